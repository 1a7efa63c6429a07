//! `tme-export`: export a stored map to a Tiled bundle.
//!
//! Reads a map from a store directory laid out the way the persistence
//! service serves it (`<file-id>.json` holding the stored map response,
//! plus every resource its `signedUrls` point at, relative to the
//! directory), lints it, and writes the bundle files into the output
//! directory. Set `RUST_LOG` for diagnostics.

use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tme_core::{ExportConfig, ExportError, ExportFormat, LintSeverity, StoredMapResponse, export_map, lint_map};
use tme_editor::{LoadError, MapStore, StoreError, load_map};

const USAGE: &str = "usage: tme-export <store-dir> <file-id> <out-dir> \
[--format tmx|json] [--config <export.json>] [--skip-hidden] [--no-images]";

// ─── Filesystem store ────────────────────────────────────────────────────

/// A `MapStore` over a local directory.
struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Resolve a URL from the stored map to a path inside the store. URLs
    /// may not leave the store directory.
    fn resolve(&self, url: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(url.strip_prefix("file://").unwrap_or(url));
        if rel.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
            return Err(StoreError::NotFound(url.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl MapStore for DirStore {
    async fn fetch_map(&self, file_id: &str) -> Result<StoredMapResponse, StoreError> {
        let path = self.resolve(&format!("{file_id}.json"))?;
        let bytes = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(url)?;
        Ok(tokio::fs::read(&path).await?)
    }
}

// ─── Arguments ───────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct Cli {
    store: PathBuf,
    file_id: String,
    out: PathBuf,
    config: Option<PathBuf>,
    format: Option<ExportFormat>,
    skip_hidden: bool,
    no_images: bool,
}

impl Cli {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut positional = Vec::new();
        let mut config = None;
        let mut format = None;
        let mut skip_hidden = false;
        let mut no_images = false;

        let mut it = args.iter();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--format" => {
                    format = Some(match it.next().map(String::as_str) {
                        Some("tmx") => ExportFormat::Tmx,
                        Some("json") => ExportFormat::Json,
                        other => return Err(format!("unknown format {other:?}")),
                    });
                }
                "--config" => {
                    let path = it.next().ok_or("--config needs a path")?;
                    config = Some(PathBuf::from(path));
                }
                "--skip-hidden" => skip_hidden = true,
                "--no-images" => no_images = true,
                flag if flag.starts_with("--") => return Err(format!("unknown flag `{flag}`")),
                _ => positional.push(arg.clone()),
            }
        }

        let [store, file_id, out] = <[String; 3]>::try_from(positional)
            .map_err(|p| format!("expected 3 arguments, got {}", p.len()))?;
        Ok(Self {
            store: store.into(),
            file_id,
            out: out.into(),
            config,
            format,
            skip_hidden,
            no_images,
        })
    }
}

// ─── Run ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("invalid export config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn export_config(cli: &Cli) -> Result<ExportConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => {
            let bytes = tokio::fs::read(path).await.map_err(io_error(path))?;
            serde_json::from_slice(&bytes)?
        }
        None => ExportConfig::default(),
    };
    if let Some(format) = cli.format {
        config.format = format;
    }
    if cli.skip_hidden {
        config.include_hidden_layers = false;
    }
    if cli.no_images {
        config.include_tileset_images = false;
    }
    Ok(config)
}

/// Export `cli.file_id`; returns the paths written.
async fn run(cli: &Cli) -> Result<Vec<PathBuf>, CliError> {
    let config = export_config(cli).await?;
    let store = Arc::new(DirStore {
        root: cli.store.clone(),
    });
    let loaded = load_map(store, &cli.file_id).await?;

    for diag in lint_map(&loaded.map) {
        match diag.severity {
            LintSeverity::Warning => log::warn!("[{}] {}", diag.rule, diag.message),
            LintSeverity::Info => log::info!("[{}] {}", diag.rule, diag.message),
        }
    }

    let bundle = export_map(&loaded.map, &loaded.images, &config)?;
    tokio::fs::create_dir_all(&cli.out).await.map_err(io_error(&cli.out))?;
    let mut written = Vec::with_capacity(bundle.entries.len());
    for entry in &bundle.entries {
        let path = cli.out.join(&entry.path);
        tokio::fs::write(&path, &entry.bytes).await.map_err(io_error(&path))?;
        log::debug!("wrote {} ({} bytes)", path.display(), entry.bytes.len());
        written.push(path);
    }
    Ok(written)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }
    let cli = match Cli::parse(&args) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("tme-export: {msg}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(&cli).await {
        Ok(written) => {
            log::info!("exported `{}` to {} file(s)", cli.file_id, written.len());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("tme-export: {err}");
            ExitCode::FAILURE
        }
    }
}
