//! Async map loading over a `MapStore`.
//!
//! The stored map document comes first; it names every tileset image and
//! layer grid to fetch. Those are fetched concurrently on a `JoinSet` and
//! joined before any buffer is built, so a map is either fully
//! materialized or not loaded at all.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tme_core::error::LoadError as DecodeError;
use tme_core::load::{self, TilesetImages};
use tme_core::{EditError, LayerId, MapFile, RgbaImage, StoredMapResponse};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("`{0}` not found")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("fetching `{resource}` failed: {source}")]
    Store {
        resource: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("stored layer tree is invalid: {0}")]
    Model(#[from] EditError),

    #[error("load task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The persistence service a map is loaded from.
pub trait MapStore: Send + Sync + 'static {
    /// The stored map document plus fetch URLs for its resources.
    fn fetch_map(&self, file_id: &str) -> impl Future<Output = Result<StoredMapResponse, StoreError>> + Send;

    /// Raw bytes behind a URL from `signed_urls` (or a tileset's `image_url`).
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send;
}

/// A fully materialized map and the tileset images its buffers came from.
#[derive(Debug, Clone)]
pub struct LoadedMap {
    pub map: MapFile,
    pub images: TilesetImages,
}

/// Identifies one load request; a session only installs the result of its
/// latest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct LoadGeneration(u64);

impl LoadGeneration {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

enum Fetched {
    Image(String, RgbaImage),
    Grid(LayerId, Vec<Vec<u32>>),
}

/// Fetch, decode and materialize the map `file_id`.
pub async fn load_map<S: MapStore>(store: Arc<S>, file_id: &str) -> Result<LoadedMap, LoadError> {
    let response = store.fetch_map(file_id).await.map_err(|source| LoadError::Store {
        resource: file_id.to_string(),
        source,
    })?;
    let mut map = response.file.to_map()?;

    let mut tasks: JoinSet<Result<Fetched, LoadError>> = JoinSet::new();
    for ts in &map.tilesets {
        let key = ts.tileset.file_id.clone();
        let url = response
            .signed_urls
            .get(&key)
            .cloned()
            .unwrap_or_else(|| ts.tileset.image_url.clone());
        if url.is_empty() {
            log::warn!("tileset `{}` has no image url", ts.tileset.name);
            continue;
        }
        let store = Arc::clone(&store);
        tasks.spawn(async move {
            let bytes = store.fetch(&url).await.map_err(|source| LoadError::Store {
                resource: key.clone(),
                source,
            })?;
            let image = load::decode_tileset_image(&bytes)?;
            Ok(Fetched::Image(key, image))
        });
    }
    for id in map.tree.layers_bottom_up() {
        let Some(url) = response.signed_urls.get(id.as_str()).cloned() else {
            continue;
        };
        let store = Arc::clone(&store);
        tasks.spawn(async move {
            let bytes = store.fetch(&url).await.map_err(|source| LoadError::Store {
                resource: id.to_string(),
                source,
            })?;
            Ok(Fetched::Grid(id, load::parse_grid(&bytes)?))
        });
    }

    let mut images = TilesetImages::new();
    let mut grids = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined?? {
            Fetched::Image(key, image) => {
                images.insert(key, image);
            }
            Fetched::Grid(id, rows) => {
                grids.insert(id, rows);
            }
        }
    }

    let built = load::materialize_all(&mut map, &grids, &images)?;
    log::debug!(
        "loaded map `{file_id}`: {} tileset image(s), {built} layer buffer(s)",
        images.len()
    );
    Ok(LoadedMap { map, images })
}

// ─── In-memory store ─────────────────────────────────────────────────────

/// A `MapStore` over in-memory documents and blobs, for headless hosts and
/// tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    maps: HashMap<String, StoredMapResponse>,
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_map(&mut self, file_id: impl Into<String>, response: StoredMapResponse) {
        self.maps.insert(file_id.into(), response);
    }

    pub fn insert_blob(&mut self, url: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.insert(url.into(), bytes);
    }
}

impl MapStore for MemoryStore {
    async fn fetch_map(&self, file_id: &str) -> Result<StoredMapResponse, StoreError> {
        self.maps
            .get(file_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(file_id.to_string()))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .get(url)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(url.to_string()))
    }
}
