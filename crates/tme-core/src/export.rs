//! Export pipeline: map → Tiled document (TMX or JSON) plus one tileset
//! document and image per tileset, collected into a bundle.
//!
//! Layers are emitted bottom of the stack first, as Tiled expects. Every
//! tile layer is flattened to a map-sized array: the layer's grid is laid
//! over a zero-filled `width × height` grid at its tile position and cells
//! outside the map are dropped.

use crate::compose::encode_png;
use crate::error::ExportError;
use crate::id::LayerId;
use crate::load::TilesetImages;
use crate::map::MapFile;
use crate::model::{LayerData, NodeKind};
use crate::{tiled_json, tmx};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ─── Config ───────────────────────────────────────────────────────────────

/// Output document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// `map.tmx` + `.tsx` tilesets.
    #[default]
    Tmx,
    /// `map.json` + `.tsj` tilesets.
    Json,
}

impl ExportFormat {
    pub fn map_file_name(self) -> &'static str {
        match self {
            ExportFormat::Tmx => "map.tmx",
            ExportFormat::Json => "map.json",
        }
    }

    pub fn tileset_extension(self) -> &'static str {
        match self {
            ExportFormat::Tmx => "tsx",
            ExportFormat::Json => "tsj",
        }
    }
}

/// Configuration for `export_map`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportConfig {
    pub format: ExportFormat,

    /// Written to the `tiledversion` attribute. Default: **1.9.2**.
    pub tiled_version: String,

    /// Emit invisible layers (with `visible = 0`). Default: **true**.
    pub include_hidden_layers: bool,

    /// Put each tileset's PNG into the bundle. Default: **true**.
    pub include_tileset_images: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Tmx,
            tiled_version: "1.9.2".to_string(),
            include_hidden_layers: true,
            include_tileset_images: true,
        }
    }
}

/// Tiled format version the documents follow.
pub const TILED_FORMAT_VERSION: &str = "1.9";

// ─── Document model ───────────────────────────────────────────────────────

/// A tileset reference as it appears in the map document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilesetRef {
    pub firstgid: u32,
    pub name: String,
    /// File stem shared by the tileset document and its image.
    pub stem: String,
    pub tile: u32,
    pub columns: u32,
    pub tilecount: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub file_id: String,
}

/// A layer record, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportLayer {
    Tiles {
        id: u32,
        name: String,
        opacity: f32,
        visible: bool,
        /// `width * height` ids, row-major, `0` = empty.
        data: Vec<u32>,
    },
    Group {
        id: u32,
        name: String,
        layers: Vec<ExportLayer>,
    },
}

/// Format-independent description of the exported map.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDocument {
    pub width: u32,
    pub height: u32,
    pub tile: u32,
    pub tilesets: Vec<TilesetRef>,
    pub layers: Vec<ExportLayer>,
    pub next_layer_id: u32,
}

/// One file of the export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// All files produced by one export. Packing them (e.g. into a ZIP) is
/// up to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportBundle {
    pub entries: Vec<BundleEntry>,
}

impl ExportBundle {
    fn push(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        self.entries.push(BundleEntry {
            path: path.into(),
            bytes,
        });
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.bytes.as_slice())
    }

    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.path.as_str()).collect()
    }
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Overlay `layer`'s grid onto a zero-filled `width × height` grid.
#[must_use]
pub fn flatten_layer(layer: &LayerData, width: u32, height: u32, tile: u32) -> Vec<u32> {
    let mut data = vec![0; (width * height) as usize];
    let Some(buffer) = layer.buffer() else {
        return data;
    };
    let origin = layer.position.to_tiles(tile);
    for (col, row, gid) in buffer.tiles().occupied() {
        let x = origin.x as i64 + col as i64;
        let y = origin.y as i64 + row as i64;
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            continue;
        }
        data[(y * width as i64 + x) as usize] = gid.get();
    }
    data
}

/// Build the format-independent document for `map`.
#[must_use]
pub fn build_document(map: &MapFile, config: &ExportConfig) -> ExportDocument {
    let mut next_id = 1;
    let layers = build_layers(map, map.tree.root_id(), config, &mut next_id);

    let mut sorted: Vec<_> = map.tilesets.iter().collect();
    sorted.sort_by_key(|t| t.range.first);
    let mut used_stems = HashSet::new();
    let tilesets = sorted
        .into_iter()
        .map(|t| {
            let ts = &t.tileset;
            TilesetRef {
                firstgid: t.range.first,
                name: ts.name.clone(),
                stem: unique_stem(&ts.name, &mut used_stems),
                tile: ts.tile_dimension,
                columns: ts.width,
                tilecount: ts.tile_count(),
                image_width: ts.width * ts.tile_dimension,
                image_height: ts.height * ts.tile_dimension,
                file_id: ts.file_id.clone(),
            }
        })
        .collect();

    ExportDocument {
        width: map.width,
        height: map.height,
        tile: map.tile_dimension,
        tilesets,
        layers,
        next_layer_id: next_id,
    }
}

/// Export `map` as a bundle: the map document, one tileset document per
/// tileset, and (optionally) each tileset's PNG.
///
/// # Errors
/// `MissingTilesetImage` when images are requested but one is absent;
/// encoding failures otherwise.
pub fn export_map(
    map: &MapFile,
    images: &TilesetImages,
    config: &ExportConfig,
) -> Result<ExportBundle, ExportError> {
    let doc = build_document(map, config);
    let mut bundle = ExportBundle::default();

    let map_bytes = match config.format {
        ExportFormat::Tmx => tmx::write_map(&doc, config).into_bytes(),
        ExportFormat::Json => tiled_json::write_map(&doc, config)?,
    };
    bundle.push(config.format.map_file_name(), map_bytes);

    for ts in &doc.tilesets {
        let path = format!("{}.{}", ts.stem, config.format.tileset_extension());
        let bytes = match config.format {
            ExportFormat::Tmx => tmx::write_tileset(ts, config).into_bytes(),
            ExportFormat::Json => tiled_json::write_tileset(ts, config)?,
        };
        bundle.push(path, bytes);

        if config.include_tileset_images {
            let image = images
                .get(&ts.file_id)
                .ok_or_else(|| ExportError::MissingTilesetImage(ts.name.clone()))?;
            bundle.push(format!("{}.png", ts.stem), encode_png(image)?);
        }
    }

    log::debug!(
        "exported {} ({} file(s))",
        config.format.map_file_name(),
        bundle.entries.len()
    );
    Ok(bundle)
}

// ─── Internals ────────────────────────────────────────────────────────────

/// Children of `group`, bottom of the stack first, recursively.
fn build_layers(
    map: &MapFile,
    group: LayerId,
    config: &ExportConfig,
    next_id: &mut u32,
) -> Vec<ExportLayer> {
    let mut children = map.tree.children(group).unwrap_or_default();
    children.reverse();

    let mut out = Vec::with_capacity(children.len());
    for child in children {
        let Some(node) = map.tree.get(child) else {
            continue;
        };
        match &node.kind {
            NodeKind::Group { .. } => {
                let id = take_id(next_id);
                let layers = build_layers(map, child, config, next_id);
                out.push(ExportLayer::Group {
                    id,
                    name: node.name.clone(),
                    layers,
                });
            }
            NodeKind::Layer(data) => {
                if !data.visible && !config.include_hidden_layers {
                    continue;
                }
                out.push(ExportLayer::Tiles {
                    id: take_id(next_id),
                    name: node.name.clone(),
                    opacity: data.opacity,
                    visible: data.visible,
                    data: flatten_layer(data, map.width, map.height, map.tile_dimension),
                });
            }
        }
    }
    out
}

fn take_id(next_id: &mut u32) -> u32 {
    let id = *next_id;
    *next_id += 1;
    id
}

/// A file-system friendly stem for `name`, unique within one export.
fn unique_stem(name: &str, used: &mut HashSet<String>) -> String {
    let mut base: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if base.is_empty() {
        base.push_str("tileset");
    }
    let mut stem = base.clone();
    let mut n = 2;
    while !used.insert(stem.clone()) {
        stem = format!("{base}_{n}");
        n += 1;
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{TileBuffer, TileGrid};
    use crate::model::{LayerNode, Position};
    use std::sync::Arc;
    use pretty_assertions::assert_eq;

    fn layer_with_grid(rows: &[Vec<u32>], position: Position, tile: u32) -> LayerData {
        let grid = TileGrid::from_rows(rows).unwrap();
        let raster = image::RgbaImage::new(grid.cols() * tile, grid.rows() * tile);
        LayerData {
            position,
            buffer: Some(Arc::new(TileBuffer::from_parts(raster, grid, tile).unwrap())),
            ..LayerData::default()
        }
    }

    #[test]
    fn flatten_places_grid_at_tile_offset() {
        let layer = layer_with_grid(&[vec![5, 6], vec![7, 8]], Position::new(2 * 16, 3 * 16), 16);
        let data = flatten_layer(&layer, 6, 5, 16);
        assert_eq!(data.len(), 30);
        assert_eq!(data[3 * 6 + 2], 5);
        assert_eq!(data[3 * 6 + 3], 6);
        assert_eq!(data[4 * 6 + 2], 7);
        assert_eq!(data[4 * 6 + 3], 8);
        assert_eq!(data.iter().filter(|&&v| v != 0).count(), 4);
    }

    #[test]
    fn flatten_drops_cells_outside_the_map() {
        let layer = layer_with_grid(&[vec![1, 2, 3], vec![4, 5, 6]], Position::new(-8, 4), 4);
        let data = flatten_layer(&layer, 2, 2, 4);
        assert_eq!(data, vec![0, 0, 3, 0]);
    }

    #[test]
    fn empty_layer_flattens_to_zeros() {
        assert_eq!(flatten_layer(&LayerData::default(), 2, 2, 8), vec![0; 4]);
    }

    #[test]
    fn layers_are_emitted_bottom_up_with_sequential_ids() {
        let mut map = MapFile::new(8, 2, 2);
        let root = map.tree.root_id();
        let (top, group, inner_top, inner_bottom) = (
            LayerId::intern("ex_top"),
            LayerId::intern("ex_group"),
            LayerId::intern("ex_inner_top"),
            LayerId::intern("ex_inner_bottom"),
        );
        map.tree.insert(root, Some(0), LayerNode::layer(top, "top")).unwrap();
        map.tree.insert(root, Some(1), LayerNode::group(group, "group")).unwrap();
        map.tree.insert(group, Some(0), LayerNode::layer(inner_top, "inner top")).unwrap();
        map.tree.insert(group, Some(1), LayerNode::layer(inner_bottom, "inner bottom")).unwrap();

        let doc = build_document(&map, &ExportConfig::default());
        let summary: Vec<(u32, String)> = doc
            .layers
            .iter()
            .flat_map(|l| match l {
                ExportLayer::Group { id, name, layers } => {
                    let mut v = vec![(*id, name.clone())];
                    v.extend(layers.iter().map(|l| match l {
                        ExportLayer::Tiles { id, name, .. } | ExportLayer::Group { id, name, .. } => {
                            (*id, name.clone())
                        }
                    }));
                    v
                }
                ExportLayer::Tiles { id, name, .. } => vec![(*id, name.clone())],
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, "group".to_string()),
                (2, "inner bottom".to_string()),
                (3, "inner top".to_string()),
                (4, "top".to_string()),
            ]
        );
        assert_eq!(doc.next_layer_id, 5);
    }

    #[test]
    fn hidden_layers_can_be_left_out() {
        let mut map = MapFile::new(8, 2, 2);
        let root = map.tree.root_id();
        let mut hidden = LayerNode::layer(LayerId::intern("ex_hidden"), "hidden");
        hidden.as_layer_mut().unwrap().visible = false;
        map.tree.insert(root, None, hidden).unwrap();
        let config = ExportConfig {
            include_hidden_layers: false,
            ..ExportConfig::default()
        };
        assert!(build_document(&map, &config).layers.is_empty());
        assert_eq!(build_document(&map, &ExportConfig::default()).layers.len(), 1);
    }

    #[test]
    fn stems_are_unique_and_safe() {
        let mut used = HashSet::new();
        assert_eq!(unique_stem("Grass Tiles", &mut used), "Grass_Tiles");
        assert_eq!(unique_stem("Grass/Tiles", &mut used), "Grass_Tiles_2");
        assert_eq!(unique_stem("", &mut used), "tileset");
    }

    #[test]
    fn config_reads_partial_json() {
        let config: ExportConfig = serde_json::from_str(r#"{ "format": "json" }"#).unwrap();
        assert_eq!(config.format, ExportFormat::Json);
        assert_eq!(config.tiled_version, "1.9.2");
        assert!(config.include_tileset_images);
    }
}
