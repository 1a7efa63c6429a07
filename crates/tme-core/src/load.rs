//! Turning stored tile grids back into in-memory buffers.
//!
//! A stored layer only carries its grid of global ids. The raster is
//! rebuilt by resolving every id to `(tileset, local index)` through the
//! map's ranges and copying that tile out of the decoded tileset image.

use crate::buffer::{TileBuffer, TileGrid};
use crate::error::LoadError;
use crate::id::LayerId;
use crate::map::MapFile;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;

/// Decoded tileset images keyed by tileset file id.
pub type TilesetImages = HashMap<String, RgbaImage>;

/// Decode one tileset image (PNG).
pub fn decode_tileset_image(bytes: &[u8]) -> Result<RgbaImage, LoadError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Parse one stored layer grid: rows of global ids, `0` = empty.
pub fn parse_grid(bytes: &[u8]) -> Result<Vec<Vec<u32>>, LoadError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Build the buffer for `layer` from its stored grid. An empty grid
/// (no rows or no columns) yields `None`.
///
/// # Errors
/// `RaggedGrid` for rows of different lengths, `UnknownGid` for an id no
/// tileset covers, `MissingTilesetImage` / `TilesetImageTooSmall` when the
/// owning tileset's image cannot supply the tile.
pub fn materialize_buffer(
    layer: LayerId,
    rows: &[Vec<u32>],
    map: &MapFile,
    images: &TilesetImages,
) -> Result<Option<TileBuffer>, LoadError> {
    let grid = TileGrid::from_rows(rows).map_err(|(row, expected, found)| LoadError::RaggedGrid {
        layer,
        row,
        expected,
        found,
    })?;
    if grid.cols() == 0 || grid.rows() == 0 {
        return Ok(None);
    }

    let tile = map.tile_dimension;
    let mut buffer = TileBuffer::new(grid.cols(), grid.rows(), tile);
    for (col, row, gid) in grid.occupied() {
        let (owner, local) = map.tileset_for_gid(gid.get()).ok_or(LoadError::UnknownGid {
            layer,
            gid: gid.get(),
        })?;
        let ts = &owner.tileset;
        let image = images
            .get(&ts.file_id)
            .ok_or_else(|| LoadError::MissingTilesetImage(ts.name.clone()))?;
        let t = ts.tile_dimension;
        if image.width() < ts.width * t || image.height() < ts.height * t {
            return Err(LoadError::TilesetImageTooSmall {
                name: ts.name.clone(),
                width: image.width(),
                height: image.height(),
            });
        }
        let sx = (local % ts.width) * t;
        let sy = (local / ts.width) * t;
        buffer.write_tile(col, row, image, sx, sy, gid);
    }
    Ok(Some(buffer))
}

/// Materialize every layer of `map` that has a stored grid. Layers without
/// one stay empty. Returns the number of buffers built.
pub fn materialize_all(
    map: &mut MapFile,
    grids: &HashMap<LayerId, Vec<Vec<u32>>>,
    images: &TilesetImages,
) -> Result<usize, LoadError> {
    let mut built = Vec::new();
    for id in map.tree.layers_bottom_up() {
        let Some(rows) = grids.get(&id) else {
            continue;
        };
        if let Some(buffer) = materialize_buffer(id, rows, map, images)? {
            built.push((id, buffer));
        }
    }
    let count = built.len();
    for (id, buffer) in built {
        if let Ok(layer) = map.tree.layer_mut(id) {
            layer.buffer = Some(Arc::new(buffer));
        }
    }
    log::debug!("materialized {count} layer buffer(s)");
    Ok(count)
}
