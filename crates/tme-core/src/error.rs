//! Error kinds for the layer engine.
//!
//! Data-model errors (`NotFound`, `InvalidMove`, `NoContent`) are
//! recoverable: callers treat them as a no-op and log them. Load and export
//! errors are terminal for the operation that produced them.

use crate::id::LayerId;
use thiserror::Error;

/// Errors from tree mutations and buffer edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// The referenced layer id is not in the tree.
    #[error("layer `{0}` not found")]
    NotFound(LayerId),

    /// `move_selected` target lies inside the selection (would create a cycle).
    #[error("cannot move the selection into itself")]
    InvalidMove,

    /// `move_selected` with an empty selection.
    #[error("nothing is selected")]
    EmptySelection,

    /// `trim` on a buffer without any opaque pixel.
    #[error("layer `{0}` has no content to trim")]
    NoContent(LayerId),

    /// A leaf-only operation was given a group.
    #[error("`{0}` is a group, not a layer")]
    NotALayer(LayerId),

    /// A container-only operation was given a leaf layer.
    #[error("`{0}` is a layer, not a group")]
    NotAGroup(LayerId),

    /// The root group cannot be replaced, selected, or deleted.
    #[error("the root group cannot be modified this way")]
    RootImmutable,

    /// A replacement node of a different kind (group vs layer).
    #[error("replacement for `{0}` changes its kind")]
    KindMismatch(LayerId),

    /// An id is already present in the tree.
    #[error("layer id `{0}` already exists")]
    DuplicateId(LayerId),

    /// A brush whose raster does not match its tile grid.
    #[error("brush raster {width}x{height} does not match a {cols}x{rows} grid of {tile}px tiles")]
    BrushShape {
        width: u32,
        height: u32,
        cols: u32,
        rows: u32,
        tile: u32,
    },

    /// A brush painted into a layer or map with another tile size.
    #[error("brush uses {found}px tiles, expected {expected}px")]
    TileSizeMismatch { expected: u32, found: u32 },

    /// No range of global tile ids is left for a tileset.
    #[error("no free range of {tile_count} tile ids")]
    GuidSpaceExhausted { tile_count: u32 },

    /// A tileset region outside the tileset.
    #[error("region {cols}x{rows} at ({col},{row}) exceeds tileset `{tileset}`")]
    RegionOutOfBounds {
        tileset: String,
        col: u32,
        row: u32,
        cols: u32,
        rows: u32,
    },
}

/// Errors while turning stored data back into in-memory buffers.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A layer grid whose rows have different lengths.
    #[error("tile grid for `{layer}` is ragged (row {row} has {found} cells, expected {expected})")]
    RaggedGrid {
        layer: LayerId,
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A gid that no tileset range covers.
    #[error("tile id {gid} in `{layer}` is not covered by any tileset")]
    UnknownGid { layer: LayerId, gid: u32 },

    /// A tileset image that was never fetched.
    #[error("no image loaded for tileset `{0}`")]
    MissingTilesetImage(String),

    /// A tileset image smaller than its declared tile grid.
    #[error("tileset `{name}` image is {width}x{height}, smaller than declared")]
    TilesetImageTooSmall { name: String, width: u32, height: u32 },
}

/// Errors while producing export documents.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no image available for tileset `{0}`")]
    MissingTilesetImage(String),
}
