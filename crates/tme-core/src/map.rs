//! Map file aggregate: dimensions, layer tree, and the tilesets with their
//! global id ranges.

use crate::brush::{self, Brush, PaintMode, PaintOutcome};
use crate::buffer::TilePoint;
use crate::error::EditError;
use crate::guid::{self, GuidRange};
use crate::id::LayerId;
use crate::model::LayerTree;
use serde::{Deserialize, Serialize};

/// An external tileset image sliced into square tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tileset {
    pub file_id: String,
    pub name: String,
    pub image_url: String,
    pub tile_dimension: u32,
    /// Width in tiles.
    pub width: u32,
    /// Height in tiles.
    pub height: u32,
}

impl Tileset {
    pub fn tile_count(&self) -> u32 {
        self.width.saturating_mul(self.height)
    }
}

/// A tileset as used by one map, with its assigned id range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTileset {
    pub tileset: Tileset,
    pub range: GuidRange,
}

/// The aggregate root of one map.
#[derive(Debug, Clone)]
pub struct MapFile {
    pub tile_dimension: u32,
    /// Width in tiles.
    pub width: u32,
    /// Height in tiles.
    pub height: u32,
    pub tree: LayerTree,
    pub tilesets: Vec<MapTileset>,
}

impl MapFile {
    pub fn new(tile_dimension: u32, width: u32, height: u32) -> Self {
        Self {
            tile_dimension,
            width,
            height,
            tree: LayerTree::new(LayerId::intern("root")),
            tilesets: Vec::new(),
        }
    }

    /// Current ranges sorted by `first`, as the allocator expects.
    pub fn sorted_ranges(&self) -> Vec<GuidRange> {
        let mut ranges: Vec<GuidRange> = self.tilesets.iter().map(|t| t.range).collect();
        ranges.sort_by_key(|r| r.first);
        ranges
    }

    /// Add a tileset, placing its id range in the first free gap.
    ///
    /// # Errors
    /// `GuidSpaceExhausted` when no range of its tile count is left.
    pub fn add_tileset(&mut self, tileset: Tileset) -> Result<GuidRange, EditError> {
        let tile_count = tileset.tile_count();
        let range = guid::allocate(&self.sorted_ranges(), tile_count)
            .ok_or(EditError::GuidSpaceExhausted { tile_count })?;
        log::debug!("tileset `{}` -> gids {}..={}", tileset.name, range.first, range.last);
        self.tilesets.push(MapTileset { tileset, range });
        Ok(range)
    }

    /// Remove a tileset by file id. Its range becomes a gap for later
    /// tilesets; tiles already painted with it are left as they are.
    pub fn remove_tileset(&mut self, file_id: &str) -> Option<MapTileset> {
        let pos = self.tilesets.iter().position(|t| t.tileset.file_id == file_id)?;
        Some(self.tilesets.remove(pos))
    }

    /// The tileset owning `gid` and the gid's local index in it.
    pub fn tileset_for_gid(&self, gid: u32) -> Option<(&MapTileset, u32)> {
        self.tilesets
            .iter()
            .find_map(|t| t.range.local_index(gid).map(|local| (t, local)))
    }

    pub fn range_of(&self, file_id: &str) -> Option<GuidRange> {
        self.tilesets
            .iter()
            .find(|t| t.tileset.file_id == file_id)
            .map(|t| t.range)
    }

    /// Paint into layer `id`. See [`brush::paint`].
    ///
    /// The brush must use the map's tile size. Calls that cannot change
    /// the layer leave the tree version alone.
    pub fn paint(
        &mut self,
        id: LayerId,
        target: TilePoint,
        brush: &Brush,
        mode: PaintMode,
        extend: bool,
    ) -> Result<PaintOutcome, EditError> {
        let existing = self.tree.layer(id)?.buffer();
        let found = brush.tile_dimension();
        let expected = existing.map_or(self.tile_dimension, |b| b.tile_dimension());
        if found != self.tile_dimension || found != expected {
            return Err(EditError::TileSizeMismatch { expected, found });
        }
        if mode == PaintMode::Erase && existing.is_none() {
            return Ok(PaintOutcome::Unchanged);
        }
        let layer = self.tree.layer_mut(id)?;
        brush::paint(layer, target, brush, mode, extend)
    }

    /// Trim layer `id`. See [`brush::trim`].
    pub fn trim(&mut self, id: LayerId) -> Result<TilePoint, EditError> {
        let buffer = self.tree.layer(id)?.buffer().ok_or(EditError::NoContent(id))?;
        if buffer.opaque_pixel_bounds().is_none() {
            return Err(EditError::NoContent(id));
        }
        let layer = self.tree.layer_mut(id)?;
        brush::trim(layer, id)
    }
}
