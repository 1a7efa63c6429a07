//! Brush engine: paints and erases brush stamps into a layer's tile buffer,
//! growing the buffer when an extending stroke reaches past its edges.

use crate::buffer::{Gid, Overflow, TileBuffer, TileGrid, TilePoint};
use crate::error::EditError;
use crate::guid::GuidRange;
use crate::id::LayerId;
use crate::map::Tileset;
use crate::model::{LayerData, Position};
use image::RgbaImage;
use std::sync::Arc;

/// A stamp of tiles: a raster and the gids of each of its cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Brush {
    raster: RgbaImage,
    tiles: TileGrid,
    tile: u32,
}

impl Brush {
    /// Build a brush from parts; the raster must be exactly the grid's size.
    pub fn new(raster: RgbaImage, tiles: TileGrid, tile: u32) -> Result<Self, EditError> {
        if tile == 0 || raster.width() != tiles.cols() * tile || raster.height() != tiles.rows() * tile
        {
            return Err(EditError::BrushShape {
                width: raster.width(),
                height: raster.height(),
                cols: tiles.cols(),
                rows: tiles.rows(),
                tile,
            });
        }
        Ok(Self {
            raster,
            tiles,
            tile,
        })
    }

    /// Cut a `cols × rows` brush out of a tileset image starting at tile
    /// (`col`, `row`). Each cell gets `range.first + local index`.
    pub fn from_tileset_region(
        tileset: &Tileset,
        range: GuidRange,
        image: &RgbaImage,
        col: u32,
        row: u32,
        cols: u32,
        rows: u32,
    ) -> Result<Self, EditError> {
        let fits = |start: u32, len: u32, limit: u32| start.checked_add(len).is_some_and(|end| end <= limit);
        if cols == 0 || rows == 0 || !fits(col, cols, tileset.width) || !fits(row, rows, tileset.height) {
            return Err(EditError::RegionOutOfBounds {
                tileset: tileset.name.clone(),
                col,
                row,
                cols,
                rows,
            });
        }
        let t = tileset.tile_dimension;
        let raster = image::imageops::crop_imm(image, col * t, row * t, cols * t, rows * t).to_image();
        let mut tiles = TileGrid::new(cols, rows);
        for r in 0..rows {
            for c in 0..cols {
                let local = (row + r) * tileset.width + (col + c);
                tiles.set(c, r, Gid::new(range.first + local));
            }
        }
        Self::new(raster, tiles, t)
    }

    pub fn cols(&self) -> u32 {
        self.tiles.cols()
    }

    pub fn rows(&self) -> u32 {
        self.tiles.rows()
    }

    pub fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }

    pub fn tile_dimension(&self) -> u32 {
        self.tile
    }

    fn as_buffer(&self) -> TileBuffer {
        TileBuffer::from_parts(self.raster.clone(), self.tiles.clone(), self.tile)
            .unwrap_or_else(|| TileBuffer::new(self.cols(), self.rows(), self.tile))
    }
}

/// Whether a stroke writes tiles or clears them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintMode {
    Draw,
    Erase,
}

/// What a paint call did to the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOutcome {
    /// Nothing to do (erase on a layer without buffer).
    Unchanged,
    /// First draw into an empty layer; buffer sized to the brush.
    Created,
    /// The brush fit inside the buffer.
    Painted,
    /// The buffer grew by `Overflow` before painting.
    Extended(Overflow),
    /// Part of the brush fell outside the buffer and was dropped.
    Clipped { dropped: u32 },
}

impl PaintOutcome {
    /// Whether the layer's raster or position may have changed.
    pub fn touched(&self) -> bool {
        !matches!(self, PaintOutcome::Unchanged)
    }
}

/// Paint `brush` into `layer` with its top-left cell at `target` (tile
/// units, map-relative).
///
/// `extend` is the extending gesture (modifier held). It only grows the
/// buffer in `Draw` mode; otherwise overflowing cells are dropped.
///
/// Draw writes every occupied brush cell and leaves the buffer alone under
/// empty brush cells. Erase clears the brush's whole footprint.
///
/// # Errors
/// `TileSizeMismatch` if the layer's buffer uses another tile size than
/// the brush. The layer is left untouched.
pub fn paint(
    layer: &mut LayerData,
    target: TilePoint,
    brush: &Brush,
    mode: PaintMode,
    extend: bool,
) -> Result<PaintOutcome, EditError> {
    let tile = brush.tile;

    let Some(existing) = layer.buffer.as_ref() else {
        return Ok(match mode {
            PaintMode::Erase => PaintOutcome::Unchanged,
            PaintMode::Draw => {
                layer.buffer = Some(Arc::new(brush.as_buffer()));
                layer.position = Position::from_tiles(target, tile);
                log::trace!("created {}x{} buffer at {target:?}", brush.cols(), brush.rows());
                PaintOutcome::Created
            }
        });
    };
    if existing.tile_dimension() != tile {
        return Err(EditError::TileSizeMismatch {
            expected: existing.tile_dimension(),
            found: tile,
        });
    }

    let mut origin = layer.position.to_tiles(tile);
    let overflow = Overflow::compute(
        origin,
        existing.cols(),
        existing.rows(),
        target,
        brush.cols(),
        brush.rows(),
    );

    let mut outcome = PaintOutcome::Painted;
    if !overflow.is_zero() && extend && mode == PaintMode::Draw {
        let grown = existing.grown(overflow);
        origin = TilePoint::new(
            origin.x - overflow.left as i32,
            origin.y - overflow.top as i32,
        );
        log::debug!(
            "extending buffer {}x{} -> {}x{}",
            existing.cols(),
            existing.rows(),
            grown.cols(),
            grown.rows()
        );
        // Buffer and position are swapped together.
        layer.buffer = Some(Arc::new(grown));
        layer.position = Position::from_tiles(origin, tile);
        outcome = PaintOutcome::Extended(overflow);
    }

    let Some(buffer) = layer.buffer.as_mut() else {
        return Ok(PaintOutcome::Unchanged);
    };
    let buffer = Arc::make_mut(buffer);
    let mut dropped = 0;
    for r in 0..brush.rows() {
        for c in 0..brush.cols() {
            let col = target.x as i64 + c as i64 - origin.x as i64;
            let row = target.y as i64 + r as i64 - origin.y as i64;
            if col < 0 || row < 0 || col >= buffer.cols() as i64 || row >= buffer.rows() as i64 {
                dropped += 1;
                continue;
            }
            let (col, row) = (col as u32, row as u32);
            match mode {
                PaintMode::Draw => {
                    if let Some(gid) = brush.tiles.get(c, r) {
                        buffer.write_tile(col, row, &brush.raster, c * tile, r * tile, gid);
                    }
                }
                PaintMode::Erase => buffer.clear_tile(col, row),
            }
        }
    }

    if dropped > 0 && matches!(outcome, PaintOutcome::Painted) {
        outcome = PaintOutcome::Clipped { dropped };
    }
    log::trace!("paint {mode:?} at {target:?}: {outcome:?}");
    Ok(outcome)
}

/// Crop `layer`'s buffer to its opaque content and shift its position by
/// the crop offset.
///
/// # Errors
/// `NoContent` if the layer has no buffer or no opaque pixel.
pub fn trim(layer: &mut LayerData, id: LayerId) -> Result<TilePoint, EditError> {
    let buffer = layer.buffer.as_ref().ok_or(EditError::NoContent(id))?;
    let tile = buffer.tile_dimension();
    let (trimmed, rect) = buffer.trimmed().ok_or(EditError::NoContent(id))?;
    let origin = layer.position.to_tiles(tile);
    let new_origin = TilePoint::new(origin.x + rect.col as i32, origin.y + rect.row as i32);
    layer.buffer = Some(Arc::new(trimmed));
    layer.position = Position::from_tiles(new_origin, tile);
    log::debug!("trimmed {id:?} to {}x{} at {new_origin:?}", rect.cols, rect.rows);
    Ok(new_origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use pretty_assertions::assert_eq;

    const T: u32 = 4;

    /// Opaque brush whose cells hold `first..first + cols*rows`.
    fn brush(cols: u32, rows: u32, first: u32) -> Brush {
        let raster = RgbaImage::from_pixel(cols * T, rows * T, Rgba([10, 200, 10, 255]));
        let mut tiles = TileGrid::new(cols, rows);
        for r in 0..rows {
            for c in 0..cols {
                tiles.set(c, r, Gid::new(first + r * cols + c));
            }
        }
        Brush::new(raster, tiles, T).unwrap()
    }

    fn grid(layer: &LayerData) -> Vec<Vec<u32>> {
        layer.buffer().unwrap().tiles().to_rows()
    }

    #[test]
    fn first_draw_creates_buffer_at_target() {
        let mut layer = LayerData::default();
        let out = paint(&mut layer, TilePoint::new(3, -2), &brush(2, 1, 5), PaintMode::Draw, false).unwrap();
        assert_eq!(out, PaintOutcome::Created);
        assert_eq!(layer.position, Position::new(12, -8));
        assert_eq!(grid(&layer), vec![vec![5, 6]]);
    }

    #[test]
    fn erase_on_empty_layer_is_noop() {
        let mut layer = LayerData::default();
        let out = paint(&mut layer, TilePoint::new(0, 0), &brush(1, 1, 1), PaintMode::Erase, true).unwrap();
        assert_eq!(out, PaintOutcome::Unchanged);
        assert!(layer.buffer.is_none());
    }

    #[test]
    fn contained_draw_overwrites_cells() {
        let mut layer = LayerData::default();
        paint(&mut layer, TilePoint::new(0, 0), &brush(3, 3, 1), PaintMode::Draw, false).unwrap();
        let out = paint(&mut layer, TilePoint::new(1, 1), &brush(1, 1, 40), PaintMode::Draw, false).unwrap();
        assert_eq!(out, PaintOutcome::Painted);
        assert_eq!(grid(&layer), vec![vec![1, 2, 3], vec![4, 40, 6], vec![7, 8, 9]]);
    }

    #[test]
    fn extend_grows_left_and_up() {
        let mut layer = LayerData::default();
        paint(&mut layer, TilePoint::new(2, 2), &brush(1, 1, 1), PaintMode::Draw, false).unwrap();
        let out = paint(&mut layer, TilePoint::new(0, 1), &brush(1, 1, 2), PaintMode::Draw, true).unwrap();
        assert_eq!(
            out,
            PaintOutcome::Extended(Overflow {
                left: 2,
                right: 0,
                top: 1,
                bottom: 0
            })
        );
        assert_eq!(layer.position, Position::new(0, 4));
        assert_eq!(grid(&layer), vec![vec![2, 0, 0], vec![0, 0, 1]]);
        assert!(layer.buffer().unwrap().is_consistent());
    }

    #[test]
    fn overflow_without_gesture_is_clipped() {
        let mut layer = LayerData::default();
        paint(&mut layer, TilePoint::new(0, 0), &brush(2, 2, 1), PaintMode::Draw, false).unwrap();
        let out = paint(&mut layer, TilePoint::new(1, 1), &brush(2, 2, 10), PaintMode::Draw, false).unwrap();
        assert_eq!(out, PaintOutcome::Clipped { dropped: 3 });
        assert_eq!(grid(&layer), vec![vec![1, 2], vec![3, 10]]);
        assert_eq!(layer.position, Position::new(0, 0));
    }

    #[test]
    fn erase_never_extends() {
        let mut layer = LayerData::default();
        paint(&mut layer, TilePoint::new(0, 0), &brush(2, 1, 1), PaintMode::Draw, false).unwrap();
        let out = paint(&mut layer, TilePoint::new(1, 0), &brush(2, 1, 1), PaintMode::Erase, true).unwrap();
        assert_eq!(out, PaintOutcome::Clipped { dropped: 1 });
        assert_eq!(grid(&layer), vec![vec![1, 0]]);
    }

    #[test]
    fn draw_skips_empty_brush_cells() {
        let mut layer = LayerData::default();
        paint(&mut layer, TilePoint::new(0, 0), &brush(2, 1, 1), PaintMode::Draw, false).unwrap();
        let mut holey = brush(2, 1, 7);
        holey.tiles.set(0, 0, None);
        paint(&mut layer, TilePoint::new(0, 0), &holey, PaintMode::Draw, false).unwrap();
        assert_eq!(grid(&layer), vec![vec![1, 8]]);
    }

    #[test]
    fn trim_shifts_position() {
        let mut layer = LayerData::default();
        paint(&mut layer, TilePoint::new(0, 0), &brush(3, 3, 1), PaintMode::Draw, false).unwrap();
        paint(&mut layer, TilePoint::new(0, 0), &brush(3, 1, 1), PaintMode::Erase, false).unwrap();
        paint(&mut layer, TilePoint::new(0, 0), &brush(1, 3, 1), PaintMode::Erase, false).unwrap();
        let origin = trim(&mut layer, LayerId::intern("trim_layer")).unwrap();
        assert_eq!(origin, TilePoint::new(1, 1));
        assert_eq!(layer.position, Position::new(4, 4));
        assert_eq!(grid(&layer), vec![vec![5, 6], vec![8, 9]]);
    }

    #[test]
    fn trim_empty_is_no_content() {
        let id = LayerId::intern("trim_empty");
        let mut layer = LayerData::default();
        assert_eq!(trim(&mut layer, id), Err(EditError::NoContent(id)));
        paint(&mut layer, TilePoint::new(0, 0), &brush(1, 1, 1), PaintMode::Draw, false).unwrap();
        paint(&mut layer, TilePoint::new(0, 0), &brush(1, 1, 1), PaintMode::Erase, false).unwrap();
        let before = layer.clone();
        assert_eq!(trim(&mut layer, id), Err(EditError::NoContent(id)));
        assert_eq!(layer, before);
    }

    #[test]
    fn brush_with_other_tile_size_is_rejected() {
        let mut layer = LayerData::default();
        paint(&mut layer, TilePoint::new(1, 1), &brush(1, 1, 1), PaintMode::Draw, false).unwrap();
        let before = layer.clone();

        let mut tiles = TileGrid::new(1, 1);
        tiles.set(0, 0, Gid::new(2));
        let large = Brush::new(RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 255])), tiles, 8).unwrap();
        assert_eq!(
            paint(&mut layer, TilePoint::new(0, 0), &large, PaintMode::Draw, true),
            Err(EditError::TileSizeMismatch { expected: T, found: 8 })
        );
        assert_eq!(layer, before);
    }

    #[test]
    fn brush_shape_is_checked() {
        let err = Brush::new(RgbaImage::new(5, 4), TileGrid::new(1, 1), 4).unwrap_err();
        assert!(matches!(err, EditError::BrushShape { width: 5, .. }));
    }

    #[test]
    fn brush_from_tileset_region_numbers_cells() {
        let ts = Tileset {
            file_id: "ts".into(),
            name: "terrain".into(),
            image_url: "terrain.png".into(),
            tile_dimension: T,
            width: 4,
            height: 3,
        };
        let image = RgbaImage::from_pixel(4 * T, 3 * T, Rgba([1, 2, 3, 255]));
        let b = Brush::from_tileset_region(&ts, GuidRange::new(11, 22), &image, 1, 1, 2, 2).unwrap();
        assert_eq!(b.tiles().to_rows(), vec![vec![16, 17], vec![20, 21]]);
        assert!(Brush::from_tileset_region(&ts, GuidRange::new(11, 22), &image, 3, 0, 2, 1).is_err());
    }
}
