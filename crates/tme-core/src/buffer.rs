//! Per-layer tile buffers: an RGBA raster plus an aligned grid of tile ids.
//!
//! The raster's pixel size is always `cols * tile` × `rows * tile`; every
//! operation here replaces or edits both halves together so the two never
//! disagree.

use image::{Rgba, RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// A global tile id (1-based). `Option<Gid>` is the cell type of a grid;
/// `None` is an empty cell and exports as `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(NonZeroU32);

impl Gid {
    /// Wrap a raw id. `0` means "no tile" and yields `None`.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Gid)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// A position in tile units. May be negative: layers can extend above or
/// left of the map origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TilePoint {
    pub x: i32,
    pub y: i32,
}

impl TilePoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A rectangle of cells inside a grid, in tile units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileRect {
    pub col: u32,
    pub row: u32,
    pub cols: u32,
    pub rows: u32,
}

/// How far a brush reaches past a buffer's edges, in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Overflow {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl Overflow {
    /// Overflow of a `brush_cols × brush_rows` brush placed at `target`
    /// against a `cols × rows` buffer whose top-left tile is `origin`.
    pub fn compute(
        origin: TilePoint,
        cols: u32,
        rows: u32,
        target: TilePoint,
        brush_cols: u32,
        brush_rows: u32,
    ) -> Self {
        let buf_right = origin.x as i64 + cols as i64;
        let buf_bottom = origin.y as i64 + rows as i64;
        let brush_right = target.x as i64 + brush_cols as i64;
        let brush_bottom = target.y as i64 + brush_rows as i64;
        Self {
            left: (origin.x as i64 - target.x as i64).max(0) as u32,
            right: (brush_right - buf_right).max(0) as u32,
            top: (origin.y as i64 - target.y as i64).max(0) as u32,
            bottom: (brush_bottom - buf_bottom).max(0) as u32,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }
}

// ─── Tile grid ───────────────────────────────────────────────────────────

/// Row-major grid of tile ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    cols: u32,
    rows: u32,
    cells: Vec<Option<Gid>>,
}

impl TileGrid {
    /// An all-empty grid.
    pub fn new(cols: u32, rows: u32) -> Self {
        Self {
            cols,
            rows,
            cells: vec![None; (cols * rows) as usize],
        }
    }

    /// Build from nested rows of raw ids (`0` = empty).
    ///
    /// # Errors
    /// Returns `(row, expected, found)` for the first row whose length
    /// differs from the first row.
    pub fn from_rows(rows: &[Vec<u32>]) -> Result<Self, (usize, usize, usize)> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut cells = Vec::with_capacity(cols * rows.len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err((i, cols, row.len()));
            }
            cells.extend(row.iter().map(|&raw| Gid::new(raw)));
        }
        Ok(Self {
            cols: cols as u32,
            rows: rows.len() as u32,
            cells,
        })
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    fn offset(&self, col: u32, row: u32) -> Option<usize> {
        (col < self.cols && row < self.rows).then(|| (row * self.cols + col) as usize)
    }

    /// Cell at (`col`, `row`); `None` for empty or out-of-range cells.
    pub fn get(&self, col: u32, row: u32) -> Option<Gid> {
        self.offset(col, row).and_then(|i| self.cells[i])
    }

    /// Set a cell. Out-of-range writes are ignored.
    pub fn set(&mut self, col: u32, row: u32, gid: Option<Gid>) {
        if let Some(i) = self.offset(col, row) {
            self.cells[i] = gid;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// Iterate `(col, row, gid)` over occupied cells.
    pub fn occupied(&self) -> impl Iterator<Item = (u32, u32, Gid)> + '_ {
        let cols = self.cols.max(1);
        self.cells
            .iter()
            .enumerate()
            .filter_map(move |(i, c)| c.map(|g| (i as u32 % cols, i as u32 / cols, g)))
    }

    /// Minimal rectangle containing every occupied cell.
    pub fn occupied_bounds(&self) -> Option<TileRect> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (col, row, _) in self.occupied() {
            bounds = Some(match bounds {
                None => (col, row, col, row),
                Some((c0, r0, c1, r1)) => (c0.min(col), r0.min(row), c1.max(col), r1.max(row)),
            });
        }
        bounds.map(|(c0, r0, c1, r1)| TileRect {
            col: c0,
            row: r0,
            cols: c1 - c0 + 1,
            rows: r1 - r0 + 1,
        })
    }

    /// A larger grid with this one copied at (`left`, `top`).
    pub fn grown(&self, overflow: Overflow) -> Self {
        let mut out = Self::new(
            self.cols + overflow.left + overflow.right,
            self.rows + overflow.top + overflow.bottom,
        );
        for (col, row, gid) in self.occupied() {
            out.set(col + overflow.left, row + overflow.top, Some(gid));
        }
        out
    }

    /// The cells inside `rect`.
    pub fn cropped(&self, rect: TileRect) -> Self {
        let mut out = Self::new(rect.cols, rect.rows);
        for row in 0..rect.rows {
            for col in 0..rect.cols {
                out.set(col, row, self.get(rect.col + col, rect.row + row));
            }
        }
        out
    }

    /// Nested rows of raw ids (`0` = empty), the stored/wire shape.
    pub fn to_rows(&self) -> Vec<Vec<u32>> {
        (0..self.rows)
            .map(|row| {
                (0..self.cols)
                    .map(|col| self.get(col, row).map_or(0, Gid::get))
                    .collect()
            })
            .collect()
    }
}

// ─── Tile buffer ─────────────────────────────────────────────────────────

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Raster + tile grid owned by one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TileBuffer {
    raster: RgbaImage,
    tiles: TileGrid,
    tile: u32,
}

impl TileBuffer {
    /// A transparent, all-empty buffer of `cols × rows` tiles.
    pub fn new(cols: u32, rows: u32, tile: u32) -> Self {
        Self {
            raster: RgbaImage::new(cols * tile, rows * tile),
            tiles: TileGrid::new(cols, rows),
            tile,
        }
    }

    /// Assemble from parts. Returns `None` if the raster is not exactly
    /// `cols * tile` × `rows * tile` pixels.
    pub fn from_parts(raster: RgbaImage, tiles: TileGrid, tile: u32) -> Option<Self> {
        let ok = tile > 0
            && raster.width() == tiles.cols() * tile
            && raster.height() == tiles.rows() * tile;
        ok.then_some(Self {
            raster,
            tiles,
            tile,
        })
    }

    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }

    pub fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    pub fn tile_dimension(&self) -> u32 {
        self.tile
    }

    pub fn cols(&self) -> u32 {
        self.tiles.cols()
    }

    pub fn rows(&self) -> u32 {
        self.tiles.rows()
    }

    /// Raster and grid dimensions agree.
    pub fn is_consistent(&self) -> bool {
        self.raster.width() == self.tiles.cols() * self.tile
            && self.raster.height() == self.tiles.rows() * self.tile
    }

    pub fn gid_at(&self, col: u32, row: u32) -> Option<Gid> {
        self.tiles.get(col, row)
    }

    /// Copy one tile-sized block from `src` at pixel (`sx`, `sy`) into cell
    /// (`col`, `row`) and record `gid` there.
    pub fn write_tile(&mut self, col: u32, row: u32, src: &RgbaImage, sx: u32, sy: u32, gid: Gid) {
        if col >= self.cols() || row >= self.rows() {
            return;
        }
        let block = imageops::crop_imm(src, sx, sy, self.tile, self.tile).to_image();
        imageops::replace(
            &mut self.raster,
            &block,
            (col * self.tile) as i64,
            (row * self.tile) as i64,
        );
        self.tiles.set(col, row, Some(gid));
    }

    /// Clear one cell to transparent / empty.
    pub fn clear_tile(&mut self, col: u32, row: u32) {
        if col >= self.cols() || row >= self.rows() {
            return;
        }
        self.clear_block(col, row);
        self.tiles.set(col, row, None);
    }

    fn clear_block(&mut self, col: u32, row: u32) {
        let (x0, y0) = (col * self.tile, row * self.tile);
        for y in y0..y0 + self.tile {
            for x in x0..x0 + self.tile {
                self.raster.put_pixel(x, y, TRANSPARENT);
            }
        }
    }

    /// A larger buffer with this one blitted at (`left`, `top`) tiles.
    pub fn grown(&self, overflow: Overflow) -> Self {
        let tiles = self.tiles.grown(overflow);
        let mut raster = RgbaImage::new(tiles.cols() * self.tile, tiles.rows() * self.tile);
        imageops::replace(
            &mut raster,
            &self.raster,
            (overflow.left * self.tile) as i64,
            (overflow.top * self.tile) as i64,
        );
        Self {
            raster,
            tiles,
            tile: self.tile,
        }
    }

    /// The part of the buffer inside `rect` (tile units).
    pub fn cropped(&self, rect: TileRect) -> Self {
        let raster = imageops::crop_imm(
            &self.raster,
            rect.col * self.tile,
            rect.row * self.tile,
            rect.cols * self.tile,
            rect.rows * self.tile,
        )
        .to_image();
        Self {
            raster,
            tiles: self.tiles.cropped(rect),
            tile: self.tile,
        }
    }

    /// Bounding box of pixels with non-zero alpha, as `(x0, y0, x1, y1)`
    /// inclusive.
    pub fn opaque_pixel_bounds(&self) -> Option<(u32, u32, u32, u32)> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, px) in self.raster.enumerate_pixels() {
            if px[3] == 0 {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        bounds
    }

    /// The opaque pixel box widened outward to whole tiles.
    pub fn opaque_tile_bounds(&self) -> Option<TileRect> {
        let (x0, y0, x1, y1) = self.opaque_pixel_bounds()?;
        let (c0, r0) = (x0 / self.tile, y0 / self.tile);
        let (c1, r1) = (x1 / self.tile, y1 / self.tile);
        Some(TileRect {
            col: c0,
            row: r0,
            cols: c1 - c0 + 1,
            rows: r1 - r0 + 1,
        })
    }

    /// Whether every pixel of cell (`col`, `row`) is fully transparent.
    pub fn tile_is_transparent(&self, col: u32, row: u32) -> bool {
        let (x0, y0) = (col * self.tile, row * self.tile);
        (y0..y0 + self.tile).all(|y| (x0..x0 + self.tile).all(|x| self.raster.get_pixel(x, y)[3] == 0))
    }

    /// Crop to the opaque pixel box. Grid cells whose pixels are all
    /// transparent are cleared so the grid follows the raster.
    ///
    /// Returns the trimmed buffer and the crop offset in tiles, or `None`
    /// when the raster has no opaque pixel.
    pub fn trimmed(&self) -> Option<(Self, TileRect)> {
        let rect = self.opaque_tile_bounds()?;
        let mut out = self.cropped(rect);
        for row in 0..out.rows() {
            for col in 0..out.cols() {
                if out.tiles.get(col, row).is_some() && out.tile_is_transparent(col, row) {
                    out.tiles.set(col, row, None);
                }
            }
        }
        Some((out, rect))
    }
}
