//! Tool system for canvas interactions.
//!
//! Each tool translates input events into `LayerMutation`s that the
//! session applies to its map.
//!
//! ## Modifier behaviors
//!
//! | Modifier | Brush (draw) | Brush (erase) |
//! |----------|--------------|---------------|
//! | **extend** (configurable, Shift by default) | Grow the layer to fit the brush | ignored |

use crate::input::{InputEvent, Modifier, Modifiers};
use crate::session::LayerMutation;
use tme_core::id::LayerId;
use tme_core::{PaintMode, TilePoint};

/// The active tool determines how input events are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Brush,
    Eraser,
}

/// Trait for tools that handle input and produce mutations.
pub trait Tool {
    fn kind(&self) -> ToolKind;

    /// Handle an input event aimed at `target`, returning zero or more
    /// mutations.
    fn handle(&mut self, event: &InputEvent, target: Option<LayerId>) -> Vec<LayerMutation>;
}

// ─── Brush Tool ──────────────────────────────────────────────────────────

/// Stamps the session's brush into the target layer, once per tile cell
/// entered during a stroke.
#[derive(Debug, Clone)]
pub struct BrushTool {
    pub mode: PaintMode,
    pub extend_modifier: Modifier,
    tile: u32,
    stroking: bool,
    /// Cell of the last stamp in the current stroke.
    last_cell: Option<TilePoint>,
}

impl BrushTool {
    pub fn new(tile_dimension: u32, extend_modifier: Modifier) -> Self {
        Self {
            mode: PaintMode::Draw,
            extend_modifier,
            tile: tile_dimension.max(1),
            stroking: false,
            last_cell: None,
        }
    }

    pub fn set_tile_dimension(&mut self, tile_dimension: u32) {
        self.tile = tile_dimension.max(1);
        self.cancel();
    }

    pub fn is_stroking(&self) -> bool {
        self.stroking
    }

    /// Abort the current stroke without emitting anything.
    pub fn cancel(&mut self) {
        self.stroking = false;
        self.last_cell = None;
    }

    /// Tile cell under a map-pixel position. Negative positions floor
    /// toward the cell above/left of the map.
    pub fn cell_at(&self, x: f32, y: f32) -> TilePoint {
        let t = self.tile as f32;
        TilePoint::new((x / t).floor() as i32, (y / t).floor() as i32)
    }

    fn stamp(&mut self, x: f32, y: f32, modifiers: Modifiers, id: LayerId) -> Vec<LayerMutation> {
        let cell = self.cell_at(x, y);
        if self.last_cell == Some(cell) {
            return vec![];
        }
        self.last_cell = Some(cell);
        let extend = self.mode == PaintMode::Draw && modifiers.has(self.extend_modifier);
        vec![LayerMutation::Paint {
            id,
            target: cell,
            mode: self.mode,
            extend,
        }]
    }
}

impl Tool for BrushTool {
    fn kind(&self) -> ToolKind {
        match self.mode {
            PaintMode::Draw => ToolKind::Brush,
            PaintMode::Erase => ToolKind::Eraser,
        }
    }

    fn handle(&mut self, event: &InputEvent, target: Option<LayerId>) -> Vec<LayerMutation> {
        match event {
            InputEvent::PointerDown { x, y, modifiers } => {
                self.cancel();
                let Some(id) = target else {
                    return vec![];
                };
                self.stroking = true;
                self.stamp(*x, *y, *modifiers, id)
            }
            InputEvent::PointerMove { x, y, modifiers } => {
                let Some(id) = target.filter(|_| self.stroking) else {
                    return vec![];
                };
                self.stamp(*x, *y, *modifiers, id)
            }
            InputEvent::PointerUp { .. } => {
                self.cancel();
                vec![]
            }
            InputEvent::Key { .. } => vec![],
        }
    }
}
