//! The editing session: one loaded map, its pending changes, the active
//! tool and brush, and the save/load state machines around them.
//!
//! All editing goes through `apply_mutation`, which also records what the
//! next save has to send:
//!
//! | Mutation | Pending change |
//! |----------|----------------|
//! | paint, trim | canvas + position |
//! | move selection | canvas + position + deleted, per moved layer |
//! | delete selection | deleted, per removed layer |
//! | attribute and selection edits | none (sent with the layer tree) |

use crate::input::{InputEvent, Modifier};
use crate::loader::{self, LoadError, LoadGeneration, LoadedMap, MapStore};
use crate::shortcuts::{ShortcutAction, ShortcutMap};
use crate::sync::{SaveChannel, SaveTracker, SyncError};
use crate::tools::{BrushTool, Tool};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tme_core::load::TilesetImages;
use tme_core::{
    Brush, EditError, ExportBundle, ExportConfig, ExportError, GuidRange, LayerId, LayerNode, LintDiagnostic,
    MapFile, MapTileset, NodePatch, PaintMode, PendingChanges, RgbaImage, TilePoint, Tileset, export_map, lint_map,
};

const DEFAULT_TILE_DIMENSION: u32 = 16;

/// Session behavior that hosts may configure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Modifier that turns a draw stroke into an extending one.
    pub extend_modifier: Modifier,
    /// Drop the result of a load that a later load superseded.
    pub discard_stale_loads: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            extend_modifier: Modifier::Shift,
            discard_stale_loads: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Nothing loaded yet.
    #[default]
    Idle,
    Loading,
    Ready,
    /// Terminal for this session.
    Failed(String),
}

/// An edit to the session's layer tree.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerMutation {
    /// Stamp the session brush into `id` with its top-left cell at `target`.
    Paint {
        id: LayerId,
        target: TilePoint,
        mode: PaintMode,
        extend: bool,
    },
    Trim {
        id: LayerId,
    },
    AddLayer {
        parent: LayerId,
        index: Option<usize>,
        id: LayerId,
        name: String,
    },
    AddGroup {
        parent: LayerId,
        index: Option<usize>,
        id: LayerId,
        name: String,
    },
    UpdateNode {
        id: LayerId,
        node: Box<LayerNode>,
    },
    UpdateSubtree {
        id: LayerId,
        patch: NodePatch,
    },
    MoveSelected {
        target: LayerId,
    },
    DeleteSelected,
    SelectOnly {
        id: LayerId,
    },
    ToggleSelected {
        id: LayerId,
    },
    SelectRangeTo {
        id: LayerId,
    },
    SelectAll,
    ClearSelection,
}

impl LayerMutation {
    /// Add an empty layer with a fresh id on top of `parent`.
    pub fn add_layer(parent: LayerId, name: impl Into<String>) -> Self {
        Self::AddLayer {
            parent,
            index: None,
            id: LayerId::new_layer(),
            name: name.into(),
        }
    }

    /// Add an empty group with a fresh id on top of `parent`.
    pub fn add_group(parent: LayerId, name: impl Into<String>) -> Self {
        Self::AddGroup {
            parent,
            index: None,
            id: LayerId::new_group(),
            name: name.into(),
        }
    }
}

/// Why a brush could not be cut from a tileset.
#[derive(Debug, Error)]
pub enum BrushError {
    #[error("unknown tileset `{0}`")]
    UnknownTileset(String),

    #[error("tileset `{0}` has no image loaded")]
    MissingImage(String),

    #[error("tileset `{tileset}` uses {found}px tiles but the map uses {expected}px")]
    TileSizeMismatch { tileset: String, expected: u32, found: u32 },

    #[error(transparent)]
    Edit(#[from] EditError),
}

pub struct EditorSession {
    pub map: MapFile,
    pub pending: PendingChanges,
    pub images: TilesetImages,
    config: SessionConfig,
    tool: BrushTool,
    brush: Option<Brush>,
    save: SaveTracker,
    load_state: LoadState,
    generation: LoadGeneration,
}

impl EditorSession {
    /// A session with nothing loaded.
    pub fn new(config: SessionConfig) -> Self {
        let map = MapFile::new(DEFAULT_TILE_DIMENSION, 0, 0);
        let save = SaveTracker::new(map.tree.version());
        Self {
            tool: BrushTool::new(DEFAULT_TILE_DIMENSION, config.extend_modifier),
            map,
            pending: PendingChanges::new(),
            images: TilesetImages::new(),
            config,
            brush: None,
            save,
            load_state: LoadState::Idle,
            generation: LoadGeneration::default(),
        }
    }

    /// A ready session over an already materialized map.
    pub fn from_map(map: MapFile, images: TilesetImages, config: SessionConfig) -> Self {
        let mut session = Self::new(config);
        session.install(LoadedMap { map, images });
        session
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn tool(&self) -> &BrushTool {
        &self.tool
    }

    pub fn brush(&self) -> Option<&Brush> {
        self.brush.as_ref()
    }

    pub fn set_brush(&mut self, brush: Option<Brush>) {
        self.brush = brush;
    }

    pub fn set_mode(&mut self, mode: PaintMode) {
        self.tool.mode = mode;
    }

    /// The layer strokes paint into: the last selected node, if it is a
    /// layer.
    pub fn paint_target(&self) -> Option<LayerId> {
        self.map
            .tree
            .last_selected()
            .filter(|id| self.map.tree.layer(*id).is_ok())
    }

    // ─── Loading ─────────────────────────────────────────────────────────

    /// Start a load; the returned generation must be passed to
    /// `finish_load`.
    pub fn begin_load(&mut self) -> LoadGeneration {
        self.generation = self.generation.next();
        self.load_state = LoadState::Loading;
        self.tool.cancel();
        self.generation
    }

    /// Install the outcome of the load `generation`. Returns `false` when
    /// the result was stale and discarded.
    pub fn finish_load(&mut self, generation: LoadGeneration, result: Result<LoadedMap, LoadError>) -> bool {
        if generation != self.generation && self.config.discard_stale_loads {
            log::debug!("discarding stale load {generation:?} (current {:?})", self.generation);
            return false;
        }
        match result {
            Ok(loaded) => self.install(loaded),
            Err(err) => {
                log::warn!("map load failed: {err}");
                self.load_state = LoadState::Failed(err.to_string());
            }
        }
        true
    }

    /// Load `file_id` from `store` into this session.
    pub async fn load<S: MapStore>(&mut self, store: Arc<S>, file_id: &str) -> &LoadState {
        let generation = self.begin_load();
        let result = loader::load_map(store, file_id).await;
        self.finish_load(generation, result);
        &self.load_state
    }

    fn install(&mut self, loaded: LoadedMap) {
        self.tool.set_tile_dimension(loaded.map.tile_dimension);
        self.save.reset(loaded.map.tree.version());
        self.map = loaded.map;
        self.images = loaded.images;
        self.pending.clear();
        self.brush = None;
        self.load_state = LoadState::Ready;
    }

    // ─── Tilesets and brushes ────────────────────────────────────────────

    /// Add a tileset (and its image, if already decoded). Returns the id
    /// range it was given.
    pub fn add_tileset(&mut self, tileset: Tileset, image: Option<RgbaImage>) -> Result<GuidRange, EditError> {
        let file_id = tileset.file_id.clone();
        let range = self.map.add_tileset(tileset)?;
        if let Some(image) = image {
            self.images.insert(file_id, image);
        }
        Ok(range)
    }

    pub fn remove_tileset(&mut self, file_id: &str) -> Option<MapTileset> {
        self.images.remove(file_id);
        self.map.remove_tileset(file_id)
    }

    /// Make a `cols × rows` region of a tileset, starting at tile
    /// (`col`, `row`), the active brush.
    pub fn select_brush(&mut self, file_id: &str, col: u32, row: u32, cols: u32, rows: u32) -> Result<(), BrushError> {
        let entry = self
            .map
            .tilesets
            .iter()
            .find(|t| t.tileset.file_id == file_id)
            .ok_or_else(|| BrushError::UnknownTileset(file_id.to_string()))?;
        if entry.tileset.tile_dimension != self.map.tile_dimension {
            return Err(BrushError::TileSizeMismatch {
                tileset: entry.tileset.name.clone(),
                expected: self.map.tile_dimension,
                found: entry.tileset.tile_dimension,
            });
        }
        let image = self
            .images
            .get(file_id)
            .ok_or_else(|| BrushError::MissingImage(entry.tileset.name.clone()))?;
        let brush = Brush::from_tileset_region(&entry.tileset, entry.range, image, col, row, cols, rows)?;
        self.brush = Some(brush);
        Ok(())
    }

    // ─── Mutations ───────────────────────────────────────────────────────

    /// Apply one mutation and record its pending changes. Data-model
    /// errors leave the map untouched and are logged.
    pub fn apply_mutation(&mut self, mutation: LayerMutation) -> Result<(), EditError> {
        let result = self.apply_inner(mutation);
        if let Err(err) = &result {
            log::warn!("edit ignored: {err}");
        }
        result
    }

    fn apply_inner(&mut self, mutation: LayerMutation) -> Result<(), EditError> {
        match mutation {
            LayerMutation::Paint {
                id,
                target,
                mode,
                extend,
            } => {
                let Some(brush) = &self.brush else {
                    log::debug!("paint on {id:?} without a brush");
                    return Ok(());
                };
                let outcome = self.map.paint(id, target, brush, mode, extend)?;
                log::trace!("paint {id:?} at ({}, {}): {outcome:?}", target.x, target.y);
                if outcome.touched() {
                    self.pending.mark_painted(id);
                }
            }
            LayerMutation::Trim { id } => {
                self.map.trim(id)?;
                self.pending.mark_painted(id);
            }
            LayerMutation::AddLayer {
                parent,
                index,
                id,
                name,
            } => self.map.tree.insert(parent, index, LayerNode::layer(id, name))?,
            LayerMutation::AddGroup {
                parent,
                index,
                id,
                name,
            } => self.map.tree.insert(parent, index, LayerNode::group(id, name))?,
            LayerMutation::UpdateNode { id, node } => {
                let old = self.map.tree.update_node(id, *node)?;
                let content_changed = match (old.as_layer(), self.map.tree.layer(id)) {
                    (Some(before), Ok(after)) => before.buffer != after.buffer || before.position != after.position,
                    _ => false,
                };
                if content_changed {
                    self.pending.mark_painted(id);
                }
            }
            LayerMutation::UpdateSubtree { id, patch } => {
                self.map.tree.update_subtree(id, &patch)?;
            }
            LayerMutation::MoveSelected { target } => {
                for id in self.map.tree.move_selected(target)? {
                    self.pending.mark_moved(id);
                }
            }
            LayerMutation::DeleteSelected => {
                for id in self.map.tree.delete_selected() {
                    self.pending.mark_deleted(id);
                }
            }
            LayerMutation::SelectOnly { id } => self.map.tree.select_only(id)?,
            LayerMutation::ToggleSelected { id } => self.map.tree.toggle_selected(id)?,
            LayerMutation::SelectRangeTo { id } => {
                self.map.tree.select_range_to(id)?;
            }
            LayerMutation::SelectAll => {
                self.map.tree.update_all_matching(|n| !n.selected, &NodePatch::selected(true));
            }
            LayerMutation::ClearSelection => self.map.tree.clear_selection(),
        }
        Ok(())
    }

    // ─── Input ───────────────────────────────────────────────────────────

    /// Route an input event. Pointer events drive the brush tool on the
    /// paint target; key events resolve to shortcuts, and the ones that
    /// need the host (`Save`, `Export`) are returned to it.
    pub fn handle_input(&mut self, event: &InputEvent) -> Option<ShortcutAction> {
        if let InputEvent::Key { key, modifiers } = event {
            let action = ShortcutMap::resolve(key, modifiers.ctrl, modifiers.shift, modifiers.alt, modifiers.meta)?;
            self.run_shortcut(action);
            return Some(action);
        }
        let target = self.paint_target();
        for mutation in self.tool.handle(event, target) {
            let _ = self.apply_mutation(mutation);
        }
        None
    }

    fn run_shortcut(&mut self, action: ShortcutAction) {
        match action {
            ShortcutAction::ToolBrush => self.set_mode(PaintMode::Draw),
            ShortcutAction::ToolEraser => self.set_mode(PaintMode::Erase),
            ShortcutAction::ToggleEraser => {
                let mode = match self.tool.mode {
                    PaintMode::Draw => PaintMode::Erase,
                    PaintMode::Erase => PaintMode::Draw,
                };
                self.set_mode(mode);
            }
            ShortcutAction::Delete => {
                let _ = self.apply_mutation(LayerMutation::DeleteSelected);
            }
            ShortcutAction::Trim => {
                if let Some(id) = self.paint_target() {
                    let _ = self.apply_mutation(LayerMutation::Trim { id });
                }
            }
            ShortcutAction::SelectAll => {
                let _ = self.apply_mutation(LayerMutation::SelectAll);
            }
            ShortcutAction::Deselect => {
                let _ = self.apply_mutation(LayerMutation::ClearSelection);
            }
            ShortcutAction::Save | ShortcutAction::Export => {}
        }
    }

    // ─── Saving ──────────────────────────────────────────────────────────

    pub fn is_saving(&self) -> bool {
        self.save.is_saving()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.save.is_dirty(&self.map, &self.pending)
    }

    /// Send the pending changes over `channel`. Returns the number of
    /// changed layers sent.
    pub fn request_save<C: SaveChannel + ?Sized>(&mut self, channel: &mut C) -> Result<usize, SyncError> {
        if self.load_state != LoadState::Ready {
            return Err(SyncError::NotReady);
        }
        self.save.begin(&self.map, &self.pending, channel)
    }

    /// The server stored the save in flight. Returns the number of pending
    /// entries cleared.
    pub fn on_changes_saved(&mut self) -> usize {
        self.save.acknowledge(&mut self.pending)
    }

    /// The save in flight failed; everything stays pending.
    pub fn on_save_failed(&mut self) {
        if self.save.fail() {
            log::warn!("save failed; {} change(s) kept for retry", self.pending.len());
        }
    }

    // ─── Export and lint ─────────────────────────────────────────────────

    pub fn export(&self, config: &ExportConfig) -> Result<ExportBundle, ExportError> {
        export_map(&self.map, &self.images, config)
    }

    pub fn lint(&self) -> Vec<LintDiagnostic> {
        lint_map(&self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Modifiers;
    use pretty_assertions::assert_eq;
    use tme_core::{ChangeSet, Gid, Rgba, TileGrid};

    const T: u32 = 4;

    fn id(s: &str) -> LayerId {
        LayerId::intern(s)
    }

    /// root
    /// ├─ se_top
    /// └─ se_group
    ///    └─ se_inner
    fn session() -> EditorSession {
        let mut map = MapFile::new(T, 8, 8);
        let root = map.tree.root_id();
        map.tree.insert(root, None, LayerNode::group(id("se_group"), "group")).unwrap();
        map.tree.insert(id("se_group"), None, LayerNode::layer(id("se_inner"), "inner")).unwrap();
        map.tree.insert(root, None, LayerNode::layer(id("se_top"), "top")).unwrap();

        let tileset = Tileset {
            file_id: "se_ts".into(),
            name: "ts".into(),
            image_url: "ts.png".into(),
            tile_dimension: T,
            width: 2,
            height: 2,
        };
        let mut session = EditorSession::from_map(map, TilesetImages::new(), SessionConfig::default());
        let image = RgbaImage::from_pixel(2 * T, 2 * T, Rgba([9, 9, 9, 255]));
        session.add_tileset(tileset, Some(image)).unwrap();
        session
    }

    #[test]
    fn paint_without_brush_is_a_no_op() {
        let mut s = session();
        let paint = LayerMutation::Paint {
            id: id("se_top"),
            target: TilePoint::new(0, 0),
            mode: PaintMode::Draw,
            extend: false,
        };
        assert_eq!(s.apply_mutation(paint), Ok(()));
        assert!(s.pending.is_empty());
    }

    #[test]
    fn paint_and_trim_mark_canvas_and_position() {
        let mut s = session();
        s.select_brush("se_ts", 0, 0, 1, 1).unwrap();
        s.apply_mutation(LayerMutation::Paint {
            id: id("se_top"),
            target: TilePoint::new(2, 1),
            mode: PaintMode::Draw,
            extend: false,
        })
        .unwrap();
        assert_eq!(s.pending.get(id("se_top")), Some(ChangeSet::PAINTED));

        s.apply_mutation(LayerMutation::Trim { id: id("se_top") }).unwrap();
        assert_eq!(s.pending.len(), 1);
    }

    #[test]
    fn errors_leave_state_unchanged() {
        let mut s = session();
        s.apply_mutation(LayerMutation::SelectOnly { id: id("se_group") }).unwrap();
        let version = s.map.tree.version();
        assert_eq!(
            s.apply_mutation(LayerMutation::MoveSelected { target: id("se_inner") }),
            Err(EditError::InvalidMove)
        );
        assert_eq!(
            s.apply_mutation(LayerMutation::Trim { id: id("se_missing") }),
            Err(EditError::NotFound(id("se_missing")))
        );
        assert_eq!(s.map.tree.version(), version);
        assert!(s.pending.is_empty());
    }

    #[test]
    fn delete_records_every_removed_layer() {
        let mut s = session();
        s.apply_mutation(LayerMutation::SelectOnly { id: id("se_group") }).unwrap();
        s.apply_mutation(LayerMutation::DeleteSelected).unwrap();
        assert!(!s.map.tree.contains(id("se_group")));
        assert_eq!(s.pending.get(id("se_inner")), Some(ChangeSet::DELETED));
        assert_eq!(s.pending.len(), 1);
    }

    #[test]
    fn move_records_moved_layers() {
        let mut s = session();
        s.apply_mutation(LayerMutation::SelectOnly { id: id("se_top") }).unwrap();
        s.apply_mutation(LayerMutation::MoveSelected { target: id("se_group") }).unwrap();
        assert_eq!(s.map.tree.parent(id("se_top")), Some(id("se_group")));
        assert_eq!(s.pending.get(id("se_top")), Some(ChangeSet::MOVED));
    }

    #[test]
    fn pointer_stroke_paints_last_selected_layer() {
        let mut s = session();
        s.select_brush("se_ts", 1, 1, 1, 1).unwrap();
        s.apply_mutation(LayerMutation::SelectOnly { id: id("se_top") }).unwrap();

        s.handle_input(&InputEvent::pointer_down(1.0, 1.0));
        s.handle_input(&InputEvent::pointer_move(2.0, 3.0));
        // Without the extend modifier the second cell falls outside the
        // buffer and is dropped.
        s.handle_input(&InputEvent::pointer_move(5.0, 1.0));
        s.handle_input(&InputEvent::pointer_up(5.0, 1.0));

        let layer = s.map.tree.layer(id("se_top")).unwrap();
        assert_eq!(layer.buffer().unwrap().tiles().to_rows(), vec![vec![4]]);
        assert_eq!(s.pending.get(id("se_top")), Some(ChangeSet::PAINTED));
        assert!(s.map.tree.layer(id("se_inner")).unwrap().buffer().is_none());
    }

    #[test]
    fn extend_modifier_grows_the_layer() {
        let mut s = session();
        s.select_brush("se_ts", 0, 0, 1, 1).unwrap();
        s.apply_mutation(LayerMutation::SelectOnly { id: id("se_top") }).unwrap();
        let shift = Modifiers::only(Modifier::Shift);

        s.handle_input(&InputEvent::pointer_down(0.0, 0.0));
        s.handle_input(&InputEvent::pointer_move(4.0, 4.0).with_modifiers(shift));
        s.handle_input(&InputEvent::pointer_move(8.0, 4.0));
        s.handle_input(&InputEvent::pointer_up(8.0, 4.0));

        let rows = s.map.tree.layer(id("se_top")).unwrap().buffer().unwrap().tiles().to_rows();
        assert_eq!(rows, vec![vec![1, 0], vec![0, 1]]);
    }

    #[test]
    fn shortcuts_switch_tools_and_surface_save() {
        let mut s = session();
        assert_eq!(
            s.handle_input(&InputEvent::key("e", Modifiers::NONE)),
            Some(ShortcutAction::ToolEraser)
        );
        assert_eq!(s.tool().mode, PaintMode::Erase);

        let cmd = Modifiers::only(Modifier::Meta);
        assert_eq!(s.handle_input(&InputEvent::key("s", cmd)), Some(ShortcutAction::Save));
        assert_eq!(s.handle_input(&InputEvent::key("q", Modifiers::NONE)), None);
    }

    #[test]
    fn brush_selection_errors() {
        let mut s = session();
        assert!(matches!(
            s.select_brush("nope", 0, 0, 1, 1),
            Err(BrushError::UnknownTileset(_))
        ));
        assert!(matches!(
            s.select_brush("se_ts", 1, 1, 2, 2),
            Err(BrushError::Edit(EditError::RegionOutOfBounds { .. }))
        ));
        s.images.clear();
        assert!(matches!(
            s.select_brush("se_ts", 0, 0, 1, 1),
            Err(BrushError::MissingImage(_))
        ));
    }

    #[test]
    fn brush_with_other_tile_size_does_not_paint() {
        let mut s = session();
        let mut tiles = TileGrid::new(1, 1);
        tiles.set(0, 0, Gid::new(1));
        let large = Brush::new(RgbaImage::from_pixel(2 * T, 2 * T, Rgba([1, 1, 1, 255])), tiles, 2 * T).unwrap();
        s.set_brush(Some(large));
        assert_eq!(
            s.apply_mutation(LayerMutation::Paint {
                id: id("se_top"),
                target: TilePoint::new(0, 0),
                mode: PaintMode::Draw,
                extend: true,
            }),
            Err(EditError::TileSizeMismatch { expected: T, found: 2 * T })
        );
        assert!(s.map.tree.layer(id("se_top")).unwrap().buffer().is_none());
        assert!(s.pending.is_empty());
    }

    #[test]
    fn save_requires_a_loaded_map() {
        let mut s = EditorSession::new(SessionConfig::default());
        let mut sent = Vec::new();
        assert!(matches!(s.request_save(&mut sent), Err(SyncError::NotReady)));
    }

    #[test]
    fn stale_loads_are_discarded() {
        let mut s = EditorSession::new(SessionConfig::default());
        let first = s.begin_load();
        let second = s.begin_load();
        let loaded = LoadedMap {
            map: MapFile::new(T, 1, 1),
            images: TilesetImages::new(),
        };
        assert!(!s.finish_load(first, Ok(loaded.clone())));
        assert_eq!(s.load_state(), &LoadState::Loading);
        assert!(s.finish_load(second, Ok(loaded)));
        assert_eq!(s.load_state(), &LoadState::Ready);
    }
}
