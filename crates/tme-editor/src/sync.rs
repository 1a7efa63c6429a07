//! Save path: pending changes → `SavePayload` → `SaveChannel`, and the
//! acknowledgement coming back.
//!
//! Only one save may be in flight. The payload is built from a snapshot of
//! the pending set; on acknowledgement exactly the snapshotted entries
//! that were not touched again are dropped, so edits made while waiting
//! go out with the next save.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tme_core::compose;
use tme_core::{ExportError, LayerId, MapFile, PendingChanges, PendingSnapshot, StoredNode};

/// One finalized edit batch, as handed to the realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    /// The whole layer tree, attributes and order included.
    pub new_root_layer: StoredNode,
    /// Every layer with a pending change, deleted ones included.
    pub changed_layer_ids: Vec<LayerId>,
    /// PNG of the composited map.
    pub new_map_image_bytes: Vec<u8>,
    /// Tile grids of the changed layers still in the tree. An empty grid
    /// means the layer has no content.
    pub layer_tile_updates: HashMap<LayerId, Vec<Vec<u32>>>,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a save is already in flight")]
    ConcurrentSaveRejected,

    #[error("no changes to save")]
    NothingToSave,

    #[error("no map is loaded")]
    NotReady,

    #[error("save channel failed: {0}")]
    Channel(String),

    #[error("failed to encode the map image: {0}")]
    Encode(#[from] ExportError),
}

/// The outbound half of the realtime connection.
pub trait SaveChannel {
    fn send(&mut self, payload: SavePayload) -> Result<(), SyncError>;
}

impl SaveChannel for Vec<SavePayload> {
    fn send(&mut self, payload: SavePayload) -> Result<(), SyncError> {
        self.push(payload);
        Ok(())
    }
}

impl SaveChannel for tokio::sync::mpsc::UnboundedSender<SavePayload> {
    fn send(&mut self, payload: SavePayload) -> Result<(), SyncError> {
        tokio::sync::mpsc::UnboundedSender::send(self, payload).map_err(|e| SyncError::Channel(e.to_string()))
    }
}

/// Build the payload for `snapshot` against the current map.
pub fn build_payload(map: &MapFile, snapshot: &PendingSnapshot) -> Result<SavePayload, ExportError> {
    let mut layer_tile_updates = HashMap::new();
    for (id, changes) in snapshot.iter() {
        if !changes.canvas {
            continue;
        }
        let Ok(layer) = map.tree.layer(id) else {
            continue;
        };
        let rows = layer.buffer().map(|b| b.tiles().to_rows()).unwrap_or_default();
        layer_tile_updates.insert(id, rows);
    }
    Ok(SavePayload {
        new_root_layer: StoredNode::from_tree(&map.tree),
        changed_layer_ids: snapshot.ids().collect(),
        new_map_image_bytes: compose::map_image_png(map)?,
        layer_tile_updates,
    })
}

#[derive(Debug, Clone)]
struct InFlight {
    snapshot: PendingSnapshot,
    tree_version: u64,
}

/// Tracks the save in flight and what the server has already seen.
#[derive(Debug, Clone, Default)]
pub struct SaveTracker {
    in_flight: Option<InFlight>,
    /// Tree version included in the last acknowledged save (or load).
    saved_version: u64,
}

impl SaveTracker {
    pub fn new(saved_version: u64) -> Self {
        Self {
            in_flight: None,
            saved_version,
        }
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether anything differs from what the server last acknowledged.
    pub fn is_dirty(&self, map: &MapFile, pending: &PendingChanges) -> bool {
        !pending.is_empty() || map.tree.version() != self.saved_version
    }

    /// Snapshot `pending`, send the payload, and mark the save in flight.
    /// Returns the number of changed layers sent.
    ///
    /// # Errors
    /// `ConcurrentSaveRejected` while a save is in flight, `NothingToSave`
    /// when nothing changed, and whatever building or sending the payload
    /// fails with. Nothing is marked in flight on error.
    pub fn begin<C: SaveChannel + ?Sized>(
        &mut self,
        map: &MapFile,
        pending: &PendingChanges,
        channel: &mut C,
    ) -> Result<usize, SyncError> {
        if self.is_saving() {
            log::warn!("save rejected: another save is in flight");
            return Err(SyncError::ConcurrentSaveRejected);
        }
        if !self.is_dirty(map, pending) {
            return Err(SyncError::NothingToSave);
        }
        let snapshot = pending.snapshot();
        let payload = build_payload(map, &snapshot)?;
        let count = snapshot.len();
        channel.send(payload)?;
        log::debug!("save sent with {count} changed layer(s)");
        self.in_flight = Some(InFlight {
            snapshot,
            tree_version: map.tree.version(),
        });
        Ok(count)
    }

    /// The server acknowledged the save in flight. Returns the number of
    /// pending entries cleared.
    pub fn acknowledge(&mut self, pending: &mut PendingChanges) -> usize {
        let Some(done) = self.in_flight.take() else {
            log::warn!("save acknowledged with no save in flight");
            return 0;
        };
        self.saved_version = done.tree_version;
        pending.acknowledge(&done.snapshot)
    }

    /// The save in flight failed; its changes stay pending. Returns whether
    /// a save was in flight.
    pub fn fail(&mut self) -> bool {
        self.in_flight.take().is_some()
    }

    /// Forget any save in flight and treat `saved_version` as clean.
    pub fn reset(&mut self, saved_version: u64) {
        self.in_flight = None;
        self.saved_version = saved_version;
    }
}
