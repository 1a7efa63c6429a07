//! Pending-change tracking between edits and a save.
//!
//! Each entry carries the revision at which it was last touched. A save
//! sends a snapshot; the acknowledgement removes only the entries whose
//! revision still matches, so edits made while the save was in flight are
//! kept for the next one.

use crate::id::LayerId;
use std::collections::HashMap;

/// Which attributes of one layer changed since the last save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeSet {
    pub canvas: bool,
    pub position: bool,
    pub deleted: bool,
}

impl ChangeSet {
    /// Canvas and position, recorded by every paint and trim.
    pub const PAINTED: Self = Self {
        canvas: true,
        position: true,
        deleted: false,
    };

    pub const DELETED: Self = Self {
        canvas: false,
        position: false,
        deleted: true,
    };

    /// Removed from the old place and re-emitted at the new one.
    pub const MOVED: Self = Self {
        canvas: true,
        position: true,
        deleted: true,
    };

    fn merge(&mut self, other: ChangeSet) {
        self.canvas |= other.canvas;
        self.position |= other.position;
        self.deleted |= other.deleted;
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    changes: ChangeSet,
    revision: u64,
}

/// `LayerId → ChangeSet` accumulated by the editing session.
#[derive(Debug, Clone, Default)]
pub struct PendingChanges {
    entries: HashMap<LayerId, Entry>,
    clock: u64,
}

/// An immutable copy of the pending set taken when a save is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSnapshot {
    entries: Vec<(LayerId, ChangeSet, u64)>,
}

impl PendingSnapshot {
    /// Layer ids in the snapshot, sorted by name.
    pub fn ids(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.entries.iter().map(|(id, _, _)| *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerId, ChangeSet)> + '_ {
        self.entries.iter().map(|(id, c, _)| (*id, *c))
    }

    pub fn get(&self, id: LayerId) -> Option<ChangeSet> {
        self.entries.iter().find(|(i, _, _)| *i == id).map(|(_, c, _)| *c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `changes` into the entry for `id`.
    pub fn mark(&mut self, id: LayerId, changes: ChangeSet) {
        self.clock += 1;
        let revision = self.clock;
        self.entries
            .entry(id)
            .and_modify(|e| {
                e.changes.merge(changes);
                e.revision = revision;
            })
            .or_insert(Entry { changes, revision });
    }

    pub fn mark_painted(&mut self, id: LayerId) {
        self.mark(id, ChangeSet::PAINTED);
    }

    pub fn mark_deleted(&mut self, id: LayerId) {
        self.mark(id, ChangeSet::DELETED);
    }

    pub fn mark_moved(&mut self, id: LayerId) {
        self.mark(id, ChangeSet::MOVED);
    }

    pub fn get(&self, id: LayerId) -> Option<ChangeSet> {
        self.entries.get(&id).map(|e| e.changes)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy the current set for sending.
    pub fn snapshot(&self) -> PendingSnapshot {
        let mut entries: Vec<(LayerId, ChangeSet, u64)> = self
            .entries
            .iter()
            .map(|(id, e)| (*id, e.changes, e.revision))
            .collect();
        entries.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        PendingSnapshot { entries }
    }

    /// Drop the entries that were sent in `snapshot` and not touched since.
    /// Returns how many were dropped.
    pub fn acknowledge(&mut self, snapshot: &PendingSnapshot) -> usize {
        let before = self.entries.len();
        for (id, _, revision) in &snapshot.entries {
            if self.entries.get(id).is_some_and(|e| e.revision == *revision) {
                self.entries.remove(id);
            }
        }
        let dropped = before - self.entries.len();
        log::debug!(
            "save acknowledged: {dropped} change(s) cleared, {} kept",
            self.entries.len()
        );
        dropped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
