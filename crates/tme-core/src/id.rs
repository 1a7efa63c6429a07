//! Layer and group identifiers.
//!
//! A stored map addresses layers by string id (tile grids are fetched per
//! layer id, saves list changed ids). In memory those strings are interned
//! once so the tree, pending changes and payloads can pass ids by value.

use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Every layer id seen by this process, from stored maps or generated.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// Id of a layer or group in a map's layer tree.
///
/// Stays fixed for the node's lifetime: renames, moves and repaints keep
/// it, so the backing store can key tile grids by it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(Spur);

impl LayerId {
    /// The id for `s`, as found in a stored map.
    pub fn intern(s: &str) -> Self {
        LayerId(INTERNER.get_or_intern(s))
    }

    /// The stored string form.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }

    /// Fresh id for a new paintable layer (`layer_3`).
    pub fn new_layer() -> Self {
        Self::with_prefix("layer")
    }

    /// Fresh id for a new group (`group_4`).
    pub fn new_group() -> Self {
        Self::with_prefix("group")
    }

    /// Fresh `<prefix>_<n>` id. Candidates already present (for instance
    /// ids read from a stored map) are skipped.
    pub fn with_prefix(prefix: &str) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        loop {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let candidate = format!("{prefix}_{n}");
            if INTERNER.get(&candidate).is_none() {
                return Self::intern(&candidate);
            }
        }
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_str())
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LayerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(LayerId::intern(&s))
    }
}
