pub mod brush;
pub mod buffer;
pub mod changes;
pub mod compose;
pub mod error;
pub mod export;
pub mod guid;
pub mod id;
pub mod lint;
pub mod load;
pub mod map;
pub mod model;
pub mod stored;
pub mod tiled_json;
pub mod tmx;

pub use brush::{Brush, PaintMode, PaintOutcome};
pub use buffer::{Gid, Overflow, TileBuffer, TileGrid, TilePoint, TileRect};
pub use changes::{ChangeSet, PendingChanges, PendingSnapshot};
pub use error::{EditError, ExportError, LoadError};
pub use export::{ExportBundle, ExportConfig, ExportFormat, export_map};
pub use guid::GuidRange;
pub use id::LayerId;
pub use lint::{LintDiagnostic, LintSeverity, lint_map};
pub use map::{MapFile, MapTileset, Tileset};
pub use model::*;
pub use stored::{StoredMap, StoredMapResponse, StoredNode};

// Re-export image types so downstream crates can build brushes and read
// rasters without a direct dependency on a matching `image` version.
pub use image::{Rgba, RgbaImage};
