pub mod input;
pub mod loader;
pub mod session;
pub mod shortcuts;
pub mod sync;
pub mod tools;

pub use input::{InputEvent, Modifier, Modifiers};
pub use loader::{LoadError, LoadGeneration, LoadedMap, MapStore, MemoryStore, StoreError, load_map};
pub use session::{BrushError, EditorSession, LayerMutation, LoadState, SessionConfig};
pub use shortcuts::{ShortcutAction, ShortcutMap};
pub use sync::{SaveChannel, SavePayload, SaveTracker, SyncError};
pub use tools::{BrushTool, Tool, ToolKind};
