pub mod anchor;
pub mod document;
pub mod event;

pub use anchor::AnchorSpec;
pub use document::{LoadedDocument, MacroDocument};
pub use event::{ClickAction, EventKind, MacroAction, MacroEvent, MouseButton, WindowGeometrySnapshot};
