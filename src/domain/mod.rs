//! Domain models - scan input and inventory record types
//!
//! This module contains the canonical data types used throughout the system:
//! - `ScanEvent` - a keystroke or camera detection fed to the classifier
//! - `ClassifierAction` - what the classifier decided about an event
//! - `UiMode` - where a completed code is routed
//! - `Record` / `FormData` - the inventory entity and its form projection

pub mod record;
pub mod types;

// Re-export commonly used types at module level
pub use record::{FormData, Record};
pub use types::{
    CellRef, ClassifierAction, FocusTarget, Key, MatchKind, ScanEvent, ScanOrigin, ScanSource,
    UiMode,
};
