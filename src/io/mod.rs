//! IO modules - storage and operator interfaces
//!
//! This module contains the concrete collaborators behind the scan engine:
//! - `store` - In-memory inventory with JSON snapshot persistence
//! - `form` - Product form over the store
//! - `catalog` - Category and tag lists
//! - `inline_table` - Inline-editable inventory table
//! - `terminal` - Terminal view, table and confirmation prompt
//! - `keyboard` - crossterm key reader
//! - `camera` - Camera polling loop and external decoder

pub mod camera;
pub mod catalog;
pub mod form;
pub mod inline_table;
pub mod keyboard;
pub mod store;
pub mod terminal;

// Re-export commonly used types
pub use camera::{BarcodeDetector, CameraScanner, ZbarDetector};
pub use catalog::CatalogIndex;
pub use form::InventoryForm;
pub use inline_table::InlineTable;
pub use keyboard::{spawn_key_reader, KeyCommand, KeyInput};
pub use store::InventoryStore;
pub use terminal::{PromptChannel, TableView, TerminalConfirm, TerminalView};
