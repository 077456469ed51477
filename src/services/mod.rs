//! Services - scan handling logic
//!
//! This module contains the scan engine:
//! - `classifier` - Splits keyboard input into completed scans
//! - `guard` - Dirty-form check before a scan replaces the open record
//! - `router` - Routes a completed scan by UI mode
//! - `dispatcher` - Single coordinator owning classifier, mode and collaborators
//! - `collaborators` - Traits for storage, form, dialogs and views
//! - `sync_worker` - Async snapshot writer
//! - `replay` - Deterministic JSONL replay

pub mod classifier;
pub mod collaborators;
pub mod dispatcher;
pub mod guard;
pub mod replay;
pub mod router;
pub mod sync_worker;

// Re-export commonly used types
pub use classifier::{ClassifierSettings, ScanClassifier};
pub use dispatcher::{Dispatch, DispatchInput, ScanClock, ScanDispatcher};
pub use router::{Collaborators, RouteOutcome, ScanRouter};
pub use sync_worker::{create_sync_worker, SyncReason, SyncSender, SyncWorker};
