//! Interfaces to the collaborators the scan engine drives
//!
//! The engine never touches storage, widgets or dialogs directly. Hosts
//! implement these traits; `crate::io` carries the terminal implementations.

use crate::domain::record::{FormData, Record};
use crate::domain::types::{CellRef, FocusTarget, MatchKind};

/// Inventory storage keyed by barcode
///
/// Barcodes are nominally unique, but duplicates must be tolerated.
pub trait RecordStore {
    fn find_by_exact_code(&self, code: &str) -> anyhow::Result<Vec<Record>>;
    /// Records whose barcode contains `fragment`
    fn find_by_partial_code(&self, fragment: &str) -> anyhow::Result<Vec<Record>>;
    /// Replace the first record with the same barcode, or append
    fn upsert(&mut self, record: Record) -> anyhow::Result<Record>;
    /// Remove the first record with this barcode
    fn delete_by_code(&mut self, code: &str) -> anyhow::Result<bool>;
    fn all(&self) -> anyhow::Result<Vec<Record>>;
}

/// The main product form
pub trait FormCollaborator {
    fn is_dirty(&self) -> bool;
    fn form_data(&self) -> FormData;
    /// Names of required fields that are missing
    fn validate(&self, data: &FormData) -> Vec<String>;
    /// Persist the form; `Ok(false)` when validation failed at save time
    fn save(&mut self) -> anyhow::Result<bool>;
    fn reset(&mut self);
    fn load_record(&mut self, record: &Record);
    fn barcode(&self) -> String;
    fn set_barcode(&mut self, code: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingFieldsDecision {
    /// Stay on the current record; the scanned code is dropped
    KeepEditing,
    /// Reset the form and continue with the scanned code
    DiscardAndContinue,
}

/// Blocking operator confirmation
pub trait Confirm {
    fn keep_editing_or_discard(&mut self, missing: &[String]) -> MissingFieldsDecision;
}

/// Best-effort refresh of derived views
pub trait IndexRefresh {
    /// Category / tag lists
    fn rebuild_indexes(&mut self) -> anyhow::Result<()>;
    fn rerender_table(&mut self) -> anyhow::Result<()>;
}

/// Visible side of routing (focus, candidate lists, messages)
pub trait ScanView {
    fn focus(&mut self, target: FocusTarget);
    fn show_candidates(&mut self, kind: MatchKind, code: &str, records: &[Record]);
    fn clear_candidates(&mut self);
    fn report_error(&mut self, message: &str);
}

/// Inline-editable table
pub trait CellEditor {
    /// Write `value` into `cell` through the normal edit-commit path
    fn commit_cell(&mut self, cell: &CellRef, value: &str) -> anyhow::Result<()>;
}
