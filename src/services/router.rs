//! Routing of completed scans
//!
//! One completed code goes to exactly one destination, chosen by `UiMode`:
//! - `Normal` - dirty-form guard, then lookup into the main form
//! - `InlineCellEdit` - the focused table cell, only if it is a barcode cell
//! - `BarcodeReplace` - rename the open record's barcode, then back to `Normal`
//!
//! Collaborator errors stop the failing step only; they are logged and
//! counted, and the next scan is handled normally.

use crate::domain::record::{now_string, Record};
use crate::domain::types::{CellRef, FocusTarget, MatchKind, UiMode};
use crate::infra::metrics::Metrics;
use crate::services::collaborators::{
    CellEditor, Confirm, FormCollaborator, IndexRefresh, RecordStore, ScanView,
};
use crate::services::guard::{BlockReason, DirtyFormGuard, GuardDecision};
use crate::services::sync_worker::{SyncReason, SyncSender};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Everything routing may touch, borrowed for the duration of one scan
pub struct Collaborators {
    pub store: Box<dyn RecordStore>,
    pub form: Box<dyn FormCollaborator>,
    pub confirm: Box<dyn Confirm>,
    pub view: Box<dyn ScanView>,
    pub index: Box<dyn IndexRefresh>,
    pub cells: Box<dyn CellEditor>,
}

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("old or new barcode is empty")]
    EmptyCode,
    #[error("no record with barcode {0}")]
    OldCodeMissing(String),
    #[error("barcode {0} already belongs to another record")]
    NewCodeTaken(String),
    #[error("store error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for RenameError {
    fn from(e: anyhow::Error) -> Self {
        RenameError::Store(format!("{:#}", e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenameOutcome {
    /// Old and new code are the same; nothing was written
    Unchanged,
    Renamed(Record),
}

/// Result of routing one completed code
#[derive(Debug, PartialEq)]
pub enum RouteOutcome {
    /// Dropped by the dirty-form guard
    Blocked(BlockReason),
    /// A single match was loaded into the form
    Loaded { kind: MatchKind, barcode: String },
    /// Several matches; the operator picks one
    Candidates { kind: MatchKind, count: usize },
    /// No match; form cleared for a new record carrying the code
    NewRecord,
    InlineWritten,
    /// Focused cell is not a barcode cell
    InlineDiscarded,
    Renamed { old_code: String, new_code: String },
    RenameUnchanged,
    RenameFailed(String),
    /// A collaborator failed; nothing else happened for this scan
    Failed(String),
}

impl RouteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteOutcome::Blocked(_) => "blocked",
            RouteOutcome::Loaded { .. } => "loaded",
            RouteOutcome::Candidates { .. } => "candidates",
            RouteOutcome::NewRecord => "new_record",
            RouteOutcome::InlineWritten => "inline_written",
            RouteOutcome::InlineDiscarded => "inline_discarded",
            RouteOutcome::Renamed { .. } => "renamed",
            RouteOutcome::RenameUnchanged => "rename_unchanged",
            RouteOutcome::RenameFailed(_) => "rename_failed",
            RouteOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct RouteResult {
    pub outcome: RouteOutcome,
    /// Mode to use for the next scan
    pub next_mode: UiMode,
    /// Records offered for manual selection; empty unless the outcome is `Candidates`
    pub candidates: Vec<Record>,
}

impl RouteResult {
    fn new(outcome: RouteOutcome, next_mode: UiMode) -> Self {
        Self { outcome, next_mode, candidates: Vec::new() }
    }
}

pub struct ScanRouter {
    guard: DirtyFormGuard,
    metrics: Arc<Metrics>,
    sync: Option<SyncSender>,
}

impl ScanRouter {
    pub fn new(metrics: Arc<Metrics>, sync: Option<SyncSender>) -> Self {
        Self { guard: DirtyFormGuard::new(metrics.clone()), metrics, sync }
    }

    pub fn route(
        &self,
        mode: &UiMode,
        code: &str,
        count_mode: bool,
        c: &mut Collaborators,
    ) -> RouteResult {
        match mode {
            UiMode::Normal => self.route_normal(code, count_mode, c),
            UiMode::InlineCellEdit(cell) => self.route_inline(cell, code, c),
            // Replace mode is single-shot
            UiMode::BarcodeReplace { old_code } => {
                RouteResult::new(self.route_replace(old_code, code, c), UiMode::Normal)
            }
        }
    }

    /// Load one record picked from a candidate list
    ///
    /// Runs the dirty-form guard first, like a scan would.
    pub fn select_candidate(
        &self,
        kind: MatchKind,
        record: &Record,
        count_mode: bool,
        c: &mut Collaborators,
    ) -> RouteOutcome {
        if let Some(blocked) = self.guard_form(&record.barcode, c) {
            return blocked;
        }

        c.form.load_record(record);
        c.form.set_barcode(&record.barcode);
        c.view.focus(if count_mode { FocusTarget::Quantity } else { FocusTarget::Barcode });
        c.view.clear_candidates();
        self.metrics.record_lookup_hit(kind);
        info!(barcode = %record.barcode, name = %record.name, "candidate_selected");
        RouteOutcome::Loaded { kind, barcode: record.barcode.clone() }
    }

    /// `Some` when the open form must not be replaced
    fn guard_form(&self, code: &str, c: &mut Collaborators) -> Option<RouteOutcome> {
        match self.guard.resolve(code, c.form.as_mut(), c.confirm.as_mut(), c.view.as_mut()) {
            GuardDecision::Blocked(reason) => {
                info!(code = %code, reason = %reason.as_str(), "scan_blocked");
                Some(RouteOutcome::Blocked(reason))
            }
            GuardDecision::Proceed { saved: true } => {
                self.refresh_views(c);
                self.request_sync(SyncReason::AutoSave);
                None
            }
            GuardDecision::Proceed { saved: false } => None,
        }
    }

    fn route_normal(&self, code: &str, count_mode: bool, c: &mut Collaborators) -> RouteResult {
        if let Some(blocked) = self.guard_form(code, c) {
            return RouteResult::new(blocked, UiMode::Normal);
        }

        c.form.set_barcode(code);

        let result = match self.lookup(code, count_mode, c) {
            Ok((outcome, candidates)) => RouteResult { outcome, next_mode: UiMode::Normal, candidates },
            Err(e) => {
                error!(code = %code, error = %format!("{:#}", e), "scan_lookup_failed");
                self.metrics.record_collaborator_error();
                RouteResult::new(RouteOutcome::Failed(format!("{:#}", e)), UiMode::Normal)
            }
        };

        // Lookup may have cleared the field on the way
        if c.form.barcode().trim().is_empty() {
            debug!(code = %code, "barcode_field_restored");
            c.form.set_barcode(code);
        }

        result
    }

    /// Exact match first, then substring; one loads, several list, none starts a new record
    fn lookup(
        &self,
        code: &str,
        count_mode: bool,
        c: &mut Collaborators,
    ) -> anyhow::Result<(RouteOutcome, Vec<Record>)> {
        for kind in [MatchKind::Exact, MatchKind::Partial] {
            let matches = match kind {
                MatchKind::Exact => c.store.find_by_exact_code(code)?,
                MatchKind::Partial => c.store.find_by_partial_code(code)?,
            };

            match matches.as_slice() {
                [] => continue,
                [record] => {
                    c.form.load_record(record);
                    c.view.focus(if count_mode { FocusTarget::Quantity } else { FocusTarget::Barcode });
                    c.view.clear_candidates();
                    self.metrics.record_lookup_hit(kind);
                    info!(
                        code = %code,
                        kind = %kind.as_str(),
                        barcode = %record.barcode,
                        name = %record.name,
                        "record_loaded"
                    );
                    return Ok((RouteOutcome::Loaded { kind, barcode: record.barcode.clone() }, Vec::new()));
                }
                records => {
                    c.view.show_candidates(kind, code, records);
                    self.metrics.record_lookup_ambiguous();
                    warn!(code = %code, kind = %kind.as_str(), count = records.len(), "scan_ambiguous");
                    return Ok((RouteOutcome::Candidates { kind, count: records.len() }, records.to_vec()));
                }
            }
        }

        c.form.reset();
        c.form.set_barcode(code);
        c.view.clear_candidates();
        self.metrics.record_lookup_miss();
        info!(code = %code, "new_record_started");
        Ok((RouteOutcome::NewRecord, Vec::new()))
    }

    fn route_inline(&self, cell: &CellRef, code: &str, c: &mut Collaborators) -> RouteResult {
        let unchanged = UiMode::InlineCellEdit(cell.clone());
        if !cell.is_barcode_column() {
            debug!(code = %code, field = %cell.field, row = %cell.row_key, "inline_scan_discarded");
            self.metrics.record_inline_write(false);
            return RouteResult::new(RouteOutcome::InlineDiscarded, unchanged);
        }

        match c.cells.commit_cell(cell, code) {
            Ok(()) => {
                info!(code = %code, row = %cell.row_key, "inline_barcode_written");
                self.metrics.record_inline_write(true);
                // The open form must follow its row, or its next save recreates the old code
                if c.form.barcode().trim() == cell.row_key {
                    debug!(old_code = %cell.row_key, new_code = %code, "form_barcode_followed_row");
                    c.form.set_barcode(code);
                }
                self.refresh_views(c);
                self.request_sync(SyncReason::InlineEdit);
                // The row is now identified by the code just written
                RouteResult::new(
                    RouteOutcome::InlineWritten,
                    UiMode::InlineCellEdit(CellRef::new(code, cell.field.clone())),
                )
            }
            Err(e) => {
                error!(code = %code, row = %cell.row_key, error = %format!("{:#}", e), "inline_commit_failed");
                self.metrics.record_collaborator_error();
                c.view.report_error(&format!("Cell not updated: {:#}", e));
                RouteResult::new(RouteOutcome::Failed(format!("{:#}", e)), unchanged)
            }
        }
    }

    fn route_replace(&self, old_code: &str, new_code: &str, c: &mut Collaborators) -> RouteOutcome {
        match rename_barcode(c.store.as_mut(), old_code, new_code) {
            Ok(RenameOutcome::Unchanged) => {
                info!(code = %new_code, "barcode_rename_unchanged");
                self.metrics.record_rename(true);
                RouteOutcome::RenameUnchanged
            }
            Ok(RenameOutcome::Renamed(record)) => {
                info!(old_code = %old_code, new_code = %record.barcode, "barcode_renamed");
                self.metrics.record_rename(true);
                self.refresh_views(c);
                c.form.load_record(&record);
                c.view.focus(FocusTarget::Barcode);
                self.request_sync(SyncReason::Rename);
                RouteOutcome::Renamed { old_code: old_code.to_string(), new_code: record.barcode }
            }
            Err(e) => {
                warn!(old_code = %old_code, new_code = %new_code, error = %e, "barcode_rename_failed");
                self.metrics.record_rename(false);
                if matches!(e, RenameError::Store(_)) {
                    self.metrics.record_collaborator_error();
                }
                c.view.report_error(&format!("Barcode not changed: {}", e));
                RouteOutcome::RenameFailed(e.to_string())
            }
        }
    }

    /// Best effort; failures are only logged
    fn refresh_views(&self, c: &mut Collaborators) {
        if let Err(e) = c.index.rebuild_indexes() {
            warn!(error = %format!("{:#}", e), "index_rebuild_failed");
            self.metrics.record_collaborator_error();
        }
        if let Err(e) = c.index.rerender_table() {
            warn!(error = %format!("{:#}", e), "table_rerender_failed");
            self.metrics.record_collaborator_error();
        }
    }

    fn request_sync(&self, reason: SyncReason) {
        if let Some(sync) = &self.sync {
            sync.request(reason);
        }
    }
}

/// Move a record from `old_code` to `new_code`
///
/// Delete-then-insert, since records are keyed by value. On any failure the
/// store is left as it was.
pub fn rename_barcode(
    store: &mut dyn RecordStore,
    old_code: &str,
    new_code: &str,
) -> Result<RenameOutcome, RenameError> {
    let old_code = old_code.trim();
    let new_code = new_code.trim();
    if old_code.is_empty() || new_code.is_empty() {
        return Err(RenameError::EmptyCode);
    }
    if old_code == new_code {
        return Ok(RenameOutcome::Unchanged);
    }

    let Some(original) = store.find_by_exact_code(old_code)?.into_iter().next() else {
        return Err(RenameError::OldCodeMissing(old_code.to_string()));
    };
    if !store.find_by_exact_code(new_code)?.is_empty() {
        return Err(RenameError::NewCodeTaken(new_code.to_string()));
    }

    let mut renamed = original.clone();
    renamed.barcode = new_code.to_string();
    renamed.updated_at = now_string();

    if !store.delete_by_code(old_code)? {
        return Err(RenameError::OldCodeMissing(old_code.to_string()));
    }

    match store.upsert(renamed) {
        Ok(record) => Ok(RenameOutcome::Renamed(record)),
        Err(e) => {
            if let Err(restore_err) = store.upsert(original) {
                error!(
                    old_code = %old_code,
                    error = %format!("{:#}", restore_err),
                    "barcode_rename_restore_failed"
                );
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::InventoryStore;

    #[test]
    fn test_rename_same_code_is_noop() {
        let mut store = InventoryStore::with_records(vec![Record::new("111", "Tea")]);
        let before = store.all().unwrap();

        let outcome = rename_barcode(&mut store, "111", " 111 ").unwrap();

        assert_eq!(outcome, RenameOutcome::Unchanged);
        assert_eq!(store.all().unwrap(), before);
    }

    #[test]
    fn test_rename_moves_record() {
        let mut store = InventoryStore::with_records(vec![
            Record::new("111", "Tea").with_category("Drinks"),
            Record::new("333", "Coffee"),
        ]);

        let outcome = rename_barcode(&mut store, "111", "222").unwrap();

        let RenameOutcome::Renamed(record) = outcome else { panic!("expected rename") };
        assert_eq!(record.barcode, "222");
        assert_eq!(record.category, "Drinks");
        assert!(store.find_by_exact_code("111").unwrap().is_empty());
        assert_eq!(store.find_by_exact_code("222").unwrap()[0].name, "Tea");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_rename_collision_leaves_store_untouched() {
        let mut store =
            InventoryStore::with_records(vec![Record::new("111", "Tea"), Record::new("222", "Coffee")]);
        let before = store.all().unwrap();

        let err = rename_barcode(&mut store, "111", "222").unwrap_err();

        assert!(matches!(err, RenameError::NewCodeTaken(code) if code == "222"));
        assert_eq!(store.all().unwrap(), before);
    }

    #[test]
    fn test_rename_missing_old_code() {
        let mut store = InventoryStore::with_records(vec![Record::new("333", "Coffee")]);

        let err = rename_barcode(&mut store, "111", "222").unwrap_err();

        assert!(matches!(err, RenameError::OldCodeMissing(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_rename_empty_code() {
        let mut store = InventoryStore::new();
        assert!(matches!(rename_barcode(&mut store, "", "222"), Err(RenameError::EmptyCode)));
    }

    /// Store whose inserts fail after the first delete
    struct BrokenInsertStore {
        inner: InventoryStore,
        fail_upserts: usize,
    }

    impl RecordStore for BrokenInsertStore {
        fn find_by_exact_code(&self, code: &str) -> anyhow::Result<Vec<Record>> {
            self.inner.find_by_exact_code(code)
        }
        fn find_by_partial_code(&self, fragment: &str) -> anyhow::Result<Vec<Record>> {
            self.inner.find_by_partial_code(fragment)
        }
        fn upsert(&mut self, record: Record) -> anyhow::Result<Record> {
            if self.fail_upserts > 0 {
                self.fail_upserts -= 1;
                anyhow::bail!("write refused");
            }
            self.inner.upsert(record)
        }
        fn delete_by_code(&mut self, code: &str) -> anyhow::Result<bool> {
            self.inner.delete_by_code(code)
        }
        fn all(&self) -> anyhow::Result<Vec<Record>> {
            self.inner.all()
        }
    }

    #[test]
    fn test_failed_insert_restores_original() {
        let inner = InventoryStore::with_records(vec![Record::new("111", "Tea")]);
        let before = inner.all().unwrap();
        let mut store = BrokenInsertStore { inner: inner.clone(), fail_upserts: 1 };

        let err = rename_barcode(&mut store, "111", "222").unwrap_err();

        assert!(matches!(err, RenameError::Store(msg) if msg.contains("write refused")));
        assert_eq!(inner.all().unwrap(), before);
    }
}
