//! Dirty-form guard
//!
//! Runs before a scanned code replaces the record open in the form. A clean
//! or empty form lets the scan through. A dirty form is auto-saved when
//! complete; otherwise the operator decides between keeping the edits (the
//! scan is dropped) and discarding them.

use crate::infra::metrics::Metrics;
use crate::services::collaborators::{Confirm, FormCollaborator, MissingFieldsDecision, ScanView};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Operator chose to keep editing the current record
    KeptEditing,
    /// Auto-save failed; the scan is not applied
    SaveFailed,
}

impl BlockReason {
    pub fn as_str(&self) -> &str {
        match self {
            BlockReason::KeptEditing => "kept_editing",
            BlockReason::SaveFailed => "save_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// `saved` is true when the previous record was auto-saved on the way
    Proceed { saved: bool },
    Blocked(BlockReason),
}

impl GuardDecision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, GuardDecision::Proceed { .. })
    }
}

pub struct DirtyFormGuard {
    metrics: Arc<Metrics>,
}

impl DirtyFormGuard {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    /// Decide whether `new_code` may replace what the form currently holds
    ///
    /// The confirmation is blocking: no other scan is processed until the
    /// operator answers.
    pub fn resolve(
        &self,
        new_code: &str,
        form: &mut dyn FormCollaborator,
        confirm: &mut dyn Confirm,
        view: &mut dyn ScanView,
    ) -> GuardDecision {
        if !form.is_dirty() {
            return GuardDecision::Proceed { saved: false };
        }

        let data = form.form_data();
        if data.is_empty() {
            return GuardDecision::Proceed { saved: false };
        }

        let missing = form.validate(&data);
        if !missing.is_empty() {
            warn!(
                new_code = %new_code,
                current_code = %data.barcode,
                missing = ?missing,
                "dirty_form_missing_fields"
            );
            return match confirm.keep_editing_or_discard(&missing) {
                MissingFieldsDecision::KeepEditing => {
                    info!(new_code = %new_code, "scan_dropped_keep_editing");
                    self.metrics.record_scan_blocked();
                    GuardDecision::Blocked(BlockReason::KeptEditing)
                }
                MissingFieldsDecision::DiscardAndContinue => {
                    info!(
                        new_code = %new_code,
                        discarded_code = %data.barcode,
                        "dirty_form_discarded"
                    );
                    form.reset();
                    GuardDecision::Proceed { saved: false }
                }
            };
        }

        match form.save() {
            Ok(true) => {
                info!(saved_code = %data.barcode, new_code = %new_code, "dirty_form_auto_saved");
                self.metrics.record_auto_save();
                GuardDecision::Proceed { saved: true }
            }
            Ok(false) => {
                error!(current_code = %data.barcode, new_code = %new_code, "auto_save_rejected");
                self.metrics.record_scan_blocked();
                view.report_error(&format!(
                    "Could not save {} before opening {}; scan again after fixing the form",
                    data.barcode, new_code
                ));
                GuardDecision::Blocked(BlockReason::SaveFailed)
            }
            Err(e) => {
                error!(
                    current_code = %data.barcode,
                    new_code = %new_code,
                    error = %e,
                    "auto_save_failed"
                );
                self.metrics.record_scan_blocked();
                self.metrics.record_collaborator_error();
                view.report_error(&format!("Saving {} failed: {:#}", data.barcode, e));
                GuardDecision::Blocked(BlockReason::SaveFailed)
            }
        }
    }
}
