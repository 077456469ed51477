//! Scan dispatcher - the single coordinator for scan input
//!
//! Owns the classifier, the routing mode and the collaborators. Events are
//! processed one at a time; the quiet-period timeout is a single deadline
//! taken from the classifier and re-armed after every input.


use crate::domain::record::Record;
use crate::domain::types::{CellRef, ClassifierAction, MatchKind, ScanEvent, UiMode, BARCODE_FIELD};
use crate::infra::metrics::Metrics;
use crate::services::classifier::{ClassifierConfigError, ClassifierSettings, ScanClassifier, SessionState};
use crate::services::router::{Collaborators, RouteOutcome, ScanRouter};
use crate::services::sync_worker::SyncSender;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Millisecond clock shared by input sources and the dispatcher loop
#[derive(Debug, Clone, Copy)]
pub struct ScanClock {
    epoch: Instant,
}

impl ScanClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }

    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn instant_at(&self, at_ms: u64) -> tokio::time::Instant {
        tokio::time::Instant::from_std(self.epoch + Duration::from_millis(at_ms))
    }
}

impl Default for ScanClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Input accepted by the dispatcher loop
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchInput {
    Scan(ScanEvent),
    ToggleBarcodeReplace,
    EnterInlineEdit(CellRef),
    LeaveInlineEdit,
    /// Inline edit of the open record's barcode cell, or leave it
    ToggleInlineEdit,
    ToggleCountMode,
    /// Pick from the last candidate list (zero-based)
    SelectCandidate(usize),
}

/// What happened to one input
#[derive(Debug, PartialEq, Default)]
pub struct Dispatch {
    /// Keep the key away from the focused field
    pub suppress_default: bool,
    /// Set when a completed code was routed
    pub routed: Option<RouteOutcome>,
}

pub struct ScanDispatcher {
    classifier: ScanClassifier,
    router: ScanRouter,
    mode: UiMode,
    /// Post-scan focus goes to quantity instead of barcode
    count_mode: bool,
    /// Last ambiguous lookup, kept until a pick or another routed scan
    candidates: Option<(MatchKind, Vec<Record>)>,
    collaborators: Collaborators,
    metrics: Arc<Metrics>,
}

impl ScanDispatcher {
    pub fn new(
        settings: ClassifierSettings,
        collaborators: Collaborators,
        metrics: Arc<Metrics>,
        sync: Option<SyncSender>,
    ) -> Result<Self, ClassifierConfigError> {
        Ok(Self {
            classifier: ScanClassifier::new(settings)?,
            router: ScanRouter::new(metrics.clone(), sync),
            mode: UiMode::Normal,
            count_mode: false,
            candidates: None,
            collaborators,
            metrics,
        })
    }

    pub fn mode(&self) -> &UiMode {
        &self.mode
    }

    pub fn count_mode(&self) -> bool {
        self.count_mode
    }

    /// Records currently offered for selection
    pub fn candidates(&self) -> &[Record] {
        self.candidates.as_ref().map_or(&[], |(_, records)| records.as_slice())
    }

    pub fn classifier(&self) -> &ScanClassifier {
        &self.classifier
    }

    /// Pending quiet-period deadline, if a keyboard scan is in flight
    pub fn deadline_ms(&self) -> Option<u64> {
        self.classifier.deadline_ms()
    }

    pub fn on_event(&mut self, event: &ScanEvent) -> Dispatch {
        let was_accumulating = self.classifier.state() == SessionState::Accumulating;
        let action = self.classifier.on_event(event);

        if action == ClassifierAction::Ignore {
            let finished_session = was_accumulating && self.classifier.state() == SessionState::Idle;
            if finished_session || matches!(event, ScanEvent::Camera { .. }) {
                self.metrics.record_scan_too_short();
            }
        }
        self.complete(action)
    }

    /// Quiet-period timer fired at `now_ms`
    pub fn on_quiet_timeout(&mut self, now_ms: u64) -> Dispatch {
        let was_accumulating = self.classifier.state() == SessionState::Accumulating;
        let action = self.classifier.on_quiet_timeout(now_ms);

        if action == ClassifierAction::Ignore
            && was_accumulating
            && self.classifier.state() == SessionState::Idle
        {
            self.metrics.record_scan_too_short();
        }
        self.complete(action)
    }

    pub fn handle(&mut self, input: DispatchInput) -> Dispatch {
        match input {
            DispatchInput::Scan(event) => return self.on_event(&event),
            DispatchInput::ToggleBarcodeReplace => {
                self.toggle_barcode_replace();
            }
            DispatchInput::EnterInlineEdit(cell) => self.enter_inline_edit(cell),
            DispatchInput::LeaveInlineEdit => self.leave_inline_edit(),
            DispatchInput::ToggleInlineEdit => {
                self.toggle_inline_edit();
            }
            DispatchInput::ToggleCountMode => {
                self.toggle_count_mode();
            }
            DispatchInput::SelectCandidate(index) => {
                return Dispatch { suppress_default: false, routed: self.select_candidate(index) };
            }
        }
        Dispatch::default()
    }

    /// Load the `index`-th record of the last candidate list
    ///
    /// `None` when there is no such candidate. A pick blocked by the
    /// dirty-form guard keeps the list.
    pub fn select_candidate(&mut self, index: usize) -> Option<RouteOutcome> {
        let Some((kind, record)) =
            self.candidates.as_ref().and_then(|(kind, records)| Some((*kind, records.get(index)?.clone())))
        else {
            warn!(index = index, available = self.candidates().len(), "candidate_out_of_range");
            self.collaborators.view.report_error(&format!("No candidate number {}", index + 1));
            return None;
        };

        let started = Instant::now();
        let outcome = self.router.select_candidate(kind, &record, self.count_mode, &mut self.collaborators);
        if !matches!(outcome, RouteOutcome::Blocked(_)) {
            self.candidates = None;
        }
        self.metrics.record_route_latency(started.elapsed().as_micros() as u64);
        Some(outcome)
    }

    /// Arm barcode replacement for the record open in the form, or cancel it
    ///
    /// Returns true when replacement is armed afterwards.
    pub fn toggle_barcode_replace(&mut self) -> bool {
        if let UiMode::BarcodeReplace { old_code } = &self.mode {
            info!(old_code = %old_code, "barcode_replace_cancelled");
            self.mode = UiMode::Normal;
            return false;
        }

        let old_code = self.collaborators.form.barcode().trim().to_string();
        if old_code.is_empty() {
            warn!("barcode_replace_without_record");
            self.collaborators
                .view
                .report_error("Open a record first, then switch to barcode replacement");
            return false;
        }

        if let UiMode::InlineCellEdit(cell) = &self.mode {
            debug!(row = %cell.row_key, "inline_edit_left_for_replace");
        }
        info!(old_code = %old_code, "barcode_replace_armed");
        self.mode = UiMode::BarcodeReplace { old_code };
        true
    }

    pub fn enter_inline_edit(&mut self, cell: CellRef) {
        if let UiMode::BarcodeReplace { old_code } = &self.mode {
            info!(old_code = %old_code, "barcode_replace_cancelled");
        }
        debug!(row = %cell.row_key, field = %cell.field, "inline_edit_entered");
        self.mode = UiMode::InlineCellEdit(cell);
    }

    /// Enter inline edit on the open record's barcode cell, or leave inline edit
    ///
    /// Returns true when inline edit is active afterwards.
    pub fn toggle_inline_edit(&mut self) -> bool {
        if matches!(self.mode, UiMode::InlineCellEdit(_)) {
            self.leave_inline_edit();
            return false;
        }

        let row = self.collaborators.form.barcode().trim().to_string();
        if row.is_empty() {
            warn!("inline_edit_without_record");
            self.collaborators.view.report_error("Open a record first, then switch to inline edit");
            return false;
        }
        self.enter_inline_edit(CellRef::new(row, BARCODE_FIELD));
        true
    }

    pub fn leave_inline_edit(&mut self) {
        if matches!(self.mode, UiMode::InlineCellEdit(_)) {
            debug!("inline_edit_left");
            self.mode = UiMode::Normal;
        }
    }

    /// Returns the new count-mode state
    pub fn toggle_count_mode(&mut self) -> bool {
        self.count_mode = !self.count_mode;
        info!(count_mode = %self.count_mode, "count_mode_toggled");
        self.count_mode
    }

    fn complete(&mut self, action: ClassifierAction) -> Dispatch {
        let suppress_default = action.suppress_default();
        let ClassifierAction::CompleteScan { code, source, .. } = action else {
            return Dispatch { suppress_default, routed: None };
        };

        let started = Instant::now();
        self.metrics.record_scan_completed(source);
        info!(code = %code, source = %source, mode = %self.mode.as_str(), "scan_completed");

        let result = self.router.route(&self.mode, &code, self.count_mode, &mut self.collaborators);
        match &result.outcome {
            RouteOutcome::Candidates { kind, .. } => self.candidates = Some((*kind, result.candidates)),
            // A blocked scan leaves the previous list on screen
            RouteOutcome::Blocked(_) => {}
            _ => self.candidates = None,
        }
        if result.next_mode != self.mode {
            debug!(from = %self.mode.as_str(), to = %result.next_mode.as_str(), "mode_changed");
            self.mode = result.next_mode;
        }

        self.metrics.record_route_latency(started.elapsed().as_micros() as u64);
        Dispatch { suppress_default, routed: Some(result.outcome) }
    }

    /// Process inputs until the channel closes or shutdown is signalled
    ///
    /// `on_dispatch` sees every result so the host can honour suppression;
    /// the input is `None` for scans completed by the quiet timeout.
    pub async fn run<F>(
        &mut self,
        clock: ScanClock,
        mut input_rx: mpsc::Receiver<DispatchInput>,
        mut shutdown: watch::Receiver<bool>,
        mut on_dispatch: F,
    ) where
        F: FnMut(Option<&DispatchInput>, &Dispatch),
    {
        info!(
            char_gap_ms = %self.classifier.settings().char_gap_ms,
            new_scan_gap_ms = %self.classifier.settings().new_scan_gap_ms,
            end_timeout_ms = %self.classifier.settings().end_timeout_ms,
            "scan_dispatcher_started"
        );

        loop {
            let deadline = self.classifier.deadline_ms();
            let quiet = async {
                match deadline {
                    Some(at_ms) => tokio::time::sleep_until(clock.instant_at(at_ms)).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scan_dispatcher_shutdown");
                        break;
                    }
                }
                input = input_rx.recv() => {
                    match input {
                        Some(input) => {
                            let dispatch = self.handle(input.clone());
                            on_dispatch(Some(&input), &dispatch);
                        }
                        None => break,
                    }
                }
                _ = quiet => {
                    let dispatch = self.on_quiet_timeout(clock.now_ms());
                    if dispatch.routed.is_some() {
                        on_dispatch(None, &dispatch);
                    }
                }
            }
        }

        let summary = self.metrics.report();
        summary.log();
    }
}
