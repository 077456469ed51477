//! JSONL replay of recorded scan input
//!
//! Drives a dispatcher on virtual time: each line carries its own `at_ms`,
//! and the quiet-period timeout fires whenever the next line (or the end of
//! input) lies past the pending deadline. Replays are deterministic.
//!
//! Line format, one JSON object per line (blank lines and `#` comments skipped):
//! ```text
//! {"origin":"keyboard","key":{"kind":"char","char":"4"},"at_ms":0}
//! {"origin":"keyboard","key":{"kind":"enter"},"at_ms":120}
//! {"origin":"camera","code":"4901234567894","at_ms":900}
//! {"command":"toggle_barcode_replace","at_ms":1000}
//! {"command":"select_candidate","index":0,"at_ms":1200}
//! ```

use crate::domain::types::{CellRef, ScanEvent};
use crate::services::dispatcher::{Dispatch, DispatchInput, ScanDispatcher};
use crate::services::router::RouteOutcome;
use anyhow::Context;
use serde::Deserialize;
use std::io::BufRead;
use tracing::{debug, info, warn};

/// Operator action recorded between scans
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ReplayCommand {
    ToggleBarcodeReplace { at_ms: u64 },
    EnterInlineEdit { row_key: String, field: String, at_ms: u64 },
    LeaveInlineEdit { at_ms: u64 },
    ToggleInlineEdit { at_ms: u64 },
    ToggleCountMode { at_ms: u64 },
    /// Zero-based position in the last candidate list
    SelectCandidate { index: usize, at_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplayLine {
    Event(ScanEvent),
    Command(ReplayCommand),
}

impl ReplayLine {
    pub fn at_ms(&self) -> u64 {
        match self {
            ReplayLine::Event(event) => event.at_ms(),
            ReplayLine::Command(
                ReplayCommand::ToggleBarcodeReplace { at_ms }
                | ReplayCommand::EnterInlineEdit { at_ms, .. }
                | ReplayCommand::LeaveInlineEdit { at_ms }
                | ReplayCommand::ToggleInlineEdit { at_ms }
                | ReplayCommand::ToggleCountMode { at_ms }
                | ReplayCommand::SelectCandidate { at_ms, .. },
            ) => *at_ms,
        }
    }

    fn into_input(self) -> DispatchInput {
        match self {
            ReplayLine::Event(event) => DispatchInput::Scan(event),
            ReplayLine::Command(ReplayCommand::ToggleBarcodeReplace { .. }) => {
                DispatchInput::ToggleBarcodeReplace
            }
            ReplayLine::Command(ReplayCommand::EnterInlineEdit { row_key, field, .. }) => {
                DispatchInput::EnterInlineEdit(CellRef::new(row_key, field))
            }
            ReplayLine::Command(ReplayCommand::LeaveInlineEdit { .. }) => DispatchInput::LeaveInlineEdit,
            ReplayLine::Command(ReplayCommand::ToggleInlineEdit { .. }) => DispatchInput::ToggleInlineEdit,
            ReplayLine::Command(ReplayCommand::ToggleCountMode { .. }) => DispatchInput::ToggleCountMode,
            ReplayLine::Command(ReplayCommand::SelectCandidate { index, .. }) => {
                DispatchInput::SelectCandidate(index)
            }
        }
    }
}

/// A routed scan observed during replay
#[derive(Debug, PartialEq)]
pub struct ReplayStep {
    pub at_ms: u64,
    pub outcome: RouteOutcome,
}

#[derive(Debug, Default, PartialEq)]
pub struct ReplaySummary {
    pub lines: usize,
    pub steps: Vec<ReplayStep>,
}

/// Parse one non-empty line
pub fn parse_line(line: &str) -> anyhow::Result<ReplayLine> {
    serde_json::from_str(line).with_context(|| format!("Invalid replay line: {}", line))
}

/// Feed every line of `reader` through `dispatcher`
///
/// Stops at the first malformed line.
pub fn replay<R: BufRead>(dispatcher: &mut ScanDispatcher, reader: R) -> anyhow::Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    let mut last_at = 0u64;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read replay line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry = parse_line(trimmed).with_context(|| format!("Replay line {}", idx + 1))?;
        let at_ms = entry.at_ms();
        if at_ms < last_at {
            warn!(line = idx + 1, at_ms = %at_ms, previous_ms = %last_at, "replay_time_went_backwards");
        }
        last_at = last_at.max(at_ms);
        summary.lines += 1;

        fire_due_timeout(dispatcher, at_ms, &mut summary);

        let dispatch = dispatcher.handle(entry.into_input());
        record(&mut summary, at_ms, dispatch);
    }

    if let Some(deadline) = dispatcher.deadline_ms() {
        debug!(deadline_ms = %deadline, "replay_final_timeout");
        let dispatch = dispatcher.on_quiet_timeout(deadline);
        record(&mut summary, deadline, dispatch);
    }

    info!(lines = summary.lines, routed = summary.steps.len(), "replay_finished");
    Ok(summary)
}

fn fire_due_timeout(dispatcher: &mut ScanDispatcher, at_ms: u64, summary: &mut ReplaySummary) {
    if let Some(deadline) = dispatcher.deadline_ms() {
        if deadline <= at_ms {
            let dispatch = dispatcher.on_quiet_timeout(deadline);
            record(summary, deadline, dispatch);
        }
    }
}

fn record(summary: &mut ReplaySummary, at_ms: u64, dispatch: Dispatch) {
    if let Some(outcome) = dispatch.routed {
        summary.steps.push(ReplayStep { at_ms, outcome });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Key;

    #[test]
    fn test_parse_keyboard_and_camera_lines() {
        assert_eq!(
            parse_line(r#"{"origin":"keyboard","key":{"kind":"char","char":"4"},"at_ms":3}"#).unwrap(),
            ReplayLine::Event(ScanEvent::char('4', 3))
        );
        assert_eq!(
            parse_line(r#"{"origin":"keyboard","key":{"kind":"other"},"modified":true,"at_ms":5}"#)
                .unwrap(),
            ReplayLine::Event(ScanEvent::Keyboard { key: Key::Other, modified: true, at_ms: 5 })
        );
        assert_eq!(
            parse_line(r#"{"origin":"camera","code":"123456","at_ms":7}"#).unwrap().at_ms(),
            7
        );
    }

    #[test]
    fn test_parse_command_lines() {
        let line =
            parse_line(r#"{"command":"enter_inline_edit","row_key":"111","field":"barcode","at_ms":9}"#)
                .unwrap();
        assert_eq!(line.at_ms(), 9);
        assert_eq!(line.into_input(), DispatchInput::EnterInlineEdit(CellRef::new("111", "barcode")));
    }

    #[test]
    fn test_parse_candidate_selection() {
        let line = parse_line(r#"{"command":"select_candidate","index":1,"at_ms":40}"#).unwrap();
        assert_eq!(line.at_ms(), 40);
        assert_eq!(line.into_input(), DispatchInput::SelectCandidate(1));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_line(r#"{"origin":"keyboard"}"#).is_err());
        assert!(parse_line("not json").is_err());
    }
}
