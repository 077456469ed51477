//! Scan input classification
//!
//! Turns a stream of keystrokes shared with human typing into discrete
//! completed codes. A scan ends on:
//! - Enter (most scanners send it)
//! - a quiet period with no characters (scanners configured without terminator)
//!
//! Scanner vs human is decided by inter-character latency. Camera detections
//! are already complete and never touch the keyboard buffer.

use crate::domain::types::{ClassifierAction, Key, ScanEvent, ScanSource};
use crate::infra::config::Config;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifierConfigError {
    #[error("fast gap ({fast_ms} ms) must be less than new-scan gap ({new_scan_ms} ms)")]
    GapOrder { fast_ms: u64, new_scan_ms: u64 },
    #[error("minimum code length must be at least 1")]
    ZeroMinLength,
}

/// Timing thresholds for the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierSettings {
    pub char_gap_ms: u64,
    pub new_scan_gap_ms: u64,
    pub end_timeout_ms: u64,
    pub min_length: usize,
}

impl ClassifierSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            char_gap_ms: config.char_gap_ms(),
            new_scan_gap_ms: config.new_scan_gap_ms(),
            end_timeout_ms: config.end_timeout_ms(),
            min_length: config.min_length(),
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self { char_gap_ms: 45, new_scan_gap_ms: 160, end_timeout_ms: 90, min_length: 4 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Accumulating,
}

/// The single in-flight keyboard scan
#[derive(Debug, Clone)]
struct ScanSession {
    buffer: String,
    started_at: u64,
    last_char_at: u64,
}

pub struct ScanClassifier {
    settings: ClassifierSettings,
    session: Option<ScanSession>,
    /// Time of the last qualifying character, kept across sessions for gap measurement
    last_char_at: Option<u64>,
}

impl ScanClassifier {
    pub fn new(settings: ClassifierSettings) -> Result<Self, ClassifierConfigError> {
        if settings.char_gap_ms >= settings.new_scan_gap_ms {
            return Err(ClassifierConfigError::GapOrder {
                fast_ms: settings.char_gap_ms,
                new_scan_ms: settings.new_scan_gap_ms,
            });
        }
        if settings.min_length == 0 {
            return Err(ClassifierConfigError::ZeroMinLength);
        }
        Ok(Self { settings, session: None, last_char_at: None })
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        if self.session.is_some() {
            SessionState::Accumulating
        } else {
            SessionState::Idle
        }
    }

    /// Current buffer content (empty when idle)
    pub fn buffer(&self) -> &str {
        self.session.as_ref().map_or("", |s| s.buffer.as_str())
    }

    /// When the pending quiet-period timeout should fire
    ///
    /// There is at most one deadline; each qualifying character moves it.
    pub fn deadline_ms(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.last_char_at + self.settings.end_timeout_ms)
    }

    /// Drop any in-flight session
    pub fn reset(&mut self) {
        self.session = None;
    }

    pub fn on_event(&mut self, event: &ScanEvent) -> ClassifierAction {
        match event {
            ScanEvent::Camera { code, at_ms } => self.on_camera(code, *at_ms),
            ScanEvent::Keyboard { modified: true, .. } => ClassifierAction::Ignore,
            ScanEvent::Keyboard { key: Key::Other, .. } => ClassifierAction::Ignore,
            ScanEvent::Keyboard { key: Key::Enter, at_ms, .. } => self.on_terminator(*at_ms),
            ScanEvent::Keyboard { key: Key::Char(c), at_ms, .. } => self.on_char(*c, *at_ms),
        }
    }

    /// Quiet-period timer fired
    ///
    /// Timers superseded by a later character are ignored, so a host may
    /// fire stale timers without harm.
    pub fn on_quiet_timeout(&mut self, now_ms: u64) -> ClassifierAction {
        let Some(deadline) = self.deadline_ms() else {
            return ClassifierAction::Ignore;
        };
        if now_ms < deadline {
            debug!(now_ms = %now_ms, deadline_ms = %deadline, "scan_timeout_superseded");
            return ClassifierAction::Ignore;
        }
        self.finish(ScanSource::HidTimeout, false)
    }

    fn on_char(&mut self, c: char, at_ms: u64) -> ClassifierAction {
        let gap_ms = self.last_char_at.map(|last| at_ms.saturating_sub(last));
        self.last_char_at = Some(at_ms);

        let looks_like_scanner = gap_ms.is_some_and(|gap| gap <= self.settings.char_gap_ms);
        let suppress_default = self.session.is_some() || looks_like_scanner;

        let stale = gap_ms.map_or(true, |gap| gap > self.settings.new_scan_gap_ms);
        match self.session.as_mut() {
            Some(session) if !stale => {
                session.buffer.push(c);
                session.last_char_at = at_ms;
            }
            _ => {
                if let Some(old) = self.session.as_ref() {
                    debug!(
                        discarded = %old.buffer,
                        gap_ms = ?gap_ms,
                        "scan_session_stale"
                    );
                }
                // The first character seeds the buffer in the same step that opens the session
                self.session =
                    Some(ScanSession { buffer: c.to_string(), started_at: at_ms, last_char_at: at_ms });
            }
        }

        ClassifierAction::Consume { suppress_default }
    }

    fn on_terminator(&mut self, at_ms: u64) -> ClassifierAction {
        if self.session.is_none() {
            return ClassifierAction::Ignore;
        }
        debug!(at_ms = %at_ms, "scan_terminator");
        self.finish(ScanSource::HidEnter, true)
    }

    fn on_camera(&mut self, code: &str, at_ms: u64) -> ClassifierAction {
        let code = code.trim();
        if code.chars().count() < self.settings.min_length {
            debug!(len = code.len(), at_ms = %at_ms, "camera_code_too_short");
            return ClassifierAction::Ignore;
        }
        ClassifierAction::CompleteScan {
            code: code.to_string(),
            source: ScanSource::Camera,
            suppress_default: false,
        }
    }

    fn finish(&mut self, source: ScanSource, suppress_default: bool) -> ClassifierAction {
        let Some(session) = self.session.take() else {
            return ClassifierAction::Ignore;
        };
        let code = session.buffer.trim();
        let duration_ms = session.last_char_at.saturating_sub(session.started_at);

        if code.chars().count() < self.settings.min_length {
            debug!(
                len = code.len(),
                source = %source,
                duration_ms = %duration_ms,
                "scan_too_short"
            );
            return ClassifierAction::Ignore;
        }

        debug!(
            code = %code,
            source = %source,
            duration_ms = %duration_ms,
            "scan_classified"
        );
        ClassifierAction::CompleteScan { code: code.to_string(), source, suppress_default }
    }
}
