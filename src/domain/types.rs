//! Shared types for scan classification and routing

use serde::{Deserialize, Serialize};

/// Field name that marks the barcode column of an editable table row
pub const BARCODE_FIELD: &str = "barcode";

/// A key as seen by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "char", rename_all = "snake_case")]
pub enum Key {
    /// Printable character
    Char(char),
    /// Enter / line feed (the usual scanner terminator)
    Enter,
    /// Arrows, function keys, Tab, Backspace, ...
    Other,
}

/// Raw input event from a keyboard-emulating scanner or a camera decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ScanEvent {
    Keyboard {
        key: Key,
        /// Ctrl / Alt / Meta held down
        #[serde(default)]
        modified: bool,
        at_ms: u64,
    },
    Camera {
        code: String,
        at_ms: u64,
    },
}

impl ScanEvent {
    pub fn char(c: char, at_ms: u64) -> Self {
        ScanEvent::Keyboard { key: Key::Char(c), modified: false, at_ms }
    }

    pub fn enter(at_ms: u64) -> Self {
        ScanEvent::Keyboard { key: Key::Enter, modified: false, at_ms }
    }

    pub fn camera(code: impl Into<String>, at_ms: u64) -> Self {
        ScanEvent::Camera { code: code.into(), at_ms }
    }

    pub fn at_ms(&self) -> u64 {
        match self {
            ScanEvent::Keyboard { at_ms, .. } | ScanEvent::Camera { at_ms, .. } => *at_ms,
        }
    }

    pub fn origin(&self) -> ScanOrigin {
        match self {
            ScanEvent::Keyboard { .. } => ScanOrigin::Keyboard,
            ScanEvent::Camera { .. } => ScanOrigin::Camera,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrigin {
    Keyboard,
    Camera,
}

impl ScanOrigin {
    pub fn as_str(&self) -> &str {
        match self {
            ScanOrigin::Keyboard => "keyboard",
            ScanOrigin::Camera => "camera",
        }
    }
}

/// How a completed scan was terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource {
    HidEnter,
    HidTimeout,
    Camera,
}

impl ScanSource {
    pub fn as_str(&self) -> &str {
        match self {
            ScanSource::HidEnter => "hid_enter",
            ScanSource::HidTimeout => "hid_timeout",
            ScanSource::Camera => "camera",
        }
    }
}

impl std::fmt::Display for ScanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier verdict for a single event
///
/// `suppress_default` asks the host to keep the key away from whatever
/// field currently has focus. The classifier never does that itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierAction {
    Ignore,
    Consume { suppress_default: bool },
    CompleteScan { code: String, source: ScanSource, suppress_default: bool },
}

impl ClassifierAction {
    /// Completed code, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            ClassifierAction::CompleteScan { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn suppress_default(&self) -> bool {
        match self {
            ClassifierAction::Ignore => false,
            ClassifierAction::Consume { suppress_default }
            | ClassifierAction::CompleteScan { suppress_default, .. } => *suppress_default,
        }
    }
}

/// A cell of the inline-editable inventory table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRef {
    /// Barcode the row was rendered with (the row's identity)
    pub row_key: String,
    /// Column field name
    pub field: String,
}

impl CellRef {
    pub fn new(row_key: impl Into<String>, field: impl Into<String>) -> Self {
        Self { row_key: row_key.into(), field: field.into() }
    }

    pub fn is_barcode_column(&self) -> bool {
        self.field == BARCODE_FIELD
    }
}

/// Where a completed code is delivered
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Normal,
    InlineCellEdit(CellRef),
    BarcodeReplace {
        old_code: String,
    },
}

impl UiMode {
    pub fn as_str(&self) -> &str {
        match self {
            UiMode::Normal => "normal",
            UiMode::InlineCellEdit(_) => "inline_cell_edit",
            UiMode::BarcodeReplace { .. } => "barcode_replace",
        }
    }
}

/// Field that receives focus after a record is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    /// Quantity field, content selected (count mode)
    Quantity,
    /// Barcode field, content selected
    Barcode,
}

/// Which lookup produced a candidate list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Partial,
}

impl MatchKind {
    pub fn as_str(&self) -> &str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Partial => "partial",
        }
    }
}
