//! Terminal keyboard input
//!
//! A blocking reader thread turns crossterm key events into dispatcher
//! input. Control chords drive the UI; everything else goes through the
//! classifier. While a confirmation is pending, keys answer it instead.

use crate::domain::types::{Key, ScanEvent};
use crate::io::terminal::PromptChannel;
use crate::services::dispatcher::{DispatchInput, ScanClock};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Operator commands bound to control chords
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    /// Ctrl+C or Esc
    Quit,
    /// Ctrl+R
    ToggleBarcodeReplace,
    /// Ctrl+K
    ToggleCountMode,
    /// Ctrl+L - barcode cell of the open record
    ToggleInlineEdit,
    /// Ctrl+O - one-shot camera scan
    StartCamera,
    /// F1..F9 - pick from the candidate list (zero-based)
    SelectCandidate(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyInput {
    Scan(ScanEvent),
    Command(KeyCommand),
}

/// Map a crossterm key event; releases and repeats yield `None`
pub fn map_key_event(key: &KeyEvent, at_ms: u64) -> Option<KeyInput> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => return Some(KeyInput::Command(KeyCommand::Quit)),
        KeyCode::F(n @ 1..=9) => {
            return Some(KeyInput::Command(KeyCommand::SelectCandidate(usize::from(n) - 1)));
        }
        _ => {}
    }
    if ctrl {
        let command = match key.code {
            KeyCode::Char('c') => Some(KeyCommand::Quit),
            KeyCode::Char('r') => Some(KeyCommand::ToggleBarcodeReplace),
            KeyCode::Char('k') => Some(KeyCommand::ToggleCountMode),
            KeyCode::Char('l') => Some(KeyCommand::ToggleInlineEdit),
            KeyCode::Char('o') => Some(KeyCommand::StartCamera),
            _ => None,
        };
        if let Some(command) = command {
            return Some(KeyInput::Command(command));
        }
    }

    let modified = key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
    let key_code = match key.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        _ => Key::Other,
    };
    Some(KeyInput::Scan(ScanEvent::Keyboard { key: key_code, modified, at_ms }))
}

/// Dispatcher input for a command; `None` for host-level commands
pub fn command_input(command: KeyCommand) -> Option<DispatchInput> {
    match command {
        KeyCommand::ToggleBarcodeReplace => Some(DispatchInput::ToggleBarcodeReplace),
        KeyCommand::ToggleCountMode => Some(DispatchInput::ToggleCountMode),
        KeyCommand::ToggleInlineEdit => Some(DispatchInput::ToggleInlineEdit),
        KeyCommand::SelectCandidate(index) => Some(DispatchInput::SelectCandidate(index)),
        KeyCommand::Quit | KeyCommand::StartCamera => None,
    }
}

/// Spawn the blocking key reader
///
/// Runs until `input_tx` closes or a key read fails. Keys go to `prompt`
/// while it is active.
pub fn spawn_key_reader(
    clock: ScanClock,
    input_tx: mpsc::Sender<KeyInput>,
    prompt: PromptChannel,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name("key-reader".to_string()).spawn(move || {
        info!("key_reader_started");
        loop {
            if input_tx.is_closed() {
                break;
            }
            match event::poll(Duration::from_millis(50)) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    warn!(error = %e, "key_poll_failed");
                    break;
                }
            }
            let key = match event::read() {
                Ok(Event::Key(key)) => key,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "key_read_failed");
                    break;
                }
            };

            if prompt.active.load(Ordering::SeqCst) {
                if let (KeyEventKind::Press, KeyCode::Char(c)) = (key.kind, key.code) {
                    let _ = prompt.tx.send(c);
                }
                continue;
            }

            let Some(input) = map_key_event(&key, clock.now_ms()) else {
                continue;
            };
            if input_tx.blocking_send(input).is_err() {
                break;
            }
        }
        debug!("key_reader_stopped");
    })
}
