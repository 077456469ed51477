//! Scan intake - barcode scan dispatch for inventory entry
//!
//! Separates scanner bursts from human typing on a shared keyboard, guards
//! unsaved form edits, and routes each completed code by UI mode.
//!
//! Module structure:
//! - `domain/` - Core types (ScanEvent, Record, UiMode)
//! - `io/` - Store, form, terminal, keyboard and camera
//! - `services/` - Classifier, guard, router, dispatcher, sync worker
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::{Parser, ValueEnum};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use scan_intake::domain::types::{Key, ScanEvent};
use scan_intake::infra::{Config, Metrics};
use scan_intake::io::camera::CameraScanner;
use scan_intake::io::keyboard::command_input;
use scan_intake::io::{
    spawn_key_reader, CatalogIndex, InlineTable, InventoryForm, InventoryStore, KeyCommand, KeyInput,
    TableView, TerminalConfirm, TerminalView, ZbarDetector,
};
use scan_intake::services::collaborators::{
    Confirm, FormCollaborator, MissingFieldsDecision, RecordStore,
};
use scan_intake::services::replay::replay;
use scan_intake::services::{
    create_sync_worker, ClassifierSettings, Collaborators, Dispatch, DispatchInput, ScanClock,
    ScanDispatcher, SyncReason, SyncSender,
};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Scan intake - barcode scanner and camera input for inventory entry
#[derive(Parser, Debug)]
#[command(name = "scan-intake", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Replay recorded input from a JSONL file instead of reading the keyboard
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Answer to the missing-fields question during replay
    #[arg(long, value_enum, default_value_t = OnMissing::Keep)]
    on_missing: OnMissing,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnMissing {
    Keep,
    Discard,
}

/// Non-interactive confirmation used by replay
struct FixedAnswer(MissingFieldsDecision);

impl Confirm for FixedAnswer {
    fn keep_editing_or_discard(&mut self, missing: &[String]) -> MissingFieldsDecision {
        info!(missing = ?missing, answer = ?self.0, "missing_fields_auto_answered");
        self.0
    }
}

const HELP: &str = "Scan, or type field=value + Enter to edit the form ('save' to save, 'show' to print it).\r\n\
Ctrl+R replace barcode | Ctrl+K count mode | Ctrl+L inline barcode edit | Ctrl+O camera | F1-F9 pick candidate | Esc quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured logging to stderr; level via RUST_LOG (default: info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "scan-intake starting");

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(Config::resolve_config_path);
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        char_gap_ms = %config.char_gap_ms(),
        new_scan_gap_ms = %config.new_scan_gap_ms(),
        end_timeout_ms = %config.end_timeout_ms(),
        min_length = %config.min_length(),
        required_fields = ?config.required_fields(),
        store_path = %config.store_path(),
        camera_enabled = %config.camera_enabled(),
        sync_enabled = %config.sync_enabled(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());
    let store = InventoryStore::load_from_file(config.store_path())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // Snapshot writer, off the scan path
    let (sync_sender, sync_handle) = if config.sync_enabled() {
        let (sender, worker) = create_sync_worker(
            store.clone(),
            PathBuf::from(config.store_path()),
            metrics.clone(),
            config.sync_queue_size(),
        );
        (Some(sender), Some(tokio::spawn(worker.run())))
    } else {
        (None, None)
    };

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Ctrl+C outside raw mode (replay, or a terminal that still delivers signals)
    let signal_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = signal_shutdown.send(true);
    });

    let catalog = CatalogIndex::new();
    catalog.rebuild(&store.all()?);
    let form = InventoryForm::from_config(store.clone(), &config);
    let settings = ClassifierSettings::from_config(&config);

    match args.replay {
        Some(path) => {
            let answer = match args.on_missing {
                OnMissing::Keep => MissingFieldsDecision::KeepEditing,
                OnMissing::Discard => MissingFieldsDecision::DiscardAndContinue,
            };
            let collaborators = Collaborators {
                store: Box::new(store.clone()),
                form: Box::new(form.clone()),
                confirm: Box::new(FixedAnswer(answer)),
                view: Box::new(TerminalView::new(std::io::stdout())),
                index: Box::new(TableView::new(store.clone(), catalog.clone(), std::io::sink())),
                cells: Box::new(InlineTable::new(store.clone())),
            };
            let mut dispatcher = ScanDispatcher::new(settings, collaborators, metrics.clone(), sync_sender)?;

            let file = File::open(&path)?;
            let summary = replay(&mut dispatcher, BufReader::new(file))?;
            for step in &summary.steps {
                println!("{:>8} ms  {:<16} {:?}", step.at_ms, step.outcome.as_str(), step.outcome);
            }
            drop(dispatcher);
            metrics.report().log();
        }
        None => {
            let (confirm, prompt) = TerminalConfirm::new(std::io::stdout());
            let collaborators = Collaborators {
                store: Box::new(store.clone()),
                form: Box::new(form.clone()),
                confirm: Box::new(confirm),
                view: Box::new(TerminalView::new(std::io::stdout())),
                index: Box::new(TableView::new(store.clone(), catalog.clone(), std::io::stdout())),
                cells: Box::new(InlineTable::new(store.clone())),
            };
            let mut dispatcher =
                ScanDispatcher::new(settings, collaborators, metrics.clone(), sync_sender.clone())?;

            let clock = ScanClock::new();
            let (key_tx, key_rx) = mpsc::channel::<KeyInput>(256);
            let (input_tx, input_rx) = mpsc::channel::<DispatchInput>(256);

            enable_raw_mode()?;
            print!("{}\r\n", HELP);
            std::io::stdout().flush()?;

            spawn_key_reader(clock, key_tx, prompt)?;
            tokio::spawn(forward_keys(
                key_rx,
                input_tx,
                config.clone(),
                clock,
                shutdown_tx.clone(),
                shutdown_rx.clone(),
            ));

            let mut typed = TypedLine::new(form.clone(), sync_sender);
            dispatcher
                .run(clock, input_rx, shutdown_rx.clone(), |input, dispatch| typed.on_dispatch(input, dispatch))
                .await;

            disable_raw_mode()?;
            drop(typed);
            drop(dispatcher);
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sync_handle {
        // Remaining senders are gone; the worker flushes and exits
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("sync_worker_shutdown_timeout");
        }
    }

    info!("scan-intake shutdown complete");
    Ok(())
}

/// Turn key reader output into dispatcher input, handling host-level commands
async fn forward_keys(
    mut key_rx: mpsc::Receiver<KeyInput>,
    input_tx: mpsc::Sender<DispatchInput>,
    config: Config,
    clock: ScanClock,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
) {
    while let Some(key) = key_rx.recv().await {
        let input = match key {
            KeyInput::Scan(event) => Some(DispatchInput::Scan(event)),
            KeyInput::Command(KeyCommand::Quit) => {
                info!("quit_requested");
                let _ = shutdown_tx.send(true);
                break;
            }
            KeyInput::Command(KeyCommand::StartCamera) => {
                start_camera(&config, clock, input_tx.clone(), shutdown_rx.clone());
                None
            }
            KeyInput::Command(command) => command_input(command),
        };

        if let Some(input) = input {
            if input_tx.send(input).await.is_err() {
                break;
            }
        }
    }
}

fn start_camera(
    config: &Config,
    clock: ScanClock,
    input_tx: mpsc::Sender<DispatchInput>,
    stop: watch::Receiver<bool>,
) {
    if !config.camera_enabled() {
        print!("! camera is disabled (camera.enabled = false)\r\n");
        return;
    }

    let frame = Duration::from_millis(config.camera_poll_interval_ms().max(1));
    match ZbarDetector::spawn(config.camera_command(), frame) {
        Ok(detector) => {
            let scanner = CameraScanner::new(Box::new(detector), frame, clock);
            tokio::spawn(scanner.run(input_tx, stop));
        }
        Err(e) => {
            warn!(error = %format!("{:#}", e), "camera_start_failed");
            print!("! {:#}\r\n", e);
        }
    }
}

/// Human typing that the classifier let through, applied to the form on Enter
struct TypedLine {
    line: String,
    form: InventoryForm,
    sync: Option<SyncSender>,
}

impl TypedLine {
    fn new(form: InventoryForm, sync: Option<SyncSender>) -> Self {
        Self { line: String::new(), form, sync }
    }

    fn on_dispatch(&mut self, input: Option<&DispatchInput>, dispatch: &Dispatch) {
        if let Some(outcome) = &dispatch.routed {
            self.line.clear();
            let data = self.form.form_data();
            print!("\r\n[{}] {} {}\r\n", outcome.as_str(), data.barcode, data.name);
            let _ = std::io::stdout().flush();
            return;
        }
        if dispatch.suppress_default {
            return;
        }

        let Some(DispatchInput::Scan(ScanEvent::Keyboard { key, modified: false, .. })) = input else {
            return;
        };
        match key {
            Key::Char(c) => {
                self.line.push(*c);
                print!("{}", c);
            }
            Key::Enter => {
                print!("\r\n");
                let line = std::mem::take(&mut self.line);
                self.apply(line.trim());
            }
            Key::Other => {
                if self.line.pop().is_some() {
                    print!("\u{8} \u{8}");
                }
            }
        }
        let _ = std::io::stdout().flush();
    }

    fn apply(&mut self, line: &str) {
        match line {
            "" => {}
            "save" => match self.form.save() {
                Ok(true) => {
                    if let Some(sync) = &self.sync {
                        sync.request(SyncReason::FormSave);
                    }
                    print!("saved\r\n");
                }
                Ok(false) => {
                    let missing = self.form.validate(&self.form.form_data());
                    print!("! missing: {}\r\n", missing.join(", "));
                }
                Err(e) => print!("! save failed: {:#}\r\n", e),
            },
            "show" => print!("{:?}\r\n", self.form.form_data()),
            _ => match line.split_once('=') {
                Some((field, value)) => {
                    if let Err(e) = self.form.set_field(field.trim(), value) {
                        print!("! {:#}\r\n", e);
                    }
                }
                None => print!("! expected field=value, 'save' or 'show'\r\n"),
            },
        }
    }
}
