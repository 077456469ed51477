//! Terminal front end for the scan engine
//!
//! Plain line output that stays readable in raw mode (`\r\n` line ends).
//! Logging goes to stderr, so stdout carries only operator-facing text.

use crate::domain::record::Record;
use crate::domain::types::{FocusTarget, MatchKind};
use crate::io::catalog::CatalogIndex;
use crate::io::store::InventoryStore;
use crate::services::collaborators::{Confirm, IndexRefresh, MissingFieldsDecision, RecordStore, ScanView};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tracing::warn;

/// Shorten `text` to `max` characters with a trailing ellipsis
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept)
}

fn write_line<W: Write>(out: &mut W, line: &str) {
    if let Err(e) = write!(out, "{}\r\n", line).and_then(|_| out.flush()) {
        warn!(error = %e, "terminal_write_failed");
    }
}

fn record_row(idx: usize, record: &Record) -> String {
    format!(
        "{:>3}  {:<15}  {:<15}  {:<12}  {:>6}  {:>4}  {}",
        idx + 1,
        truncate(&record.barcode, 15),
        truncate(&record.name, 15),
        truncate(&record.category, 12),
        record.price.map(|p| format!("{:.2}", p)).unwrap_or_default(),
        record.qty,
        record.updated_at,
    )
}

/// Focus, candidate lists and error messages
pub struct TerminalView<W: Write> {
    out: W,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> ScanView for TerminalView<W> {
    fn focus(&mut self, target: FocusTarget) {
        let field = match target {
            FocusTarget::Quantity => "quantity",
            FocusTarget::Barcode => "barcode",
        };
        write_line(&mut self.out, &format!("» focus: {}", field));
    }

    fn show_candidates(&mut self, kind: MatchKind, code: &str, records: &[Record]) {
        write_line(
            &mut self.out,
            &format!("{} {} match(es) for {}, pick one with F1-F9:", records.len(), kind.as_str(), code),
        );
        for (idx, record) in records.iter().enumerate() {
            write_line(&mut self.out, &record_row(idx, record));
        }
    }

    fn clear_candidates(&mut self) {}

    fn report_error(&mut self, message: &str) {
        write_line(&mut self.out, &format!("! {}", message));
    }
}

/// Inventory table plus the category/tag index behind it
pub struct TableView<W: Write> {
    store: InventoryStore,
    catalog: CatalogIndex,
    out: W,
}

impl<W: Write> TableView<W> {
    pub fn new(store: InventoryStore, catalog: CatalogIndex, out: W) -> Self {
        Self { store, catalog, out }
    }
}

impl<W: Write> IndexRefresh for TableView<W> {
    fn rebuild_indexes(&mut self) -> anyhow::Result<()> {
        self.catalog.rebuild(&self.store.all()?);
        Ok(())
    }

    fn rerender_table(&mut self) -> anyhow::Result<()> {
        let records = self.store.all()?;
        write_line(
            &mut self.out,
            &format!(
                "  #  {:<15}  {:<15}  {:<12}  {:>6}  {:>4}  updated",
                "barcode", "name", "category", "price", "qty"
            ),
        );
        for (idx, record) in records.iter().enumerate() {
            write_line(&mut self.out, &record_row(idx, record));
        }
        Ok(())
    }
}

/// Keys routed to a pending confirmation instead of the scanner
#[derive(Clone)]
pub struct PromptChannel {
    pub active: Arc<AtomicBool>,
    pub tx: mpsc::Sender<char>,
}

/// Blocking keep-editing / discard question on the terminal
pub struct TerminalConfirm<W: Write> {
    active: Arc<AtomicBool>,
    rx: mpsc::Receiver<char>,
    out: W,
}

impl<W: Write> TerminalConfirm<W> {
    /// Returns the confirm and the channel the key reader answers through
    pub fn new(out: W) -> (Self, PromptChannel) {
        let (tx, rx) = mpsc::channel();
        let active = Arc::new(AtomicBool::new(false));
        (Self { active: active.clone(), rx, out }, PromptChannel { active, tx })
    }

    fn wait_for_answer(&self) -> MissingFieldsDecision {
        loop {
            match self.rx.recv() {
                Ok('k' | 'K') => return MissingFieldsDecision::KeepEditing,
                Ok('d' | 'D') => return MissingFieldsDecision::DiscardAndContinue,
                Ok(_) => continue,
                // Reader gone: keep the operator's data
                Err(_) => return MissingFieldsDecision::KeepEditing,
            }
        }
    }
}

impl<W: Write> Confirm for TerminalConfirm<W> {
    fn keep_editing_or_discard(&mut self, missing: &[String]) -> MissingFieldsDecision {
        write_line(&mut self.out, &format!("Current record is missing: {}", missing.join(", ")));
        write_line(&mut self.out, "[k] keep editing (scan is dropped)   [d] discard and open the scan");

        // Drain answers typed before the question was shown
        while self.rx.try_recv().is_ok() {}
        self.active.store(true, Ordering::SeqCst);
        let multi_thread = tokio::runtime::Handle::try_current()
            .map(|h| h.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread)
            .unwrap_or(false);
        let decision = if multi_thread {
            tokio::task::block_in_place(|| self.wait_for_answer())
        } else {
            self.wait_for_answer()
        };
        self.active.store(false, Ordering::SeqCst);
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Writer whose output stays inspectable after being boxed away
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).to_string()
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 15), "short");
        assert_eq!(truncate("4901234567894123", 8), "4901234…");
    }

    #[test]
    fn test_candidates_are_listed() {
        let buf = SharedBuf::default();
        let mut view = TerminalView::new(buf.clone());

        view.show_candidates(
            MatchKind::Exact,
            "999",
            &[Record::new("999", "Dup A"), Record::new("999", "Dup B")],
        );

        let text = buf.text();
        assert!(text.contains("2 exact match(es) for 999"));
        assert!(text.contains("Dup A") && text.contains("Dup B"));
        assert!(text.ends_with("\r\n"));
    }

    #[test]
    fn test_table_view_rebuilds_catalog() {
        let store = InventoryStore::with_records(vec![Record::new("1", "Tea").with_category("Drinks")]);
        let catalog = CatalogIndex::new();
        let buf = SharedBuf::default();
        let mut table = TableView::new(store, catalog.clone(), buf.clone());

        table.rebuild_indexes().unwrap();
        table.rerender_table().unwrap();

        assert_eq!(catalog.categories()[0].name, "Drinks");
        assert!(buf.text().contains("Tea"));
    }

    #[test]
    fn test_confirm_reads_answer_from_prompt_channel() {
        let buf = SharedBuf::default();
        let (mut confirm, prompt) = TerminalConfirm::new(buf.clone());

        let answer = std::thread::spawn(move || {
            while !prompt.active.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }
            prompt.tx.send('x').unwrap();
            prompt.tx.send('d').unwrap();
        });

        let decision = confirm.keep_editing_or_discard(&["category".to_string()]);
        answer.join().unwrap();

        assert_eq!(decision, MissingFieldsDecision::DiscardAndContinue);
        assert!(buf.text().contains("missing: category"));
    }

    #[test]
    fn test_confirm_defaults_to_keep_when_reader_is_gone() {
        let (mut confirm, prompt) = TerminalConfirm::new(Vec::new());
        drop(prompt);

        assert_eq!(
            confirm.keep_editing_or_discard(&["name".to_string()]),
            MissingFieldsDecision::KeepEditing
        );
    }
}
