//! End-to-end scan handling over the real inventory adapters
//!
//! Input is fed through the JSONL replay so timing is deterministic.

use scan_intake::domain::{MatchKind, Record, UiMode};
use scan_intake::infra::Metrics;
use scan_intake::io::{CatalogIndex, InlineTable, InventoryForm, InventoryStore, TableView, TerminalView};
use scan_intake::services::collaborators::{Confirm, FormCollaborator, MissingFieldsDecision, RecordStore};
use scan_intake::services::guard::BlockReason;
use scan_intake::services::replay::{replay, ReplaySummary};
use scan_intake::services::{ClassifierSettings, Collaborators, RouteOutcome, ScanDispatcher};
use std::cell::{Cell, RefCell};
use std::io::{Cursor, Write};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

/// Operator answering every prompt the same way
struct ScriptedConfirm {
    answer: MissingFieldsDecision,
    asked: Rc<Cell<usize>>,
}

impl Confirm for ScriptedConfirm {
    fn keep_editing_or_discard(&mut self, _missing: &[String]) -> MissingFieldsDecision {
        self.asked.set(self.asked.get() + 1);
        self.answer
    }
}

struct Station {
    dispatcher: ScanDispatcher,
    store: InventoryStore,
    form: InventoryForm,
    catalog: CatalogIndex,
    screen: SharedBuf,
    asked: Rc<Cell<usize>>,
    metrics: Arc<Metrics>,
}

fn station(records: Vec<Record>, answer: MissingFieldsDecision) -> Station {
    let store = InventoryStore::with_records(records);
    let form = InventoryForm::new(
        store.clone(),
        ["barcode", "name", "category", "price", "tags"].iter().map(|s| s.to_string()).collect(),
        1,
    );
    let catalog = CatalogIndex::new();
    let screen = SharedBuf::default();
    let asked = Rc::new(Cell::new(0));
    let metrics = Arc::new(Metrics::new());

    let collaborators = Collaborators {
        store: Box::new(store.clone()),
        form: Box::new(form.clone()),
        confirm: Box::new(ScriptedConfirm { answer, asked: asked.clone() }),
        view: Box::new(TerminalView::new(screen.clone())),
        index: Box::new(TableView::new(store.clone(), catalog.clone(), std::io::sink())),
        cells: Box::new(InlineTable::new(store.clone())),
    };
    let dispatcher =
        ScanDispatcher::new(ClassifierSettings::default(), collaborators, metrics.clone(), None).unwrap();

    Station { dispatcher, store, form, catalog, screen, asked, metrics }
}

fn product(code: &str, name: &str) -> Record {
    Record::new(code, name).with_category("Drinks").with_price(1.5).with_tags("tea")
}

/// Scanner burst: characters 8ms apart, optionally closed by Enter
fn burst(code: &str, start_ms: u64, enter: bool) -> String {
    let mut lines = String::new();
    let mut at = start_ms;
    for c in code.chars() {
        lines.push_str(&format!(
            "{{\"origin\":\"keyboard\",\"key\":{{\"kind\":\"char\",\"char\":\"{}\"}},\"at_ms\":{}}}\n",
            c, at
        ));
        at += 8;
    }
    if enter {
        lines.push_str(&format!("{{\"origin\":\"keyboard\",\"key\":{{\"kind\":\"enter\"}},\"at_ms\":{}}}\n", at));
    }
    lines
}

fn run(station: &mut Station, input: &str) -> ReplaySummary {
    replay(&mut station.dispatcher, Cursor::new(input.to_string())).unwrap()
}

fn outcomes(summary: &ReplaySummary) -> Vec<&'static str> {
    summary.steps.iter().map(|s| s.outcome.as_str()).collect()
}

#[test]
fn test_exact_scan_loads_record_into_form() {
    let mut st = station(
        vec![product("4901234567894", "Green tea"), product("4900000000001", "Oolong")],
        MissingFieldsDecision::KeepEditing,
    );

    let summary = run(&mut st, &burst("4901234567894", 0, true));

    assert_eq!(
        summary.steps[0].outcome,
        RouteOutcome::Loaded { kind: MatchKind::Exact, barcode: "4901234567894".to_string() }
    );
    let data = st.form.form_data();
    assert_eq!(data.name, "Green tea");
    assert!(!st.form.is_dirty());
    assert!(st.screen.text().contains("focus: barcode"));
    assert_eq!(st.metrics.scans_total(), 1);
}

#[test]
fn test_unknown_code_starts_new_record() {
    let mut st = station(vec![product("4901234567894", "Green tea")], MissingFieldsDecision::KeepEditing);

    let summary = run(&mut st, &burst("7777777", 0, true));

    assert_eq!(summary.steps[0].outcome, RouteOutcome::NewRecord);
    let data = st.form.form_data();
    assert_eq!(data.barcode, "7777777");
    assert_eq!(data.qty, Some(1));
    assert!(data.name.is_empty());
}

#[test]
fn test_incomplete_edit_kept_drops_scan() {
    let mut st = station(vec![product("4901234567894", "Green tea")], MissingFieldsDecision::KeepEditing);
    st.form.set_field("name", "Half typed").unwrap();

    let summary = run(&mut st, &burst("4901234567894", 0, true));

    assert_eq!(summary.steps[0].outcome, RouteOutcome::Blocked(BlockReason::KeptEditing));
    assert_eq!(st.asked.get(), 1);
    assert_eq!(st.form.form_data().name, "Half typed");
    assert!(st.form.is_dirty());
    assert_eq!(st.metrics.scans_blocked(), 1);
}

#[test]
fn test_incomplete_edit_discarded_loads_scan() {
    let mut st = station(vec![product("4901234567894", "Green tea")], MissingFieldsDecision::DiscardAndContinue);
    st.form.set_field("name", "Half typed").unwrap();

    let summary = run(&mut st, &burst("4901234567894", 0, true));

    assert_eq!(outcomes(&summary), vec!["loaded"]);
    assert_eq!(st.form.form_data().name, "Green tea");
    assert_eq!(st.store.len(), 1);
}

#[test]
fn test_complete_edit_is_saved_before_next_record_loads() {
    let mut st = station(vec![product("4901234567894", "Green tea")], MissingFieldsDecision::KeepEditing);
    for (field, value) in
        [("barcode", "5550001"), ("name", "Barley tea"), ("category", "Drinks"), ("price", "2.25"), ("tags", "tea")]
    {
        st.form.set_field(field, value).unwrap();
    }

    let summary = run(&mut st, &burst("4901234567894", 0, true));

    assert_eq!(outcomes(&summary), vec!["loaded"]);
    assert_eq!(st.asked.get(), 0);
    let saved = st.store.find_by_exact_code("5550001").unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].price, Some(2.25));
    assert_eq!(st.form.form_data().name, "Green tea");
    // Index rebuilt after the save
    assert!(st.catalog.categories().iter().any(|c| c.name == "Drinks" && c.count == 2));
}

#[test]
fn test_duplicate_codes_offer_candidates() {
    let mut st = station(
        vec![product("4901234567894", "Green tea"), product("4901234567894", "Green tea (old label)")],
        MissingFieldsDecision::KeepEditing,
    );

    let summary = run(&mut st, &burst("4901234567894", 0, true));

    assert_eq!(summary.steps[0].outcome, RouteOutcome::Candidates { kind: MatchKind::Exact, count: 2 });
    assert!(st.screen.text().contains("2 exact match(es) for 4901234567894"));
    assert!(st.form.form_data().name.is_empty());
}

#[test]
fn test_scan_without_enter_completes_after_quiet_period() {
    let mut st = station(vec![product("4901234567894", "Green tea")], MissingFieldsDecision::KeepEditing);

    let summary = run(&mut st, &burst("4901234567894", 0, false));

    // Last character at 96ms, quiet period 90ms
    assert_eq!(summary.steps.len(), 1);
    assert_eq!(summary.steps[0].at_ms, 186);
    assert_eq!(outcomes(&summary), vec!["loaded"]);
}

#[test]
fn test_slow_typing_is_not_routed() {
    let mut st = station(vec![product("4901234567894", "Green tea")], MissingFieldsDecision::KeepEditing);
    let input = r#"
{"origin":"keyboard","key":{"kind":"char","char":"4"},"at_ms":0}
{"origin":"keyboard","key":{"kind":"char","char":"9"},"at_ms":300}
{"origin":"keyboard","key":{"kind":"char","char":"0"},"at_ms":600}
{"origin":"keyboard","key":{"kind":"char","char":"1"},"at_ms":900}
"#;

    let summary = run(&mut st, input);

    assert!(summary.steps.is_empty());
    assert_eq!(st.metrics.scans_total(), 0);
}

#[test]
fn test_camera_code_loads_record() {
    let mut st = station(vec![product("4901234567894", "Green tea")], MissingFieldsDecision::KeepEditing);

    let summary = run(&mut st, "{\"origin\":\"camera\",\"code\":\"4901234567894\",\"at_ms\":50}\n");

    assert_eq!(outcomes(&summary), vec!["loaded"]);
}

#[test]
fn test_replace_renames_open_record() {
    let mut st = station(vec![product("11110000", "Green tea")], MissingFieldsDecision::KeepEditing);
    let mut input = burst("11110000", 0, true);
    input.push_str("{\"command\":\"toggle_barcode_replace\",\"at_ms\":500}\n");
    input.push_str(&burst("33330000", 1000, true));

    let summary = run(&mut st, &input);

    assert_eq!(outcomes(&summary), vec!["loaded", "renamed"]);
    assert!(st.store.find_by_exact_code("11110000").unwrap().is_empty());
    assert_eq!(st.store.find_by_exact_code("33330000").unwrap()[0].name, "Green tea");
    assert_eq!(st.form.form_data().barcode, "33330000");
    assert_eq!(st.dispatcher.mode(), &UiMode::Normal);
}

#[test]
fn test_replace_onto_existing_code_is_refused() {
    let mut st = station(
        vec![product("11110000", "Green tea"), product("22220000", "Oolong")],
        MissingFieldsDecision::KeepEditing,
    );
    let mut input = burst("11110000", 0, true);
    input.push_str("{\"command\":\"toggle_barcode_replace\",\"at_ms\":500}\n");
    input.push_str(&burst("22220000", 1000, true));

    let summary = run(&mut st, &input);

    assert_eq!(outcomes(&summary), vec!["loaded", "rename_failed"]);
    assert_eq!(st.store.find_by_exact_code("11110000").unwrap().len(), 1);
    assert_eq!(st.store.find_by_exact_code("22220000").unwrap()[0].name, "Oolong");
    assert!(st.screen.text().contains("Barcode not changed"));
    assert_eq!(st.dispatcher.mode(), &UiMode::Normal);
    assert_eq!(st.metrics.renames_failed(), 1);
}

#[test]
fn test_inline_scan_rewrites_row_barcode() {
    let mut st = station(vec![product("11110000", "Green tea")], MissingFieldsDecision::KeepEditing);
    let mut input =
        "{\"command\":\"enter_inline_edit\",\"row_key\":\"11110000\",\"field\":\"barcode\",\"at_ms\":0}\n"
            .to_string();
    input.push_str(&burst("44440000", 100, true));

    let summary = run(&mut st, &input);

    assert_eq!(outcomes(&summary), vec!["inline_written"]);
    assert_eq!(st.store.find_by_exact_code("44440000").unwrap()[0].name, "Green tea");
    assert!(st.store.find_by_exact_code("11110000").unwrap().is_empty());
    // Inline writes leave the form alone
    assert!(st.form.form_data().name.is_empty());
}

#[test]
fn test_inline_rename_then_next_scan_keeps_form_edits_on_new_code() {
    let mut st = station(vec![product("11110000", "Tea")], MissingFieldsDecision::KeepEditing);

    run(&mut st, "{\"origin\":\"camera\",\"code\":\"11110000\",\"at_ms\":0}\n");
    st.form.set_field("name", "Tea edited").unwrap();

    let summary = run(
        &mut st,
        "{\"command\":\"toggle_inline_edit\",\"at_ms\":100}\n\
         {\"origin\":\"camera\",\"code\":\"22220000\",\"at_ms\":200}\n\
         {\"command\":\"toggle_inline_edit\",\"at_ms\":300}\n\
         {\"origin\":\"camera\",\"code\":\"33330000\",\"at_ms\":400}\n",
    );

    assert_eq!(outcomes(&summary), vec!["inline_written", "new_record"]);
    let records: Vec<(String, String)> =
        st.store.all().unwrap().into_iter().map(|r| (r.barcode, r.name)).collect();
    assert_eq!(records, vec![("22220000".to_string(), "Tea edited".to_string())]);
    assert_eq!(st.form.form_data().barcode, "33330000");
}

#[test]
fn test_operator_picks_duplicate_from_candidates() {
    let mut st = station(
        vec![product("4901234567894", "Green tea"), product("4901234567894", "Green tea (old label)")],
        MissingFieldsDecision::KeepEditing,
    );
    let mut input = burst("4901234567894", 0, true);
    input.push_str("{\"command\":\"select_candidate\",\"index\":1,\"at_ms\":2000}\n");

    let summary = run(&mut st, &input);

    assert_eq!(outcomes(&summary), vec!["candidates", "loaded"]);
    assert_eq!(summary.steps[1].at_ms, 2000);
    assert_eq!(st.form.form_data().name, "Green tea (old label)");
    assert!(st.dispatcher.candidates().is_empty());
}
