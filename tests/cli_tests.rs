use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use std::fs;

/// Helper to create a temporary database and set it as the data location
fn setup_test_env() -> (TempDir, std::sync::MutexGuard<'static, ()>) {
    let guard = test_env::lock_test_env();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    // Create config file
    let config_dir = temp_dir.path().join(".lotflow");
    fs::create_dir_all(&config_dir).unwrap();
    let config_file = config_dir.join("rc");
    fs::write(&config_file, format!("data.location={}\nlock.timeout_ms=500\n", db_path.display())).unwrap();

    (temp_dir, guard)
}

fn get_lotflow_cmd(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lotflow").unwrap();
    cmd.env("HOME", temp_dir.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

fn json_output(temp_dir: &TempDir, args: &[&str]) -> serde_json::Value {
    let output = get_lotflow_cmd(temp_dir).args(args).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    serde_json::from_str(&stdout).unwrap()
}

fn add_lot(temp_dir: &TempDir, so: &str, line: &str, qty: &str) -> i64 {
    let json = json_output(temp_dir, &["add", so, line, "--qty", qty, "--party", "Acme Valves", "--json"]);
    json["id"].as_i64().unwrap()
}

// =============================================================================
// add / show / list
// =============================================================================

#[test]
fn test_add_creates_planning_lot() {
    let (temp_dir, _guard) = setup_test_env();

    get_lotflow_cmd(&temp_dir)
        .args(["add", "SO-2291", "4", "--qty", "36", "--product", "GV-50", "--attr", "size=DN50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created lot 1 for SO-2291-4 with qty 36 in Planning"));

    get_lotflow_cmd(&temp_dir)
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Lot 1: SO-2291-4 at Planning"))
        .stdout(predicate::str::contains("Pending:     36"))
        .stdout(predicate::str::contains("size: DN50"));

    let rows = json_output(&temp_dir, &["list", "planning", "--json"]);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["unique_code"], "SO-2291-4");
    assert_eq!(rows[0]["status"], "pending");
    assert_eq!(rows[0]["qty_pending"], 36);
}

#[test]
fn test_add_duplicate_order_line_is_user_error() {
    let (temp_dir, _guard) = setup_test_env();
    add_lot(&temp_dir, "SO1", "1", "10");

    get_lotflow_cmd(&temp_dir)
        .args(["add", "SO1", "1", "--qty", "5"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error: Order line 'SO1-1' is already in the ledger"));
}

#[test]
fn test_list_unknown_stage() {
    let (temp_dir, _guard) = setup_test_env();

    get_lotflow_cmd(&temp_dir)
        .args(["list", "painting"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown stage 'painting'"));
}

// =============================================================================
// assign / dispatch
// =============================================================================

#[test]
fn test_assign_and_split() {
    let (temp_dir, _guard) = setup_test_env();
    let id = add_lot(&temp_dir, "SO1", "1", "36");
    let id = id.to_string();

    get_lotflow_cmd(&temp_dir)
        .args(["assign", &id, "material-issue", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Moved 10 of lot 1 from Planning to Material Issue as lot 2."))
        .stdout(predicate::str::contains("Lot 1 has 26 pending at Planning."));

    get_lotflow_cmd(&temp_dir)
        .args(["assign", &id, "semi-qc", "15", "--split-to", "phosphating-qc", "--split-qty", "10"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Split total 25 does not equal available 26"));

    let outcome = json_output(
        &temp_dir,
        &["assign", &id, "Semi QC", "16", "--split-to", "phosphating_qc", "--split-qty", "10", "--json"],
    );
    assert_eq!(outcome["source_closed"], true);
    let created = outcome["created"].as_array().unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0]["stage"], "semi-qc");
    assert_eq!(created[1]["stage"], "phosphating-qc");
    assert_eq!(created[0]["split_id"], outcome["split_id"]);

    get_lotflow_cmd(&temp_dir)
        .args(["check", "SO1-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Quantities balance."));
}

#[test]
fn test_assign_rejections_exit_one() {
    let (temp_dir, _guard) = setup_test_env();
    add_lot(&temp_dir, "SO1", "1", "5");

    get_lotflow_cmd(&temp_dir)
        .args(["assign", "1", "svs", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not follow Planning"));

    get_lotflow_cmd(&temp_dir)
        .args(["assign", "1", "semi-qc", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Quantity 0 is out of range"));

    get_lotflow_cmd(&temp_dir)
        .args(["assign", "1", "semi-qc", "3", "--split-to", "semi-qc", "--split-qty", "2"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("a split needs two different stages"));

    get_lotflow_cmd(&temp_dir)
        .args(["assign", "9", "semi-qc", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Lot 9 not found"));

    get_lotflow_cmd(&temp_dir)
        .args(["assign", "abc", "semi-qc", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid lot ID"));
}

#[test]
fn test_dispatch_requires_terminal_stage() {
    let (temp_dir, _guard) = setup_test_env();
    add_lot(&temp_dir, "SO1", "1", "5");

    get_lotflow_cmd(&temp_dir)
        .args(["dispatch", "1", "5"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("only lots at a terminal stage can be dispatched"));
}

// =============================================================================
// history / flags / search
// =============================================================================

#[test]
fn test_history_and_lineage() {
    let (temp_dir, _guard) = setup_test_env();
    add_lot(&temp_dir, "SO1", "1", "8");
    get_lotflow_cmd(&temp_dir).args(["assign", "1", "semi-qc", "8"]).assert().success();

    let history = json_output(&temp_dir, &["history", "1", "--json"]);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["qty_processed"], 8);
    assert!(!history[0]["exited_ts"].is_null());

    let lineage = json_output(&temp_dir, &["history", "2", "--lineage", "--json"]);
    let stages: Vec<&str> = lineage
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["stage"].as_str().unwrap())
        .collect();
    assert_eq!(stages, vec!["planning", "semi-qc"]);
}

#[test]
fn test_urgent_and_remark_follow_lot() {
    let (temp_dir, _guard) = setup_test_env();
    add_lot(&temp_dir, "SO1", "1", "8");
    add_lot(&temp_dir, "SO1", "2", "3");

    get_lotflow_cmd(&temp_dir)
        .args(["urgent", "SO1-1", "on"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Marked SO1-1 urgent."));
    get_lotflow_cmd(&temp_dir)
        .args(["remark", "SO1-1", "customer", "chasing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Remark on SO1-1: customer chasing"));
    get_lotflow_cmd(&temp_dir).args(["assign", "1", "semi-qc", "8"]).assert().success();

    let rows = json_output(&temp_dir, &["search", "urgent", "stage=semi-qc", "--json"]);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["flags"]["remark"], "customer chasing");

    get_lotflow_cmd(&temp_dir)
        .args(["urgent"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SO1-1  customer chasing"))
        .stdout(predicate::str::contains("SO1-2").not());

    get_lotflow_cmd(&temp_dir)
        .args(["urgent", "  ", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Lot key cannot be empty"));
}

#[test]
fn test_search_dates_and_errors() {
    let (temp_dir, _guard) = setup_test_env();
    get_lotflow_cmd(&temp_dir)
        .args(["add", "SO1", "1", "--qty", "4", "--date", "14/03/2026"])
        .assert()
        .success();
    get_lotflow_cmd(&temp_dir)
        .args(["add", "SO1", "2", "--qty", "4", "--date", "HOLD"])
        .assert()
        .success();

    let rows = json_output(&temp_dir, &["search", "entered=2026-03", "--json"]);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["unique_code"], "SO1-1");

    let all = json_output(&temp_dir, &["search", "--json"]);
    assert_eq!(all.as_array().unwrap().len(), 2);

    get_lotflow_cmd(&temp_dir)
        .args(["search", "colour=red"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Filter parse error"));

    get_lotflow_cmd(&temp_dir)
        .args(["search", "stage=tpi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No lots found."));
}

#[test]
fn test_stages_and_summary() {
    let (temp_dir, _guard) = setup_test_env();

    get_lotflow_cmd(&temp_dir)
        .args(["stages"])
        .assert()
        .success()
        .stdout(predicate::str::contains("assembly-d"))
        .stdout(predicate::str::contains("(terminal)"));

    add_lot(&temp_dir, "SO1", "1", "8");
    let summary = json_output(&temp_dir, &["summary", "--json"]);
    let summary = summary.as_array().unwrap();
    assert_eq!(summary.len(), 17);
    assert_eq!(summary[0]["stage"], "planning");
    assert_eq!(summary[0]["pending_qty"], 8);
}

#[test]
fn test_relative_data_location_resolves_against_rc_dir() {
    let (temp_dir, _guard) = setup_test_env();
    fs::write(temp_dir.path().join(".lotflow").join("rc"), "data.location=db/ledger.db\n").unwrap();

    add_lot(&temp_dir, "SO1", "1", "2");
    assert!(temp_dir.path().join(".lotflow").join("db").join("ledger.db").exists());
}
