use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

const JANUARY: &str = "\
Date | Description | Amount
2024-01-05 | \"GROCERY STORE\" | -54.32
2024-01-20 | \"PAYROLL\" | 2000.00
";

const JULY_OTP: &str = "\
OTP banka d.d.
IZPIS PROMETA št. 7
EUR 1.000,00 208,54 915,56 1.707,02
11.07.2025 2100901623 SI56023030018888678 915,56 1.915,56 PRILIV NA RAČUN
PLAČA JULIJ
12.07.2025 2100901624 SI56023030018888679 208,54 1.707,02 NAKUP
MERCATOR LJUBLJANA
Stran 1 od 1
";

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        std::fs::create_dir_all(ws.statements()).unwrap();
        ws
    }

    fn statements(&self) -> PathBuf {
        self.dir.path().join("statements")
    }

    fn write_statement(&self, name: &str, content: &str) -> PathBuf {
        let path = self.statements().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("otpledger").unwrap();
        cmd.env("OTPLEDGER_CONFIG_DIR", self.dir.path().join("config"))
            .env("HOME", self.dir.path())
            .env("XDG_DATA_HOME", self.dir.path().join("xdg"))
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    fn init(&self) {
        self.cmd()
            .args(["init", "--grammar", "delimited", "--data-dir"])
            .arg(self.dir.path().join("data"))
            .arg("--statements-dir")
            .arg(self.statements())
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized ledger"));
    }

    fn ingest(&self, path: &Path) -> assert_cmd::assert::Assert {
        self.cmd().arg("ingest").arg(path).assert()
    }
}

#[test]
fn commands_require_init() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["report", "totals"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("otpledger init"));
}

#[test]
fn ingest_then_report_january() {
    let ws = Workspace::new();
    ws.init();
    ws.write_statement("jan.txt", JANUARY);

    ws.ingest(&ws.statements())
        .success()
        .stdout(predicate::str::contains("jan.txt: 2 new, 0 duplicate, 0 conflict"));

    ws.cmd()
        .args(["report", "totals", "--month", "2024-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("€2,000.00"))
        .stdout(predicate::str::contains("€54.32"))
        .stdout(predicate::str::contains("€1,945.68"));

    ws.cmd()
        .args(["report", "monthly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-01"));
}

#[test]
fn reingesting_is_idempotent() {
    let ws = Workspace::new();
    ws.init();
    let path = ws.write_statement("jan.txt", JANUARY);

    ws.ingest(&path).success();
    ws.ingest(&path)
        .success()
        .stdout(predicate::str::contains("0 new, 2 duplicate, 0 conflict"));

    ws.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Transactions:   2"));
}

#[test]
fn ingest_without_paths_uses_statements_dir() {
    let ws = Workspace::new();
    ws.init();
    ws.write_statement("jan.txt", JANUARY);
    ws.cmd()
        .arg("ingest")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 new"));
}

#[test]
fn failed_document_does_not_stop_batch_but_fails_exit() {
    let ws = Workspace::new();
    ws.init();
    ws.write_statement("a_broken.pdf", "%PDF-1.4 not really a pdf");
    ws.write_statement("b_jan.txt", JANUARY);

    ws.ingest(&ws.statements())
        .failure()
        .stdout(predicate::str::contains("a_broken.pdf"))
        .stdout(predicate::str::contains("b_jan.txt: 2 new"))
        .stdout(predicate::str::contains("failed: "))
        .stderr(predicate::str::contains("1 of 2 documents failed"));

    ws.cmd()
        .args(["runs", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("failed"))
        .stdout(predicate::str::contains("completed"));
}

#[test]
fn parse_warnings_are_reported_and_persisted() {
    let ws = Workspace::new();
    ws.init();
    let path = ws.write_statement("bad.txt", "2024-01-05 | COFFEE | abc\n2024-01-06 | TEA | -3.10\n");

    ws.ingest(&path)
        .success()
        .stdout(predicate::str::contains("1 new, 0 duplicate, 0 conflict, 1 warning(s)"))
        .stdout(predicate::str::contains("unparsable amount"));

    ws.cmd()
        .args(["runs", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unparsable amount"));
}

#[test]
fn rules_and_manual_assignment() {
    let ws = Workspace::new();
    ws.init();
    let path = ws.write_statement("jan.txt", JANUARY);

    ws.cmd()
        .args(["rules", "add", "PAYROLL", "--category", "Salary"])
        .assert()
        .success();
    ws.cmd()
        .args(["rules", "add", "(", "--category", "Salary", "--match-type", "regex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid rule pattern"));

    ws.ingest(&path)
        .success()
        .stdout(predicate::str::contains("1 categorized by rule"));

    ws.cmd()
        .args(["assign", "--keyword", "grocery", "--category", "Groceries"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 transaction(s)"));

    ws.cmd()
        .args(["export"])
        .assert()
        .success()
        .stdout(predicate::str::contains("GROCERY STORE,,,Groceries,manual"))
        .stdout(predicate::str::contains("PAYROLL,,,Salary,rule"));

    ws.cmd()
        .args(["report", "categories"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Groceries"));
}

#[test]
fn assign_requires_a_category_or_clear() {
    let ws = Workspace::new();
    ws.init();
    ws.cmd()
        .args(["assign", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--clear"));
}

#[test]
fn dashboard_is_valid_json() {
    let ws = Workspace::new();
    ws.init();
    let path = ws.write_statement("jan.txt", JANUARY);
    ws.ingest(&path).success();

    let output = ws.cmd().args(["dashboard", "--year", "2024"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["totals"]["income"], "2000.00");
    assert_eq!(value["totals"]["expense"], "54.32");
    assert_eq!(value["totals"]["net"], "1945.68");
    assert_eq!(value["totals"]["uncategorized"], 2);
    assert_eq!(value["monthly"][0]["month"], "2024-01");
    assert_eq!(value["transactions"].as_array().unwrap().len(), 2);
}

#[test]
fn from_requires_to() {
    let ws = Workspace::new();
    ws.init();
    ws.cmd()
        .args(["transactions", "--from", "2024-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--from requires --to"));
}

#[test]
fn categories_add_rejects_duplicates() {
    let ws = Workspace::new();
    ws.init();
    ws.cmd()
        .args(["categories", "add", "Travel"])
        .assert()
        .success();
    ws.cmd()
        .args(["categories", "add", "Travel"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    ws.cmd()
        .args(["categories", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Travel"));
}

#[test]
fn otp_statement_edit_is_reported_as_conflict() {
    let ws = Workspace::new();
    ws.init();
    let path = ws.write_statement("julij.txt", JULY_OTP);

    ws.cmd()
        .args(["ingest", "--grammar", "otp"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("julij.txt: 2 new, 0 duplicate, 0 conflict, 0 warning(s)"));

    ws.write_statement("julij.txt", &JULY_OTP.replace("MERCATOR LJUBLJANA", "SPAR MARIBOR"));
    ws.cmd()
        .args(["ingest", "--grammar", "otp"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 new, 1 duplicate, 1 conflict"))
        .stdout(predicate::str::contains("conflicts with stored record (description)"));

    ws.cmd()
        .args(["transactions", "--month", "2025-07"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NAKUP MERCATOR LJUBLJANA"))
        .stdout(predicate::str::contains("SPAR").not());

    ws.cmd()
        .args(["report", "totals", "--year", "2025"])
        .assert()
        .success()
        .stdout(predicate::str::contains("€915.56"))
        .stdout(predicate::str::contains("€208.54"));

    ws.cmd()
        .args(["runs", "show", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 new, 1 duplicate, 1 conflict"))
        .stdout(predicate::str::contains("differs from stored record in description"));
}

#[test]
fn month_and_year_cannot_be_combined() {
    let ws = Workspace::new();
    ws.init();
    ws.cmd()
        .args(["transactions", "--month", "2024-02", "--year", "2023"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}
