mod common;

use std::fs;

use assert_cmd::Command;
use common::{INSPECTION_EXPORT, TestWorkspace};
use predicates::prelude::*;
use predicates::str::contains;

fn cnq() -> Command {
    Command::cargo_bin("cnq-engine").expect("binary exists")
}

fn export(workspace: &TestWorkspace) -> String {
    workspace
        .write("inspection.csv", INSPECTION_EXPORT)
        .to_str()
        .expect("utf-8 path")
        .to_string()
}

#[test]
fn resolve_lists_resolved_and_missing_fields() {
    let workspace = TestWorkspace::new();
    let input = export(&workspace);
    cnq()
        .args(["resolve", "-i", &input, "--delimiter", ";"])
        .assert()
        .success()
        .stdout(contains("chain"))
        .stdout(contains("IDChaineMontage"))
        .stdout(contains("order-value"));

    cnq()
        .args(["resolve", "-i", &input, "--delimiter", ";", "--missing"])
        .assert()
        .success()
        .stdout(contains("order-value"))
        .stdout(contains("IDChaineMontage").not());
}

#[test]
fn normalize_writes_derived_costs_as_csv() {
    let workspace = TestWorkspace::new();
    let input = export(&workspace);
    let output = workspace.path().join("normalized.csv");
    cnq()
        .args([
            "normalize",
            "-i",
            &input,
            "--delimiter",
            ";",
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("read output");
    let mut lines = contents.lines();
    let header = lines.next().expect("header");
    assert!(header.starts_with("row,date,chain,operation,operation_label"));
    assert!(header.ends_with("cnq,cnq_percentage"));
    let first = lines.next().expect("first record");
    assert!(first.starts_with("1,2023-01-10,CH1,OP1,unknown,C01,Pantalon,Couture,"));
    assert!(first.ends_with(",120,12"));
    let last = contents.lines().last().expect("last record");
    assert!(last.starts_with("4,,CH3,OP3,unknown,C03,unknown,unknown,"));
}

#[test]
fn normalize_applies_filters_and_rework_factor() {
    let workspace = TestWorkspace::new();
    let input = export(&workspace);
    let assert = cnq()
        .args([
            "normalize",
            "-i",
            &input,
            "--delimiter",
            ";",
            "--rework-factor",
            "6",
            "--filter",
            "chain=CH1",
            "--from",
            "2023-02-01",
        ])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf-8");
    let records = stdout.lines().skip(1).collect::<Vec<_>>();
    assert_eq!(records.len(), 1);
    // stdout keeps the input delimiter
    assert!(records[0].starts_with("3;2023-02-05;CH1"));
    // 5 defects × 1h × 20/h × 6
    assert!(records[0].contains(";600;"));
}

#[test]
fn summary_emits_json() {
    let workspace = TestWorkspace::new();
    let input = export(&workspace);
    cnq()
        .args(["summary", "-i", &input, "--delimiter", ";", "--json"])
        .assert()
        .success()
        .stdout(contains("\"percentage_basis\": \"Quantity\""))
        .stdout(contains("\"records\": 4"))
        .stdout(contains("\"total_cnq\": 730.0"))
        .stdout(contains("\"penalty_cost\": 150.0"));
}

#[test]
fn summary_table_uses_config_file() {
    let workspace = TestWorkspace::new();
    let input = export(&workspace);
    let config = workspace.write("cnq.yaml", "penalty_per_note: 10\n");
    cnq()
        .args([
            "summary",
            "-i",
            &input,
            "--delimiter",
            ";",
            "-c",
            config.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("penalty_cost"))
        .stdout(contains("total_cnq").and(contains("600")));
}

#[test]
fn aggregate_sorts_and_keeps_top_groups() {
    let workspace = TestWorkspace::new();
    let input = export(&workspace);
    let assert = cnq()
        .args([
            "aggregate",
            "-i",
            &input,
            "--delimiter",
            ";",
            "-g",
            "chain",
            "-M",
            "cnq:sum,rework-cost:max",
            "--sort",
            "cnq_sum",
            "--top",
            "2",
        ])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf-8");
    let lines = stdout.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("chain"));
    assert!(lines[0].contains("cnq_sum") && lines[0].contains("rework_cost_max"));
    assert!(lines[2].starts_with("CH1") && lines[2].contains("420"));
    assert!(lines[3].starts_with("CH2") && lines[3].contains("250"));
}

#[test]
fn aggregate_exports_csv_by_period() {
    let workspace = TestWorkspace::new();
    let input = export(&workspace);
    let output = workspace.path().join("by_period.csv");
    cnq()
        .args([
            "aggregate",
            "-i",
            &input,
            "--delimiter",
            ";",
            "-g",
            "period",
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();
    let contents = fs::read_to_string(&output).expect("read output");
    assert_eq!(
        contents.lines().collect::<Vec<_>>(),
        vec![
            "period,cnq_sum,records",
            "2023-01,370,2",
            "2023-02,300,1",
            "unknown,60,1",
        ]
    );
}

#[test]
fn options_lists_distinct_values_and_dates() {
    let workspace = TestWorkspace::new();
    let input = export(&workspace);
    cnq()
        .args(["options", "-i", &input, "--delimiter", ";", "-f", "chaine"])
        .assert()
        .success()
        .stdout(contains("CH1").and(contains("CH2")).and(contains("CH3")))
        .stdout(contains("dates: 2023-01-10 .. 2023-02-05"));
}

#[test]
fn unknown_filter_field_fails() {
    let workspace = TestWorkspace::new();
    let input = export(&workspace);
    cnq()
        .args([
            "summary",
            "-i",
            &input,
            "--delimiter",
            ";",
            "--filter",
            "colour=red",
        ])
        .assert()
        .failure()
        .stderr(contains("error:"))
        .stderr(contains("colour"));
}

#[test]
fn non_positive_rework_factor_is_rejected() {
    let workspace = TestWorkspace::new();
    let input = export(&workspace);
    cnq()
        .args([
            "summary",
            "-i",
            &input,
            "--delimiter",
            ";",
            "--rework-factor",
            "0",
        ])
        .assert()
        .failure()
        .stderr(contains("Rework factor must be a positive number"));
}

#[test]
fn inverted_date_range_is_rejected() {
    let workspace = TestWorkspace::new();
    let input = export(&workspace);
    cnq()
        .args([
            "normalize",
            "-i",
            &input,
            "--delimiter",
            ";",
            "--from",
            "2023-03-01",
            "--to",
            "2023-01-01",
        ])
        .assert()
        .failure();
}
