//! Tests for the factgraph binary: exit codes and output contract.

use std::path::PathBuf;
use std::process::Command;

use factgraph::aggregate::FactGraph;
use tempfile::TempDir;

fn sample_app() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata/sample-app")
}

fn factgraph() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_factgraph"));
    cmd.env_remove("FACTGRAPH_LOG");
    cmd
}

#[test]
fn test_scan_writes_json_to_stdout() {
    let output = factgraph()
        .arg("scan")
        .arg(sample_app())
        .output()
        .expect("binary should run");
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.ends_with("}\n"));
    let graph: FactGraph = serde_json::from_str(&stdout).expect("stdout should be the graph");
    assert!(graph.db_models.contains(&"Product".to_string()));
}

#[test]
fn test_scan_writes_json_to_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("graph.json");
    let status = factgraph()
        .args(["scan", "--limit", "1", "--output"])
        .arg(&out)
        .arg(sample_app())
        .status()
        .expect("binary should run");
    assert_eq!(status.code(), Some(0));

    let graph: FactGraph = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(graph.db_models, vec!["Category".to_string()]);
}

#[test]
fn test_missing_root_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let output = factgraph()
        .arg("scan")
        .arg(dir.path().join("does-not-exist"))
        .output()
        .expect("binary should run");
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}

#[test]
fn test_unwritable_output_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let status = factgraph()
        .arg("scan")
        .arg(sample_app())
        .arg("--output")
        .arg(dir.path())
        .status()
        .expect("binary should run");
    assert_eq!(status.code(), Some(2));
}

#[test]
fn test_init_writes_default_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("factgraph.yaml");
    let status = factgraph()
        .args(["init", "--output"])
        .arg(&path)
        .status()
        .expect("binary should run");
    assert_eq!(status.code(), Some(0));
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("association_conflicts: last_wins"));
}
