use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn bronze_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_bronze"))
}

fn run_cli(home: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new(bronze_bin());
    cmd.args(args)
        .env("BRONZE_HOME", home)
        .env("RUST_LOG", "error")
        .env_remove("BRONZE_STORE")
        .env_remove("BRONZE_NAMESPACE");
    cmd.output().expect("failed to execute bronze CLI")
}

fn parse_json_output(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json_start = stdout
        .find(|c| c == '{' || c == '[')
        .unwrap_or_else(|| {
            panic!(
                "no JSON payload found in output\nstdout:\n{}\nstderr:\n{}",
                stdout,
                String::from_utf8_lossy(&output.stderr)
            )
        });
    let mut deserializer = serde_json::Deserializer::from_str(&stdout[json_start..]);
    serde_json::Value::deserialize(&mut deserializer).unwrap_or_else(|err| {
        panic!(
            "failed to parse JSON output: {}\nstdout:\n{}\nstderr:\n{}",
            err,
            stdout,
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

/// Workspace with a config pointing at a store under `lake/`.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(sources_toml: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let config = format!(
            "[store]\npath = \"lake/bronze.duckdb\"\n\n[run]\nconcurrency = 2\n{}",
            sources_toml
        );
        fs::write(dir.path().join("bronze.toml"), config).unwrap();
        Self { dir }
    }

    fn write(&self, name: &str, content: &str) {
        fs::write(self.dir.path().join(name), content).unwrap();
    }

    fn config(&self) -> String {
        self.dir.path().join("bronze.toml").display().to_string()
    }

    fn home(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    fn run(&self, args: &[&str]) -> Output {
        let config = self.config();
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["--config", config.as_str()]);
        run_cli(&self.home(), &full)
    }
}

const TWO_FILES: &str = r#"
[[sources]]
id = "customers"
kind = "file"
location = "customers.csv"

[[sources]]
id = "user_events"
kind = "file"
location = "user_events.csv"
"#;

#[test]
fn test_run_json_then_tables_and_query() {
    let fx = Fixture::new(TWO_FILES);
    fx.write("customers.csv", "id,name\n1,A\n2,B\n");
    fx.write(
        "user_events.csv",
        "id,event,event_timestamp\n1,login,2024-03-01 10:00:00\n",
    );

    let output = fx.run(&["run", "--json"]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let summary = parse_json_output(&output);
    assert_eq!(summary["status"], "succeeded");
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["outcomes"][0]["source_id"], "customers");
    assert_eq!(summary["outcomes"][0]["rows_loaded"], 2);
    assert_eq!(summary["outcomes"][0]["action"], "created");
    assert_eq!(summary["outcomes"][1]["rows_loaded"], 1);
    assert!(fx.dir.path().join("lake/bronze.duckdb").exists());

    let output = fx.run(&["tables", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let tables = parse_json_output(&output);
    let names: Vec<&str> = tables
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["table"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["customers", "user_events"]);
    assert_eq!(tables[0]["rows"], 2);

    let output = fx.run(&[
        "query",
        "SELECT id, name, source_tag FROM bronze.customers ORDER BY id",
        "--json",
        "--limit",
        "1",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let result = parse_json_output(&output);
    assert_eq!(result["columns"][2], "source_tag");
    assert_eq!(result["rows"][0][0], 1);
    assert_eq!(result["rows"][0][1], "A");
    assert_eq!(result["rows"][0][2], "file.customers");
    assert_eq!(result["truncated"], true);
}

#[test]
fn test_failed_source_exits_with_partial_failure() {
    let fx = Fixture::new(TWO_FILES);
    fx.write("customers.csv", "id\n1\n");

    let output = fx.run(&["run", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let summary = parse_json_output(&output);
    assert_eq!(summary["status"], "partially_failed");
    assert_eq!(summary["outcomes"][0]["status"], "succeeded");
    assert_eq!(summary["outcomes"][1]["status"], "failed");
    assert_eq!(summary["outcomes"][1]["error_kind"], "source_unavailable");
}

#[test]
fn test_only_restricts_the_run() {
    let fx = Fixture::new(TWO_FILES);
    fx.write("customers.csv", "id\n1\n");

    let output = fx.run(&["run", "--json", "--only", "customers"]);
    assert_eq!(output.status.code(), Some(0));
    let summary = parse_json_output(&output);
    assert_eq!(summary["total"], 1);

    let output = fx.run(&["run", "--only", "nope"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope"));
}

#[test]
fn test_missing_config_exits_with_failure_and_suggestions() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml").display().to_string();

    let output = run_cli(&dir.path().join("home"), &["run", "--config", &missing]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Config file not found"));
    assert!(stderr.contains("TRY:"));
}

#[test]
fn test_empty_source_list_is_orchestrator_failure() {
    let fx = Fixture::new("");

    let output = fx.run(&["run", "--json"]);
    assert_eq!(output.status.code(), Some(2));
    let error = parse_json_output(&output);
    assert_eq!(error["status"], "error");
}

#[test]
fn test_tables_without_store_points_at_run() {
    let fx = Fixture::new(TWO_FILES);

    let output = fx.run(&["tables"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Landing store not found"));
    assert!(stderr.contains("bronze run"));
}
