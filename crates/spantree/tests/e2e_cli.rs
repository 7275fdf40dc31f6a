use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_spantree")
}

const INHERITED_ENV: &[&str] = &[
    "SPANTREE_BAR_WIDTH",
    "SPANTREE_INDENT_WIDTH",
    "SPANTREE_MAX_SPANS",
    "SPANTREE_SLOW_SPAN",
    "SPANTREE_LOG_FORMAT",
    "RUST_LOG",
];

/// A `spantree` invocation isolated from the caller's shell configuration.
fn command(args: &[&str], config_dir: &Path) -> Command {
    let mut cmd = Command::new(bin());
    cmd.args(args)
        .env("SPANTREE_CONFIG", config_dir.join("config.toml"))
        .env("SPANTREE_COLOR", "never");
    for key in INHERITED_ENV {
        cmd.env_remove(key);
    }
    cmd
}

fn run(args: &[&str], config_dir: &Path) -> Output {
    command(args, config_dir).output().unwrap()
}

fn run_with_env(args: &[&str], config_dir: &Path, env: &[(&str, &str)]) -> Output {
    let mut cmd = command(args, config_dir);
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.output().unwrap()
}

fn write_event(dir: &Path, body: &str) -> String {
    let path = dir.join("event.json");
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn show_prints_tree_in_display_order() {
    let temp = tempfile::tempdir().unwrap();
    let event = write_event(temp.path(), &testkit::sample_event_json());

    let out = run(&["show", &event], temp.path());
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let text = stdout(&out);
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with(&format!("TRACE {}", testkit::TRACE_ID)));
    assert!(lines[0].contains("spans=5"));
    assert!(lines[1].contains("http.server - /checkout"));
    assert!(lines[2].contains("  http.handler - POST /checkout"));
    assert!(lines[3].contains("    db.query"));
    assert!(lines[4].contains("    cache.get"));
    assert!(lines[5].contains("  serialize"));
}

#[test]
fn show_filters_and_reports_hidden_spans() {
    let temp = tempfile::tempdir().unwrap();
    let event = write_event(temp.path(), &testkit::sample_event_json());

    let out = run(&["show", &event, "--query", "ORDERS"], temp.path());
    assert!(out.status.success());

    let text = stdout(&out);
    assert!(text.contains("matched=1 hidden=2"), "{text}");
    assert!(text.contains("db.query"));
    assert!(!text.contains("cache.get"));
    assert!(text.contains("2 spans filtered out"), "{text}");
}

#[test]
fn show_json_includes_rows_and_filter() {
    let temp = tempfile::tempdir().unwrap();
    let event = write_event(temp.path(), &testkit::sample_event_json());

    let out = run(
        &["--json", "show", &event, "--where", "peer=redis:*", "--collapse", "c000000000000000"],
        temp.path(),
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["trace"]["trace_id"], testkit::TRACE_ID);
    assert_eq!(value["filter"]["active"], true);
    assert_eq!(value["filter"]["matched"].as_array().unwrap().len(), 1);

    let rows = value["rows"].as_array().unwrap();
    let kinds: Vec<&str> = rows.iter().map(|r| r["kind"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["span", "span", "filtered", "span", "filtered"]);
    assert_eq!(rows[3]["matched"], true);
}

#[test]
fn show_reads_stdin() {
    let temp = tempfile::tempdir().unwrap();
    let mut child = command(&["check", "-"], temp.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(testkit::sample_event_json().as_bytes())
        .unwrap();
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success());
    assert!(stdout(&out).starts_with(&format!("OK trace={} spans=5 depth=2", testkit::TRACE_ID)));
}

#[test]
fn check_rejects_duplicate_span_ids() {
    let temp = tempfile::tempdir().unwrap();
    let event = write_event(
        temp.path(),
        r#"[{"span_id": "1", "start_timestamp": 0, "timestamp": 1},
            {"span_id": "1", "start_timestamp": 0, "timestamp": 1}]"#,
    );

    let out = run(&["check", &event], temp.path());
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("duplicate span id: 1"));
}

#[test]
fn check_rejects_parent_cycles() {
    let temp = tempfile::tempdir().unwrap();
    let event = write_event(
        temp.path(),
        r#"[{"span_id": "1", "parent_span_id": "1", "start_timestamp": 0, "timestamp": 1}]"#,
    );

    let out = run(&["check", &event], temp.path());
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("span 1 is its own ancestor"));
}

#[test]
fn config_file_limits_span_count() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("config.toml"), "max_spans = 2\n").unwrap();
    let event = write_event(temp.path(), &testkit::sample_event_json());

    let out = run(&["check", &event], temp.path());
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("limit is 2"));

    let out = run(&["--max-spans", "10", "check", &event], temp.path());
    assert!(out.status.success());
}

#[test]
fn unknown_collapse_id_fails() {
    let temp = tempfile::tempdir().unwrap();
    let event = write_event(temp.path(), &testkit::sample_event_json());

    let out = run(&["show", &event, "--collapse", "nope"], temp.path());
    assert!(!out.status.success());
}

#[test]
fn environment_overrides_config_file() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("config.toml"), "max_spans = 100\n").unwrap();
    let event = write_event(temp.path(), &testkit::sample_event_json());

    let out = run(&["check", &event], temp.path());
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = run_with_env(&["check", &event], temp.path(), &[("SPANTREE_MAX_SPANS", "1")]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("limit is 1"));
}

#[test]
fn malformed_environment_value_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let event = write_event(temp.path(), &testkit::sample_event_json());

    let out = run_with_env(&["check", &event], temp.path(), &[("SPANTREE_MAX_SPANS", "abc")]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("bad SPANTREE_MAX_SPANS in environment"), "{stderr}");
}
