// Integration tests for the `leadsync` binary.
// Run with: cargo test -p leadsync-cli --test cli_commands

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const CREDENTIAL_VARS: [&str; 7] = [
    "ZOHO_CLIENT_ID",
    "ZOHO_CLIENT_SECRET",
    "ZOHO_REFRESH_TOKEN",
    "ZOHO_REGION",
    "NEXT_PUBLIC_SUPABASE_URL",
    "SUPABASE_SERVICE_ROLE_KEY",
    "MARKETING_ROI_ENV_PATH",
];

/// Run from an empty directory with no credentials in the environment.
fn leadsync(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_leadsync"));
    cmd.current_dir(dir);
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../recon/tests/fixtures").join(name)
}

fn snapshot_args() -> Vec<String> {
    vec![
        "--source-snapshot".into(),
        fixture("source.json").display().to_string(),
        "--target-snapshot".into(),
        fixture("target.json").display().to_string(),
    ]
}

fn assert_exit(output: &Output, code: i32) {
    assert_eq!(
        output.status.code(),
        Some(code),
        "expected exit {}, got {:?}\nstderr: {}",
        code,
        output.status.code(),
        String::from_utf8_lossy(&output.stderr),
    );
}

// ── Credentials and configuration ──────────────────────────────────

#[test]
fn missing_crm_credentials_exits_50() {
    let dir = tempfile::tempdir().unwrap();
    let output = leadsync(dir.path()).arg("reconcile").output().expect("failed to run leadsync");

    assert_exit(&output, 50);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing Zoho credentials"), "stderr: {}", stderr);
    assert!(stderr.contains("hint:"), "stderr: {}", stderr);
}

#[test]
fn missing_store_credentials_exits_60() {
    let dir = tempfile::tempdir().unwrap();
    let output = leadsync(dir.path())
        .args(["reconcile", "--source-snapshot"])
        .arg(fixture("source.json"))
        .output()
        .expect("failed to run leadsync");

    assert_exit(&output, 60);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing lead store credentials"), "stderr: {}", stderr);
}

#[test]
fn credentials_from_local_env_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".env.local"),
        "NEXT_PUBLIC_SUPABASE_URL=not-a-url\nSUPABASE_SERVICE_ROLE_KEY=k\n",
    )
    .unwrap();
    let output = leadsync(dir.path())
        .args(["reconcile", "--source-snapshot"])
        .arg(fixture("source.json"))
        .output()
        .expect("failed to run leadsync");

    // the URL from .env.local was picked up and rejected
    assert_exit(&output, 60);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid NEXT_PUBLIC_SUPABASE_URL"), "stderr: {}", stderr);
}

#[test]
fn missing_env_file_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let output = leadsync(dir.path())
        .args(["reconcile", "--env-file", "nope.env"])
        .output()
        .expect("failed to run leadsync");
    assert_exit(&output, 2);
}

#[test]
fn bad_settings_file_exits_4() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("leadsync.toml"), "[source]\npage_size = 0\n").unwrap();
    let output = leadsync(dir.path())
        .arg("reconcile")
        .args(snapshot_args())
        .output()
        .expect("failed to run leadsync");

    assert_exit(&output, 4);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("page_size"), "stderr: {}", stderr);
}

// ── reconcile ──────────────────────────────────────────────────────

#[test]
fn reconcile_snapshots_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = leadsync(dir.path())
        .args(["reconcile", "--json"])
        .args(snapshot_args())
        .output()
        .expect("failed to run leadsync");

    assert_exit(&output, 0);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let v: serde_json::Value = serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("invalid JSON: {}\nstdout: {}", e, stdout));

    assert!(v["generated_at"].is_string());
    assert_eq!(v["summary"]["source_count"], 5);
    assert_eq!(v["summary"]["target_count"], 5);
    assert_eq!(v["summary"]["matched_count"], 4);
    assert_eq!(v["summary"]["status_diff_count"], 3);
    assert_eq!(v["matches"].as_array().unwrap().len(), 5);
    assert_eq!(v["unmatched_source"][0]["id"], "z-104");
    assert_eq!(v["unmatched_target"][0]["id"], "s-5");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("reconciliation: 5 source, 5 target"), "stderr: {}", stderr);
}

#[test]
fn reconcile_writes_report_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = leadsync(dir.path())
        .args(["reconcile", "--output", "report.json"])
        .args(snapshot_args())
        .output()
        .expect("failed to run leadsync");

    assert_exit(&output, 0);
    assert!(output.stdout.is_empty(), "stdout must stay empty without --json");
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("report.json")).unwrap())
            .unwrap();
    assert_eq!(report["summary"]["matched_count"], 4);
}

#[test]
fn reconcile_against_live_store() {
    use httpmock::prelude::*;

    let server = MockServer::start();
    let leads = server.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/leads")
            .header("apikey", "svc")
            .query_param("deleted_at", "is.null");
        then.status(200).json_body(serde_json::json!([
            {"id": "s-1", "name": "Dana L.", "phone": "0501234567", "status": "contacted",
             "created_at": "2026-01-12T08:05:00Z", "custom_fields": {}}
        ]));
    });

    let dir = tempfile::tempdir().unwrap();
    let output = leadsync(dir.path())
        .args(["reconcile", "--target", "prod", "--json", "--source-snapshot"])
        .arg(fixture("source.json"))
        .env("NEXT_PUBLIC_SUPABASE_URL", server.base_url())
        .env("SUPABASE_SERVICE_ROLE_KEY", "svc")
        .output()
        .expect("failed to run leadsync");

    assert_exit(&output, 0);
    leads.assert();
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["summary"]["target_count"], 1);
    assert_eq!(v["summary"]["matched_count"], 1);
    assert_eq!(v["matches"][0]["match_type"], "phone");
}

// ── sync ───────────────────────────────────────────────────────────

#[test]
fn live_sync_with_snapshots_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let output = leadsync(dir.path())
        .args(["sync", "--force"])
        .args(snapshot_args())
        .output()
        .expect("failed to run leadsync");
    assert_exit(&output, 2);
}

#[test]
fn dry_run_sync_from_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let output = leadsync(dir.path())
        .args(["sync", "--dry-run", "--output", "sync.json"])
        .args(snapshot_args())
        .output()
        .expect("failed to run leadsync");

    assert_exit(&output, 0);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pending updates: 2"), "stderr: {}", stderr);
    assert!(stderr.contains("contacted -> meeting_set"), "stderr: {}", stderr);
    assert!(stderr.contains("notes: Prefers mornings"), "stderr: {}", stderr);
    assert!(stderr.contains("z-103 Rivka Shapiro: 'follow_up'"), "stderr: {}", stderr);
    assert!(stderr.contains("dry run: 2 attempted, 2 succeeded, 0 failed"), "stderr: {}", stderr);

    let log: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("sync.json")).unwrap())
            .unwrap();
    assert_eq!(log["result"]["success"], true);
    assert_eq!(log["updates"].as_array().unwrap().len(), 2);
}

#[test]
fn empty_source_exits_71() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("empty.json"), "[]").unwrap();
    let output = leadsync(dir.path())
        .args(["sync", "--dry-run", "--source-snapshot", "empty.json", "--target-snapshot"])
        .arg(fixture("target.json"))
        .output()
        .expect("failed to run leadsync");
    assert_exit(&output, 71);
}

// ── migrate-statuses ───────────────────────────────────────────────

#[test]
fn migrate_statuses_against_live_store() {
    use httpmock::prelude::*;

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rest/v1/dev_leads");
        then.status(200).json_body(serde_json::json!([
            {"id": "a", "name": "A", "status": "new"},
            {"id": "b", "name": "B", "status": "signed"},
            {"id": "c", "name": "C", "status": "lost"}
        ]));
    });
    let to_not_contacted = server.mock(|when, then| {
        when.method(PATCH)
            .path("/rest/v1/dev_leads")
            .query_param("id", "eq.a")
            .json_body(serde_json::json!({"status": "not_contacted"}));
        then.status(204);
    });
    let to_not_relevant = server.mock(|when, then| {
        when.method(PATCH)
            .path("/rest/v1/dev_leads")
            .query_param("id", "eq.c")
            .json_body(serde_json::json!({"status": "not_relevant"}));
        then.status(204);
    });

    let dir = tempfile::tempdir().unwrap();
    let run = |dry_run: bool| {
        let mut cmd = leadsync(dir.path());
        cmd.arg("migrate-statuses")
            .env("NEXT_PUBLIC_SUPABASE_URL", server.base_url())
            .env("SUPABASE_SERVICE_ROLE_KEY", "svc");
        if dry_run {
            cmd.arg("--dry-run");
        }
        cmd.output().expect("failed to run leadsync")
    };

    let dry = run(true);
    assert_exit(&dry, 0);
    let stderr = String::from_utf8_lossy(&dry.stderr);
    assert!(stderr.contains("legacy statuses in dev_leads: 2"), "stderr: {}", stderr);
    to_not_contacted.assert_hits(0);

    let live = run(false);
    assert_exit(&live, 0);
    to_not_contacted.assert_hits(1);
    to_not_relevant.assert_hits(1);
}

// ── phone ──────────────────────────────────────────────────────────

#[test]
fn phone_prints_normalized_and_variants() {
    let dir = tempfile::tempdir().unwrap();
    let output = leadsync(dir.path())
        .args(["phone", "+972-50-123-4567", "12"])
        .output()
        .expect("failed to run leadsync");

    assert_exit(&output, 0);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "+972-50-123-4567\t0501234567\t0501234567,972501234567,+972501234567,050-123-4567",
            "12\t-\t",
        ]
    );
}

#[test]
fn phone_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = leadsync(dir.path())
        .args(["phone", "501234567", "--json"])
        .output()
        .expect("failed to run leadsync");

    assert_exit(&output, 0);
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v[0]["normalized"], "0501234567");
    assert_eq!(v[0]["variants"][3], "050-123-4567");
}
