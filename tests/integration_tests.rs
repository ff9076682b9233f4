//! Integration tests for the flowcheck CLI.
//!
//! These exercise the binary surface end to end. No test talks to a real
//! backend: the "backend" is either absent or an unroutable localhost
//! address, so remote steps fail fast at the transport layer.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a flowcheck Command with an isolated cache file and no
/// ambient configuration leaking in from the host.
fn flowcheck(cache_dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("flowcheck");
    cmd.current_dir(cache_dir.path())
        .env_remove("FLOWCHECK_BACKEND_URL")
        .env_remove("FLOWCHECK_BACKEND_KEY")
        .env(
            "FLOWCHECK_CACHE_FILE",
            cache_dir.path().join("recent_runs.json"),
        );
    cmd
}

/// Point the command at a backend nothing listens on.
fn with_dead_backend(cmd: &mut Command) -> &mut Command {
    cmd.env("FLOWCHECK_BACKEND_URL", "http://127.0.0.1:9")
        .env("FLOWCHECK_BACKEND_KEY", "test-key")
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = TempDir::new().unwrap();
        flowcheck(&dir).arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        flowcheck(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_run_requires_backend_configuration() {
        let dir = TempDir::new().unwrap();
        flowcheck(&dir)
            .args(["run", "Microsoft"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No backend configured"));
    }
}

mod validation {
    use super::*;

    #[test]
    fn test_empty_competitor_is_rejected_before_any_call() {
        let dir = TempDir::new().unwrap();
        let mut cmd = flowcheck(&dir);
        with_dead_backend(&mut cmd)
            .args(["run", "   "])
            .assert()
            .failure()
            .stderr(predicate::str::contains("competitor name must not be empty"));
        // Nothing was recorded: the run never started.
        assert!(!dir.path().join("recent_runs.json").exists());
    }
}

mod run_and_history {
    use super::*;

    #[test]
    fn test_failed_run_still_completes_and_is_recorded() {
        let dir = TempDir::new().unwrap();

        // Auth fails at the transport layer, so the run aborts at step one
        // but still prints a summary and records locally.
        let mut cmd = flowcheck(&dir);
        with_dead_backend(&mut cmd)
            .args(["run", "Microsoft"])
            .assert()
            .success()
            .stdout(predicate::str::contains("steps passed"))
            .stdout(predicate::str::contains("Session & user"));

        assert!(dir.path().join("recent_runs.json").exists());

        // The local history now shows the failed run.
        flowcheck(&dir)
            .args(["history"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Microsoft"));
    }

    #[test]
    fn test_history_with_no_runs_prints_hint() {
        let dir = TempDir::new().unwrap();
        flowcheck(&dir)
            .args(["history"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No recorded runs yet"));
    }
}

mod diagnostics {
    use super::*;

    #[test]
    fn test_report_with_no_runs_prints_hint() {
        let dir = TempDir::new().unwrap();
        flowcheck(&dir)
            .args(["report"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No recorded runs yet"));
    }

    #[test]
    fn test_report_after_failed_run_emits_json() {
        let dir = TempDir::new().unwrap();
        let mut cmd = flowcheck(&dir);
        with_dead_backend(&mut cmd)
            .args(["run", "Microsoft"])
            .assert()
            .success();

        flowcheck(&dir)
            .args(["report"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"summary\""))
            .stdout(predicate::str::contains("\"hints\""));
    }

    #[test]
    fn test_fixit_after_failed_run_mentions_failing_step() {
        let dir = TempDir::new().unwrap();
        let mut cmd = flowcheck(&dir);
        with_dead_backend(&mut cmd)
            .args(["run", "Microsoft"])
            .assert()
            .success();

        flowcheck(&dir)
            .args(["fixit"])
            .assert()
            .success()
            .stdout(predicate::str::contains("flow test"))
            .stdout(predicate::str::contains("auth"));
    }
}
