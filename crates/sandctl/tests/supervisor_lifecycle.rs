//! End-to-end sandbox lifecycle against real child processes.

#![cfg(unix)]

use sandctl::state::{RunMode, StateStore};
use sandctl::supervisor::{LaunchSpec, StartOutcome, StopOutcome, Supervisor};
use sandctl::{NativeProcessTree, SandctlError};
use std::time::Duration;
use tempfile::TempDir;

fn supervisor() -> (TempDir, Supervisor<NativeProcessTree>) {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path().join("runtime.toml"));
    (temp, Supervisor::native(store))
}

fn shell(name: &str, script: &str) -> LaunchSpec {
    LaunchSpec::new("sh", name).args(["-c", script])
}

#[tokio::test]
async fn test_detached_start_records_and_stop_clears() {
    let (_temp, supervisor) = supervisor();

    let outcome = supervisor
        .start(LaunchSpec::new("sleep", "box1").args(["30"]).detach(true))
        .await
        .unwrap();

    let StartOutcome::Detached(handle) = outcome else {
        panic!("expected a detached start");
    };
    assert!(handle.detached);

    let state = supervisor.store().read().unwrap();
    assert_eq!(state.running_name, "box1");
    assert_eq!(state.running_pid, handle.pid);
    assert_eq!(state.mode, RunMode::Dev);

    let StopOutcome::Stopped { name, pid, report } = supervisor.stop_current().unwrap() else {
        panic!("expected the sandbox to be stopped");
    };
    assert_eq!(name, "box1");
    assert_eq!(pid, handle.pid);
    assert_eq!(*report.attempted.last().unwrap(), handle.pid);

    let state = supervisor.store().read().unwrap();
    assert_eq!(state.running_name, "");
    assert_eq!(state.running_pid, 0);
}

#[tokio::test]
async fn test_second_start_is_rejected_while_running() {
    let (_temp, supervisor) = supervisor();

    supervisor
        .start(LaunchSpec::new("sleep", "box1").args(["30"]).detach(true))
        .await
        .unwrap();
    let before = supervisor.store().read().unwrap();

    let err = supervisor
        .start(LaunchSpec::new("sleep", "box2").args(["30"]).detach(true))
        .await
        .unwrap_err();

    assert!(matches!(err, SandctlError::AlreadyRunning { ref name } if name == "box1"));
    assert_eq!(supervisor.store().read().unwrap(), before);

    supervisor.stop_current().unwrap();
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (_temp, supervisor) = supervisor();

    supervisor
        .start(LaunchSpec::new("sleep", "box1").args(["30"]).detach(true))
        .await
        .unwrap();

    assert!(matches!(supervisor.stop_current().unwrap(), StopOutcome::Stopped { .. }));
    assert_eq!(supervisor.stop_current().unwrap(), StopOutcome::NothingRunning);
}

#[tokio::test]
async fn test_attached_natural_exit_clears_state() {
    let (_temp, supervisor) = supervisor();

    let outcome = supervisor
        .start_with_interrupt(shell("box1", "exit 3"), std::future::pending())
        .await
        .unwrap();

    match outcome {
        StartOutcome::Exited {
            code, interrupted, ..
        } => {
            assert_eq!(code, Some(3));
            assert!(!interrupted);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!supervisor.store().read().unwrap().is_active());
}

#[tokio::test]
async fn test_interrupt_clears_state_and_lets_process_finish() {
    let (_temp, supervisor) = supervisor();

    let interrupt = tokio::time::sleep(Duration::from_millis(200));
    let outcome = supervisor
        .start_with_interrupt(shell("box1", "sleep 1; exit 0"), interrupt)
        .await
        .unwrap();

    match outcome {
        StartOutcome::Exited {
            code, interrupted, ..
        } => {
            // Exit code 0 shows the process was not killed.
            assert_eq!(code, Some(0));
            assert!(interrupted);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!supervisor.store().read().unwrap().is_active());
}

#[tokio::test]
async fn test_attached_run_is_recorded_while_running() {
    let (_temp, supervisor) = supervisor();
    let store = supervisor.store().clone();

    let observed = async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let state = store.read().unwrap();
        assert_eq!(state.running_name, "box1");
        assert_ne!(state.running_pid, 0);
        std::future::pending::<()>().await;
    };

    let outcome = supervisor
        .start_with_interrupt(shell("box1", "sleep 1"), observed)
        .await
        .unwrap();
    assert!(matches!(outcome, StartOutcome::Exited { interrupted: false, .. }));
}
