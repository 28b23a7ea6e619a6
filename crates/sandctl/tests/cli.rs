//! Runs the sandctl binary against a throwaway home directory.

use chrono::{Duration, Utc};
use sandctl::state::{StateStore, VersionNotice};
use std::process::{Command, Output};
use tempfile::TempDir;

fn sandctl(home: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sandctl"))
        .args(args)
        .env("SANDCTL_HOME", home.path())
        .env_remove("SANDCTL_CONFIG")
        .env_remove("SANDCTL_MANIFEST_URL")
        .env_remove("SANDCTL_REMOTE_URL")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_missing_explicit_config_fails() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("nope.toml");

    let output = sandctl(&home, &["--config", missing.to_str().unwrap(), "sandbox", "status"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "{stderr}");
    assert!(stderr.contains("Failed to read config file"), "{stderr}");
}

#[test]
fn test_latest_without_manifest_clears_stale_reminder() {
    let home = TempDir::new().unwrap();
    let store = StateStore::new(home.path().join("runtime.toml"));
    let version = env!("CARGO_PKG_VERSION");

    store
        .record_version_check(version, Utc::now() - Duration::days(45))
        .unwrap();
    assert!(matches!(
        store.check_version(version, Utc::now()).unwrap(),
        Some(VersionNotice::StaleCheck { .. })
    ));

    let output = sandctl(&home, &["latest"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(store.check_version(version, Utc::now()).unwrap(), None);
}
