//! Lookup of the newest published sandctl release.
//!
//! The release manifest is a JSON document with a top-level `version`
//! field. Refreshing stores the result in the persisted state, which is what
//! the periodic version reminder reads.

use crate::error::{Result, SandctlError};
use crate::state::{PersistedState, StateStore, is_newer_version};
use crate::task::client::ensure_success;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ReleaseManifest {
    version: String,
}

/// Result of a version refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestVersion {
    pub current: String,
    pub latest: String,
}

impl LatestVersion {
    pub fn is_upgrade_available(&self) -> bool {
        is_newer_version(&self.latest, &self.current)
    }
}

/// Fetch the newest version from the release manifest at `url`
pub async fn fetch_latest_version(client: &reqwest::Client, url: &str) -> Result<String> {
    debug!("Fetching release manifest from {}", url);
    let response = ensure_success(client.get(url).send().await?).await?;
    parse_manifest(&response.text().await?)
}

/// Record `latest` as the newest known version, checked at `now`
pub fn record_latest(store: &StateStore, current: &str, latest: &str, now: DateTime<Utc>) -> Result<LatestVersion> {
    let state: PersistedState = store.record_version_check(latest, now)?;
    info!("Latest sandctl version is {} (running {})", state.latest_version, current);

    Ok(LatestVersion {
        current: current.to_string(),
        latest: state.latest_version,
    })
}

fn parse_manifest(body: &str) -> Result<String> {
    let manifest: ReleaseManifest = serde_json::from_str(body)
        .map_err(|e| SandctlError::parse(format!("invalid release manifest: {}", e)))?;

    let version = manifest.version.trim();
    if version.is_empty() {
        return Err(SandctlError::parse("release manifest has an empty version"));
    }
    Ok(version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::VersionNotice;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_parse_manifest() {
        let body = r#"{"version":"2.4.0","homepage":"https://example.com","license":"MIT"}"#;
        assert_eq!(parse_manifest(body).unwrap(), "2.4.0");

        assert!(matches!(parse_manifest(r#"{"version":" "}"#), Err(SandctlError::Parse(_))));
        assert!(matches!(parse_manifest("<html>"), Err(SandctlError::Parse(_))));
    }

    #[test]
    fn test_record_latest_feeds_reminder() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("runtime.toml"));
        let seeded = Utc::now() - Duration::days(40);
        store.check_version("1.0.0", seeded).unwrap();

        let now = Utc::now();
        let latest = record_latest(&store, "1.0.0", "1.2.0", now).unwrap();
        assert!(latest.is_upgrade_available());

        assert_eq!(
            store.check_version("1.0.0", now).unwrap(),
            Some(VersionNotice::NewerAvailable {
                version: "1.2.0".to_string()
            })
        );

        record_latest(&store, "1.2.0", "1.2.0", now).unwrap();
        assert_eq!(store.check_version("1.2.0", now).unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_from_unreachable_host_is_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}/manifest.json", port);

        let err = fetch_latest_version(&reqwest::Client::new(), &url).await.unwrap_err();
        assert!(err.is_transport());
    }
}
