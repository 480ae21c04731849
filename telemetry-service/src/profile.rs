use std::{io::ErrorKind, path::PathBuf};

use meter_client::Profile;

/// Read-through access to the locally persisted user profile.
///
/// Called at alert time only; implementations must not cache across calls so
/// that profile edits apply to the next alert.
#[async_trait::async_trait]
pub trait ProfileSource: Send + Sync {
    async fn load(&self) -> Option<Profile>;
}

/// No profile configured; alerts fall back to an unknown location.
pub struct NoProfile;

#[async_trait::async_trait]
impl ProfileSource for NoProfile {
    async fn load(&self) -> Option<Profile> {
        None
    }
}

/// Profile stored as a JSON document on disk, as written by the settings page.
pub struct JsonFileProfileStore {
    path: PathBuf,
}

impl JsonFileProfileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ProfileSource for JsonFileProfileStore {
    async fn load(&self) -> Option<Profile> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no persisted profile");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "failed to read profile");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "profile is not valid json");
                None
            }
        }
    }
}
