//! Durable local node state
//!
//! Role and secret survive restarts of the process through a small JSON
//! file next to the node, independent of the peer directory:
//! `<state_dir>/<environment>.<name>.state`
//!
//! Writes use the atomic pattern:
//! 1. Write to temp file
//! 2. fsync temp file
//! 3. Rename temp to final
//! 4. fsync the state directory
//!
//! The file holds the replication secret and is created owner-readable only.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::RoleMarker;
use crate::errors::{BootstrapError, BootstrapResult};

const STATE_EXTENSION: &str = "state";

/// Durable part of a [`super::LocalNode`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub name: String,
    pub environment: String,
    #[serde(default)]
    pub role: Option<RoleMarker>,
    #[serde(default)]
    pub replication_secret: Option<String>,
    pub version: u64,
    pub saved_at: DateTime<Utc>,
}

impl NodeState {
    pub fn new(
        name: &str,
        environment: &str,
        role: Option<RoleMarker>,
        replication_secret: Option<String>,
        version: u64,
    ) -> Self {
        Self {
            name: name.to_string(),
            environment: environment.to_string(),
            role,
            replication_secret,
            version,
            saved_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeState")
            .field("name", &self.name)
            .field("environment", &self.environment)
            .field("role", &self.role)
            .field(
                "replication_secret",
                &self.replication_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("version", &self.version)
            .field("saved_at", &self.saved_at)
            .finish()
    }
}

/// Reads and writes node state files.
#[derive(Debug, Clone)]
pub struct NodeStateStore {
    state_dir: PathBuf,
}

impl NodeStateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn state_path(&self, environment: &str, name: &str) -> PathBuf {
        self.state_dir
            .join(format!("{}.{}.{}", environment, name, STATE_EXTENSION))
    }

    /// Load saved state, `None` if the node never saved any.
    pub fn load(&self, environment: &str, name: &str) -> BootstrapResult<Option<NodeState>> {
        let path = self.state_path(environment, name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BootstrapError::configuration_error(format!(
                    "failed to read node state {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let state = serde_json::from_str(&content).map_err(|e| {
            BootstrapError::configuration_error(format!(
                "failed to parse node state {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Some(state))
    }

    /// Save state atomically.
    pub fn save(&self, state: &NodeState) -> BootstrapResult<()> {
        let path = self.state_path(&state.environment, &state.name);
        let fail = |what: &str, e: &dyn std::fmt::Display| {
            BootstrapError::configuration_error(format!(
                "failed to {} node state {}: {}",
                what,
                path.display(),
                e
            ))
        };

        fs::create_dir_all(&self.state_dir).map_err(|e| fail("create directory for", &e))?;
        let content = serde_json::to_string_pretty(state).map_err(|e| fail("encode", &e))?;

        let temp_path = path.with_extension(format!("{}.tmp", STATE_EXTENSION));
        let mut file = open_private(&temp_path).map_err(|e| fail("create temp file for", &e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| fail("write", &e))?;
        file.sync_all().map_err(|e| fail("fsync", &e))?;

        fs::rename(&temp_path, &path).map_err(|e| fail("commit", &e))?;

        if let Ok(dir) = File::open(&self.state_dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
