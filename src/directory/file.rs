//! File-backed peer directory
//!
//! Layout: `<root>/<environment>/<name>.json`, one file per node, typically
//! on a shared mount. Each file holds an envelope with the serialized record
//! and a CRC32 checksum of it.
//!
//! Writes use the atomic pattern:
//! 1. Write to temp file
//! 2. fsync temp file
//! 3. Rename temp to final
//! 4. fsync the environment directory
//!
//! A missing root means the directory is not mounted and is reported as
//! `DirectoryUnavailable`. A checksum mismatch is reported the same way:
//! a corrupt record must never be treated as "no peer".

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use super::record::{NodeRecord, RoleMarker};
use super::{check_publish, validate_key, PeerDirectory, PublishAction};
use crate::errors::{BootstrapError, BootstrapResult};

const ENVELOPE_VERSION: u32 = 1;
const RECORD_EXTENSION: &str = "json";

/// On-disk wrapper around a serialized record.
#[derive(Debug, Serialize, Deserialize)]
struct RecordEnvelope {
    version: u32,
    checksum: u32,
    payload: String,
}

fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Directory of node records stored as JSON files.
#[derive(Debug, Clone)]
pub struct FileDirectory {
    root: PathBuf,
}

impl FileDirectory {
    /// Open a directory rooted at `root`. The root must already exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> BootstrapResult<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(BootstrapError::directory_unavailable(format!(
                "directory root {} is not reachable",
                self.root.display()
            )))
        }
    }

    fn environment_dir(&self, environment: &str) -> BootstrapResult<PathBuf> {
        validate_key("environment", environment)?;
        Ok(self.root.join(environment))
    }

    fn record_path(&self, environment: &str, name: &str) -> BootstrapResult<PathBuf> {
        validate_key("node name", name)?;
        Ok(self
            .environment_dir(environment)?
            .join(format!("{}.{}", name, RECORD_EXTENSION)))
    }

    fn read_record(path: &Path) -> BootstrapResult<Option<NodeRecord>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BootstrapError::directory_unavailable(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let envelope: RecordEnvelope = serde_json::from_str(&content).map_err(|e| {
            BootstrapError::directory_unavailable(format!(
                "failed to parse {}: {}",
                path.display(),
                e
            ))
        })?;

        if envelope.version != ENVELOPE_VERSION {
            return Err(BootstrapError::directory_unavailable(format!(
                "{} has unsupported envelope version {}",
                path.display(),
                envelope.version
            )));
        }

        if compute_checksum(envelope.payload.as_bytes()) != envelope.checksum {
            return Err(BootstrapError::directory_unavailable(format!(
                "{} failed checksum verification",
                path.display()
            )));
        }

        let record = serde_json::from_str(&envelope.payload).map_err(|e| {
            BootstrapError::directory_unavailable(format!(
                "failed to decode record in {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Some(record))
    }

    fn write_atomic(path: &Path, record: &NodeRecord) -> BootstrapResult<()> {
        let fail = |what: &str, e: &dyn std::fmt::Display| {
            BootstrapError::directory_unavailable(format!(
                "{} {}: {}",
                what,
                path.display(),
                e
            ))
        };

        let parent = path
            .parent()
            .ok_or_else(|| BootstrapError::configuration_error("record path has no parent"))?;
        fs::create_dir_all(parent).map_err(|e| fail("failed to create directory for", &e))?;

        let payload = serde_json::to_string(record).map_err(|e| fail("failed to encode", &e))?;
        let envelope = RecordEnvelope {
            version: ENVELOPE_VERSION,
            checksum: compute_checksum(payload.as_bytes()),
            payload,
        };
        let content =
            serde_json::to_string_pretty(&envelope).map_err(|e| fail("failed to encode", &e))?;

        let temp_path = path.with_extension(format!("{}.tmp", RECORD_EXTENSION));
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| fail("failed to create temp file for", &e))?;

        file.write_all(content.as_bytes())
            .map_err(|e| fail("failed to write", &e))?;
        file.sync_all().map_err(|e| fail("failed to fsync", &e))?;

        fs::rename(&temp_path, path).map_err(|e| fail("failed to commit", &e))?;

        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }

        Ok(())
    }
}

impl PeerDirectory for FileDirectory {
    fn find_by_role_marker(
        &self,
        environment: &str,
        marker: RoleMarker,
    ) -> BootstrapResult<Vec<NodeRecord>> {
        self.ensure_root()?;
        let env_dir = self.environment_dir(environment)?;

        let entries = match fs::read_dir(&env_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BootstrapError::directory_unavailable(format!(
                    "failed to list {}: {}",
                    env_dir.display(),
                    e
                )))
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                BootstrapError::directory_unavailable(format!(
                    "failed to list {}: {}",
                    env_dir.display(),
                    e
                ))
            })?;
            let path = entry.path();
            // Temp files end in `.json.tmp` and are skipped here.
            if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut matches = Vec::new();
        for path in paths {
            if let Some(record) = Self::read_record(&path)? {
                if record.environment == environment && record.role_marker == marker {
                    matches.push(record);
                }
            }
        }
        Ok(matches)
    }

    fn find_node(&self, environment: &str, name: &str) -> BootstrapResult<Option<NodeRecord>> {
        self.ensure_root()?;
        Self::read_record(&self.record_path(environment, name)?)
    }

    fn publish(&self, record: &NodeRecord) -> BootstrapResult<()> {
        self.ensure_root()?;
        let path = self.record_path(&record.environment, &record.name)?;
        let existing = Self::read_record(&path)?;

        match check_publish(existing.as_ref(), record)? {
            PublishAction::Unchanged => Ok(()),
            PublishAction::Write => {
                let mut stored = record.clone();
                if stored.role_marker.is_assigned() && stored.published_at.is_none() {
                    stored.published_at = Some(Utc::now());
                }
                Self::write_atomic(&path, &stored)
            }
        }
    }
}
