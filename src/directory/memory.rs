//! In-memory peer directory
//!
//! Shared by every node of a single process (tests, the `simulate` command).
//! Besides the directory contract it exposes hooks to make the directory
//! unreachable and to hide records from queries, which is how read staleness
//! is reproduced.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::record::{NodeRecord, RoleMarker};
use super::{check_publish, PeerDirectory, PublishAction};
use crate::errors::{BootstrapError, BootstrapResult};

#[derive(Debug, Default)]
struct MemoryState {
    /// Records keyed by (environment, name)
    records: BTreeMap<(String, String), NodeRecord>,
    /// Names invisible to role queries
    hidden: HashSet<String>,
    /// Simulated outage
    unavailable: bool,
    /// Writes that actually changed a record
    writes: u64,
}

/// Thread-safe in-memory directory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    state: Mutex<MemoryState>,
}

impl MemoryDirectory {
    /// Create an empty, reachable directory.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> BootstrapResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| BootstrapError::directory_unavailable("directory state lock poisoned"))
    }

    fn lock_available(&self) -> BootstrapResult<MutexGuard<'_, MemoryState>> {
        let state = self.lock()?;
        if state.unavailable {
            return Err(BootstrapError::directory_unavailable(
                "directory is unreachable",
            ));
        }
        Ok(state)
    }

    /// Store a record directly, bypassing publish checks.
    ///
    /// Used to pre-seed a directory, including with records that violate
    /// the one-First invariant.
    pub fn seed(&self, record: NodeRecord) -> BootstrapResult<()> {
        let mut state = self.lock()?;
        state
            .records
            .insert((record.environment.clone(), record.name.clone()), record);
        Ok(())
    }

    /// Make the directory reachable or unreachable.
    pub fn set_available(&self, available: bool) -> BootstrapResult<()> {
        self.lock()?.unavailable = !available;
        Ok(())
    }

    /// Hide a node's record from role queries (stale read).
    pub fn hide(&self, name: &str) -> BootstrapResult<()> {
        self.lock()?.hidden.insert(name.to_string());
        Ok(())
    }

    /// Make a hidden record visible again (consistency caught up).
    pub fn reveal(&self, name: &str) -> BootstrapResult<()> {
        self.lock()?.hidden.remove(name);
        Ok(())
    }

    /// Number of publishes that changed a stored record.
    pub fn write_count(&self) -> BootstrapResult<u64> {
        Ok(self.lock()?.writes)
    }

    /// All stored records, visible or not.
    pub fn records(&self) -> BootstrapResult<Vec<NodeRecord>> {
        Ok(self.lock()?.records.values().cloned().collect())
    }
}

impl PeerDirectory for MemoryDirectory {
    fn find_by_role_marker(
        &self,
        environment: &str,
        marker: RoleMarker,
    ) -> BootstrapResult<Vec<NodeRecord>> {
        let state = self.lock_available()?;
        Ok(state
            .records
            .values()
            .filter(|r| r.environment == environment && r.role_marker == marker)
            .filter(|r| !state.hidden.contains(&r.name))
            .cloned()
            .collect())
    }

    fn find_node(&self, environment: &str, name: &str) -> BootstrapResult<Option<NodeRecord>> {
        let state = self.lock_available()?;
        Ok(state
            .records
            .get(&(environment.to_string(), name.to_string()))
            .cloned())
    }

    fn publish(&self, record: &NodeRecord) -> BootstrapResult<()> {
        let mut state = self.lock_available()?;
        let key = (record.environment.clone(), record.name.clone());

        match check_publish(state.records.get(&key), record)? {
            PublishAction::Unchanged => Ok(()),
            PublishAction::Write => {
                let mut stored = record.clone();
                if stored.role_marker.is_assigned() && stored.published_at.is_none() {
                    stored.published_at = Some(Utc::now());
                }
                state.records.insert(key, stored);
                state.writes += 1;
                Ok(())
            }
        }
    }
}
