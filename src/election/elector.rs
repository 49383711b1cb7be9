//! Role Elector
//!
//! Decides, from the directory alone, what this pass should do. It never
//! writes anything.
//!
//! Undecided node:
//! - zero First records → claim First
//! - exactly one First record → claim Second, unless some other node
//!   already published Second
//! - more than one First record → conflict
//!
//! Node holding a role re-checks its own role each pass. A later query may
//! reveal a double claim the claiming query missed, and that is reported as
//! a conflict rather than ignored.

use std::sync::Arc;

use crate::directory::{NodeRecord, PeerDirectory, RoleMarker};
use crate::errors::BootstrapResult;
use crate::node::LocalNode;

/// What a pass should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Election {
    /// No first master visible
    ClaimFirst,

    /// Join `first` as second master
    ClaimSecond { first: NodeRecord },

    /// Already first master; `second` if one has published
    HoldingFirst { second: Option<NodeRecord> },

    /// Already second master
    HoldingSecond { first: Option<NodeRecord> },

    /// More than one node claims `role`
    Conflict {
        role: RoleMarker,
        claimants: Vec<String>,
    },
}

impl Election {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Reads role markers and decides the local node's next step.
pub struct RoleElector {
    directory: Arc<dyn PeerDirectory>,
}

fn names(records: &[NodeRecord]) -> Vec<String> {
    records.iter().map(|r| r.name.clone()).collect()
}

fn conflict(role: RoleMarker, records: &[NodeRecord]) -> Election {
    Election::Conflict {
        role,
        claimants: names(records),
    }
}

impl RoleElector {
    pub fn new(directory: Arc<dyn PeerDirectory>) -> Self {
        Self { directory }
    }

    /// Decide the next step for `node`.
    ///
    /// Fails only with `DirectoryUnavailable`.
    pub fn elect(&self, node: &LocalNode) -> BootstrapResult<Election> {
        match node.role() {
            Some(RoleMarker::First) => self.recheck_first(node),
            Some(RoleMarker::Second) => self.recheck_second(node),
            Some(RoleMarker::None) | None => self.elect_undecided(node),
        }
    }

    fn find(&self, node: &LocalNode, marker: RoleMarker) -> BootstrapResult<Vec<NodeRecord>> {
        self.directory
            .find_by_role_marker(node.environment(), marker)
    }

    fn elect_undecided(&self, node: &LocalNode) -> BootstrapResult<Election> {
        let mut firsts = self.find(node, RoleMarker::First)?;

        match firsts.len() {
            0 => Ok(Election::ClaimFirst),
            1 => {
                let seconds: Vec<NodeRecord> = self
                    .find(node, RoleMarker::Second)?
                    .into_iter()
                    .filter(|r| r.name != node.name())
                    .collect();
                if !seconds.is_empty() {
                    // A third node: the pair is already complete.
                    let mut claimants = names(&seconds);
                    claimants.push(node.name().to_string());
                    return Ok(Election::Conflict {
                        role: RoleMarker::Second,
                        claimants,
                    });
                }
                let first = firsts.remove(0);
                Ok(Election::ClaimSecond { first })
            }
            _ => Ok(conflict(RoleMarker::First, &firsts)),
        }
    }

    fn recheck_first(&self, node: &LocalNode) -> BootstrapResult<Election> {
        let firsts = self.find(node, RoleMarker::First)?;
        if firsts.iter().any(|r| r.name != node.name()) {
            let mut claimants = names(&firsts);
            if !claimants.iter().any(|n| n == node.name()) {
                claimants.push(node.name().to_string());
            }
            claimants.sort();
            return Ok(Election::Conflict {
                role: RoleMarker::First,
                claimants,
            });
        }

        let mut seconds = self.find(node, RoleMarker::Second)?;
        match seconds.len() {
            0 => Ok(Election::HoldingFirst { second: None }),
            1 => Ok(Election::HoldingFirst {
                second: seconds.pop(),
            }),
            _ => Ok(conflict(RoleMarker::Second, &seconds)),
        }
    }

    fn recheck_second(&self, node: &LocalNode) -> BootstrapResult<Election> {
        let seconds = self.find(node, RoleMarker::Second)?;
        if seconds.iter().any(|r| r.name != node.name()) {
            let mut claimants = names(&seconds);
            if !claimants.iter().any(|n| n == node.name()) {
                claimants.push(node.name().to_string());
            }
            claimants.sort();
            return Ok(Election::Conflict {
                role: RoleMarker::Second,
                claimants,
            });
        }

        let mut firsts = self.find(node, RoleMarker::First)?;
        match firsts.len() {
            0 | 1 => Ok(Election::HoldingSecond { first: firsts.pop() }),
            _ => Ok(conflict(RoleMarker::First, &firsts)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::errors::BootstrapErrorKind;

    fn record(name: &str, role: RoleMarker) -> NodeRecord {
        let mut r = NodeRecord::new(name, "prod", format!("{}.local", name), "mysql-bin");
        r.role_marker = role;
        if role == RoleMarker::First {
            r.replication_secret = Some("s".into());
        }
        r
    }

    fn setup(records: &[NodeRecord]) -> (Arc<MemoryDirectory>, RoleElector) {
        let dir = Arc::new(MemoryDirectory::new());
        for r in records {
            dir.seed(r.clone()).unwrap();
        }
        let elector = RoleElector::new(dir.clone());
        (dir, elector)
    }

    fn undecided(name: &str) -> LocalNode {
        LocalNode::new(name, "prod", format!("{}.local", name))
    }

    fn holding(name: &str, role: RoleMarker) -> LocalNode {
        let mut node = undecided(name);
        node.set_role(role).unwrap();
        node
    }

    #[test]
    fn test_empty_directory_claims_first() {
        let (_, elector) = setup(&[]);
        assert_eq!(elector.elect(&undecided("db1")).unwrap(), Election::ClaimFirst);
    }

    #[test]
    fn test_one_first_claims_second() {
        let (_, elector) = setup(&[record("db1", RoleMarker::First)]);
        match elector.elect(&undecided("db2")).unwrap() {
            Election::ClaimSecond { first } => assert_eq!(first.name, "db1"),
            other => panic!("unexpected election {:?}", other),
        }
    }

    #[test]
    fn test_two_firsts_conflict() {
        let (_, elector) = setup(&[
            record("db1", RoleMarker::First),
            record("db2", RoleMarker::First),
        ]);
        let election = elector.elect(&undecided("db3")).unwrap();
        assert_eq!(
            election,
            Election::Conflict {
                role: RoleMarker::First,
                claimants: vec!["db1".into(), "db2".into()],
            }
        );
    }

    #[test]
    fn test_third_node_conflicts_on_second() {
        let (_, elector) = setup(&[
            record("db1", RoleMarker::First),
            record("db2", RoleMarker::Second),
        ]);
        let election = elector.elect(&undecided("db3")).unwrap();
        assert!(election.is_conflict());
    }

    #[test]
    fn test_first_sees_second() {
        let (_, elector) = setup(&[
            record("db1", RoleMarker::First),
            record("db2", RoleMarker::Second),
        ]);
        match elector.elect(&holding("db1", RoleMarker::First)).unwrap() {
            Election::HoldingFirst { second: Some(s) } => assert_eq!(s.name, "db2"),
            other => panic!("unexpected election {:?}", other),
        }
    }

    #[test]
    fn test_first_without_second_waits() {
        let (_, elector) = setup(&[record("db1", RoleMarker::First)]);
        assert_eq!(
            elector.elect(&holding("db1", RoleMarker::First)).unwrap(),
            Election::HoldingFirst { second: None }
        );
    }

    #[test]
    fn test_first_detects_late_rival() {
        let (_, elector) = setup(&[
            record("db1", RoleMarker::First),
            record("db2", RoleMarker::First),
        ]);
        let election = elector.elect(&holding("db1", RoleMarker::First)).unwrap();
        assert_eq!(
            election,
            Election::Conflict {
                role: RoleMarker::First,
                claimants: vec!["db1".into(), "db2".into()],
            }
        );
    }

    #[test]
    fn test_first_with_own_record_hidden_still_detects_rival() {
        let (dir, elector) = setup(&[
            record("db1", RoleMarker::First),
            record("db2", RoleMarker::First),
        ]);
        dir.hide("db1").unwrap();
        let election = elector.elect(&holding("db1", RoleMarker::First)).unwrap();
        assert!(election.is_conflict());
    }

    #[test]
    fn test_second_holds() {
        let (_, elector) = setup(&[
            record("db1", RoleMarker::First),
            record("db2", RoleMarker::Second),
        ]);
        match elector.elect(&holding("db2", RoleMarker::Second)).unwrap() {
            Election::HoldingSecond { first: Some(f) } => assert_eq!(f.name, "db1"),
            other => panic!("unexpected election {:?}", other),
        }
    }

    #[test]
    fn test_unavailable_directory_propagates() {
        let (dir, elector) = setup(&[]);
        dir.set_available(false).unwrap();
        let err = elector.elect(&undecided("db1")).unwrap_err();
        assert_eq!(err.kind, BootstrapErrorKind::DirectoryUnavailable);
    }

    #[test]
    fn test_queries_scoped_to_environment() {
        let mut other_env = record("db9", RoleMarker::First);
        other_env.environment = "staging".into();
        let (_, elector) = setup(&[other_env]);
        assert_eq!(elector.elect(&undecided("db1")).unwrap(), Election::ClaimFirst);
    }
}
