//! Bootstrap Protocol Tests
//!
//! Whole-protocol behavior of two (or three) nodes sharing one directory:
//! - Exactly one First and one Second after convergence
//! - Repeated passes on a finished node change nothing
//! - Double claims are reported, never resolved silently
//! - The Second replicates with the First's secret
//! - The First closes the replication loop exactly once
//! - A claim made on a stale read is caught once the directory catches up

mod common;

use common::{holders, node, pair, Cluster, ENV};
use dualmaster::directory::{NodeRecord, PeerDirectory};
use dualmaster::replication::Statement;
use dualmaster::{BootstrapErrorKind, ElectionState, PassAction, RoleMarker};

fn seeded_first(name: &str, address: &str) -> NodeRecord {
    let mut record = NodeRecord::new(name, ENV, address, "mysql-bin");
    record.role_marker = RoleMarker::First;
    record.replication_secret = Some(format!("{}-secret", name));
    record
}

// =============================================================================
// Single claim
// =============================================================================

/// Every serialized interleaving of two fresh nodes ends with one First and
/// one Second replicating from each other.
#[test]
fn test_every_interleaving_converges_to_one_first_one_second() {
    for schedule in 0u32..64 {
        let cluster = Cluster::new();
        let mut nodes = pair();

        for step in 0..6 {
            let index = ((schedule >> step) & 1) as usize;
            cluster.pass(&mut nodes[index]).unwrap();
        }
        for index in [0, 1, 0, 1] {
            cluster.pass(&mut nodes[index]).unwrap();
        }

        assert_eq!(holders(&nodes, RoleMarker::First).len(), 1, "schedule {:06b}", schedule);
        assert_eq!(holders(&nodes, RoleMarker::Second).len(), 1, "schedule {:06b}", schedule);

        // Whoever ran first owns the role.
        let first_index = (schedule & 1) as usize;
        assert_eq!(nodes[first_index].role(), Some(RoleMarker::First));

        for n in &nodes {
            assert!(cluster.db.is_running(n.address()), "schedule {:06b}", schedule);
        }
        assert_eq!(cluster.db.upstream_of("10.0.0.1").as_deref(), Some("10.0.0.2"));
        assert_eq!(cluster.db.upstream_of("10.0.0.2").as_deref(), Some("10.0.0.1"));
    }
}

#[test]
fn test_roles_are_published_with_offsets_apart() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();
    cluster.pass(&mut db2).unwrap();

    let first = cluster.directory.find_node(ENV, "db1").unwrap().unwrap();
    let second = cluster.directory.find_node(ENV, "db2").unwrap().unwrap();
    assert!(first.is_first());
    assert!(second.is_second());
    assert!(second.replication_secret.is_none());
    assert_ne!(
        first.role_marker.auto_increment_offset(),
        second.role_marker.auto_increment_offset()
    );
}

// =============================================================================
// Idempotence
// =============================================================================

#[test]
fn test_repeated_passes_issue_no_mutations() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();
    cluster.pass(&mut db2).unwrap();
    cluster.pass(&mut db1).unwrap();

    let mutations = cluster.db.total_mutations();
    let writes = cluster.directory.write_count().unwrap();

    for _ in 0..3 {
        let first = cluster.pass(&mut db1).unwrap();
        let second = cluster.pass(&mut db2).unwrap();
        assert!(!first.changed_anything());
        assert!(!second.changed_anything());
        assert_eq!(first.actions, vec![PassAction::ReplicaAlreadyRunning]);
        assert!(second.actions.is_empty());
    }

    assert_eq!(cluster.db.total_mutations(), mutations);
    assert_eq!(cluster.directory.write_count().unwrap(), writes);
}

#[test]
fn test_restarted_node_resumes_without_mutations() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();
    cluster.pass(&mut db2).unwrap();
    cluster.pass(&mut db1).unwrap();

    let mutations = cluster.db.total_mutations();
    let writes = cluster.directory.write_count().unwrap();

    // Fresh processes: nothing remembered locally.
    let [mut db1_again, mut db2_again] = pair();
    let first = cluster.pass(&mut db1_again).unwrap();
    let second = cluster.pass(&mut db2_again).unwrap();

    assert_eq!(first.state, ElectionState::First);
    assert_eq!(second.state, ElectionState::Second);
    assert_eq!(db1_again.replication_secret(), db1.replication_secret());
    assert_eq!(db2_again.replication_secret(), db2.replication_secret());
    assert_eq!(cluster.db.total_mutations(), mutations);
    assert_eq!(cluster.directory.write_count().unwrap(), writes);
    assert_eq!(cluster.secrets_issued(), 1);
}

// =============================================================================
// Conflict detection
// =============================================================================

#[test]
fn test_two_seeded_firsts_block_a_newcomer() {
    let cluster = Cluster::new();
    cluster.directory.seed(seeded_first("db1", "10.0.0.1")).unwrap();
    cluster.directory.seed(seeded_first("db2", "10.0.0.2")).unwrap();

    let mut db3 = node("db3", "10.0.0.3");
    let err = cluster.pass(&mut db3).unwrap_err();

    assert_eq!(err.kind, BootstrapErrorKind::ElectionConflict);
    assert!(err.message.contains("db1"));
    assert!(err.message.contains("db2"));
    assert!(db3.role().is_none());
    assert!(cluster.db.statements().is_empty());
    assert_eq!(cluster.directory.write_count().unwrap(), 0);
}

#[test]
fn test_two_seeded_firsts_block_the_claimants_themselves() {
    let cluster = Cluster::new();
    cluster.directory.seed(seeded_first("db1", "10.0.0.1")).unwrap();
    cluster.directory.seed(seeded_first("db2", "10.0.0.2")).unwrap();

    for mut n in pair() {
        let err = cluster.pass(&mut n).unwrap_err();
        assert_eq!(err.kind, BootstrapErrorKind::ElectionConflict);
        assert!(!err.is_transient());
    }
    assert_eq!(cluster.db.total_mutations(), 0);
    assert_eq!(cluster.reconciler.metrics().snapshot().election_conflicts, 2);
}

#[test]
fn test_third_node_never_becomes_second() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();
    cluster.pass(&mut db2).unwrap();

    let mut db3 = node("db3", "10.0.0.3");
    let err = cluster.pass(&mut db3).unwrap_err();
    assert_eq!(err.kind, BootstrapErrorKind::ElectionConflict);
    assert_eq!(cluster.db.mutation_count("10.0.0.3"), 0);
    assert!(cluster.directory.find_node(ENV, "db3").unwrap().is_none());
}

// =============================================================================
// Secret propagation
// =============================================================================

#[test]
fn test_second_attaches_with_the_firsts_secret() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();
    assert_eq!(cluster.secrets_issued(), 1);
    assert_eq!(db1.replication_secret(), Some("secret-1"));

    cluster.pass(&mut db2).unwrap();
    assert_eq!(cluster.secrets_issued(), 1);
    assert_eq!(db2.replication_secret(), Some("secret-1"));

    let calls = cluster.change_master_calls("10.0.0.2");
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Statement::ChangeMaster {
            host,
            user,
            password,
            log_file,
            log_position,
            ..
        } => {
            assert_eq!(host, "10.0.0.1");
            assert_eq!(user, "repl");
            assert_eq!(password, "secret-1");
            assert_eq!(log_file, "mysql-bin.000001");
            assert_eq!(*log_position, 0);
        }
        other => panic!("unexpected statement {:?}", other),
    }
    assert!(cluster.db.has_replication_user("10.0.0.1", "repl", "secret-1"));
}

#[test]
fn test_first_without_visible_secret_defers_second() {
    let cluster = Cluster::new();
    let mut first = seeded_first("db1", "10.0.0.1");
    first.replication_secret = None;
    cluster.directory.seed(first).unwrap();

    let mut db2 = node("db2", "10.0.0.2");
    let err = cluster.pass(&mut db2).unwrap_err();
    assert_eq!(err.kind, BootstrapErrorKind::SecretUnavailable);
    assert!(err.is_transient());
    assert!(db2.replication_secret().is_none());
    assert_eq!(cluster.db.total_mutations(), 0);
    assert_eq!(cluster.secrets_issued(), 0);
}

#[test]
fn test_development_mode_uses_fixed_secret() {
    let cluster = Cluster::new();
    let mut db1 = node("db1", "10.0.0.1").with_development_mode(true);
    let mut db2 = node("db2", "10.0.0.2").with_development_mode(true);
    cluster.pass(&mut db1).unwrap();
    cluster.pass(&mut db2).unwrap();

    assert_eq!(db1.replication_secret(), Some("replication"));
    assert_eq!(db2.replication_secret(), Some("replication"));
    assert_eq!(cluster.secrets_issued(), 0);
}

// =============================================================================
// Circular attach
// =============================================================================

#[test]
fn test_first_attaches_back_to_second_once() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();
    assert!(cluster.change_master_calls("10.0.0.1").is_empty());

    cluster.pass(&mut db2).unwrap();
    let report = cluster.pass(&mut db1).unwrap();
    assert!(report.actions.contains(&PassAction::ReplicaAttached {
        upstream: "db2".to_string()
    }));

    let calls = cluster.change_master_calls("10.0.0.1");
    assert_eq!(calls.len(), 1);
    assert!(matches!(
        &calls[0],
        Statement::ChangeMaster { host, password, .. }
            if host == "10.0.0.2" && password == "secret-1"
    ));

    cluster.pass(&mut db1).unwrap();
    cluster.pass(&mut db1).unwrap();
    assert_eq!(cluster.change_master_calls("10.0.0.1").len(), 1);
}

#[test]
fn test_stopped_reverse_link_is_reattached() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();
    cluster.pass(&mut db2).unwrap();
    cluster.pass(&mut db1).unwrap();

    cluster.db.stop_replica("10.0.0.1");
    cluster.pass(&mut db1).unwrap();

    assert_eq!(cluster.change_master_calls("10.0.0.1").len(), 2);
    assert!(cluster.db.is_running("10.0.0.1"));
}

#[test]
fn test_second_never_reattaches() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();
    cluster.pass(&mut db2).unwrap();

    cluster.db.stop_replica("10.0.0.2");
    let report = cluster.pass(&mut db2).unwrap();

    assert!(report.actions.is_empty());
    assert_eq!(cluster.change_master_calls("10.0.0.2").len(), 1);
}

/// An unreadable replica status counts as "not running"; the attach that
/// follows fails on its own and the pass reports it.
#[test]
fn test_unreachable_first_attempts_attach_and_fails() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();
    cluster.pass(&mut db2).unwrap();

    cluster.db.set_reachable("10.0.0.1", false);
    let err = cluster.pass(&mut db1).unwrap_err();
    assert_eq!(err.kind, BootstrapErrorKind::ReplicationAttachFailed);
    assert_eq!(db1.role(), Some(RoleMarker::First));
    assert_eq!(cluster.reconciler.metrics().snapshot().attach_failures, 1);

    cluster.db.set_reachable("10.0.0.1", true);
    cluster.pass(&mut db1).unwrap();
    assert!(cluster.db.is_running("10.0.0.1"));
}

// =============================================================================
// Staleness tolerance
// =============================================================================

#[test]
fn test_claim_on_stale_read_is_caught_when_directory_catches_up() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();

    // db2 cannot see db1 and claims First as well.
    cluster.directory.hide("db1").unwrap();
    let report = cluster.pass(&mut db2).unwrap();
    assert_eq!(report.state, ElectionState::First);

    cluster.directory.reveal("db1").unwrap();
    let mutations = cluster.db.total_mutations();

    for n in [&mut db1, &mut db2] {
        let err = cluster.pass(n).unwrap_err();
        assert_eq!(err.kind, BootstrapErrorKind::ElectionConflict);
    }
    assert_eq!(cluster.db.total_mutations(), mutations);
    assert_eq!(cluster.db.upstream_of("10.0.0.1"), None);
    assert_eq!(cluster.db.upstream_of("10.0.0.2"), None);
}

#[test]
fn test_stale_read_of_second_is_harmless() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();
    cluster.pass(&mut db2).unwrap();

    cluster.directory.hide("db2").unwrap();
    let report = cluster.pass(&mut db1).unwrap();
    assert_eq!(report.actions, vec![PassAction::ReverseLinkPending]);

    cluster.directory.reveal("db2").unwrap();
    let report = cluster.pass(&mut db1).unwrap();
    assert!(report.actions.contains(&PassAction::ReplicaAttached {
        upstream: "db2".to_string()
    }));
}

// =============================================================================
// Completion fence
// =============================================================================

#[test]
fn test_failed_attach_leaves_second_unpublished() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();
    cluster.pass(&mut db1).unwrap();

    cluster.db.refuse_replica_start("10.0.0.2", true);
    let err = cluster.pass(&mut db2).unwrap_err();
    assert_eq!(err.kind, BootstrapErrorKind::ReplicationAttachFailed);
    assert!(db2.role().is_none());
    assert!(cluster.directory.find_node(ENV, "db2").unwrap().is_none());

    // The First must not trust a Second that is not there.
    let report = cluster.pass(&mut db1).unwrap();
    assert_eq!(report.actions, vec![PassAction::ReverseLinkPending]);

    cluster.db.refuse_replica_start("10.0.0.2", false);
    let report = cluster.pass(&mut db2).unwrap();
    assert_eq!(report.state, ElectionState::Second);
    assert!(cluster.db.is_running("10.0.0.2"));
}

#[test]
fn test_failed_grant_leaves_first_unpublished() {
    let cluster = Cluster::new();
    let mut db1 = node("db1", "10.0.0.1");

    cluster.db.set_reachable("10.0.0.1", false);
    let err = cluster.pass(&mut db1).unwrap_err();
    assert!(err.is_transient());
    assert!(cluster.directory.records().unwrap().is_empty());

    cluster.db.set_reachable("10.0.0.1", true);
    let report = cluster.pass(&mut db1).unwrap();
    assert_eq!(report.state, ElectionState::First);

    // The secret made on the failed pass is the one that was granted.
    assert_eq!(cluster.secrets_issued(), 1);
    assert!(cluster.db.has_replication_user("10.0.0.1", "repl", "secret-1"));
}

#[test]
fn test_unavailable_directory_ends_pass_without_side_effects() {
    let cluster = Cluster::new();
    let mut db1 = node("db1", "10.0.0.1");

    cluster.directory.set_available(false).unwrap();
    let err = cluster.pass(&mut db1).unwrap_err();
    assert_eq!(err.kind, BootstrapErrorKind::DirectoryUnavailable);
    assert!(err.is_transient());
    assert!(cluster.db.statements().is_empty());

    cluster.directory.set_available(true).unwrap();
    assert_eq!(cluster.pass(&mut db1).unwrap().state, ElectionState::First);

    let snapshot = cluster.reconciler.metrics().snapshot();
    assert_eq!(snapshot.passes_failed, 1);
    assert_eq!(snapshot.passes_completed, 1);
}

#[test]
fn test_failed_first_claim_yields_to_peer_that_claims_first() {
    let cluster = Cluster::new();
    let [mut db1, mut db2] = pair();

    cluster.db.set_reachable("10.0.0.1", false);
    assert!(cluster.pass(&mut db1).unwrap_err().is_transient());
    assert_eq!(db1.role(), None);
    assert_eq!(db1.replication_secret(), Some("secret-1"));
    cluster.db.set_reachable("10.0.0.1", true);

    let report = cluster.pass(&mut db2).unwrap();
    assert_eq!(report.state, ElectionState::First);
    assert_eq!(db2.replication_secret(), Some("secret-2"));

    let report = cluster.pass(&mut db1).unwrap();
    assert_eq!(report.state, ElectionState::Second);
    assert_eq!(db1.role(), Some(RoleMarker::Second));
    assert_eq!(db1.replication_secret(), Some("secret-2"));
    assert_eq!(cluster.secrets_issued(), 2);

    let calls = cluster.change_master_calls("10.0.0.1");
    assert_eq!(calls.len(), 1);
    assert!(matches!(
        &calls[0],
        Statement::ChangeMaster { host, password, .. }
            if host == "10.0.0.2" && password == "secret-2"
    ));

    cluster.pass(&mut db2).unwrap();
    assert!(cluster.db.is_running("10.0.0.1"));
    assert!(cluster.db.is_running("10.0.0.2"));
    assert_eq!(cluster.db.upstream_of("10.0.0.2").as_deref(), Some("10.0.0.1"));
}

#[test]
fn test_second_with_colliding_server_id_is_refused() {
    let cluster = Cluster::new();
    let mut db1 = node("db1", "1.11.1.1");
    let mut db2 = node("db2", "11.1.1.1");
    cluster.pass(&mut db1).unwrap();

    let err = cluster.pass(&mut db2).unwrap_err();
    assert_eq!(err.kind, BootstrapErrorKind::ConfigurationError);
    assert!(!err.is_transient());
    assert_eq!(db2.role(), None);
    assert_eq!(db2.replication_secret(), None);
    assert_eq!(cluster.db.mutation_count("11.1.1.1"), 0);
    assert!(cluster.directory.find_node(ENV, "db2").unwrap().is_none());
}
