//! Credential Vault
//!
//! Produces the replication secret exactly once per cluster and hands it to
//! the second master. The first master generates it (or reuses the one it
//! already holds); the second master only ever copies it from the First
//! record. Regeneration would orphan the second master's configuration, so
//! it never happens.
//!
//! Secrets never appear in logs. Log lines carry [`fingerprint`] instead.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::directory::NodeRecord;
use crate::errors::{BootstrapError, BootstrapResult};
use crate::node::LocalNode;
use crate::observability::{log_event_with_fields, Event};

/// Fixed secret used in development mode.
pub const DEVELOPMENT_SECRET: &str = "replication";

/// Random bytes per generated secret.
const SECRET_BYTES: usize = 24;

/// Source of fresh secrets.
pub trait SecretGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Generates secrets from the operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSecretGenerator;

impl SecretGenerator for OsSecretGenerator {
    fn generate(&self) -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// Creates, reuses and copies the replication secret.
pub struct CredentialVault {
    generator: Box<dyn SecretGenerator>,
}

impl CredentialVault {
    pub fn new(generator: Box<dyn SecretGenerator>) -> Self {
        Self { generator }
    }

    /// Secret for `node`.
    ///
    /// With `first_peer == None` the node acts as first master: an existing
    /// local secret is returned unchanged, otherwise a new one is made (the
    /// fixed development secret in development mode).
    ///
    /// With `Some(first)` the node acts as second master and copies the
    /// First record's secret. A First record without a secret is
    /// `SecretUnavailable`: the record is visible before its secret is.
    pub fn create_or_get_replication_secret(
        &self,
        node: &LocalNode,
        first_peer: Option<&NodeRecord>,
    ) -> BootstrapResult<String> {
        match first_peer {
            None => Ok(self.first_master_secret(node)),
            Some(first) => copy_from_first(node, first),
        }
    }

    fn first_master_secret(&self, node: &LocalNode) -> String {
        if let Some(existing) = node.replication_secret() {
            let fp = fingerprint(existing);
            log_event_with_fields(
                Event::SecretReused,
                &[("fingerprint", fp.as_str()), ("node", node.name())],
            );
            return existing.to_string();
        }

        let secret = if node.development_mode() {
            DEVELOPMENT_SECRET.to_string()
        } else {
            self.generator.generate()
        };
        let fp = fingerprint(&secret);
        log_event_with_fields(
            Event::SecretGenerated,
            &[
                ("development_mode", if node.development_mode() { "true" } else { "false" }),
                ("fingerprint", fp.as_str()),
                ("node", node.name()),
            ],
        );
        secret
    }
}

impl Default for CredentialVault {
    fn default() -> Self {
        Self::new(Box::new(OsSecretGenerator))
    }
}

fn copy_from_first(node: &LocalNode, first: &NodeRecord) -> BootstrapResult<String> {
    let secret = first.replication_secret.as_deref().ok_or_else(|| {
        BootstrapError::secret_unavailable(format!(
            "first master '{}' has no replication secret published yet",
            first.name
        ))
    })?;

    // A secret held without a role was never published and gets replaced.
    let replaced = match node.replication_secret() {
        Some(local) if !secrets_equal(local, secret) => {
            if node.role().is_some() {
                return Err(BootstrapError::configuration_error(format!(
                    "node '{}' holds a replication secret that differs from first master '{}'",
                    node.name(),
                    first.name
                )));
            }
            true
        }
        _ => false,
    };

    let fp = fingerprint(secret);
    log_event_with_fields(
        Event::SecretCopied,
        &[
            ("fingerprint", fp.as_str()),
            ("from", first.name.as_str()),
            ("node", node.name()),
            ("replaced", if replaced { "true" } else { "false" }),
        ],
    );
    Ok(secret.to_string())
}

/// Constant-time secret comparison.
pub fn secrets_equal(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Short, non-reversible identifier of a secret for logs.
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
}
