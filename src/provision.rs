//! Database server provisioning
//!
//! The core does not install anything itself. It computes the per-role
//! server tuning and hands it to a [`PackageInstaller`], which must be
//! idempotent: running it twice with the same tuning changes nothing.
//!
//! Tuning per role:
//! - `server_id` from the bind address (must differ between the masters)
//! - `auto_increment_increment = 2` and an offset of 1 (First) or 2
//!   (Second), so concurrent inserts on both masters never collide
//! - binary logging under the node's log base name

use std::net::Ipv4Addr;
use std::process::Command;

use crc32fast::Hasher;
use serde::Serialize;

use crate::directory::RoleMarker;
use crate::errors::{BootstrapError, BootstrapResult};
use crate::node::LocalNode;
use crate::observability::{log_event_with_fields, Event};
use crate::replication::split_host_port;

/// Both masters step auto-increment keys by the number of masters.
pub const AUTO_INCREMENT_INCREMENT: u8 = 2;

/// Server settings for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerTuning {
    pub role: RoleMarker,
    pub server_id: u32,
    pub bind_address: String,
    pub auto_increment_increment: u8,
    pub auto_increment_offset: u8,
    pub log_base_name: String,
}

impl ServerTuning {
    /// Tuning for `node` provisioned as `role`.
    pub fn for_role(node: &LocalNode, role: RoleMarker) -> BootstrapResult<Self> {
        let offset = role.auto_increment_offset().ok_or_else(|| {
            BootstrapError::configuration_error("cannot provision a server without a role")
        })?;
        let (bind_address, _) = split_host_port(node.address());

        Ok(Self {
            role,
            server_id: derive_server_id(&bind_address),
            bind_address,
            auto_increment_increment: AUTO_INCREMENT_INCREMENT,
            auto_increment_offset: offset,
            log_base_name: node.log_base_name().to_string(),
        })
    }

    /// Fail when the master at `peer_address` would get the same server id.
    ///
    /// Two masters sharing a server id drop each other's binlog events.
    pub fn ensure_distinct_from(&self, peer_address: &str) -> BootstrapResult<()> {
        let (peer_host, _) = split_host_port(peer_address);
        let peer_id = derive_server_id(&peer_host);
        if peer_id == self.server_id {
            return Err(BootstrapError::configuration_error(format!(
                "server id {} of '{}' collides with master at '{}'",
                self.server_id, self.bind_address, peer_host
            )));
        }
        Ok(())
    }

    /// Settings as environment variables for an external installer.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("DUALMASTER_ROLE", self.role.as_str().to_string()),
            ("DUALMASTER_SERVER_ID", self.server_id.to_string()),
            ("DUALMASTER_BIND_ADDRESS", self.bind_address.clone()),
            (
                "DUALMASTER_AUTO_INCREMENT_INCREMENT",
                self.auto_increment_increment.to_string(),
            ),
            (
                "DUALMASTER_AUTO_INCREMENT_OFFSET",
                self.auto_increment_offset.to_string(),
            ),
            ("DUALMASTER_LOG_BASE_NAME", self.log_base_name.clone()),
        ]
    }
}

/// Server id for a bind address.
///
/// IPv4 addresses use their decimal digits with the dots removed
/// (`10.0.0.1` → `10001`), falling back to the address as a 32-bit integer
/// when the digits overflow. Anything else uses a CRC32 of the address
/// masked to 31 bits. Zero is not a valid server id and maps to 1.
///
/// Digit concatenation can collide (`1.11.1.1` and `11.1.1.1`). The Second
/// checks its id against the First with [`ServerTuning::ensure_distinct_from`].
pub fn derive_server_id(bind_address: &str) -> u32 {
    let id = match bind_address.parse::<Ipv4Addr>() {
        Ok(ip) => ip
            .to_string()
            .replace('.', "")
            .parse::<u32>()
            .unwrap_or_else(|_| u32::from(ip)),
        Err(_) => {
            let mut hasher = Hasher::new();
            hasher.update(bind_address.as_bytes());
            hasher.finalize() & 0x7fff_ffff
        }
    };
    id.max(1)
}

/// Installs and configures the database server. Must be idempotent.
pub trait PackageInstaller: Send + Sync {
    fn install_database_server(&self, tuning: &ServerTuning) -> BootstrapResult<()>;
}

/// Installer for hosts whose server is provisioned out of band.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInstaller;

impl PackageInstaller for NoopInstaller {
    fn install_database_server(&self, tuning: &ServerTuning) -> BootstrapResult<()> {
        let server_id = tuning.server_id.to_string();
        log_event_with_fields(
            Event::ServerProvisioned,
            &[
                ("installer", "noop"),
                ("role", tuning.role.as_str()),
                ("server_id", server_id.as_str()),
            ],
        );
        Ok(())
    }
}

/// Runs an operator-supplied provisioning command.
///
/// The command receives the tuning through `DUALMASTER_*` environment
/// variables and is run directly, never through a shell.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    argv: Vec<String>,
}

impl CommandInstaller {
    pub fn new(argv: Vec<String>) -> BootstrapResult<Self> {
        if argv.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(BootstrapError::configuration_error(
                "install command must name a program",
            ));
        }
        Ok(Self { argv })
    }
}

impl PackageInstaller for CommandInstaller {
    fn install_database_server(&self, tuning: &ServerTuning) -> BootstrapResult<()> {
        let (program, args) = match self.argv.split_first() {
            Some(split) => split,
            None => {
                return Err(BootstrapError::configuration_error(
                    "install command is empty",
                ))
            }
        };

        let output = Command::new(program)
            .args(args)
            .envs(tuning.to_env())
            .output()
            .map_err(|e| {
                BootstrapError::provisioning_failed(format!("failed to run {}: {}", program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BootstrapError::provisioning_failed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        let server_id = tuning.server_id.to_string();
        log_event_with_fields(
            Event::ServerProvisioned,
            &[
                ("installer", program.as_str()),
                ("role", tuning.role.as_str()),
                ("server_id", server_id.as_str()),
            ],
        );
        Ok(())
    }
}
