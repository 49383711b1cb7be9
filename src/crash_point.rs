//! Crash point injection for testing the completion fence
//!
//! Crash points are enabled through the `DUALMASTER_CRASH_POINT` environment
//! variable. When the named point is reached the process terminates via
//! `std::process::abort()`: no cleanup, no unwinding, no catching.
//!
//! A crash between any two steps of a role claim must leave the cluster in
//! a state the next pass completes from.
//!
//! # Testing
//!
//! ```bash
//! DUALMASTER_CRASH_POINT=first_before_publish dualmaster reconcile --config node.json
//! ```

use std::sync::OnceLock;

/// Environment variable naming the active crash point
pub const CRASH_POINT_ENV: &str = "DUALMASTER_CRASH_POINT";

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var(CRASH_POINT_ENV).ok())
        .as_deref()
}

/// Returns true if `DUALMASTER_CRASH_POINT` equals `name`.
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Abort the process if the named crash point is enabled.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // First master claim
    pub const FIRST_AFTER_PROVISION: &str = "first_after_provision";
    pub const FIRST_AFTER_SECRET: &str = "first_after_secret";
    pub const FIRST_AFTER_GRANT: &str = "first_after_grant";
    pub const FIRST_BEFORE_PUBLISH: &str = "first_before_publish";
    pub const FIRST_AFTER_PUBLISH: &str = "first_after_publish";

    // Second master claim
    pub const SECOND_AFTER_SECRET: &str = "second_after_secret";
    pub const SECOND_BEFORE_ATTACH: &str = "second_before_attach";
    pub const SECOND_BEFORE_PUBLISH: &str = "second_before_publish";
    pub const SECOND_AFTER_PUBLISH: &str = "second_after_publish";

    // Reverse link
    pub const REVERSE_BEFORE_ATTACH: &str = "reverse_before_attach";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[
            FIRST_AFTER_PROVISION,
            FIRST_AFTER_SECRET,
            FIRST_AFTER_GRANT,
            FIRST_BEFORE_PUBLISH,
            FIRST_AFTER_PUBLISH,
            SECOND_AFTER_SECRET,
            SECOND_BEFORE_ATTACH,
            SECOND_BEFORE_PUBLISH,
            SECOND_AFTER_PUBLISH,
            REVERSE_BEFORE_ATTACH,
        ]
    }
}
