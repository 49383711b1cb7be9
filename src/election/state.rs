//! Election State Machine
//!
//! - States are explicit and enumerable
//! - Transitions consume the current state and either return the next
//!   state or an `IllegalTransition` error
//! - `ElectionConflict` is terminal: nothing leaves it without an operator
//!
//! Crash semantics:
//! - Unassigned, ClaimingFirst, ClaimingSecond: claim forgotten, the next
//!   pass elects again from the directory
//! - First, Second: role preserved by the published marker

use serde::Serialize;

use crate::directory::RoleMarker;
use crate::errors::{BootstrapError, BootstrapResult};

/// Role election state of the local node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state")]
pub enum ElectionState {
    /// No role yet, no claim in progress
    #[default]
    Unassigned,

    /// No First record was visible; claiming the first master role
    ClaimingFirst,

    /// Exactly one First record was visible; claiming the second master role
    ClaimingSecond {
        /// Name of the first master being joined
        first: String,
    },

    /// First master, marker published
    First,

    /// Second master, marker published
    Second,

    /// More than one node claims `role` (terminal)
    ElectionConflict {
        role: RoleMarker,
        claimants: Vec<String>,
    },
}

impl ElectionState {
    /// State for a node that already holds `role`.
    pub fn resume(role: Option<RoleMarker>) -> Self {
        match role {
            Some(RoleMarker::First) => Self::First,
            Some(RoleMarker::Second) => Self::Second,
            Some(RoleMarker::None) | None => Self::Unassigned,
        }
    }

    /// Get the state name for observability.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Unassigned => "Unassigned",
            Self::ClaimingFirst => "ClaimingFirst",
            Self::ClaimingSecond { .. } => "ClaimingSecond",
            Self::First => "First",
            Self::Second => "Second",
            Self::ElectionConflict { .. } => "ElectionConflict",
        }
    }

    /// Finalized role, if any.
    pub fn role(&self) -> Option<RoleMarker> {
        match self {
            Self::First => Some(RoleMarker::First),
            Self::Second => Some(RoleMarker::Second),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ElectionConflict { .. })
    }

    /// Unassigned → ClaimingFirst
    pub fn claim_first(self) -> BootstrapResult<Self> {
        match self {
            Self::Unassigned => Ok(Self::ClaimingFirst),
            _ => Err(BootstrapError::illegal_transition(
                self.state_name(),
                "ClaimingFirst",
            )),
        }
    }

    /// Unassigned → ClaimingSecond
    pub fn claim_second(self, first: impl Into<String>) -> BootstrapResult<Self> {
        match self {
            Self::Unassigned => Ok(Self::ClaimingSecond {
                first: first.into(),
            }),
            _ => Err(BootstrapError::illegal_transition(
                self.state_name(),
                "ClaimingSecond",
            )),
        }
    }

    /// ClaimingFirst → First, ClaimingSecond → Second
    ///
    /// Only after the role marker has been published.
    pub fn confirm(self) -> BootstrapResult<Self> {
        match self {
            Self::ClaimingFirst => Ok(Self::First),
            Self::ClaimingSecond { .. } => Ok(Self::Second),
            _ => Err(BootstrapError::illegal_transition(
                self.state_name(),
                "First|Second",
            )),
        }
    }

    /// ClaimingFirst | ClaimingSecond → Unassigned
    ///
    /// A claim step failed before the marker was published.
    pub fn abandon(self) -> BootstrapResult<Self> {
        match self {
            Self::ClaimingFirst | Self::ClaimingSecond { .. } => Ok(Self::Unassigned),
            _ => Err(BootstrapError::illegal_transition(
                self.state_name(),
                "Unassigned",
            )),
        }
    }

    /// Any non-terminal state → ElectionConflict
    pub fn conflict(self, role: RoleMarker, claimants: Vec<String>) -> BootstrapResult<Self> {
        match self {
            Self::ElectionConflict { .. } => Err(BootstrapError::illegal_transition(
                self.state_name(),
                "ElectionConflict",
            )),
            _ => Ok(Self::ElectionConflict { role, claimants }),
        }
    }
}
