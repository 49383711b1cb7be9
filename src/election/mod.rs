//! Role Election
//!
//! Self-election of the two masters through the peer directory:
//! - The first node to find no First record claims First
//! - The node that finds exactly one First record claims Second
//! - Finding more than one First record is a fatal conflict
//!
//! The directory is weakly consistent, so two nodes can both claim First.
//! That race is accepted and detected on later passes; it is never
//! prevented.

mod elector;
mod state;

pub use elector::{Election, RoleElector};
pub use state::ElectionState;
