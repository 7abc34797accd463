//! Plain data model for store records and session state.
//!
//! # Responsibility
//! - Define the shapes the store hands to the UI layer.
//! - Keep every value owned and detached from live collections.
//!
//! # Invariants
//! - Reads return clones; mutating a returned value never touches a source.

pub mod record;
pub mod session;
