//! Event aggregation and lazy keyed caching.
//!
//! # Responsibility
//! - Expose the single facade the UI talks to ([`Store`]).
//! - Keep cache policy ([`cache`]) and link bookkeeping ([`rebind`])
//!   separate from the facade.
//!
//! # Invariants
//! - Only `Store` methods mutate the comment cache and the link table.

pub mod aggregator;
pub mod cache;
pub mod error;
pub mod lookup;
pub mod rebind;
pub mod tasks;

pub use aggregator::Store;
