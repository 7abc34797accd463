//! Observable data sources the store aggregates.
//!
//! # Responsibility
//! - Wrap repositories in stateful, observable sources.
//! - Report every membership or content change as a lifecycle event.
//!
//! # Invariants
//! - Sources are single-threaded (`Rc`/`RefCell`) and never emit while
//!   holding an internal borrow.

pub mod collection;
pub mod event;
pub mod session;
