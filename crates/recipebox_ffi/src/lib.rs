//! Flutter bridge for the recipe store.

pub mod api;
