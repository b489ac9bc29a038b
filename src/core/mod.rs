//! Shared primitives: errors, configuration, clock, SQLite access, the
//! per-module lock registry and the spec document store.

pub mod config;
pub mod db;
pub mod error;
pub mod locks;
pub mod store;
pub mod time;
