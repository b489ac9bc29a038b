//! Module specifications and their projection onto the live store.
//!
//! - [`types`]: the spec data model
//! - [`sync`]: validated, versioned spec mutations
//! - [`schema`]: derivation of the storage schema from a spec
//! - [`modeler`]: the storage boundary and its SQLite implementation
//! - [`driver`]: reconciliation plus registry bookkeeping

pub mod driver;
pub mod modeler;
pub mod schema;
pub mod sync;
pub mod types;
pub mod validate;
pub mod version;
