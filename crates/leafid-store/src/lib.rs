//! LeafID Store
//!
//! Plant metadata and prediction history persistence.
//!
//! - [`plant_store`]: the read-only label → [`PlantRecord`] lookup used on the
//!   serving path, backed by SQLite or by memory
//! - [`admin`]: offline schema creation, seeding, import and label coverage
//! - [`history`]: append-only log of past identifications
//!
//! [`PlantRecord`]: leafid_core::PlantRecord

pub mod admin;
pub mod history;
pub mod plant_store;

pub use admin::{
    default_records, import_records, initialize_database, load_records, missing_labels,
    seed_defaults,
};
pub use history::HistoryStore;
pub use plant_store::{MemoryPlantStore, PlantStore, SqlitePlantStore};

use leafid_core::Error;

/// Map a SQLite failure into a store error with some context
pub(crate) fn db_error(context: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::store(format!("{}: {}", context, e))
}
