//! LeafID Core
//!
//! Core types shared across the LeafID components.
//!
//! This crate provides:
//! - Domain records for plants, predictions and the prediction history
//! - The error taxonomy used by the model loader, the metadata store and the
//!   request handler

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{
    CaptureSource, HistoryEntry, Identification, NewHistoryEntry, PlantLookup, PlantRecord,
    Prediction, ScoredLabel,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{Identification, PlantLookup, PlantRecord, Prediction};
}
