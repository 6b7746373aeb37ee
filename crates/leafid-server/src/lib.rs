//! LeafID Server
//!
//! Web front end for medicinal leaf identification: an upload form and a
//! webcam capture page, a JSON API, and the offline administration commands
//! of the `leafid` binary.

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod state;
pub mod uploads;

pub use config::ServerConfig;
pub use error::{ApiError, PageError};
pub use pipeline::{identify, ImagePayload};
pub use server::{build_app, run_server};
pub use state::{AppState, RequestSettings};
