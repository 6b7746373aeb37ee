pub mod app;
pub mod routes;
pub mod static_files;
pub mod views;

pub use app::*;
