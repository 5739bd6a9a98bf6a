//! Clipscope Server
//!
//! HTTP surface over a single [`clipscope_models::Workbench`]: image upload,
//! class-name and prompt editing, checkpoint activation, sequential
//! selection, and the two prediction endpoints. Also hosts the built
//! front-end and a Prometheus scrape endpoint.

pub mod cli;
pub mod config;
pub mod server;
pub mod state;

pub use cli::Cli;
pub use config::ServerConfig;
pub use server::{build_app, run_server};
pub use state::{build_workbench, AppState};
