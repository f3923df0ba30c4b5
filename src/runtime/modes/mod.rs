//! Mode routing
//!
//! - Server mode (HTTP server, the default)
//! - `migrate`: apply pending migrations and exit
//! - `generate-config`: write a sample `config.toml`

pub mod cli;
pub mod server;

pub use cli::{generate_config, run_migrate};
pub use server::{configure_app, run_server};
