//! HTTP service protected by the Daijie security filter.
//!
//! Reads `daijie.toml` for the server itself and a `.properties` file for
//! the `shiro.*` security keys, then assembles sessions, caches, realm and
//! filter chains in front of a small axum router.

pub mod assembly;
pub mod config;
pub mod filters;
pub mod handlers;
pub mod observability;
pub mod server;

pub use assembly::{AssemblyError, SecurityComponents, assemble, assemble_with};
pub use config::{AppConfig, LoggingConfig, SecurityConfig, ServerConfig};
pub use observability::init_tracing;
pub use server::{DaijieServer, ServerBuilder, build_app};
