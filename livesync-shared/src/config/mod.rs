//! # Configuration
//!
//! Layered configuration shared by the server and the CLI.

pub mod server;

pub use server::{
    AuthConfig, Config, ConfigError, CorsConfig, DatabaseConfig, FeedConfig, LogFormat,
    LoggingConfig, ServerConfig, SyncConfig,
};
