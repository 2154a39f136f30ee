#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.
#![allow(clippy::missing_errors_doc)]

//! LiveSync HTTP server: message store, bulk snapshots, and per-conversation
//! change feeds over server-sent events.

pub mod app_state;
pub mod commands;
pub mod db;
pub mod feed;
pub mod handlers;
pub mod http;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod store;
mod tracer;
