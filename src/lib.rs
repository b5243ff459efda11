//! superchatd - multi-transport, multi-tenant chat and forum server.
//!
//! The library crate exists so integration tests (and embedders) can run
//! the full server in-process with an explicit [`config::Config`]; the
//! `superchatd` binary is a thin wrapper over [`server::Server`].

pub mod broker;
pub mod config;
pub mod directory;
pub mod dm;
pub mod error;
pub mod handlers;
pub mod http;
pub mod hub;
pub mod metrics;
pub mod network;
pub mod repo;
pub mod security;
pub mod server;
pub mod session;
pub mod sweeper;
pub mod telemetry;

pub use config::Config;
pub use hub::Hub;
pub use server::Server;
