//! Admin client that keeps a local view of a PC fleet in sync with the
//! control server's real-time event stream.

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod net;
pub mod protocol;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod web;

pub use client::AdminClient;
pub use commands::{CommandError, CommandSender};
pub use config::AppConfig;
pub use connection::{ConnectionManager, ReconnectPolicy};
pub use store::FleetSnapshot;
pub use types::{ConnectionState, EntityStatus, ManagedEntity, StaleFieldPolicy};
