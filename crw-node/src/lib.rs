//! Wires one chain engine to N peer sessions: the binary crate that turns
//! `crw-chain`/`crw-consensus`/`crw-state`/`crw-network` into a running node.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod error;
pub mod genesis;
pub mod service;

pub use config::Config;
pub use error::NodeError;
pub use service::NodeService;
