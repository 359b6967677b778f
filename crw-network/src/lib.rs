//! The wire protocol and peer session state machine.
//!
//! This crate knows nothing about consensus rules or the UTXO set: a peer
//! session is generic over a [`tower::Service`] speaking
//! [`protocol::internal::Request`]/[`protocol::internal::Response`], and it
//! is `crw-node` that wires a concrete chain engine and store in to answer
//! those requests.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod constants;
pub mod meta_addr;
pub mod peer;
pub mod protocol;

pub use config::Config;
pub use meta_addr::MetaAddr;
