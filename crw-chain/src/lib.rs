//! Core consensus data structures: hashes, scripts' container types,
//! transactions, blocks, amounts, and network parameters.
//!
//! This crate has no knowledge of script execution, the UTXO set, or the
//! chain engine's validation rules -- it only defines the wire formats and
//! invariants those higher-level crates build on.

pub mod amount;
pub mod block;
mod cached;
pub mod compactint;
pub mod fmt;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use serialization::{BitcoinDeserialize, BitcoinDeserializeInto, BitcoinSerialize, SerializationError};
