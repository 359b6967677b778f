//! The per-connection peer state machine: `Connecting -> Handshaking ->
//! Active -> Closed`.

mod error;
mod handshake;
mod session;

pub use error::PeerError;
pub use handshake::{connect, HandshakeConfig, Transport};
pub use session::{RequestedBlocks, Session};

use std::net::SocketAddr;

/// The lifecycle state of one peer connection, tracked only for diagnostics
/// -- the actual driving logic lives in [`handshake::connect`] and
/// [`Session::run`], which move through these states without ever
/// materializing a value in the intermediate ones.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    Connecting,
    Handshaking,
    Active,
    Closed,
}

/// Why a session ended, recorded for the caller that owns peer lifecycle
/// (reconnect policy, address-book scoring) to act on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClosedReason {
    /// The remote closed the TCP stream or a read/write failed.
    Io,
    /// The handshake did not complete within [`crate::constants::HANDSHAKE_TIMEOUT`].
    HandshakeTimeout,
    /// The peer sent a malformed message or violated the wire protocol.
    ProtocolViolation,
    /// The peer supplied a context-free-invalid block or transaction.
    Banned,
    /// The peer's unsolicited `inv` queue exceeded its bound.
    InvOverflow,
    /// The local side asked the session to shut down.
    Shutdown,
}

/// A connected peer's address and the services it claims to offer, learned
/// during the handshake.
#[derive(Copy, Clone, Debug)]
pub struct Connection {
    pub addr: SocketAddr,
    pub state: State,
}
