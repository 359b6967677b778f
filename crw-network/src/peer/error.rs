use thiserror::Error;

/// Why a peer session failed or was closed.
///
/// Mirrors the failure semantics from the wire protocol: parse/protocol
/// violations disconnect with a reason, transient I/O closes for the
/// caller to decide whether to reconnect, and a context-free-invalid
/// block or transaction bans the peer for the rest of the session.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("peer did not complete the handshake within the timeout")]
    HandshakeTimeout,

    #[error("peer sent an unexpected message during the handshake: {0}")]
    UnexpectedDuringHandshake(&'static str),

    #[error("peer's protocol version {0:?} is below the minimum accepted version")]
    ObsoleteVersion(crate::protocol::external::ProtocolVersion),

    #[error("peer connected to itself (matching nonce)")]
    SelfConnect,

    #[error(transparent)]
    Serialization(#[from] crw_chain::SerializationError),

    #[error("peer's unsolicited inv queue overflowed")]
    InvOverflow,

    #[error("peer sent a block that was never requested")]
    UnrequestedBlock,

    #[error("peer supplied an invalid block or transaction: {0}")]
    Banned(String),

    #[error("the rest of the node is unavailable: {0}")]
    Service(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
