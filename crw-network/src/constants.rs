//! Protocol constants shared by the codec, the handshake, and peer sessions.

use std::time::Duration;

use crate::protocol::external::ProtocolVersion;

/// The protocol version this node speaks when initiating a handshake.
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion(70015);

/// The minimum protocol version this node will accept a peer announcing.
///
/// Below this, a peer predates the witness-serialization rules the codec
/// and script engine assume.
pub const MIN_ACCEPTED_VERSION: ProtocolVersion = ProtocolVersion(70001);

/// This node's user agent string, sent in `version` messages.
pub const USER_AGENT: &str = "/crw:1.0.0-alpha.1/";

/// How long a session may spend in `Handshaking` before it is closed.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for a peer's `pong` before the session is considered
/// unresponsive.
pub const PING_TIMEOUT: Duration = Duration::from_secs(60);

/// How often an `Active` session pings its peer.
pub const PING_INTERVAL: Duration = Duration::from_secs(120);

/// How long a `getdata(block)` request may go unanswered before the
/// requesting session gives up and lets a different peer retry it.
pub const BLOCK_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// The maximum number of block locator hashes accepted in a `getheaders`
/// request; Bitcoin Core returns at most 2000 headers per response.
pub const MAX_HEADERS_PER_MESSAGE: usize = 2000;

/// The maximum size, in entries, of a session's unsolicited-`inv` queue
/// before it is considered to be flooding and disconnected.
pub const MAX_INV_QUEUE: usize = 50_000;

/// How many `getdata(block)` requests a session may have outstanding at once.
pub const MAX_IN_FLIGHT_BLOCK_REQUESTS: usize = 16;
