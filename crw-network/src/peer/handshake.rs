//! `Connecting -> Handshaking`: dial a peer and perform the `version`/`verack`
//! exchange.

use std::io;
use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use crw_chain::{block, parameters::Network};

use crate::constants;
use crate::protocol::external::{Codec, Message, Nonce, PeerServices, Version};

use super::error::PeerError;

/// A handshaken transport: a framed TCP stream speaking the negotiated
/// [`Codec`].
pub type Transport = Framed<TcpStream, Codec>;

/// The capability set this node offers and announces in its own `version`
/// message.
#[derive(Clone, Debug)]
pub struct HandshakeConfig {
    pub network: Network,
    pub our_services: PeerServices,
    pub user_agent: String,
    pub relay: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        HandshakeConfig {
            network: Network::Mainnet,
            our_services: PeerServices::NODE_NETWORK,
            user_agent: constants::USER_AGENT.to_owned(),
            relay: true,
        }
    }
}

/// Dial `addr` and perform the handshake, returning the ready-to-drive
/// transport and the services the peer advertised.
///
/// Bounded by [`constants::HANDSHAKE_TIMEOUT`]; anything that doesn't
/// complete the exchange in time becomes [`PeerError::HandshakeTimeout`].
pub async fn connect(
    addr: SocketAddr,
    config: &HandshakeConfig,
    best_block: block::Height,
) -> Result<(Transport, PeerServices), PeerError> {
    let stream = TcpStream::connect(addr).await.map_err(PeerError::Connect)?;
    let our_addr = stream.local_addr().map_err(PeerError::Connect)?;

    let codec = Codec::builder().for_network(config.network).finish();
    let transport = Framed::new(stream, codec);

    let nonce = Nonce(rand::thread_rng().gen());
    let version = Message::Version(Version::new(
        constants::CURRENT_VERSION,
        addr,
        PeerServices::NODE_NETWORK,
        config.our_services,
        our_addr,
        nonce,
        config.user_agent.clone(),
        best_block,
        config.relay,
    ));

    timeout(constants::HANDSHAKE_TIMEOUT, negotiate(transport, version, nonce))
        .await
        .map_err(|_| PeerError::HandshakeTimeout)?
}

async fn negotiate(
    mut transport: Transport,
    our_version: Message,
    our_nonce: Nonce,
) -> Result<(Transport, PeerServices), PeerError> {
    transport.send(our_version).await?;

    let remote_version = match transport.next().await {
        Some(Ok(Message::Version(version))) => version,
        Some(Ok(_)) => return Err(PeerError::UnexpectedDuringHandshake("expected version")),
        Some(Err(error)) => return Err(error.into()),
        None => return Err(closed_during_handshake()),
    };

    if remote_version.nonce == our_nonce {
        return Err(PeerError::SelfConnect);
    }
    if remote_version.version < constants::MIN_ACCEPTED_VERSION {
        return Err(PeerError::ObsoleteVersion(remote_version.version));
    }

    transport.send(Message::Verack).await?;

    // Some peers interleave `ping`/`addr` before their `verack`; only treat
    // an out-of-sequence `version` as a protocol violation.
    loop {
        match transport.next().await {
            Some(Ok(Message::Verack)) => break,
            Some(Ok(Message::Version(_))) => {
                return Err(PeerError::UnexpectedDuringHandshake("duplicate version"))
            }
            Some(Ok(_)) => continue,
            Some(Err(error)) => return Err(error.into()),
            None => return Err(closed_during_handshake()),
        }
    }

    transport.codec_mut().reconfigure_version(remote_version.version.min(constants::CURRENT_VERSION));

    Ok((transport, remote_version.services))
}

fn closed_during_handshake() -> PeerError {
    PeerError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "connection closed during handshake",
    ))
}
