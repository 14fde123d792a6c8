use std::io;
use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

use crate::host::ResolveError;
use crate::icmp::{IcmpPacketError, IcmpType};
use crate::session::SessionError;
use crate::types::Ttl;

/// Everything that can end a single ping attempt.
///
/// A send that fails only because the socket buffer is full never surfaces
/// here: it is retried until it goes through or fails differently.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PingError {
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolveError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("failed to set ttl/hop limit to {0}: {1}")]
    SocketOption(Ttl, #[source] io::Error),
    #[error("failed to encode echo request: {0}")]
    Encode(#[source] IcmpPacketError),
    #[error("failed to send echo request to {0}: {1}")]
    Send(IpAddr, #[source] io::Error),
    #[error("no echo reply within {0:?}")]
    Timeout(Duration),
    #[error("failed to read echo reply: {0}")]
    Receive(#[source] io::Error),
    #[error("failed to decode reply: {0}")]
    Decode(#[source] IcmpPacketError),
    #[error("got {icmp_type} (code {code}) from {}; want echo reply", display_peer(.peer))]
    UnexpectedReply {
        icmp_type: IcmpType,
        code: u8,
        peer: Option<IpAddr>,
    },
}

fn display_peer(peer: &Option<IpAddr>) -> String {
    peer.map_or_else(|| "unknown".to_owned(), |addr| addr.to_string())
}

impl PingError {
    /// Errors that say nothing about the network path and will repeat on
    /// every attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PingError::Resolution(_) | PingError::Session(_) | PingError::Encode(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PingError::Timeout(_))
    }
}
