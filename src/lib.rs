mod echo;
mod error;
mod host;
mod icmp;
mod session;
mod types;
mod utils;

#[cfg(test)]
mod testing;

use std::net::IpAddr;
use std::time::Duration;

use log::debug;
use pnet::datalink::{self, NetworkInterface};

pub use crate::echo::{DEFAULT_TIMEOUT, send_and_await};
pub use crate::error::PingError;
pub use crate::host::{ResolveError, resolve};
pub use crate::icmp::{EchoMessage, IcmpPacketError, IcmpType};
pub use crate::session::{EchoSession, SessionError, Transport};
pub use crate::types::{Family, PingCounters, PingResult, SequencePolicy, Ttl};

/// Data carried by every echo request.
pub const ECHO_PAYLOAD: &[u8] = b"echo requests";

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum InterfaceError {
    #[error("specified network interface not found")]
    InterfaceNotFound,
    #[error("interface `{0}` has no {1} address")]
    AddressNotFound(String, Family),
}

pub fn get_network_interface(name: &str) -> Result<NetworkInterface, InterfaceError> {
    datalink::interfaces()
        .into_iter()
        .find(|iface: &NetworkInterface| iface.name == name)
        .ok_or(InterfaceError::InterfaceNotFound)
}

/// Address on the named interface to bind sessions of `family` to.
pub fn interface_listen_addr(name: &str, family: Family) -> Result<IpAddr, InterfaceError> {
    let interface = get_network_interface(name)?;
    host::listen_addr_for_interface(&interface, family)
        .ok_or_else(|| InterfaceError::AddressNotFound(name.to_owned(), family))
}

#[derive(Debug, Clone)]
pub struct PingConfig {
    pub family: Family,
    pub ttl: Ttl,
    /// `None` listens on all interfaces.
    pub listen_addr: Option<IpAddr>,
    pub timeout: Duration,
    pub interval: Duration,
    pub identifier: u16,
    pub sequence: SequencePolicy,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            family: Family::default(),
            ttl: Ttl::default(),
            listen_addr: None,
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
            identifier: (std::process::id() & 0xffff) as u16,
            sequence: SequencePolicy::default(),
        }
    }
}

/// Runs ping attempts one at a time and keeps the running send/receive totals
/// they share.
#[derive(Debug)]
pub struct Pinger {
    config: PingConfig,
    counters: PingCounters,
    next_sequence: u16,
}

impl Pinger {
    pub fn new(config: PingConfig) -> Self {
        Self {
            config,
            counters: PingCounters::new(),
            next_sequence: 1,
        }
    }

    pub fn config(&self) -> &PingConfig {
        &self.config
    }

    pub fn counters(&self) -> &PingCounters {
        &self.counters
    }

    /// One attempt over a freshly opened raw socket.
    pub fn ping(&mut self, target: &str) -> PingResult {
        self.ping_with(target, EchoSession::open)
    }

    /// One attempt over whatever transport `open` produces.
    ///
    /// The target is resolved first, so nothing is opened or sent for a target
    /// that does not resolve. The transport is dropped before this returns.
    pub fn ping_with<T, F>(&mut self, target: &str, open: F) -> PingResult
    where
        T: Transport,
        F: FnOnce(Family, Option<IpAddr>) -> Result<T, SessionError>,
    {
        let sequence = self.sequence();

        let destination = match resolve(target, self.config.family) {
            Ok(addr) => addr,
            Err(e) => return PingResult::new(target, None, sequence, Err(e.into()), None),
        };

        let outcome = self.attempt(destination, sequence, open);

        let loss_percent = match &outcome {
            Ok(_) | Err(PingError::UnexpectedReply { .. }) => Some(self.counters.loss_percent()),
            Err(_) => None,
        };
        PingResult::new(target, Some(destination), sequence, outcome, loss_percent)
    }

    fn attempt<T, F>(
        &mut self,
        destination: IpAddr,
        sequence: u16,
        open: F,
    ) -> Result<Duration, PingError>
    where
        T: Transport,
        F: FnOnce(Family, Option<IpAddr>) -> Result<T, SessionError>,
    {
        let mut session = open(self.config.family, self.config.listen_addr)?;

        let ttl = self.config.ttl;
        session
            .set_ttl(ttl)
            .map_err(|e| PingError::SocketOption(ttl, e))?;
        debug!("Set {} ttl/hop limit to {}", self.config.family, ttl);

        let request = EchoMessage::request(
            self.config.family,
            self.config.identifier,
            sequence,
            ECHO_PAYLOAD,
        );
        send_and_await(
            &mut session,
            &mut self.counters,
            destination,
            &request,
            self.config.timeout,
        )
    }

    fn sequence(&mut self) -> u16 {
        match self.config.sequence {
            SequencePolicy::Fixed(sequence) => sequence,
            SequencePolicy::Incrementing => {
                let sequence = self.next_sequence;
                self.next_sequence = self.next_sequence.wrapping_add(1);
                sequence
            }
        }
    }
}
