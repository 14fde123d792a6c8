use std::{borrow::Cow, fmt::Display, net::IpAddr, time::Duration};

use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};

use crate::error::PingError;

/// The address family an attempt runs over, selected by the caller rather than
/// inferred from the resolved address.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Family {
    #[default]
    V4,
    V6,
}

impl Family {
    pub(crate) fn protocol(&self) -> IpNextHeaderProtocol {
        match self {
            Family::V4 => IpNextHeaderProtocols::Icmp,
            Family::V6 => IpNextHeaderProtocols::Icmpv6,
        }
    }

    /// IANA protocol number of the family's ICMP flavour.
    pub fn protocol_number(&self) -> u8 {
        self.protocol().0
    }

    pub fn matches(&self, addr: &IpAddr) -> bool {
        matches!(
            (self, addr),
            (Family::V4, IpAddr::V4(_)) | (Family::V6, IpAddr::V6(_))
        )
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Family::V4 => Cow::Borrowed("ipv4"),
            Family::V6 => Cow::Borrowed("ipv6"),
        };
        write!(f, "{}", value)
    }
}

/// Hop limit applied to the session: IP_TTL for IPv4, the unicast hop limit
/// for IPv6.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Ttl(u8);

impl Ttl {
    pub const DEFAULT: Ttl = Ttl(60);

    /// Zero means "unset" and is normalized to [`Ttl::DEFAULT`].
    pub fn new(value: u8) -> Self {
        if value == 0 { Self::DEFAULT } else { Self(value) }
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for Ttl {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl Display for Ttl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the echo sequence number evolves between attempts.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SequencePolicy {
    /// Every request carries the same sequence number.
    Fixed(u16),
    /// Starts at 1 and wraps around after `u16::MAX`.
    Incrementing,
}

impl Default for SequencePolicy {
    fn default() -> Self {
        SequencePolicy::Fixed(1)
    }
}

/// Running totals across every attempt of a [`crate::Pinger`].
///
/// Both counters start at zero and only ever grow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PingCounters {
    packets_sent: u64,
    packets_received: u64,
}

impl PingCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    pub(crate) fn record_sent(&mut self) {
        self.packets_sent += 1;
    }

    pub(crate) fn record_received(&mut self) {
        self.packets_received += 1;
    }

    /// Cumulative loss as a percentage of everything sent so far.
    pub fn loss_percent(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        let lost = self.packets_sent as f64 - self.packets_received as f64;
        lost / self.packets_sent as f64 * 100.0
    }
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub struct PingResult {
    host: String,
    destination: Option<IpAddr>,
    sequence: u16,
    outcome: Result<Duration, PingError>,
    loss_percent: Option<f64>,
}

impl PingResult {
    pub(crate) fn new(
        host: impl Into<String>,
        destination: Option<IpAddr>,
        sequence: u16,
        outcome: Result<Duration, PingError>,
        loss_percent: Option<f64>,
    ) -> Self {
        Self {
            host: host.into(),
            destination,
            sequence,
            outcome,
            loss_percent,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn destination(&self) -> Option<IpAddr> {
        self.destination
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn round_trip_time(&self) -> Option<Duration> {
        self.outcome.as_ref().ok().copied()
    }

    pub fn error(&self) -> Option<&PingError> {
        self.outcome.as_ref().err()
    }

    /// Only present once an attempt got as far as classifying a reply.
    pub fn loss_percent(&self) -> Option<f64> {
        self.loss_percent
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn into_outcome(self) -> Result<Duration, PingError> {
        self.outcome
    }
}

impl Display for PingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "host={}", self.host)?;
        if let Some(destination) = self.destination {
            write!(f, " ip={}", destination)?;
        }
        match &self.outcome {
            Ok(rtt) => write!(f, " RTT={:?}", rtt)?,
            Err(e) => write!(f, " error={}", e)?,
        }
        if let Some(loss) = self.loss_percent {
            write!(f, " Loss={:.1}%", loss)?;
        }
        Ok(())
    }
}
