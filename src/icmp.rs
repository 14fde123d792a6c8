use std::{borrow::Cow, fmt::Display};

use pnet::packet::icmp::IcmpTypes;
use pnet::packet::icmpv6::Icmpv6Types;
use thiserror::Error;

use crate::types::Family;
use crate::utils;

/// Type, code, checksum, identifier, sequence.
pub(crate) const HEADER_LEN: usize = 8;

/// Largest payload that still fits a single IPv4 datagram.
pub(crate) const MAX_PAYLOAD: usize = 65507;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum IcmpType {
    EchoRequest,
    EchoReply,
    Other(u8),
}

impl IcmpType {
    fn to_u8(self, family: Family) -> u8 {
        match (self, family) {
            (IcmpType::EchoRequest, Family::V4) => IcmpTypes::EchoRequest.0,
            (IcmpType::EchoReply, Family::V4) => IcmpTypes::EchoReply.0,
            (IcmpType::EchoRequest, Family::V6) => Icmpv6Types::EchoRequest.0,
            (IcmpType::EchoReply, Family::V6) => Icmpv6Types::EchoReply.0,
            (IcmpType::Other(n), _) => n,
        }
    }

    fn from_u8(value: u8, family: Family) -> Self {
        match family {
            Family::V4 if value == IcmpTypes::EchoRequest.0 => IcmpType::EchoRequest,
            Family::V4 if value == IcmpTypes::EchoReply.0 => IcmpType::EchoReply,
            Family::V6 if value == Icmpv6Types::EchoRequest.0 => IcmpType::EchoRequest,
            Family::V6 if value == Icmpv6Types::EchoReply.0 => IcmpType::EchoReply,
            _ => IcmpType::Other(value),
        }
    }
}

impl Display for IcmpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            IcmpType::EchoRequest => Cow::Borrowed("EchoRequest"),
            IcmpType::EchoReply => Cow::Borrowed("EchoReply"),
            IcmpType::Other(n) => Cow::Owned(format!("Other({})", n)),
        };
        write!(f, "{}", value)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IcmpPacketError {
    #[error("malformed icmp packet: {0}")]
    Malformed(Cow<'static, str>),
    #[error("checksum mismatch: expected: {0}, actual: {1}")]
    ChecksumMismatch(u16, u16),
    #[error("payload of {0} bytes does not fit in a single datagram")]
    PayloadTooLarge(usize),
}

/// An ICMP or ICMPv6 message laid out as an echo (identifier, sequence, data).
///
/// Non-echo types share the same first eight bytes, so any message can be
/// parsed into this shape for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoMessage {
    family: Family,
    icmp_type: IcmpType,
    code: u8,
    checksum: u16,
    identifier: u16,
    sequence: u16,
    payload: Vec<u8>,
}

impl Display for EchoMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Icmp(family={}, type={}, code={}, checksum={}, identifier={}, sequence={})",
            self.family, self.icmp_type, self.code, self.checksum, self.identifier, self.sequence,
        )
    }
}

impl EchoMessage {
    pub fn request(family: Family, identifier: u16, sequence: u16, payload: &[u8]) -> Self {
        Self {
            family,
            icmp_type: IcmpType::EchoRequest,
            code: 0,
            checksum: 0,
            identifier,
            sequence,
            payload: payload.to_vec(),
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn icmp_type(&self) -> IcmpType {
        self.icmp_type
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serializes the message with a freshly computed checksum.
    ///
    /// For ICMPv6 the kernel replaces the checksum with one that covers the
    /// pseudo header, so the value written here only matters for IPv4.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IcmpPacketError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(IcmpPacketError::PayloadTooLarge(self.payload.len()));
        }

        let ident_array = self.identifier.to_be_bytes();
        let seq_no_array = self.sequence.to_be_bytes();

        let mut v = Vec::with_capacity(HEADER_LEN + self.payload.len());
        v.extend([
            self.icmp_type.to_u8(self.family),
            self.code,
            0,
            0,
            ident_array[0],
            ident_array[1],
            seq_no_array[0],
            seq_no_array[1],
        ]);
        v.extend(&self.payload);

        let checksum = utils::calculate_checksum(&v);
        v[2..4].copy_from_slice(&checksum.to_be_bytes());
        Ok(v)
    }

    /// Parses an ICMP message (without any IP header) for the given family.
    pub fn parse(family: Family, bytes: &[u8]) -> Result<Self, IcmpPacketError> {
        if bytes.len() < HEADER_LEN {
            return Err(IcmpPacketError::Malformed(Cow::Owned(format!(
                "this icmp packet length is too short: {}",
                bytes.len()
            ))));
        }

        let checksum = u16::from_be_bytes([bytes[2], bytes[3]]);
        if family == Family::V4 {
            let calculated_checksum = utils::calculate_checksum(bytes);
            if checksum != calculated_checksum {
                return Err(IcmpPacketError::ChecksumMismatch(
                    checksum,
                    calculated_checksum,
                ));
            }
        }

        Ok(Self {
            family,
            icmp_type: IcmpType::from_u8(bytes[0], family),
            code: bytes[1],
            checksum,
            identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

/// IPv4 raw sockets deliver the IP header along with the ICMP message.
pub(crate) fn strip_ipv4_header(bytes: &[u8]) -> Result<&[u8], IcmpPacketError> {
    if bytes.len() < 20 {
        return Err(IcmpPacketError::Malformed(Cow::Owned(format!(
            "this ip packet length is too short: {}",
            bytes.len()
        ))));
    }
    if bytes[0] >> 4 != 4 {
        return Err(IcmpPacketError::Malformed(Cow::Owned(format!(
            "expected an ipv4 header, but got version {}",
            bytes[0] >> 4
        ))));
    }

    let ihl = (bytes[0] & 0b00001111) as usize;
    if ihl < 5 {
        return Err(IcmpPacketError::Malformed(Cow::Owned(format!(
            "ihl must be greater than or equal to 5, but got {}",
            ihl
        ))));
    }
    let header_length = ihl * 4;
    if bytes.len() < header_length {
        return Err(IcmpPacketError::Malformed(Cow::Borrowed(
            "ip header extends past the end of the packet",
        )));
    }
    Ok(&bytes[header_length..])
}
