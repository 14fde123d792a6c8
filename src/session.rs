use std::io::{self, ErrorKind};
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use log::debug;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thiserror::Error;

use crate::types::{Family, Ttl};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(
        "permission denied opening a raw {0} icmp socket: run as root or grant CAP_NET_RAW (e.g. `setcap cap_net_raw+ep <binary>`)"
    )]
    PermissionDenied(Family),
    #[error("failed to open a raw {0} icmp socket: {1}")]
    Open(Family, #[source] io::Error),
    #[error("failed to bind to {0}: {1}")]
    Bind(IpAddr, #[source] io::Error),
}

/// The operations the echo engine needs from an open session.
pub trait Transport {
    fn family(&self) -> Family;
    fn set_ttl(&mut self, ttl: Ttl) -> io::Result<()>;
    fn send_to(&mut self, buf: &[u8], dst: IpAddr) -> io::Result<usize>;
    /// Subsequent reads fail with `WouldBlock` or `TimedOut` once `timeout` elapses.
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, Option<IpAddr>)>;
}

/// A raw ICMP (IPv4) or ICMPv6 socket. The socket is closed when the session
/// is dropped.
#[derive(Debug)]
pub struct EchoSession {
    family: Family,
    socket: Socket,
}

impl EchoSession {
    pub fn open(family: Family, listen_addr: Option<IpAddr>) -> Result<Self, SessionError> {
        let (domain, protocol) = match family {
            Family::V4 => (Domain::IPV4, Protocol::ICMPV4),
            Family::V6 => (Domain::IPV6, Protocol::ICMPV6),
        };

        let socket = Socket::new(domain, Type::RAW, Some(protocol)).map_err(|e| {
            if e.kind() == ErrorKind::PermissionDenied {
                SessionError::PermissionDenied(family)
            } else {
                SessionError::Open(family, e)
            }
        })?;

        if let Some(addr) = listen_addr {
            socket
                .bind(&SockAddr::from(SocketAddr::new(addr, 0)))
                .map_err(|e| SessionError::Bind(addr, e))?;
        }

        debug!(
            "Opened {} icmp session (protocol={}, listen_addr={})",
            family,
            family.protocol_number(),
            listen_addr.map_or_else(|| "any".to_owned(), |addr| addr.to_string())
        );
        Ok(Self { family, socket })
    }
}

impl Drop for EchoSession {
    fn drop(&mut self) {
        debug!("Closing {} icmp session", self.family);
    }
}

impl Transport for EchoSession {
    fn family(&self) -> Family {
        self.family
    }

    fn set_ttl(&mut self, ttl: Ttl) -> io::Result<()> {
        match self.family {
            Family::V4 => self.socket.set_ttl(u32::from(ttl.as_u8())),
            Family::V6 => self.socket.set_unicast_hops_v6(u32::from(ttl.as_u8())),
        }
    }

    fn send_to(&mut self, buf: &[u8], dst: IpAddr) -> io::Result<usize> {
        self.socket.send_to(buf, &SockAddr::from(SocketAddr::new(dst, 0)))
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        // A zero timeout would mean "block forever" to the OS.
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(timeout))
    }

    // Safety: `recv_from` never writes uninitialised bytes into `buf`, so
    // viewing it as `[MaybeUninit<u8>]` is sound.
    #[allow(unsafe_code)]
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, Option<IpAddr>)> {
        let buf = unsafe { &mut *(std::ptr::from_mut::<[u8]>(buf) as *mut [MaybeUninit<u8>]) };
        let (size, addr) = self.socket.recv_from(buf)?;
        Ok((size, addr.as_socket().map(|sock_addr| sock_addr.ip())))
    }
}
