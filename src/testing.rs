use std::cell::Cell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use crate::session::Transport;
use crate::types::{Family, Ttl};
use crate::utils;

/// What the fake hands back on the next read.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Scripted {
    /// An echo reply mirroring the last request written.
    EchoReply,
    /// The last request written, unchanged.
    LoopedBackRequest,
    /// An echo reply whose checksum does not verify.
    CorruptedReply,
    /// A bare message of the given type and code.
    Message(u8, u8),
    Error(ErrorKind),
}

/// In-memory [`Transport`] that records what is written and replays a script
/// of reads. Once the script runs out, reads block for the armed timeout and
/// then fail with `WouldBlock` like a real socket.
#[derive(Debug)]
pub(crate) struct FakeTransport {
    family: Family,
    peer: IpAddr,
    script: VecDeque<Scripted>,
    send_errors: VecDeque<io::Error>,
    short_writes: bool,
    reject_ttl: bool,
    applied_ttl: Rc<Cell<Option<Ttl>>>,
    sent: Vec<Vec<u8>>,
    send_attempts: usize,
    read_timeout: Option<Duration>,
    read_timeouts: Vec<Duration>,
}

impl FakeTransport {
    pub(crate) fn new(family: Family, script: impl IntoIterator<Item = Scripted>) -> Self {
        let peer = match family {
            Family::V4 => IpAddr::V4(Ipv4Addr::LOCALHOST),
            Family::V6 => IpAddr::V6(Ipv6Addr::LOCALHOST),
        };
        Self {
            family,
            peer,
            script: script.into_iter().collect(),
            send_errors: VecDeque::new(),
            short_writes: false,
            reject_ttl: false,
            applied_ttl: Rc::default(),
            sent: Vec::new(),
            send_attempts: 0,
            read_timeout: None,
            read_timeouts: Vec::new(),
        }
    }

    /// A transport that never receives anything.
    pub(crate) fn silent(family: Family) -> Self {
        Self::new(family, Vec::new())
    }

    pub(crate) fn with_peer(mut self, peer: IpAddr) -> Self {
        self.peer = peer;
        self
    }

    /// Errors returned by the first writes, in order.
    pub(crate) fn with_send_errors(mut self, errors: impl IntoIterator<Item = io::Error>) -> Self {
        self.send_errors = errors.into_iter().collect();
        self
    }

    pub(crate) fn with_short_writes(mut self) -> Self {
        self.short_writes = true;
        self
    }

    pub(crate) fn rejecting_ttl(mut self) -> Self {
        self.reject_ttl = true;
        self
    }

    /// Shares the TTL slot so it can be inspected after the transport is gone.
    pub(crate) fn with_ttl_probe(mut self, probe: Rc<Cell<Option<Ttl>>>) -> Self {
        self.applied_ttl = probe;
        self
    }

    pub(crate) fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub(crate) fn send_attempts(&self) -> usize {
        self.send_attempts
    }

    pub(crate) fn read_timeouts(&self) -> &[Duration] {
        &self.read_timeouts
    }

    fn last_sent(&self) -> Vec<u8> {
        self.sent.last().cloned().unwrap_or_else(|| vec![0; 8])
    }

    fn reply(&self) -> Vec<u8> {
        let mut message = self.last_sent();
        message[0] = match self.family {
            Family::V4 => 0,
            Family::V6 => 129,
        };
        self.seal(message)
    }

    fn seal(&self, mut message: Vec<u8>) -> Vec<u8> {
        let checksum = utils::calculate_checksum(&message);
        message[2..4].copy_from_slice(&checksum.to_be_bytes());
        message
    }

    /// Adds the IP header an IPv4 raw socket would deliver.
    fn frame(&self, message: Vec<u8>) -> Vec<u8> {
        match self.family {
            Family::V4 => {
                let total = ((20 + message.len()) as u16).to_be_bytes();
                let mut packet = vec![
                    0x45, 0, total[0], total[1], 0, 0, 0, 0, 64, 1, 0, 0, 127, 0, 0, 1, 127, 0,
                    0, 1,
                ];
                packet.extend(message);
                packet
            }
            Family::V6 => message,
        }
    }
}

impl Transport for FakeTransport {
    fn family(&self) -> Family {
        self.family
    }

    fn set_ttl(&mut self, ttl: Ttl) -> io::Result<()> {
        if self.reject_ttl {
            return Err(io::Error::from(ErrorKind::InvalidInput));
        }
        self.applied_ttl.set(Some(ttl));
        Ok(())
    }

    fn send_to(&mut self, buf: &[u8], _dst: IpAddr) -> io::Result<usize> {
        self.send_attempts += 1;
        if let Some(e) = self.send_errors.pop_front() {
            return Err(e);
        }
        self.sent.push(buf.to_vec());
        if self.short_writes {
            Ok(buf.len() / 2)
        } else {
            Ok(buf.len())
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.read_timeout = Some(timeout);
        self.read_timeouts.push(timeout);
        Ok(())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, Option<IpAddr>)> {
        let message = match self.script.pop_front() {
            Some(Scripted::EchoReply) => self.reply(),
            Some(Scripted::LoopedBackRequest) => self.last_sent(),
            Some(Scripted::CorruptedReply) => {
                let mut message = self.reply();
                message[2] ^= 0xff;
                message
            }
            Some(Scripted::Message(icmp_type, code)) => {
                self.seal(vec![icmp_type, code, 0, 0, 0, 0, 0, 0])
            }
            Some(Scripted::Error(kind)) => return Err(io::Error::from(kind)),
            None => {
                if let Some(timeout) = self.read_timeout {
                    thread::sleep(timeout);
                }
                return Err(io::Error::from(ErrorKind::WouldBlock));
            }
        };

        let packet = self.frame(message);
        let n = packet.len().min(buf.len());
        buf[..n].copy_from_slice(&packet[..n]);
        Ok((n, Some(self.peer)))
    }
}
