use std::io::{self, ErrorKind};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::PingError;
use crate::icmp::{self, EchoMessage, IcmpPacketError, IcmpType};
use crate::session::Transport;
use crate::types::{Family, PingCounters};

/// Room for one unfragmented, Ethernet-MTU sized packet. Anything longer is
/// truncated by the read.
pub(crate) const RECV_BUFFER_SIZE: usize = 1500;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends `request` to `destination` and waits up to `timeout` for the reply.
///
/// `packets_sent` is bumped once the request is on the wire and
/// `packets_received` once an echo reply comes back. Returns the round trip
/// time measured from just before the write to the moment the reply was read.
pub fn send_and_await<T: Transport + ?Sized>(
    transport: &mut T,
    counters: &mut PingCounters,
    destination: IpAddr,
    request: &EchoMessage,
    timeout: Duration,
) -> Result<Duration, PingError> {
    let family = transport.family();
    let bytes = request.to_bytes().map_err(PingError::Encode)?;

    debug!("Sending {} to {}", request, destination);
    let start = Instant::now();
    send_retrying(transport, &bytes, destination)?;
    counters.record_sent();

    let deadline = Instant::now() + timeout;
    transport
        .set_read_timeout(timeout)
        .map_err(PingError::Receive)?;

    let mut buf = [0u8; RECV_BUFFER_SIZE];
    loop {
        let (n, peer) = match transport.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if is_timeout(&e) => return Err(PingError::Timeout(timeout)),
            Err(e) => return Err(PingError::Receive(e)),
        };
        let rtt = start.elapsed();

        let reply = parse_reply(family, &buf[..n]).map_err(PingError::Decode)?;
        debug!("Received {} from {:?} after {:?}", reply, peer, rtt);

        match reply.icmp_type() {
            IcmpType::EchoReply => {
                counters.record_received();
                return Ok(rtt);
            }
            // Pinging a local address hands our own request back to a raw socket.
            IcmpType::EchoRequest if reply.identifier() == request.identifier() => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(PingError::Timeout(timeout));
                }
                transport
                    .set_read_timeout(remaining)
                    .map_err(PingError::Receive)?;
            }
            icmp_type => {
                return Err(PingError::UnexpectedReply {
                    icmp_type,
                    code: reply.code(),
                    peer,
                });
            }
        }
    }
}

/// Writes the whole request, spinning on `ENOBUFS` with no delay and no cap.
///
/// Under sustained buffer exhaustion this never returns; a backoff would be
/// the place to harden it.
fn send_retrying<T: Transport + ?Sized>(
    transport: &mut T,
    bytes: &[u8],
    destination: IpAddr,
) -> Result<(), PingError> {
    let mut retries: u64 = 0;
    let written = loop {
        match transport.send_to(bytes, destination) {
            Ok(n) => break n,
            Err(e) if is_send_buffer_exhausted(&e) => retries += 1,
            Err(e) => return Err(PingError::Send(destination, e)),
        }
    };
    if retries > 0 {
        debug!("Send buffer exhausted, request went out after {} retries", retries);
    }

    if written != bytes.len() {
        return Err(PingError::Send(
            destination,
            io::Error::new(
                ErrorKind::WriteZero,
                format!("wrote {} of {} bytes", written, bytes.len()),
            ),
        ));
    }
    Ok(())
}

fn parse_reply(family: Family, bytes: &[u8]) -> Result<EchoMessage, IcmpPacketError> {
    match family {
        Family::V4 => EchoMessage::parse(family, icmp::strip_ipv4_header(bytes)?),
        Family::V6 => EchoMessage::parse(family, bytes),
    }
}

fn is_send_buffer_exhausted(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ENOBUFS)
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
