use std::io;
use std::net::{IpAddr, ToSocketAddrs};

use log::debug;
use pnet::datalink::NetworkInterface;
use thiserror::Error;

use crate::types::Family;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("target is empty")]
    Empty,
    #[error("`{0}` is not a valid ipv4 address")]
    InvalidLiteral(String),
    #[error("`{target}` is an {actual} address, but {expected} was requested")]
    FamilyMismatch {
        target: String,
        expected: Family,
        actual: Family,
    },
    #[error("failed to look up `{0}`: {1}")]
    Lookup(String, #[source] io::Error),
    #[error("`{0}` has no {1} address")]
    NoAddress(String, Family),
}

/// Resolves a hostname or address literal to an address of `family`.
pub fn resolve(target: &str, family: Family) -> Result<IpAddr, ResolveError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ResolveError::Empty);
    }

    if let Ok(addr) = target.parse::<IpAddr>() {
        return if family.matches(&addr) {
            Ok(addr)
        } else {
            Err(ResolveError::FamilyMismatch {
                target: target.to_owned(),
                expected: family,
                actual: family_of(&addr),
            })
        };
    }

    // A numeric dotted quad that failed to parse is a broken literal. Shorter
    // numeric forms like `127.1` go to the resolver.
    let numeric = target.chars().all(|c| c.is_ascii_digit() || c == '.');
    if numeric && target.split('.').count() == 4 {
        return Err(ResolveError::InvalidLiteral(target.to_owned()));
    }

    debug!("Resolving {} ({})", target, family);
    let addr = (target, 0)
        .to_socket_addrs()
        .map_err(|e| ResolveError::Lookup(target.to_owned(), e))?
        .map(|sock_addr| sock_addr.ip())
        .find(|addr| family.matches(addr))
        .ok_or_else(|| ResolveError::NoAddress(target.to_owned(), family))?;
    debug!("Resolved {} to {}", target, addr);

    Ok(addr)
}

fn family_of(addr: &IpAddr) -> Family {
    match addr {
        IpAddr::V4(_) => Family::V4,
        IpAddr::V6(_) => Family::V6,
    }
}

/// First address of `family` configured on `interface`, used as the session's
/// listen address.
pub(crate) fn listen_addr_for_interface(
    interface: &NetworkInterface,
    family: Family,
) -> Option<IpAddr> {
    first_of_family(interface.ips.iter().map(|ip_network| ip_network.ip()), family)
}

fn first_of_family(addrs: impl IntoIterator<Item = IpAddr>, family: Family) -> Option<IpAddr> {
    addrs.into_iter().find(|addr| family.matches(addr))
}
