//! `host:port` decoding.
//!
//! Turns the address strings accepted on the command line into a network
//! family and a normalized address usable for binding or connecting. Purely
//! syntactic: hostnames are kept as-is and resolved later by the socket layer.

use std::fmt;
use std::net::IpAddr;

use crate::error::ProxyError;

/// Network family of a decoded address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    /// Empty host or a hostname; the family is decided at resolution time.
    Unspecified,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressFamily::Ipv4 => "tcp4",
            AddressFamily::Ipv6 => "tcp6",
            AddressFamily::Unspecified => "tcp",
        };
        f.write_str(name)
    }
}

/// A validated `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetAddress {
    family: AddressFamily,
    address: String,
}

impl NetAddress {
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Normalized address string, e.g. `127.0.0.1:9443` or `[::1]:9443`.
    pub fn as_str(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

impl std::str::FromStr for NetAddress {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (family, address) = decode_address(s)?;
        Ok(Self { family, address })
    }
}

/// Decode a colon-separated host/port string.
///
/// An empty host (`:9443`) means "all interfaces" and normalizes to the
/// dual-stack wildcard `[::]:9443`.
pub fn decode_address(input: &str) -> Result<(AddressFamily, String), ProxyError> {
    let (host, port) = split_host_port(input)
        .ok_or_else(|| ProxyError::invalid_address(input, "expected host:port"))?;

    let port: u16 = port
        .parse()
        .map_err(|_| ProxyError::invalid_address(input, "port must be a number between 0 and 65535"))?;

    if host.is_empty() {
        return Ok((AddressFamily::Unspecified, format!("[::]:{port}")));
    }

    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => Ok((AddressFamily::Ipv4, format!("{ip}:{port}"))),
        Ok(IpAddr::V6(ip)) => match ip.to_ipv4_mapped() {
            Some(v4) => Ok((AddressFamily::Ipv4, format!("{v4}:{port}"))),
            None => Ok((AddressFamily::Ipv6, format!("[{ip}]:{port}"))),
        },
        Err(_) if is_hostname(host) => Ok((AddressFamily::Unspecified, format!("{host}:{port}"))),
        Err(_) => Err(ProxyError::invalid_address(input, "host is not an IP address or hostname")),
    }
}

fn split_host_port(input: &str) -> Option<(&str, &str)> {
    if let Some(rest) = input.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        // Brackets are only meaningful around IPv6 literals.
        if !host.contains(':') {
            return None;
        }
        let port = tail.strip_prefix(':')?;
        return Some((host, port));
    }

    let (host, port) = input.rsplit_once(':')?;
    if host.contains(':') {
        return None;
    }
    Some((host, port))
}

fn is_hostname(host: &str) -> bool {
    host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}
