//! Utility functions for the middleman proxy.
//!
//! ## Address Utilities
//! - DNS resolution (hostname to socket address) for the configured hosts
//! - IP formatting for log lines and viewers
//!
//! ## Hex Dumps
//! - `hex_dump` renders datagrams the way the proxy logs them

use std::{
    fmt::Write,
    io,
    net::{IpAddr, SocketAddr, ToSocketAddrs},
};

/// Turns a configured host into an endpoint.
///
/// IP literals, multicast groups included, are used as-is; anything else goes
/// through the system resolver and the first address wins.
///
/// ```
/// use middleman_utilities::resolve_host;
///
/// let group = resolve_host("224.10.10.19", 3000).unwrap();
/// assert!(group.ip().is_multicast());
/// ```
pub fn resolve_host(hostname: &str, port: u16) -> io::Result<SocketAddr> {
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (hostname, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Could not resolve hostname"))
}

/// Formats the IP part of a socket address for log lines, without reverse lookup.
///
/// # Examples
/// ```
/// use middleman_utilities::format_ip;
/// use std::net::{IpAddr, Ipv4Addr, SocketAddr};
///
/// let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);
/// let ip_str = format_ip(&addr);
/// assert_eq!(ip_str, "127.0.0.1");
/// ```
pub fn format_ip(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

/// Renders bytes as lowercase hex, grouped in pairs of bytes.
///
/// # Examples
/// ```
/// use middleman_utilities::hex_dump;
///
/// assert_eq!(hex_dump(&[0x01, 0x02, 0x03]), "0102 03");
/// ```
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 5 / 2 + 1);
    for (i, chunk) in bytes.chunks(2).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        for byte in chunk {
            let _ = write!(out, "{:02x}", byte);
        }
    }
    out
}
