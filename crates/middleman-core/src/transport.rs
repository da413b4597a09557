//! Transport abstraction for pluggable datagram I/O.

use std::{io::Result, net::SocketAddr};

/// Low-level datagram socket abstraction.
///
/// The reactor receives through this trait and hands it to the receive handler so
/// the handler can send from the same socket it received on.
pub trait Socket: Send + Sync {
    /// Sends a single datagram.
    fn send_packet(&self, addr: &SocketAddr, payload: &[u8]) -> Result<usize>;

    /// Receives a single datagram into `buffer`, returning the filled prefix.
    fn receive_packet<'a>(&self, buffer: &'a mut [u8]) -> Result<(&'a mut [u8], SocketAddr)>;

    /// Returns the socket address that this socket is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;
}
