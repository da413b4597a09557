//! Event types emitted by the proxy.
//!
//! A [`ForwardedPacket`] is produced once per datagram after it has been
//! forwarded (or the forward attempt failed) and is handed to the registered
//! observer.

use std::{net::SocketAddr, time::SystemTime};

use middleman_core::shared::SharedBytes;

/// A datagram that passed through the proxy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardedPacket {
    /// Bytes as forwarded, after mutation.
    pub payload: SharedBytes,
    /// Sender of the original datagram.
    pub source: SocketAddr,
    /// Where the datagram was forwarded to.
    pub destination: SocketAddr,
    /// When the datagram was received.
    pub timestamp: SystemTime,
    /// Whether the mutator rewrote the datagram.
    pub mutated: bool,
    /// Whether the forward send succeeded.
    pub forwarded: bool,
}

impl ForwardedPacket {
    /// Returns the forwarded bytes.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }
}
