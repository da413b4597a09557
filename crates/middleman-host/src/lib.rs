#![warn(missing_docs)]

//! middleman-host: UDP transport reactor and the intercepting proxy built on it.

/// Event types emitted per forwarded datagram.
pub mod event_types;
/// Observers notified per forwarded datagram.
pub mod observer;
/// Proxy orchestrator.
pub mod proxy;
/// Proxy counters.
pub mod statistics;
/// Time utilities for the host.
pub mod time;
/// UDP transport reactor.
pub mod transport;

pub use event_types::ForwardedPacket;
pub use observer::{ChannelObserver, PacketObserver};
pub use proxy::Proxy;
pub use statistics::{ProxyStatistics, StatisticsSnapshot};
pub use time::{Clock, SystemClock};
pub use transport::{DatagramSocket, ReceiveHandler, UdpTransport};
