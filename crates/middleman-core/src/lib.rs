#![warn(missing_docs)]

//! middleman-core: foundational types shared by every layer of the proxy.
//!
//! This crate provides the minimal set of core utilities shared across all layers:
//! - Configuration types and the proxy configuration loader
//! - Error handling
//! - Protocol constants
//! - The packet mutator capability and its trivial implementations
//!
//! Schema and rule handling live in `middleman-protocol`; the UDP reactor and the
//! proxy orchestrator live in `middleman-host`.

/// Constants shared across layers.
pub mod constants {
    /// Largest UDP payload; also the size of the reusable receive buffer.
    pub const MAX_DATAGRAM_SIZE: usize = 65535;
    /// Largest message `send_to` accepts (64 MiB).
    pub const MAX_SEND_SIZE: usize = 64 * 1024 * 1024;
    /// Hop limit applied to multicast traffic when none is configured.
    pub const DEFAULT_MULTICAST_TTL: u32 = 64;
    /// Configuration file the CLI reads when no path is given.
    pub const DEFAULT_CONFIG_FILE: &str = "mm_config.json";
}

/// Configuration options for the transport and the proxy.
pub mod config;
/// Error types and results.
pub mod error;
/// Datagram inspection and rewriting.
pub mod mutator;
/// Shared, reference-counted byte slices with zero-copy slicing.
pub mod shared;
/// Transport abstraction for pluggable I/O.
pub mod transport;
