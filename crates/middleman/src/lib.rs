#![warn(missing_docs)]

//! Middleman: a small public API facade for the workspace.
//!
//! This crate re-exports the types needed to run an intercepting UDP proxy:
//!
//! - Configuration (`ProxyConfig`, `Config`, `load_config`)
//! - The proxy and its observers (`Proxy`, `ChannelObserver`, `ForwardedPacket`)
//! - The rule engine (`RuleBasedMutator`, `compile_schema`, `compile_rules`, `apply_rules`)
//!
//! Example
//! ```no_run
//! use middleman::prelude::*;
//!
//! let config = load_config("mm_config.json").unwrap();
//! let mutator = RuleBasedMutator::from_files(
//!     "schema.json",
//!     Some(std::path::Path::new("rules.json")),
//!     config.network_byte_order,
//!     config.offset_mode,
//! )
//! .unwrap();
//!
//! let (observer, packets) = ChannelObserver::channel();
//! let proxy =
//!     Proxy::bind_with_mutator_and_observer(&config, Box::new(mutator), Box::new(observer))
//!         .unwrap();
//!
//! for packet in packets.iter().take(10) {
//!     println!("{} bytes from {}", packet.payload().len(), packet.source);
//! }
//! drop(proxy);
//! ```

// Core config, errors and the mutator capability
pub use middleman_core::{
    config::{load_config, load_config_str, Config, OffsetMode, ProxyConfig},
    error::{ConfigError, ErrorKind, Result, TransportError},
    mutator::{ByteReplaceMutator, PacketMutator, PassThroughMutator},
};
// Host: transport reactor, proxy and observers
pub use middleman_host::{
    ChannelObserver, ForwardedPacket, PacketObserver, Proxy, StatisticsSnapshot, UdpTransport,
};
// Protocol: schemas, rules and evaluation
pub use middleman_protocol::{
    apply_rules, compile_rules, compile_rules_str, compile_schema, compile_schema_str, Diagnostic,
    PacketLayout, RuleBasedMutator, RuleSet, Schema,
};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        load_config, ChannelObserver, Config, ForwardedPacket, PacketMutator, PassThroughMutator,
        Proxy, ProxyConfig, RuleBasedMutator,
    };
}
