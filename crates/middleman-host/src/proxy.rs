//! Proxy orchestrator.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use middleman_core::{
    config::{Config, ProxyConfig},
    error::{ConfigError, Result},
    mutator::{PacketMutator, PassThroughMutator},
    shared::SharedBytes,
    transport::Socket,
};
use middleman_utilities::{format_ip, hex_dump};
use tracing::{debug, info, warn};

use crate::{
    event_types::ForwardedPacket,
    observer::PacketObserver,
    statistics::{ProxyStatistics, StatisticsSnapshot},
    time::{Clock, SystemClock},
    transport::{ReceiveHandler, UdpTransport},
};

/// Per-datagram path: log, mutate, forward, count, notify.
struct ForwardingHandler {
    destination: SocketAddr,
    log_to_stdout: bool,
    mutator: Box<dyn PacketMutator>,
    observer: Option<Box<dyn PacketObserver>>,
    statistics: Arc<ProxyStatistics>,
    clock: Arc<dyn Clock>,
}

impl ReceiveHandler for ForwardingHandler {
    fn on_datagram(&mut self, socket: &dyn Socket, source: SocketAddr, data: &mut [u8]) {
        let timestamp = self.clock.now();
        debug!("received {} bytes from {}", data.len(), format_ip(&source));
        self.statistics.record_received(data.len());

        if self.log_to_stdout {
            info!("{}", hex_dump(data));
        }

        let mutated = self.mutator.should_mutate(&source, data) && self.mutator.mutate(&source, data);
        if mutated {
            self.statistics.record_mutated();
            if self.log_to_stdout {
                info!("{} (mutated)", hex_dump(data));
            }
        }

        let forwarded = match socket.send_packet(&self.destination, data) {
            Ok(sent) => {
                self.statistics.record_forwarded(sent);
                true
            }
            Err(e) => {
                self.statistics.record_send_failure();
                warn!("failed to forward datagram to {}: {}", format_ip(&self.destination), e);
                false
            }
        };

        if let Some(observer) = self.observer.as_mut() {
            observer.on_packet(&ForwardedPacket {
                payload: SharedBytes::copy_from_slice(data),
                source,
                destination: self.destination,
                timestamp,
                mutated,
                forwarded,
            });
        }
    }
}

/// Listens on one endpoint and forwards every datagram, possibly mutated, to a
/// fixed destination.
///
/// The local endpoint is bound during construction; dropping the proxy stops the
/// reactor and closes the socket.
pub struct Proxy {
    transport: UdpTransport,
    statistics: Arc<ProxyStatistics>,
    local_addr: SocketAddr,
    destination: SocketAddr,
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("local_addr", &self.local_addr)
            .field("destination", &self.destination)
            .field("transport", &self.transport)
            .finish()
    }
}

impl Proxy {
    /// Creates a pass-through proxy.
    pub fn bind(config: &ProxyConfig) -> Result<Self> {
        Self::bind_with_mutator(config, Box::new(PassThroughMutator))
    }

    /// Creates a proxy that runs every datagram through `mutator`.
    pub fn bind_with_mutator(config: &ProxyConfig, mutator: Box<dyn PacketMutator>) -> Result<Self> {
        Self::bind_with_config_clock_mutator_and_observer(
            config,
            Config::default(),
            Arc::new(SystemClock),
            mutator,
            None,
        )
    }

    /// Creates a proxy with a mutator and an observer notified per forwarded datagram.
    pub fn bind_with_mutator_and_observer(
        config: &ProxyConfig,
        mutator: Box<dyn PacketMutator>,
        observer: Box<dyn PacketObserver>,
    ) -> Result<Self> {
        Self::bind_with_config_clock_mutator_and_observer(
            config,
            Config::default(),
            Arc::new(SystemClock),
            mutator,
            Some(observer),
        )
    }

    /// Creates a proxy with custom transport configuration, clock, mutator and observer.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint cannot be resolved or the local endpoint
    /// cannot be bound.
    pub fn bind_with_config_clock_mutator_and_observer(
        config: &ProxyConfig,
        transport_config: Config,
        clock: Arc<dyn Clock>,
        mutator: Box<dyn PacketMutator>,
        observer: Option<Box<dyn PacketObserver>>,
    ) -> Result<Self> {
        let local = config.local_endpoint()?;
        let destination = config.remote_endpoint()?;
        let reuse_address = transport_config.reuse_address;
        let statistics = Arc::new(ProxyStatistics::default());

        let mut transport = UdpTransport::with_config(transport_config);
        transport.register_receive_handler(ForwardingHandler {
            destination,
            log_to_stdout: config.log_to_stdout,
            mutator,
            observer,
            statistics: statistics.clone(),
            clock,
        });
        transport.listen(local, reuse_address)?;

        if let Some(group) = config.multicast_group() {
            let group: IpAddr = group.parse().map_err(|_| {
                ConfigError::Invalid(format!("multicast_group {group:?} is not an IP address"))
            })?;
            if local.ip() == group {
                debug!("multicast group {} already joined by listen", group);
            } else {
                if !local.ip().is_unspecified() && !local.ip().is_multicast() {
                    transport.set_multicast_outbound_interface(local.ip());
                }
                transport.join_multicast_group(group, false);
            }
            transport.set_ttl(config.multicast_ttl);
            info!("joined multicast group {}", group);
        }

        let local_addr = transport.local_addr()?;
        info!("proxying {} -> {}", format_ip(&local_addr), format_ip(&destination));

        Ok(Self { transport, statistics, local_addr, destination })
    }

    /// Address the proxy listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address datagrams are forwarded to.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Current counters.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }

    /// True until [`stop`](Self::stop) is called.
    pub fn is_running(&self) -> bool {
        self.transport.is_listening()
    }

    /// Stops forwarding and closes the socket. Idempotent.
    pub fn stop(&mut self) {
        self.transport.stop();
    }
}
