//! UDP transport reactor.
//!
//! [`UdpTransport`] owns one UDP socket and a dedicated reactor thread. The thread
//! receives into a reusable buffer, hands each datagram to the registered
//! [`ReceiveHandler`] and only then issues the next receive, so the handler and the
//! buffer are never used concurrently.

use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use middleman_core::{config::Config, error::TransportError, transport::Socket};
use socket2::{Domain, Protocol, SockRef, Socket as Socket2, Type};
use tracing::{debug, error, info, warn};

// ============================================================================
// Socket
// ============================================================================

/// A bound UDP socket shared between the reactor thread and the sending side.
#[derive(Debug)]
pub struct DatagramSocket {
    socket: UdpSocket,
}

impl DatagramSocket {
    fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// The underlying std socket, for socket options.
    pub fn as_udp_socket(&self) -> &UdpSocket {
        &self.socket
    }
}

impl Socket for DatagramSocket {
    fn send_packet(&self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, addr)
    }

    fn receive_packet<'a>(&self, buffer: &'a mut [u8]) -> io::Result<(&'a mut [u8], SocketAddr)> {
        self.socket.recv_from(buffer).map(move |(recv_len, address)| (&mut buffer[..recv_len], address))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

fn unspecified_for(addr: &SocketAddr) -> IpAddr {
    match addr {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// Applies socket options from configuration to a socket before it is bound.
fn apply_socket_options(socket: &Socket2, config: &Config) -> io::Result<()> {
    if let Some(size) = config.socket_recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }

    if let Some(size) = config.socket_send_buffer_size {
        socket.set_send_buffer_size(size)?;
    }

    if let Some(ttl) = config.socket_ttl {
        socket.set_ttl(ttl)?;
    }

    if config.socket_broadcast {
        socket.set_broadcast(true)?;
    }

    Ok(())
}

fn open_socket(
    bind_addr: SocketAddr,
    reuse_address: bool,
    config: &Config,
) -> Result<UdpSocket, TransportError> {
    let socket = Socket2::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(TransportError::InvalidAddress)?;

    if reuse_address {
        socket.set_reuse_address(true).map_err(TransportError::BindError)?;
    }
    apply_socket_options(&socket, config).map_err(TransportError::BindError)?;
    socket.bind(&bind_addr.into()).map_err(TransportError::BindError)?;

    Ok(socket.into())
}

// ============================================================================
// Receive Handler
// ============================================================================

/// Callback invoked on the reactor thread for every received datagram.
///
/// `data` borrows the reactor's receive buffer and is only valid for the duration
/// of the call. `socket` is the socket the datagram arrived on and may be used to
/// send replies or forward the datagram.
pub trait ReceiveHandler: Send {
    /// Handles one datagram.
    fn on_datagram(&mut self, socket: &dyn Socket, source: SocketAddr, data: &mut [u8]);
}

impl<F> ReceiveHandler for F
where
    F: FnMut(&dyn Socket, SocketAddr, &mut [u8]) + Send,
{
    fn on_datagram(&mut self, socket: &dyn Socket, source: SocketAddr, data: &mut [u8]) {
        self(socket, source, data)
    }
}

type ReactorThread = JoinHandle<Option<Box<dyn ReceiveHandler>>>;
type ReactorBody = Box<dyn FnOnce() -> Option<Box<dyn ReceiveHandler>> + Send>;

struct Reactor {
    shutdown: Sender<()>,
    thread: ReactorThread,
    local_addr: SocketAddr,
}

fn run_reactor(
    socket: Arc<DatagramSocket>,
    mut handler: Box<dyn ReceiveHandler>,
    shutdown: Receiver<()>,
    buffer_size: usize,
) -> Box<dyn ReceiveHandler> {
    let mut buffer = vec![0u8; buffer_size];

    loop {
        match shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match socket.receive_packet(&mut buffer) {
            Ok((data, source)) => handler.on_datagram(socket.as_ref(), source, data),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => error!("Encountered an error receiving data: {:?}", e),
        }
    }

    debug!("reactor stopped");
    handler
}

// ============================================================================
// Transport
// ============================================================================

/// UDP socket plus reactor thread.
///
/// State machine: idle until [`listen`](Self::listen) succeeds, listening until
/// [`stop`](Self::stop) (or drop), then idle again with the handler restored so
/// the transport can listen again.
pub struct UdpTransport {
    config: Config,
    handler: Option<Box<dyn ReceiveHandler>>,
    socket: Option<Arc<DatagramSocket>>,
    reactor: Option<Reactor>,
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("socket", &self.socket)
            .field("listening", &self.is_listening())
            .finish()
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpTransport {
    /// Creates an idle transport with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an idle transport with custom configuration.
    pub fn with_config(config: Config) -> Self {
        Self { config, handler: None, socket: None, reactor: None }
    }

    /// Sets the callback the reactor dispatches datagrams to. Must precede `listen`.
    pub fn register_receive_handler<H: ReceiveHandler + 'static>(&mut self, handler: H) {
        if self.is_listening() {
            debug!("receive handler registered while listening, takes effect after the next listen");
        }
        self.handler = Some(Box::new(handler));
    }

    /// Binds `local` and starts the reactor thread.
    ///
    /// A multicast `local` address binds the wildcard address on the same port and
    /// joins the group instead, with multicast loopback disabled.
    ///
    /// # Panics
    ///
    /// Panics if no receive handler has been registered.
    pub fn listen(&mut self, local: SocketAddr, reuse_address: bool) -> Result<(), TransportError> {
        self.listen_with_spawner(local, reuse_address, |builder, body| builder.spawn(body))
    }

    fn listen_with_spawner<S>(
        &mut self,
        local: SocketAddr,
        reuse_address: bool,
        spawn: S,
    ) -> Result<(), TransportError>
    where
        S: FnOnce(thread::Builder, ReactorBody) -> io::Result<ReactorThread>,
    {
        if self.reactor.is_some() {
            return Err(TransportError::AlreadyListening);
        }
        if local.port() == 0 {
            return Err(TransportError::InvalidPort);
        }

        let handler =
            self.handler.take().expect("receive handler must be registered before listen");
        let (socket, local_addr) = match self.bind_listen_socket(local, reuse_address) {
            Ok(bound) => bound,
            Err(e) => {
                self.handler = Some(handler);
                return Err(e);
            }
        };

        // The handler waits in the handoff channel so it survives a failed spawn.
        let (handoff, handoff_rx) = bounded::<Box<dyn ReceiveHandler>>(1);
        let _ = handoff.send(handler);
        let reactor_handoff = handoff_rx.clone();

        let (shutdown, shutdown_rx) = bounded(1);
        let buffer_size = self.config.receive_buffer_size;
        let reactor_socket = socket.clone();
        let body: ReactorBody = Box::new(move || {
            let handler = reactor_handoff.recv().ok()?;
            Some(run_reactor(reactor_socket, handler, shutdown_rx, buffer_size))
        });

        let thread = match spawn(thread::Builder::new().name("middleman-reactor".to_string()), body) {
            Ok(thread) => thread,
            Err(e) => {
                error!("failed to start reactor thread: {}", e);
                self.handler = handoff_rx.try_recv().ok();
                return Err(TransportError::ReactorSpawn(e));
            }
        };

        self.socket = Some(socket);
        info!("listening on {}", local_addr);
        self.reactor = Some(Reactor { shutdown, thread, local_addr });

        if local.ip().is_multicast() {
            info!("rebound multicast listen address {} to {}", local, local_addr);
            self.join_multicast_group(local.ip(), false);
        }
        Ok(())
    }

    fn bind_listen_socket(
        &self,
        local: SocketAddr,
        reuse_address: bool,
    ) -> Result<(Arc<DatagramSocket>, SocketAddr), TransportError> {
        let bind_addr = if local.ip().is_multicast() {
            SocketAddr::new(unspecified_for(&local), local.port())
        } else {
            local
        };

        let udp = open_socket(bind_addr, reuse_address, &self.config)?;
        udp.set_read_timeout(Some(self.polling_timeout())).map_err(TransportError::BindError)?;
        let local_addr = udp.local_addr().map_err(TransportError::BindError)?;
        Ok((Arc::new(DatagramSocket::new(udp)), local_addr))
    }

    /// Listens on `port` and joins `group`.
    pub fn listen_multicast(
        &mut self,
        group: IpAddr,
        port: u16,
        reuse_address: bool,
    ) -> Result<(), TransportError> {
        self.listen(SocketAddr::new(group, port), reuse_address)
    }

    /// Stops the reactor and closes the socket. Idempotent.
    pub fn stop(&mut self) {
        if let Some(reactor) = self.reactor.take() {
            // A full channel means a stop is already pending.
            let _ = reactor.shutdown.try_send(());
            match reactor.thread.join() {
                Ok(handler) => {
                    if self.handler.is_none() {
                        self.handler = handler;
                    }
                }
                Err(_) => error!("reactor thread panicked"),
            }
            info!("stopped listening on {}", reactor.local_addr);
        }
        self.socket = None;
    }

    /// True between a successful `listen` and `stop`.
    pub fn is_listening(&self) -> bool {
        self.reactor.is_some()
    }

    /// Address the listening socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.reactor.as_ref().map(|reactor| reactor.local_addr).ok_or(TransportError::NotListening)
    }

    /// The socket currently held, listening or send-only.
    pub fn socket(&self) -> Option<&DatagramSocket> {
        self.socket.as_deref()
    }

    /// Sends one datagram to `destination`.
    ///
    /// Uses the listening socket when there is one; otherwise lazily opens an
    /// unbound send-only socket.
    pub fn send_to(&mut self, bytes: &[u8], destination: SocketAddr) -> Result<(), TransportError> {
        if bytes.len() > self.config.max_send_size {
            return Err(TransportError::MessageTooLarge {
                size: bytes.len(),
                max: self.config.max_send_size,
            });
        }

        let socket = match &self.socket {
            Some(socket) => socket.clone(),
            None => {
                let bind_addr = SocketAddr::new(unspecified_for(&destination), 0);
                let udp = open_socket(bind_addr, false, &self.config)?;
                debug!("opened send-only socket on {:?}", udp.local_addr());
                let socket = Arc::new(DatagramSocket::new(udp));
                self.socket = Some(socket.clone());
                socket
            }
        };

        socket.send_packet(&destination, bytes).map_err(TransportError::SendFailure)?;
        Ok(())
    }

    /// Sends UTF-8 text as one datagram.
    pub fn send_text(&mut self, text: &str, destination: SocketAddr) -> Result<(), TransportError> {
        self.send_to(text.as_bytes(), destination)
    }

    // ------------------------------------------------------------------------
    // Best-effort socket options
    // ------------------------------------------------------------------------

    fn with_socket(&self, option: &str, apply: impl FnOnce(&UdpSocket) -> io::Result<()>) {
        let Some(socket) = &self.socket else {
            warn!("cannot set {}: no socket", option);
            return;
        };
        match apply(socket.as_udp_socket()) {
            Ok(()) => debug!("set {}", option),
            Err(e) => warn!("failed to set {}: {}", option, e),
        }
    }

    /// Joins `group` on the default interface and sets multicast loopback.
    ///
    /// The membership and the loopback option are applied independently, so a
    /// failed or repeated join still leaves loopback as requested.
    pub fn join_multicast_group(&self, group: IpAddr, enable_loopback: bool) {
        self.with_socket("multicast membership", |socket| match group {
            IpAddr::V4(group) => socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(group) => socket.join_multicast_v6(&group, 0),
        });
        self.with_socket("multicast loopback", |socket| match group {
            IpAddr::V4(_) => socket.set_multicast_loop_v4(enable_loopback),
            IpAddr::V6(_) => socket.set_multicast_loop_v6(enable_loopback),
        });
    }

    /// Selects the interface outgoing multicast datagrams leave through.
    pub fn set_multicast_outbound_interface(&self, local_ip: IpAddr) {
        self.with_socket("multicast outbound interface", |socket| match local_ip {
            IpAddr::V4(ip) => SockRef::from(socket).set_multicast_if_v4(&ip),
            IpAddr::V6(_) => {
                Err(io::Error::new(io::ErrorKind::Unsupported, "IPv6 interfaces are selected by index"))
            }
        });
    }

    /// Sets the hop limit of outgoing multicast datagrams.
    pub fn set_ttl(&self, hops: u32) {
        self.with_socket("multicast ttl", |socket| {
            match socket.local_addr()? {
                SocketAddr::V4(_) => socket.set_multicast_ttl_v4(hops),
                SocketAddr::V6(_) => SockRef::from(socket).set_multicast_hops_v6(hops),
            }
        });
    }

    /// Enables or disables sending to broadcast addresses.
    pub fn set_broadcast(&self, enabled: bool) {
        self.with_socket("broadcast", |socket| socket.set_broadcast(enabled));
    }

    fn polling_timeout(&self) -> Duration {
        // A zero read timeout is rejected by the OS.
        self.config.socket_polling_timeout.max(Duration::from_millis(1))
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.stop();
    }
}
