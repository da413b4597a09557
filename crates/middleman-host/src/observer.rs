//! Observers notified once per forwarded datagram.
//!
//! Observers run on the reactor thread. [`ChannelObserver`] re-dispatches packets
//! through a `crossbeam_channel` for consumers on other threads.

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::event_types::ForwardedPacket;

/// Read-only, fire-and-forget notification of forwarded datagrams.
pub trait PacketObserver: Send {
    /// Called after the datagram has been forwarded.
    fn on_packet(&mut self, packet: &ForwardedPacket);
}

impl<F> PacketObserver for F
where
    F: FnMut(&ForwardedPacket) + Send,
{
    fn on_packet(&mut self, packet: &ForwardedPacket) {
        self(packet)
    }
}

/// Observer that forwards every packet into a channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<ForwardedPacket>,
}

impl ChannelObserver {
    /// Creates an observer and the receiving end of its unbounded channel.
    pub fn channel() -> (Self, Receiver<ForwardedPacket>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    /// Wraps an existing sender.
    pub fn new(sender: Sender<ForwardedPacket>) -> Self {
        Self { sender }
    }
}

impl PacketObserver for ChannelObserver {
    fn on_packet(&mut self, packet: &ForwardedPacket) {
        if self.sender.send(packet.clone()).is_err() {
            debug!("observer channel closed, dropping notification");
        }
    }
}
