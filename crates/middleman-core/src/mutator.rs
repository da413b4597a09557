//! Datagram mutation capability.
//!
//! This module provides the trait the proxy calls for every received datagram before
//! forwarding it. Implementations may inspect and rewrite the bytes in place; the
//! datagram keeps its length.

use std::net::SocketAddr;

use tracing::info;

/// Capability to inspect and possibly rewrite a just-received datagram.
///
/// # Examples
/// ```
/// use std::net::SocketAddr;
/// use middleman_core::mutator::PacketMutator;
///
/// struct InvertFirstByte;
///
/// impl PacketMutator for InvertFirstByte {
///     fn mutate(&mut self, _source: &SocketAddr, data: &mut [u8]) -> bool {
///         match data.first_mut() {
///             Some(byte) => {
///                 *byte = !*byte;
///                 true
///             }
///             None => false,
///         }
///     }
/// }
/// ```
pub trait PacketMutator: Send {
    /// Cheap pre-check. Returning `false` skips [`mutate`](Self::mutate) entirely.
    fn should_mutate(&self, _source: &SocketAddr, _data: &[u8]) -> bool {
        true
    }

    /// Rewrites `data` in place.
    ///
    /// # Arguments
    /// * `source` - The address the datagram came from
    /// * `data` - The received bytes
    ///
    /// # Returns
    /// `true` if any byte was written.
    fn mutate(&mut self, source: &SocketAddr, data: &mut [u8]) -> bool;
}

impl<M: PacketMutator + ?Sized> PacketMutator for Box<M> {
    fn should_mutate(&self, source: &SocketAddr, data: &[u8]) -> bool {
        (**self).should_mutate(source, data)
    }

    fn mutate(&mut self, source: &SocketAddr, data: &mut [u8]) -> bool {
        (**self).mutate(source, data)
    }
}

/// Mutator that forwards every datagram unchanged.
///
/// This is the default mutator when none is specified.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughMutator;

impl PacketMutator for PassThroughMutator {
    fn should_mutate(&self, _source: &SocketAddr, _data: &[u8]) -> bool {
        false
    }

    fn mutate(&mut self, _source: &SocketAddr, _data: &mut [u8]) -> bool {
        false
    }
}

/// Replaces one byte value at a fixed offset.
///
/// Handy for smoke-testing a proxy chain: send `"abcz"` and watch `"abcg"` arrive
/// with `ByteReplaceMutator::new(3, b'z', b'g')`.
#[derive(Debug, Clone, Copy)]
pub struct ByteReplaceMutator {
    offset: usize,
    from: u8,
    to: u8,
}

impl ByteReplaceMutator {
    /// Creates a mutator rewriting `from` to `to` at `offset`.
    pub fn new(offset: usize, from: u8, to: u8) -> Self {
        Self { offset, from, to }
    }
}

impl PacketMutator for ByteReplaceMutator {
    fn should_mutate(&self, _source: &SocketAddr, data: &[u8]) -> bool {
        data.len() > self.offset
    }

    fn mutate(&mut self, _source: &SocketAddr, data: &mut [u8]) -> bool {
        match data.get_mut(self.offset) {
            Some(byte) if *byte == self.from => {
                info!("Mutating packet at byte {}", self.offset);
                *byte = self.to;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080)
    }

    struct CountingMutator {
        calls: usize,
    }

    impl PacketMutator for CountingMutator {
        fn mutate(&mut self, _source: &SocketAddr, _data: &mut [u8]) -> bool {
            self.calls += 1;
            false
        }
    }

    #[test]
    fn test_default_should_mutate_is_true() {
        let mut mutator = CountingMutator { calls: 0 };
        let mut data = vec![1, 2, 3];
        assert!(mutator.should_mutate(&addr(), &data));
        assert!(!mutator.mutate(&addr(), &mut data));
        assert_eq!(mutator.calls, 1);
    }

    #[test]
    fn test_pass_through_mutator() {
        let mut mutator = PassThroughMutator;
        let mut data = vec![1, 2, 3];
        let original = data.clone();

        assert!(!mutator.should_mutate(&addr(), &data));
        assert!(!mutator.mutate(&addr(), &mut data));
        assert_eq!(data, original);
    }

    #[test]
    fn test_byte_replace_mutator() {
        let mut mutator = ByteReplaceMutator::new(3, b'z', b'g');

        let mut data = b"abcz".to_vec();
        assert!(mutator.should_mutate(&addr(), &data));
        assert!(mutator.mutate(&addr(), &mut data));
        assert_eq!(&data, b"abcg");

        // Already rewritten, nothing left to do
        assert!(!mutator.mutate(&addr(), &mut data));
    }

    #[test]
    fn test_byte_replace_mutator_short_datagram() {
        let mut mutator = ByteReplaceMutator::new(3, b'z', b'g');
        let mut data = b"ab".to_vec();
        assert!(!mutator.should_mutate(&addr(), &data));
        assert!(!mutator.mutate(&addr(), &mut data));
        assert_eq!(&data, b"ab");
    }

    #[test]
    fn test_boxed_mutator_delegates() {
        let mut mutator: Box<dyn PacketMutator> = Box::new(ByteReplaceMutator::new(0, 1, 2));
        let mut data = vec![1];
        assert!(mutator.should_mutate(&addr(), &data));
        assert!(mutator.mutate(&addr(), &mut data));
        assert_eq!(data, vec![2]);
    }
}
