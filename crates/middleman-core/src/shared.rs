use std::{ops::Deref, sync::Arc};

/// Reference-counted copy of a datagram.
///
/// Observers receive forwarded datagrams as `SharedBytes` so they can keep them
/// past the callback while the reactor reuses its receive buffer. Clones share
/// the same storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedBytes(Arc<[u8]>);

impl SharedBytes {
    /// Copies a borrowed slice into a new shared buffer.
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }

    /// Returns the bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for SharedBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_from_slice_is_independent() {
        let mut source = vec![1u8, 2, 3];
        let shared = SharedBytes::copy_from_slice(&source);
        source[0] = 9;
        assert_eq!(shared.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_clones_share_storage() {
        let shared = SharedBytes::copy_from_slice(b"datagram");
        let kept = shared.clone();
        drop(shared);
        assert_eq!(&*kept, b"datagram");
        assert_eq!(kept.len(), 8);
    }
}
