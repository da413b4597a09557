//! Bounds-checked typed access to a datagram.
//!
//! Every read and write validates `offset + size <= len` first and returns a
//! [`ViewError`] instead of touching memory outside the datagram.

use std::cmp::Ordering;

use byteorder::{BigEndian, ByteOrder, NativeEndian};
use thiserror::Error;

use crate::primitive::PrimitiveType;

/// Byte order of multi-byte fields on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum WireOrder {
    /// Fields use the host's native representation.
    #[default]
    Host,
    /// Fields are big-endian (network byte order).
    Network,
}

impl WireOrder {
    /// Maps the `network_byte_order` flag onto a wire order.
    pub fn from_network_flag(network_byte_order: bool) -> Self {
        if network_byte_order {
            WireOrder::Network
        } else {
            WireOrder::Host
        }
    }
}

/// Failures of a [`PacketView`] access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ViewError {
    /// The field does not fit inside the datagram.
    #[error("field at offset {offset} with size {size} exceeds datagram of {len} bytes")]
    OutOfBounds {
        /// Field offset.
        offset: usize,
        /// Field size.
        size: usize,
        /// Datagram length.
        len: usize,
    },
    /// Opaque array fields have no scalar representation.
    #[error("opaque array fields cannot be read or written as scalars")]
    Opaque,
}

/// A decoded field value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Scalar {
    /// `int8`
    I8(i8),
    /// `int16`
    I16(i16),
    /// `int32`
    I32(i32),
    /// `int64`
    I64(i64),
    /// `uint8`
    U8(u8),
    /// `uint16`
    U16(u16),
    /// `uint32`
    U32(u32),
    /// `uint64`
    U64(u64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
}

impl Scalar {
    /// Natural ordering of two values of the same type. `None` for mixed types or NaN.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::I8(a), Scalar::I8(b)) => a.partial_cmp(b),
            (Scalar::I16(a), Scalar::I16(b)) => a.partial_cmp(b),
            (Scalar::I32(a), Scalar::I32(b)) => a.partial_cmp(b),
            (Scalar::I64(a), Scalar::I64(b)) => a.partial_cmp(b),
            (Scalar::U8(a), Scalar::U8(b)) => a.partial_cmp(b),
            (Scalar::U16(a), Scalar::U16(b)) => a.partial_cmp(b),
            (Scalar::U32(a), Scalar::U32(b)) => a.partial_cmp(b),
            (Scalar::U64(a), Scalar::U64(b)) => a.partial_cmp(b),
            (Scalar::F32(a), Scalar::F32(b)) => a.partial_cmp(b),
            (Scalar::F64(a), Scalar::F64(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// The value widened to `i128`, for integer scalars.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Scalar::I8(v) => Some(v.into()),
            Scalar::I16(v) => Some(v.into()),
            Scalar::I32(v) => Some(v.into()),
            Scalar::I64(v) => Some(v.into()),
            Scalar::U8(v) => Some(v.into()),
            Scalar::U16(v) => Some(v.into()),
            Scalar::U32(v) => Some(v.into()),
            Scalar::U64(v) => Some(v.into()),
            Scalar::F32(_) | Scalar::F64(_) => None,
        }
    }
}

fn decode<E: ByteOrder>(bytes: &[u8], ty: PrimitiveType) -> Result<Scalar, ViewError> {
    let scalar = match ty {
        PrimitiveType::Int8 => Scalar::I8(bytes[0] as i8),
        PrimitiveType::Int16 => Scalar::I16(E::read_i16(bytes)),
        PrimitiveType::Int32 => Scalar::I32(E::read_i32(bytes)),
        PrimitiveType::Int64 => Scalar::I64(E::read_i64(bytes)),
        PrimitiveType::UInt8 => Scalar::U8(bytes[0]),
        PrimitiveType::UInt16 => Scalar::U16(E::read_u16(bytes)),
        PrimitiveType::UInt32 => Scalar::U32(E::read_u32(bytes)),
        PrimitiveType::UInt64 => Scalar::U64(E::read_u64(bytes)),
        PrimitiveType::Float => Scalar::F32(E::read_f32(bytes)),
        PrimitiveType::Double => Scalar::F64(E::read_f64(bytes)),
        PrimitiveType::Array => return Err(ViewError::Opaque),
    };
    Ok(scalar)
}

fn encode<E: ByteOrder>(bytes: &mut [u8], value: Scalar) {
    match value {
        Scalar::I8(v) => bytes[0] = v as u8,
        Scalar::I16(v) => E::write_i16(bytes, v),
        Scalar::I32(v) => E::write_i32(bytes, v),
        Scalar::I64(v) => E::write_i64(bytes, v),
        Scalar::U8(v) => bytes[0] = v,
        Scalar::U16(v) => E::write_u16(bytes, v),
        Scalar::U32(v) => E::write_u32(bytes, v),
        Scalar::U64(v) => E::write_u64(bytes, v),
        Scalar::F32(v) => E::write_f32(bytes, v),
        Scalar::F64(v) => E::write_f64(bytes, v),
    }
}

fn scalar_size(value: &Scalar) -> usize {
    match value {
        Scalar::I8(_) | Scalar::U8(_) => 1,
        Scalar::I16(_) | Scalar::U16(_) => 2,
        Scalar::I32(_) | Scalar::U32(_) | Scalar::F32(_) => 4,
        Scalar::I64(_) | Scalar::U64(_) | Scalar::F64(_) => 8,
    }
}

/// Typed window over a datagram's bytes.
///
/// `PacketView<&[u8]>` reads, `PacketView<&mut [u8]>` reads and writes.
#[derive(Debug)]
pub struct PacketView<B> {
    bytes: B,
    order: WireOrder,
}

impl<B: AsRef<[u8]>> PacketView<B> {
    /// Wraps `bytes`, decoding multi-byte fields in `order`.
    pub fn new(bytes: B, order: WireOrder) -> Self {
        Self { bytes, order }
    }

    /// Length of the underlying datagram.
    pub fn len(&self) -> usize {
        self.bytes.as_ref().len()
    }

    /// True for an empty datagram.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wire order used for multi-byte fields.
    pub fn order(&self) -> WireOrder {
        self.order
    }

    /// Returns the `size` bytes at `offset`.
    pub fn bytes_at(&self, offset: usize, size: usize) -> Result<&[u8], ViewError> {
        let bytes = self.bytes.as_ref();
        let len = bytes.len();
        match offset.checked_add(size) {
            Some(end) if end <= len => Ok(&bytes[offset..end]),
            _ => Err(ViewError::OutOfBounds { offset, size, len }),
        }
    }

    /// Decodes the field of type `ty` at `offset`.
    pub fn read(&self, offset: usize, ty: PrimitiveType) -> Result<Scalar, ViewError> {
        let size = ty.fixed_size().ok_or(ViewError::Opaque)?;
        let bytes = self.bytes_at(offset, size)?;
        match self.order {
            WireOrder::Host => decode::<NativeEndian>(bytes, ty),
            WireOrder::Network => decode::<BigEndian>(bytes, ty),
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> PacketView<B> {
    /// Encodes `value` at `offset`, leaving the datagram untouched on error.
    pub fn write(&mut self, offset: usize, value: Scalar) -> Result<(), ViewError> {
        let size = scalar_size(&value);
        let bytes = self.bytes.as_mut();
        let len = bytes.len();
        let end = match offset.checked_add(size) {
            Some(end) if end <= len => end,
            _ => return Err(ViewError::OutOfBounds { offset, size, len }),
        };
        let target = &mut bytes[offset..end];
        match self.order {
            WireOrder::Host => encode::<NativeEndian>(target, value),
            WireOrder::Network => encode::<BigEndian>(target, value),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_network_order() {
        let bytes = [0xAB, 0xCD];
        let view = PacketView::new(&bytes[..], WireOrder::Network);
        assert_eq!(view.read(0, PrimitiveType::UInt16), Ok(Scalar::U16(0xABCD)));
    }

    #[test]
    fn test_read_host_order() {
        let value: u32 = 10;
        let bytes = value.to_ne_bytes();
        let view = PacketView::new(&bytes[..], WireOrder::Host);
        assert_eq!(view.read(0, PrimitiveType::UInt32), Ok(Scalar::U32(10)));
    }

    #[test]
    fn test_read_signed_and_float() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-2i16).to_be_bytes());
        bytes.extend_from_slice(&1.5f32.to_be_bytes());
        let view = PacketView::new(&bytes[..], WireOrder::Network);
        assert_eq!(view.read(0, PrimitiveType::Int16), Ok(Scalar::I16(-2)));
        assert_eq!(view.read(2, PrimitiveType::Float), Ok(Scalar::F32(1.5)));
    }

    #[test]
    fn test_read_out_of_bounds() {
        let bytes = [0u8; 3];
        let view = PacketView::new(&bytes[..], WireOrder::Host);
        assert_eq!(
            view.read(0, PrimitiveType::UInt32),
            Err(ViewError::OutOfBounds { offset: 0, size: 4, len: 3 })
        );
        assert!(view.read(usize::MAX, PrimitiveType::UInt8).is_err());
    }

    #[test]
    fn test_read_array_is_opaque() {
        let bytes = [0u8; 8];
        let view = PacketView::new(&bytes[..], WireOrder::Host);
        assert_eq!(view.read(0, PrimitiveType::Array), Err(ViewError::Opaque));
    }

    #[test]
    fn test_write_network_order() {
        let mut bytes = [0u8; 4];
        let mut view = PacketView::new(&mut bytes[..], WireOrder::Network);
        view.write(1, Scalar::U16(0x0102)).unwrap();
        assert_eq!(bytes, [0x00, 0x01, 0x02, 0x00]);
    }

    #[test]
    fn test_write_out_of_bounds_leaves_buffer() {
        let mut bytes = [7u8; 2];
        let mut view = PacketView::new(&mut bytes[..], WireOrder::Host);
        assert_eq!(
            view.write(1, Scalar::U16(0)),
            Err(ViewError::OutOfBounds { offset: 1, size: 2, len: 2 })
        );
        assert_eq!(bytes, [7, 7]);
    }

    #[test]
    fn test_scalar_compare() {
        assert_eq!(Scalar::U8(1).compare(&Scalar::U8(2)), Some(Ordering::Less));
        assert_eq!(Scalar::I64(-1).compare(&Scalar::I64(-1)), Some(Ordering::Equal));
        assert_eq!(Scalar::U8(1).compare(&Scalar::I8(1)), None);
        assert_eq!(Scalar::F64(f64::NAN).compare(&Scalar::F64(0.0)), None);
    }

    #[test]
    fn test_scalar_as_i128() {
        assert_eq!(Scalar::U64(u64::MAX).as_i128(), Some(u64::MAX as i128));
        assert_eq!(Scalar::I8(-3).as_i128(), Some(-3));
        assert_eq!(Scalar::F32(1.0).as_i128(), None);
    }
}
