// Output algebra: values attached to arcs and final states.

use std::fmt::Debug;
use std::hash::Hash;

use crate::FstError;
use crate::codec::{read_varint, write_varint};

/// Values a transducer can associate with its keys.
///
/// The builder pushes the shared part of the outputs of neighbouring keys
/// towards the root, so the type must form a monoid under [`add`](Self::add)
/// with a [`common_prefix`](Self::common_prefix) / [`subtract`](Self::subtract)
/// pair satisfying
///
/// ```text
/// add(common_prefix(a, b), subtract(a, common_prefix(a, b))) == a
/// ```
///
/// `subtract(a, b)` is only defined when `b` is a common-prefix bound of `a`.
/// Calling it otherwise is a programming error.
///
/// Each output also knows its two wire encodings: a fixed-width one for the
/// default format (arcs stay fixed-size and binary searchable in storage) and
/// a variable-length one for the compressed format.
pub trait Output: Clone + Eq + Hash + Debug {
    /// Size in bytes of [`write_fixed`](Self::write_fixed).
    const FIXED_WIDTH: usize;

    /// Fewest bytes [`write_var`](Self::write_var) ever writes.
    const MIN_VAR_WIDTH: usize;

    fn zero() -> Self;

    fn add(&self, other: &Self) -> Self;

    /// Largest value that is a prefix of both `self` and `other`.
    fn common_prefix(&self, other: &Self) -> Self;

    fn subtract(&self, prefix: &Self) -> Self;

    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    fn write_fixed(&self, buf: &mut Vec<u8>);

    /// Decode from exactly [`FIXED_WIDTH`](Self::FIXED_WIDTH) bytes.
    fn read_fixed(data: &[u8]) -> Self;

    fn write_var(&self, buf: &mut Vec<u8>);

    fn read_var(data: &[u8], pos: &mut usize) -> Result<Self, FstError>;
}

/// No output: the transducer degenerates to a minimal acyclic set automaton.
impl Output for () {
    const FIXED_WIDTH: usize = 0;
    const MIN_VAR_WIDTH: usize = 0;

    fn zero() -> Self {}

    fn add(&self, _other: &Self) -> Self {}

    fn common_prefix(&self, _other: &Self) -> Self {}

    fn subtract(&self, _prefix: &Self) -> Self {}

    fn write_fixed(&self, _buf: &mut Vec<u8>) {}

    fn read_fixed(_data: &[u8]) -> Self {}

    fn write_var(&self, _buf: &mut Vec<u8>) {}

    fn read_var(_data: &[u8], _pos: &mut usize) -> Result<Self, FstError> {
        Ok(())
    }
}

macro_rules! unsigned_output {
    ($ty:ty) => {
        impl Output for $ty {
            const FIXED_WIDTH: usize = size_of::<$ty>();
            const MIN_VAR_WIDTH: usize = 1;

            #[inline]
            fn zero() -> Self {
                0
            }

            #[inline]
            fn add(&self, other: &Self) -> Self {
                self + other
            }

            #[inline]
            fn common_prefix(&self, other: &Self) -> Self {
                (*self).min(*other)
            }

            #[inline]
            fn subtract(&self, prefix: &Self) -> Self {
                debug_assert!(prefix <= self, "subtract: {} is not a prefix of {}", prefix, self);
                self - prefix
            }

            fn write_fixed(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_le_bytes());
            }

            fn read_fixed(data: &[u8]) -> Self {
                let mut raw = [0u8; size_of::<$ty>()];
                raw.copy_from_slice(&data[..size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw)
            }

            fn write_var(&self, buf: &mut Vec<u8>) {
                write_varint(buf, *self as u64);
            }

            fn read_var(data: &[u8], pos: &mut usize) -> Result<Self, FstError> {
                let v = read_varint(data, pos)?;
                <$ty>::try_from(v).map_err(|_| {
                    FstError::Corrupt(format!("output {v} overflows {}", stringify!($ty)))
                })
            }
        }
    };
}

// Signed outputs use wrapping arithmetic: with `min` as the common prefix the
// difference of two extreme values does not fit the type, but the identity
// above still holds modulo 2^N, and zig-zag keeps small magnitudes short.
macro_rules! signed_output {
    ($ty:ty, $uty:ty) => {
        impl Output for $ty {
            const FIXED_WIDTH: usize = size_of::<$ty>();
            const MIN_VAR_WIDTH: usize = 1;

            #[inline]
            fn zero() -> Self {
                0
            }

            #[inline]
            fn add(&self, other: &Self) -> Self {
                self.wrapping_add(*other)
            }

            #[inline]
            fn common_prefix(&self, other: &Self) -> Self {
                (*self).min(*other)
            }

            #[inline]
            fn subtract(&self, prefix: &Self) -> Self {
                self.wrapping_sub(*prefix)
            }

            fn write_fixed(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_le_bytes());
            }

            fn read_fixed(data: &[u8]) -> Self {
                let mut raw = [0u8; size_of::<$ty>()];
                raw.copy_from_slice(&data[..size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw)
            }

            fn write_var(&self, buf: &mut Vec<u8>) {
                let zigzag = ((self << 1) ^ (self >> (<$ty>::BITS - 1))) as $uty;
                write_varint(buf, zigzag as u64);
            }

            fn read_var(data: &[u8], pos: &mut usize) -> Result<Self, FstError> {
                let v = read_varint(data, pos)?;
                let zigzag = <$uty>::try_from(v).map_err(|_| {
                    FstError::Corrupt(format!("output {v} overflows {}", stringify!($ty)))
                })?;
                Ok(((zigzag >> 1) as $ty) ^ -((zigzag & 1) as $ty))
            }
        }
    };
}

unsigned_output!(u32);
unsigned_output!(u64);
signed_output!(i32, u32);
signed_output!(i64, u64);

#[cfg(test)]
mod tests {
    use super::*;

    fn check_identity<O: Output>(a: O, b: O) {
        let prefix = a.common_prefix(&b);
        assert_eq!(prefix.add(&a.subtract(&prefix)), a);
        assert_eq!(prefix.add(&b.subtract(&prefix)), b);
    }

    #[test]
    fn unsigned_algebra() {
        assert_eq!(41198u32.common_prefix(&2513), 2513);
        assert_eq!(41198u32.subtract(&2513), 38685);
        assert!(0u64.is_zero());
        check_identity(41198u32, 2513);
        check_identity(7u64, 7);
        check_identity(0u64, u64::MAX);
    }

    #[test]
    fn signed_algebra_with_extremes() {
        check_identity(-5i32, 12);
        check_identity(i32::MAX, i32::MIN);
        check_identity(i64::MIN, 0);
    }

    #[test]
    fn unit_output_is_trivial() {
        check_identity((), ());
        assert!(().is_zero());
        let mut buf = Vec::new();
        ().write_fixed(&mut buf);
        ().write_var(&mut buf);
        assert!(buf.is_empty());
    }

    #[test]
    fn fixed_encoding_is_little_endian() {
        let mut buf = Vec::new();
        0x0102_0304u32.write_fixed(&mut buf);
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(u32::read_fixed(&buf), 0x0102_0304);

        buf.clear();
        (-2i64).write_fixed(&mut buf);
        assert_eq!(buf.len(), i64::FIXED_WIDTH);
        assert_eq!(i64::read_fixed(&buf), -2);
    }

    #[test]
    fn zigzag_keeps_small_negatives_short() {
        let mut buf = Vec::new();
        (-1i32).write_var(&mut buf);
        assert_eq!(buf, [0x01]);
        buf.clear();
        1i32.write_var(&mut buf);
        assert_eq!(buf, [0x02]);

        for v in [0i64, -64, 63, i64::MIN, i64::MAX] {
            buf.clear();
            v.write_var(&mut buf);
            let mut pos = 0;
            assert_eq!(i64::read_var(&buf, &mut pos).unwrap(), v);
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn narrow_var_read_rejects_overflow() {
        let mut buf = Vec::new();
        write_varint(&mut buf, u64::from(u32::MAX) + 1);
        let mut pos = 0;
        assert!(matches!(
            u32::read_var(&buf, &mut pos),
            Err(FstError::Corrupt(_))
        ));
    }
}
