//! Fixed-width values readable from and writable to segments.

mod sealed {
    pub trait Sealed {}
}

/// A primitive that segments store in little-endian byte order.
///
/// Implemented for the integer types from 8 to 64 bits and for `f32` and
/// `f64`. Sealed.
pub trait Scalar: sealed::Sealed + Copy {
    /// The encoded form, `[u8; size_of::<Self>()]`.
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default;

    /// Decode from little-endian bytes.
    fn decode_le(bytes: Self::Bytes) -> Self;

    /// Encode to little-endian bytes.
    fn encode_le(self) -> Self::Bytes;
}

macro_rules! impl_scalar {
    ($($t:ty),* $(,)?) => {$(
        impl sealed::Sealed for $t {}

        impl Scalar for $t {
            type Bytes = [u8; std::mem::size_of::<$t>()];

            #[inline]
            fn decode_le(bytes: Self::Bytes) -> Self {
                <$t>::from_le_bytes(bytes)
            }

            #[inline]
            fn encode_le(self) -> Self::Bytes {
                self.to_le_bytes()
            }
        }
    )*};
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
