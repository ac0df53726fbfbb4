//! Key types a B+Tree can index.

use std::cmp::Ordering;
use std::fmt;

/// A fixed-width, totally ordered key.
///
/// Nodes store keys back to back, so every key of a type must encode to
/// exactly `ENCODED_SIZE` bytes. Ordering comes from `Ord` on the decoded
/// value, never from the encoded bytes.
pub trait IndexKey: Ord + Copy + Default + fmt::Debug + Send + Sync + 'static {
    const ENCODED_SIZE: usize;

    /// Write the key into `buf[..ENCODED_SIZE]`.
    fn encode(&self, buf: &mut [u8]);

    /// Read a key from `buf[..ENCODED_SIZE]`.
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! impl_index_key_for_int {
    ($($ty:ty),*) => {
        $(
            impl IndexKey for $ty {
                const ENCODED_SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn encode(&self, buf: &mut [u8]) {
                    buf[..Self::ENCODED_SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn decode(buf: &[u8]) -> Self {
                    let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                    bytes.copy_from_slice(&buf[..Self::ENCODED_SIZE]);
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_index_key_for_int!(i32, i64, u32, u64);

/// Fixed-width byte-string key, compared lexicographically.
///
/// Shorter inputs are zero-padded, so `"ab"` and `"ab\0"` are the same key.
///
/// # Example
/// ```
/// use crabtree::index::btree::GenericKey;
///
/// let a = GenericKey::<8>::from_bytes(b"apple");
/// let b = GenericKey::<8>::from_bytes(b"banana");
/// assert!(a < b);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericKey<const N: usize>([u8; N]);

impl<const N: usize> GenericKey<N> {
    /// Build a key from at most `N` bytes; extra bytes are cut off.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; N];
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Self(data)
    }

    /// Big-endian encoding so byte order matches numeric order for
    /// non-negative values.
    pub fn from_u64(value: u64) -> Self {
        Self::from_bytes(&value.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self([0u8; N])
    }
}

impl<const N: usize> PartialOrd for GenericKey<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const N: usize> Ord for GenericKey<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_slice().cmp(other.0.as_slice())
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        write!(f, "GenericKey({:?})", String::from_utf8_lossy(&self.0[..end]))
    }
}

impl<const N: usize> IndexKey for GenericKey<N> {
    const ENCODED_SIZE: usize = N;

    fn encode(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.0);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(&buf[..N]);
        Self(data)
    }
}
