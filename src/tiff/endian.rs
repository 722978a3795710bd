use eio::{FromBytes, ReadExt, ToBytes};
use num_traits::{cast::NumCast, ToPrimitive};
use std::io::Result;
use std::mem;

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    pub fn decode<const N: usize, T: FromBytes<N>>(&self, bytes: [u8; N]) -> Result<T> {
        match self {
            Endian::Big => bytes.as_slice().read_be(),
            Endian::Little => bytes.as_slice().read_le(),
        }
    }

    /// Decode the first `N` bytes of a slice, `None` if the slice is too short.
    pub fn decode_slice<const N: usize, T: FromBytes<N>>(&self, bytes: &[u8]) -> Option<T> {
        bytes
            .get(..N)
            .and_then(|head| head.try_into().ok())
            .and_then(|arr| self.decode::<N, T>(arr).ok())
    }

    pub fn decode_all<const N: usize, T: FromBytes<N>>(&self, bytes: &[u8]) -> Option<Vec<T>> {
        bytes
            .chunks_exact(mem::size_of::<T>())
            .map(|chunk| self.decode_slice::<N, T>(chunk))
            .collect()
    }

    pub fn decode_all_to_primative<const N: usize, A: FromBytes<N> + ToPrimitive, T: NumCast>(
        &self,
        bytes: &[u8],
    ) -> Option<Vec<T>> {
        self.decode_all::<N, A>(bytes)?
            .into_iter()
            .map(|v| T::from(v))
            .collect()
    }

    pub fn encode<const N: usize, T: ToBytes<N>>(&self, value: T) -> [u8; N] {
        match self {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        }
    }

    pub fn encode_all<const N: usize, T: ToBytes<N> + Copy>(&self, values: &[T]) -> Vec<u8> {
        values.iter().flat_map(|v| self.encode(*v)).collect()
    }

    pub fn magic(&self) -> &'static [u8; 2] {
        match self {
            Endian::Big => b"MM",
            Endian::Little => b"II",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_both_byte_orders() {
        let bytes = [0x01, 0x02];
        assert_eq!(Endian::Little.decode::<2, u16>(bytes).unwrap(), 0x0201);
        assert_eq!(Endian::Big.decode::<2, u16>(bytes).unwrap(), 0x0102);
    }

    #[test]
    fn short_slice_is_none() {
        assert_eq!(Endian::Little.decode_slice::<4, u32>(&[1, 2, 3]), None);
    }

    #[test]
    fn decode_all_widens_to_requested_type() {
        let bytes = Endian::Big.encode_all(&[3u16, 700]);
        let values: Vec<u64> = Endian::Big
            .decode_all_to_primative::<2, u16, u64>(&bytes)
            .unwrap();
        assert_eq!(values, vec![3, 700]);
    }
}
