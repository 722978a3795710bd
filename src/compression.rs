// https://en.wikipedia.org/wiki/TIFF#TIFF_Compression_Tag
// https://exiftool.org/TagNames/EXIF.html#Compression
// https://github.com/image-rs/image-tiff/blob/master/src/decoder/mod.rs

use crate::tiff::Endian;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use num_enum::{FromPrimitive, IntoPrimitive};
use salzweg::decoder::{DecodingError, TiffStyleDecoder};
use salzweg::encoder::{EncodingError, TiffStyleEncoder};
use std::io::{self, Read, Write};

#[derive(Debug)]
pub enum DecompressError {
    LzwError(DecodingError),
    LzwEncodeError(EncodingError),
    CompressionNotSupported(Compression),
    PredictorNotSupported(Predictor),
    PackBitsOverrun,
    LengthMismatch { expected: usize, actual: usize },
    IoError(io::Error),
}

impl From<io::Error> for DecompressError {
    fn from(e: io::Error) -> Self {
        DecompressError::IoError(e)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Compression {
    Uncompressed = 1,
    CCITT1D = 2,
    T4Group3Fax = 3,
    T6Group4Fax = 4,
    Lzw = 5,
    JpegOld = 6,
    Jpeg = 7,
    DeflateAdobe = 8,
    PackBits = 32773,
    Deflate = 32946,
    ESRILerc = 34887,
    LZMA2 = 34925,
    Zstd = 34926,
    WebP = 34927,
    JPEGXL = 52546,

    #[num_enum(catch_all)]
    Unknown(u16),
}

impl Compression {
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::Uncompressed | Self::Lzw | Self::DeflateAdobe | Self::Deflate | Self::PackBits
        )
    }

    /// Decompress one segment, which must inflate to exactly `expected_len` bytes.
    pub fn decode(&self, bytes: &[u8], expected_len: usize) -> Result<Vec<u8>, DecompressError> {
        let buf = match self {
            Self::Uncompressed => bytes.to_vec(),
            Self::Lzw => TiffStyleDecoder::decode_to_vec(bytes).map_err(DecompressError::LzwError)?,
            Self::DeflateAdobe | Self::Deflate => {
                let mut buf = Vec::with_capacity(expected_len);
                ZlibDecoder::new(bytes).read_to_end(&mut buf)?;
                buf
            }
            Self::PackBits => unpack_bits(bytes, expected_len)?,
            other => return Err(DecompressError::CompressionNotSupported(*other)),
        };
        if buf.len() != expected_len {
            return Err(DecompressError::LengthMismatch {
                expected: expected_len,
                actual: buf.len(),
            });
        }
        Ok(buf)
    }

    pub fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecompressError> {
        match self {
            Self::Uncompressed => Ok(bytes.to_vec()),
            Self::Lzw => {
                TiffStyleEncoder::encode_to_vec(bytes).map_err(DecompressError::LzwEncodeError)
            }
            Self::DeflateAdobe | Self::Deflate => {
                let mut encoder = ZlibEncoder::new(vec![], flate2::Compression::default());
                encoder.write_all(bytes)?;
                Ok(encoder.finish()?)
            }
            Self::PackBits => Ok(pack_bits(bytes)),
            other => Err(DecompressError::CompressionNotSupported(*other)),
        }
    }
}

// https://web.archive.org/web/20080705155158/http://developer.apple.com/technotes/tn/tn1023.html
fn unpack_bits(bytes: &[u8], expected_len: usize) -> Result<Vec<u8>, DecompressError> {
    let mut out = Vec::with_capacity(expected_len);
    let mut i = 0;
    while i < bytes.len() && out.len() < expected_len {
        let n = bytes[i] as i8;
        i += 1;
        match n {
            0..=127 => {
                let count = n as usize + 1;
                let literal = bytes
                    .get(i..i + count)
                    .ok_or(DecompressError::PackBitsOverrun)?;
                out.extend_from_slice(literal);
                i += count;
            }
            -127..=-1 => {
                let value = *bytes.get(i).ok_or(DecompressError::PackBitsOverrun)?;
                out.extend(std::iter::repeat(value).take(1 + (-n) as usize));
                i += 1;
            }
            -128 => {} // no-op
        }
    }
    Ok(out)
}

fn pack_bits(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 128 + 1);
    let mut i = 0;
    while i < bytes.len() {
        let mut run = 1;
        while i + run < bytes.len() && run < 128 && bytes[i + run] == bytes[i] {
            run += 1;
        }
        if run > 1 {
            out.push((1 - run as i16) as i8 as u8);
            out.push(bytes[i]);
            i += run;
            continue;
        }

        let start = i;
        while i < bytes.len()
            && i - start < 128
            && !(i + 1 < bytes.len() && bytes[i + 1] == bytes[i])
        {
            i += 1;
        }
        if i == start {
            // next byte starts a run, emit the current one alone
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&bytes[start..i]);
    }
    out
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Predictor {
    No = 1,
    Horizontal = 2,
    FloatingPoint = 3,

    #[num_enum(catch_all)]
    Unknown(u16),
}

macro_rules! accumulate {
    ($row:expr, $stride:expr, $endian:expr, $n:literal, $t:ty) => {{
        let samples = $row.len() / $n;
        for i in $stride..samples {
            let prev: $t = $endian.decode_slice::<$n, $t>(&$row[(i - $stride) * $n..]).unwrap_or(0);
            let cur: $t = $endian.decode_slice::<$n, $t>(&$row[i * $n..]).unwrap_or(0);
            let sum = cur.wrapping_add(prev);
            $row[i * $n..(i + 1) * $n].copy_from_slice(&$endian.encode::<$n, $t>(sum));
        }
    }};
}

macro_rules! difference {
    ($row:expr, $stride:expr, $endian:expr, $n:literal, $t:ty) => {{
        let samples = $row.len() / $n;
        for i in ($stride..samples).rev() {
            let prev: $t = $endian.decode_slice::<$n, $t>(&$row[(i - $stride) * $n..]).unwrap_or(0);
            let cur: $t = $endian.decode_slice::<$n, $t>(&$row[i * $n..]).unwrap_or(0);
            let delta = cur.wrapping_sub(prev);
            $row[i * $n..(i + 1) * $n].copy_from_slice(&$endian.encode::<$n, $t>(delta));
        }
    }};
}

impl Predictor {
    /// Apply the predictor in place before compression, the inverse of `undo`.
    pub fn apply(
        &self,
        buffer: &mut [u8],
        width: usize,
        bytes_per_sample: usize,
        samples_per_pixel: usize,
        endian: Endian,
    ) -> Result<(), DecompressError> {
        let row_bytes = width * samples_per_pixel * bytes_per_sample;
        if row_bytes == 0 {
            return Ok(());
        }
        match self {
            Self::No => {}
            Self::Horizontal => {
                for row in buffer.chunks_exact_mut(row_bytes) {
                    match bytes_per_sample {
                        1 => difference!(row, samples_per_pixel, endian, 1, u8),
                        2 => difference!(row, samples_per_pixel, endian, 2, u16),
                        4 => difference!(row, samples_per_pixel, endian, 4, u32),
                        8 => difference!(row, samples_per_pixel, endian, 8, u64),
                        _ => return Err(DecompressError::PredictorNotSupported(*self)),
                    }
                }
            }
            Self::FloatingPoint => {
                let mut shuffled = vec![0; row_bytes];
                let samples = width * samples_per_pixel;
                for row in buffer.chunks_exact_mut(row_bytes) {
                    for sample in 0..samples {
                        for byte in 0..bytes_per_sample {
                            let plane = match endian {
                                Endian::Big => byte,
                                Endian::Little => bytes_per_sample - byte - 1,
                            };
                            shuffled[plane * samples + sample] =
                                row[sample * bytes_per_sample + byte];
                        }
                    }
                    for i in (samples_per_pixel..row_bytes).rev() {
                        shuffled[i] = shuffled[i].wrapping_sub(shuffled[i - samples_per_pixel]);
                    }
                    row.copy_from_slice(&shuffled);
                }
            }
            other => return Err(DecompressError::PredictorNotSupported(*other)),
        }
        Ok(())
    }

    /// Undo the predictor in place over a decompressed segment of rows
    /// `width` pixels wide.
    pub fn undo(
        &self,
        buffer: &mut [u8],
        width: usize,
        bytes_per_sample: usize,
        samples_per_pixel: usize,
        endian: Endian,
    ) -> Result<(), DecompressError> {
        let row_bytes = width * samples_per_pixel * bytes_per_sample;
        if row_bytes == 0 {
            return Ok(());
        }
        match self {
            Self::No => {}
            Self::Horizontal => {
                for row in buffer.chunks_exact_mut(row_bytes) {
                    match bytes_per_sample {
                        1 => accumulate!(row, samples_per_pixel, endian, 1, u8),
                        2 => accumulate!(row, samples_per_pixel, endian, 2, u16),
                        4 => accumulate!(row, samples_per_pixel, endian, 4, u32),
                        8 => accumulate!(row, samples_per_pixel, endian, 8, u64),
                        _ => return Err(DecompressError::PredictorNotSupported(*self)),
                    }
                }
            }
            Self::FloatingPoint => {
                let mut shuffled = vec![0; row_bytes];
                let samples = width * samples_per_pixel;
                for row in buffer.chunks_exact_mut(row_bytes) {
                    for i in samples_per_pixel..row_bytes {
                        row[i] = row[i].wrapping_add(row[i - samples_per_pixel]);
                    }
                    shuffled.copy_from_slice(row);
                    // byte planes are stored most significant first
                    for sample in 0..samples {
                        for byte in 0..bytes_per_sample {
                            let plane = match endian {
                                Endian::Big => byte,
                                Endian::Little => bytes_per_sample - byte - 1,
                            };
                            row[sample * bytes_per_sample + byte] =
                                shuffled[plane * samples + sample];
                        }
                    }
                }
            }
            other => return Err(DecompressError::PredictorNotSupported(*other)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut bytes: Vec<u8> = (0..=255).collect();
        bytes.extend(std::iter::repeat(7).take(300));
        bytes.extend([1, 2, 2, 3, 3, 3]);
        bytes
    }

    #[test]
    fn codecs_restore_their_input() {
        let bytes = sample();
        for codec in [
            Compression::Uncompressed,
            Compression::Lzw,
            Compression::DeflateAdobe,
            Compression::Deflate,
            Compression::PackBits,
        ] {
            let encoded = codec.encode(&bytes).unwrap();
            assert_eq!(codec.decode(&encoded, bytes.len()).unwrap(), bytes, "{codec:?}");
        }
    }

    #[test]
    fn packbits_reference_vector() {
        // Apple TN1023 example
        let packed = [
            0xFE, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7,
            0xAA,
        ];
        let unpacked = [
            0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        assert_eq!(
            Compression::PackBits.decode(&packed, unpacked.len()).unwrap(),
            unpacked
        );
    }

    #[test]
    fn wrong_length_is_reported() {
        let encoded = Compression::Deflate.encode(&[1, 2, 3]).unwrap();
        assert!(matches!(
            Compression::Deflate.decode(&encoded, 4),
            Err(DecompressError::LengthMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn unknown_codec_keeps_its_id() {
        let codec = Compression::from(50000);
        assert_eq!(codec, Compression::Unknown(50000));
        assert!(!codec.is_supported());
        assert!(matches!(
            codec.decode(&[], 0),
            Err(DecompressError::CompressionNotSupported(Compression::Unknown(50000)))
        ));
        assert!(!Compression::Jpeg.is_supported());
    }

    #[test]
    fn horizontal_predictor_16_bit() {
        let endian = Endian::Little;
        // two pixels per row, one sample, deltas 100 then +5
        let mut buf = endian.encode_all(&[100u16, 5, 200, 65535]);
        Predictor::Horizontal.undo(&mut buf, 2, 2, 1, endian).unwrap();
        let values: Vec<u16> = endian.decode_all::<2, u16>(&buf).unwrap();
        assert_eq!(values, vec![100, 105, 200, 199]);
    }

    #[test]
    fn predictors_invert() {
        for endian in [Endian::Little, Endian::Big] {
            let values = [3.5f64, -1.0, 1e10, 0.0, 7.25, -8.5];
            let original = endian.encode_all(&values);
            for predictor in [Predictor::Horizontal, Predictor::FloatingPoint] {
                // three pixels of two samples per row
                let mut buf = original.clone();
                predictor.apply(&mut buf, 3, 8, 2, endian).unwrap();
                assert_ne!(buf, original);
                predictor.undo(&mut buf, 3, 8, 2, endian).unwrap();
                assert_eq!(buf, original, "{predictor:?} {endian:?}");
            }
        }
    }

    #[test]
    fn floating_point_predictor() {
        let values = [1.5f32, -2.25, 1000.0];
        let endian = Endian::Big;
        // forward: split into byte planes, then byte-wise difference
        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        let n = values.len();
        let mut planes = vec![0u8; raw.len()];
        for s in 0..n {
            for b in 0..4 {
                planes[b * n + s] = raw[s * 4 + b];
            }
        }
        let mut encoded = planes.clone();
        for i in (1..planes.len()).rev() {
            encoded[i] = planes[i].wrapping_sub(planes[i - 1]);
        }
        Predictor::FloatingPoint.undo(&mut encoded, n, 4, 1, endian).unwrap();
        assert_eq!(encoded, raw);
    }
}
