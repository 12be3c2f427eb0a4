use crate::{error::Error, format::Fmt, value::Value};
use bytes::Bytes;

/// Positional bit-level cursor over an immutable byte buffer.
///
/// Bits are numbered MSB-first within each byte; the stream length is
/// tracked in bits so hex inputs with an odd nibble count keep their exact
/// width (`0x234` is 12 bits, not 16).
#[derive(Clone, Debug)]
pub struct BitStream {
    data: Bytes,
    bit_len: usize,
    pos: usize,
}

impl BitStream {
    pub fn new<B: Into<Bytes>>(data: B) -> Self {
        let data = data.into();
        let bit_len = data.len() * 8;
        Self {
            data,
            bit_len,
            pos: 0,
        }
    }

    /// A stream over `data` truncated to an exact bit length.
    pub fn with_len<B: Into<Bytes>>(data: B, bit_len: usize) -> Result<Self, Error> {
        let data = data.into();
        if bit_len > data.len() * 8 {
            return Err(Error::UnexpectedEnd {
                pos: 0,
                wanted: bit_len,
                len: data.len() * 8,
            });
        }
        Ok(Self {
            data,
            bit_len,
            pos: 0,
        })
    }

    /// Parses a `0x`-prefixed hex string. Odd nibble counts are allowed;
    /// the final nibble occupies the high half of the last byte.
    pub fn from_hex<S: AsRef<str>>(s: S) -> Result<Self, Error> {
        let s = s.as_ref();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| Error::InvalidFormatCode(s.to_owned()))?;
        let mut data = Vec::with_capacity(digits.len().div_ceil(2));
        let mut nibbles = 0_usize;
        let mut pending: Option<u8> = None;
        for c in digits.chars() {
            let nibble = c
                .to_digit(16)
                .ok_or_else(|| Error::InvalidFormatCode(s.to_owned()))? as u8;
            nibbles += 1;
            match pending.take() {
                Some(high) => data.push((high << 4) | nibble),
                None => pending = Some(nibble),
            }
        }
        if let Some(high) = pending {
            data.push(high << 4);
        }
        Ok(Self {
            data: data.into(),
            bit_len: nibbles * 4,
            pos: 0,
        })
    }

    /// Current position in bits.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Total stream length in bits.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Bits left to read.
    pub fn remaining(&self) -> usize {
        self.bit_len - self.pos
    }

    /// Reads one value per the format code, advancing by its bit count.
    pub fn read(&mut self, fmt: &Fmt) -> Result<Value, Error> {
        match fmt {
            Fmt::Uint(width) => Ok(Value::Uint(self.read_bits(*width)?)),
            Fmt::Int(width) => {
                let raw = self.read_bits(*width)?;
                Ok(Value::Int(sign_extend(raw, *width)))
            }
            Fmt::Bytes(count) => self.read_bytes(*count).map(Value::Bytes),
        }
    }

    fn read_bits(&mut self, width: usize) -> Result<u64, Error> {
        if width == 0 || width > 64 {
            return Err(Error::UnsupportedWidth(width));
        }
        self.check_available(width)?;
        let mut value = 0_u64;
        for _ in 0..width {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | u64::from(bit);
            self.pos += 1;
        }
        Ok(value)
    }

    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, Error> {
        self.check_available(count * 8)?;
        if self.pos % 8 == 0 {
            let start = self.pos / 8;
            self.pos += count * 8;
            Ok(self.data[start..start + count].to_vec())
        } else {
            (0..count)
                .map(|_| self.read_bits(8).map(|b| b as u8))
                .collect()
        }
    }

    fn check_available(&self, wanted: usize) -> Result<(), Error> {
        if self.pos + wanted > self.bit_len {
            Err(Error::UnexpectedEnd {
                pos: self.pos,
                wanted,
                len: self.bit_len,
            })
        } else {
            Ok(())
        }
    }
}

fn sign_extend(raw: u64, width: usize) -> i64 {
    if width == 64 {
        raw as i64
    } else if raw & (1 << (width - 1)) != 0 {
        (raw as i128 - (1_i128 << width)) as i64
    } else {
        raw as i64
    }
}

/// Conversion into a [`BitStream`], accepted by `deserialize`.
///
/// Implemented for hex strings (`"0x…"`), byte slices and vectors,
/// [`bytes::Bytes`] and pre-built streams.
pub trait IntoBitStream {
    fn into_bit_stream(self) -> Result<BitStream, Error>;
}

impl IntoBitStream for BitStream {
    fn into_bit_stream(self) -> Result<BitStream, Error> {
        Ok(self)
    }
}

impl IntoBitStream for &str {
    fn into_bit_stream(self) -> Result<BitStream, Error> {
        BitStream::from_hex(self)
    }
}

impl IntoBitStream for &String {
    fn into_bit_stream(self) -> Result<BitStream, Error> {
        BitStream::from_hex(self)
    }
}

impl IntoBitStream for &[u8] {
    fn into_bit_stream(self) -> Result<BitStream, Error> {
        Ok(BitStream::new(self.to_vec()))
    }
}

impl IntoBitStream for Vec<u8> {
    fn into_bit_stream(self) -> Result<BitStream, Error> {
        Ok(BitStream::new(self))
    }
}

impl IntoBitStream for Bytes {
    fn into_bit_stream(self) -> Result<BitStream, Error> {
        Ok(BitStream::new(self))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hex_parsing() {
        let s = BitStream::from_hex("0x34").unwrap();
        assert_eq!(s.bit_len(), 8);

        let s = BitStream::from_hex("0x11ff265434726").unwrap();
        assert_eq!(s.bit_len(), 52);

        assert!(BitStream::from_hex("34").is_err());
        assert!(BitStream::from_hex("0xzz").is_err());
    }

    #[test]
    fn uint_reads_msb_first() {
        let mut s = BitStream::from_hex("0x34").unwrap();
        assert_eq!(s.read(&Fmt::Uint(4)).unwrap(), Value::Uint(3));
        assert_eq!(s.read(&Fmt::Uint(4)).unwrap(), Value::Uint(4));
        assert_eq!(s.remaining(), 0);
    }

    #[test]
    fn unaligned_reads() {
        // 0b1010_1100_0101_0000
        let mut s = BitStream::new(vec![0xac, 0x50]);
        assert_eq!(s.read(&Fmt::Uint(3)).unwrap(), Value::Uint(0b101));
        assert_eq!(s.read(&Fmt::Uint(9)).unwrap(), Value::Uint(0b0_1100_0101));
        assert_eq!(s.pos(), 12);
    }

    #[test]
    fn int_sign_extension() {
        let mut s = BitStream::from_hex("0xff").unwrap();
        assert_eq!(s.read(&Fmt::Int(8)).unwrap(), Value::Int(-1));

        let mut s = BitStream::from_hex("0x7f").unwrap();
        assert_eq!(s.read(&Fmt::Int(8)).unwrap(), Value::Int(127));

        let mut s = BitStream::from_hex("0x8").unwrap();
        assert_eq!(s.read(&Fmt::Int(4)).unwrap(), Value::Int(-8));
    }

    #[test]
    fn byte_reads() {
        let mut s = BitStream::new(vec![0xde, 0xad, 0xbe]);
        assert_eq!(
            s.read(&Fmt::Bytes(2)).unwrap(),
            Value::Bytes(vec![0xde, 0xad])
        );

        // Unaligned: shifted reassembly
        let mut s = BitStream::new(vec![0x0d, 0xea, 0xd0]);
        let _ = s.read(&Fmt::Uint(4)).unwrap();
        assert_eq!(
            s.read(&Fmt::Bytes(2)).unwrap(),
            Value::Bytes(vec![0xde, 0xad])
        );
    }

    #[test]
    fn read_past_end() {
        let mut s = BitStream::from_hex("0x3").unwrap();
        let _ = s.read(&Fmt::Uint(2)).unwrap();
        assert_eq!(
            s.read(&Fmt::Uint(4)),
            Err(Error::UnexpectedEnd {
                pos: 2,
                wanted: 4,
                len: 4,
            })
        );
    }

    #[test]
    fn explicit_bit_length() {
        let s = BitStream::with_len(vec![0xff], 6).unwrap();
        assert_eq!(s.bit_len(), 6);
        assert!(BitStream::with_len(vec![0xff], 9).is_err());
    }
}
