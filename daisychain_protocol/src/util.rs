//! # Nibble-split integers
//!
//! VISCA carries multi-byte numbers one nibble per byte, in the low four bits,
//! most-significant nibble first: `0x1234` goes on the wire as `01 02 03 04`.
//!
//! Signed values (pan/tilt positions, limits) use the same layout with the
//! two's complement bit pattern of an `i16`.
use binrw::binrw;

/// Splits `value` into four nibble bytes, most-significant first.
pub const fn to_nibbles(value: u16) -> [u8; 4] {
    [
        ((value >> 12) & 0xf) as u8,
        ((value >> 8) & 0xf) as u8,
        ((value >> 4) & 0xf) as u8,
        (value & 0xf) as u8,
    ]
}

/// Joins four nibble bytes into a `u16`, ignoring the high nibble of each
/// byte.
pub fn from_nibbles(nibbles: [u8; 4]) -> u16 {
    nibbles
        .iter()
        .fold(0, |acc, n| (acc << 4) | u16::from(n & 0xf))
}

/// A 16-bit value carried as four nibble bytes.
///
/// ## Packet format
///
/// * 4 × `u8`: `0p 0q 0r 0s`, value `0xpqrs`
#[binrw]
#[brw(big)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nibble16(
    #[br(map = from_nibbles)]
    #[bw(map = |v: &u16| to_nibbles(*v))]
    pub u16,
);

impl Nibble16 {
    pub const fn from_signed(value: i16) -> Self {
        Self(value as u16)
    }

    pub const fn signed(self) -> i16 {
        self.0 as i16
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        to_nibbles(self.0)
    }
}

impl From<u16> for Nibble16 {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<Nibble16> for u16 {
    fn from(value: Nibble16) -> Self {
        value.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Result;
    use binrw::{BinRead, BinWrite};
    use std::io::Cursor;

    #[test]
    fn zoom_position() {
        assert_eq!(0x0123, from_nibbles([0x0, 0x1, 0x2, 0x3]));
        assert_eq!([0x0, 0x1, 0x2, 0x3], to_nibbles(0x0123));
    }

    #[test]
    fn ignores_high_nibble() {
        assert_eq!(0x4abc, from_nibbles([0xf4, 0x0a, 0x3b, 0x0c]));
    }

    #[test]
    fn round_trip() {
        for v in [0, 1, 0x4000, 0x7fff, 0xfc90, 0xffff] {
            assert_eq!(v, from_nibbles(to_nibbles(v)));
        }
    }

    #[test]
    fn signed_pan() -> Result<()> {
        // -880, the leftmost pan position of an EVI-D30
        let cmd = hex::decode("0f0c0900")?;
        let v = Nibble16::read(&mut Cursor::new(&cmd))?;
        assert_eq!(-880, v.signed());

        let mut out = Cursor::new(Vec::new());
        Nibble16::from_signed(-880).write(&mut out)?;
        assert_eq!(cmd, out.into_inner());
        Ok(())
    }
}
