//! On-screen title operations.
//!
//! A title is 20 characters in the camera's own character set, sent in two
//! halves, plus a parameter block for position, colour and blinking.
use super::{check_range, on_off, Builder, Category, Operation};
use crate::{packet::ViscaPacket, Error, Result};

const TITLE_SET: u8 = 0x73;
const TITLE_DISPLAY: u8 = 0x74;
const PARAMS: u8 = 0x00;
const PART1: u8 = 0x01;
const PART2: u8 = 0x02;
const CLEAR: u8 = 0x00;

pub const TITLE_LENGTH: usize = 20;
const PART_LENGTH: usize = TITLE_LENGTH / 2;

/// Character code of a blank.
pub const SPACE: u8 = 0x1b;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum TitleColour {
    White = 0x00,
    Yellow = 0x01,
    Violet = 0x02,
    Red = 0x03,
    Cyan = 0x04,
    Green = 0x05,
    Blue = 0x06,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleData {
    /// Line, from the top.
    pub vposition: u8,
    /// Column of the first character.
    pub hposition: u8,
    pub colour: TitleColour,
    pub blink: bool,
    pub text: [u8; TITLE_LENGTH],
}

impl Default for TitleData {
    fn default() -> Self {
        Self {
            vposition: 0,
            hposition: 0,
            colour: TitleColour::White,
            blink: false,
            text: [SPACE; TITLE_LENGTH],
        }
    }
}

impl TitleData {
    /// Sets the title text from character codes, padding with [SPACE].
    pub fn with_text(mut self, text: &[u8]) -> Result<Self> {
        if text.len() > TITLE_LENGTH {
            error!("title is {} characters, limit is {TITLE_LENGTH}", text.len());
            return Err(Error::InvalidLength);
        }
        if text.contains(&ViscaPacket::TERMINATOR) {
            return Err(Error::ParameterOutOfRange);
        }
        self.text = [SPACE; TITLE_LENGTH];
        self.text[..text.len()].copy_from_slice(text);
        Ok(self)
    }
}

pub fn title_display(on: bool) -> Operation {
    Operation::command(Category::Camera, [TITLE_DISPLAY, on_off(on)])
}

pub fn title_clear() -> Operation {
    Operation::command(Category::Camera, [TITLE_DISPLAY, CLEAR])
}

/// Sets position, colour and blinking of the title.
pub fn title_params(title: &TitleData) -> Result<Operation> {
    let v = check_range("title line", title.vposition, 0..=0x0a)?;
    let h = check_range("title column", title.hposition, 0..=0x17)?;
    Ok(Operation::command(
        Category::Camera,
        [
            TITLE_SET,
            PARAMS,
            v,
            h,
            title.colour as u8,
            on_off(title.blink),
            0,
            0,
            0,
            0,
            0,
            0,
        ],
    ))
}

/// The two commands which set the title text.
pub fn title_text(title: &TitleData) -> Result<[Operation; 2]> {
    if title.text.contains(&ViscaPacket::TERMINATOR) {
        return Err(Error::ParameterOutOfRange);
    }
    let (first, second) = title.text.split_at(PART_LENGTH);
    let part = |n: u8, chars: &[u8]| {
        let mut body = vec![TITLE_SET, n];
        body.extend_from_slice(chars);
        Operation::command(Category::Camera, body)
    };
    Ok([part(PART1, first), part(PART2, second)])
}

pub(super) const CATALOG: &[(&str, Builder)] = &[
    ("title_display_on", || title_display(true)),
    ("title_display_off", || title_display(false)),
    ("title_clear", title_clear),
];

#[cfg(test)]
mod test {
    use super::*;
    use crate::Recipient;

    #[test]
    fn params() -> Result<()> {
        let title = TitleData {
            vposition: 2,
            hposition: 5,
            colour: TitleColour::Red,
            blink: true,
            ..Default::default()
        };
        let pkt = title_params(&title)?.encode(Recipient::Device(1))?.encode()?;
        assert_eq!(hex::decode("810104730002050302000000000000ff")?, pkt);
        assert_eq!(ViscaPacket::MAX_PACKET_LENGTH, pkt.len());

        let title = TitleData {
            hposition: 0x18,
            ..Default::default()
        };
        assert!(title_params(&title).is_err());
        Ok(())
    }

    #[test]
    fn text() -> Result<()> {
        let title = TitleData::default().with_text(&[0, 1, 2])?;
        let [a, b] = title_text(&title)?;
        assert_eq!(
            hex::decode("81010473010001021b1b1b1b1b1b1bff")?,
            a.encode(Recipient::Device(1))?.encode()?
        );
        assert_eq!(&[PART2], &b.body[1..2]);
        assert_eq!(&[SPACE; PART_LENGTH], &b.body[2..]);

        assert!(TitleData::default().with_text(&[0; 21]).is_err());
        assert!(TitleData::default().with_text(&[0xff]).is_err());
        Ok(())
    }
}
