//! # Operations
//!
//! Every camera feature is an [Operation]: a descriptor holding the bytes to
//! send and how to interpret the reply. The catalog modules only build
//! descriptors; sending them and correlating replies is up to the client.
//!
//! ## Packet format
//!
//! Outbound operations are encoded as:
//!
//! * `u8`: header, `0x80 | recipient`
//! * `u8`: [kind][OperationKind], `0x01` command or `0x09` inquiry
//! * `u8`: [category][Category]
//! * 1 or more bytes: [body][Operation::body], opcode first
//! * `u8`: terminator, `0xff`
//!
//! Multi-byte parameters are nibble-split ([crate::to_nibbles]).
use crate::{
    packet::{Recipient, ViscaPacket},
    util::{from_nibbles, Nibble16},
    Error, Result,
};
use binrw::BinRead;
use std::{collections::HashMap, io::Cursor};

pub mod camera;
pub mod interface;
pub mod pan_tilt;
pub mod title;
pub mod tracking;

use self::interface::CameraInfo;

/// Generic "on" parameter value.
pub const ON: u8 = 0x02;
/// Generic "off" parameter value.
pub const OFF: u8 = 0x03;
/// Generic "toggle" parameter value.
pub const TOGGLE: u8 = 0x10;

pub(crate) const fn on_off(on: bool) -> u8 {
    if on {
        ON
    } else {
        OFF
    }
}

/// Appends `value` as four nibble bytes to `prefix`.
pub(crate) fn with_nibbles(prefix: &[u8], value: u16) -> Vec<u8> {
    let mut body = prefix.to_vec();
    body.extend_from_slice(&Nibble16(value).to_bytes());
    body
}

/// Checks that `value` is in `range`, for building operations.
pub(crate) fn check_range<T>(name: &str, value: T, range: std::ops::RangeInclusive<T>) -> Result<T>
where
    T: PartialOrd + std::fmt::Debug,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        error!("{name} {value:?} out of range {range:?}");
        Err(Error::ParameterOutOfRange)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum OperationKind {
    Command = 0x01,
    Inquiry = 0x09,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Category {
    Interface = 0x00,
    Camera = 0x04,
    PanTilt = 0x06,
    /// Vendor extensions, such as the EVI-D30 tracking commands.
    Camera2 = 0x07,
}

/// When a command counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Completion {
    /// Wait for the completion (or error) reply on the command's socket.
    #[default]
    Await,
    /// The ACK is enough. The socket stays occupied until the device reports
    /// completion.
    Ack,
}

/// How to decode the data bytes of an inquiry reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReplyShape {
    /// No data is expected.
    #[default]
    None,
    /// One byte.
    Byte,
    /// Two independent bytes.
    BytePair,
    /// Two bytes, big-endian.
    Word,
    /// Four nibble bytes.
    Nibble16,
    /// Four nibble bytes, two's complement.
    SignedNibble16,
    /// Eight nibble bytes, two signed values (pan, tilt).
    Nibble16Pair,
    /// Seven bytes of [CameraInfo].
    CameraInfo,
    /// Passed through undecoded.
    Raw,
}

impl ReplyShape {
    const fn expected_len(self) -> Option<usize> {
        Some(match self {
            Self::None => 0,
            Self::Byte => 1,
            Self::BytePair | Self::Word => 2,
            Self::Nibble16 | Self::SignedNibble16 => 4,
            Self::Nibble16Pair => 8,
            Self::CameraInfo => 7,
            Self::Raw => return None,
        })
    }

    /// Decodes the data bytes of a completion reply (everything after the
    /// `0x50` status byte).
    pub fn decode(self, data: &[u8]) -> Result<Value> {
        if let Some(len) = self.expected_len() {
            if data.len() != len {
                error!(
                    "{self:?} reply should be {len} bytes, got {}",
                    hex::encode(data)
                );
                return Err(Error::InvalidLength);
            }
        }

        Ok(match self {
            Self::None => Value::None,
            Self::Byte => Value::Byte(data[0]),
            Self::BytePair => Value::BytePair(data[0], data[1]),
            Self::Word => Value::Word(u16::from_be_bytes([data[0], data[1]])),
            Self::Nibble16 => {
                Value::Unsigned(from_nibbles([data[0], data[1], data[2], data[3]]))
            }
            Self::SignedNibble16 => Value::Signed(Nibble16::read(&mut Cursor::new(data))?.signed()),
            Self::Nibble16Pair => {
                let mut c = Cursor::new(data);
                let a = Nibble16::read(&mut c)?;
                let b = Nibble16::read(&mut c)?;
                Value::SignedPair(a.signed(), b.signed())
            }
            Self::CameraInfo => Value::CameraInfo(CameraInfo::read(&mut Cursor::new(data))?),
            Self::Raw => Value::Raw(data.to_vec()),
        })
    }
}

/// A decoded inquiry reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    None,
    Byte(u8),
    BytePair(u8, u8),
    Word(u16),
    Unsigned(u16),
    Signed(i16),
    SignedPair(i16, i16),
    CameraInfo(CameraInfo),
    Raw(Vec<u8>),
}

impl Value {
    pub fn byte(&self) -> Option<u8> {
        match self {
            Self::Byte(v) => Some(*v),
            _ => None,
        }
    }

    /// Interprets a [Value::Byte] as an on/off switch.
    pub fn on_off(&self) -> Option<bool> {
        match self.byte()? {
            ON => Some(true),
            OFF => Some(false),
            _ => None,
        }
    }

    pub fn unsigned(&self) -> Option<u16> {
        match self {
            Self::Unsigned(v) | Self::Word(v) => Some(*v),
            _ => None,
        }
    }

    pub fn signed(&self) -> Option<i16> {
        match self {
            Self::Signed(v) => Some(*v),
            _ => None,
        }
    }

    pub fn camera_info(&self) -> Option<CameraInfo> {
        match self {
            Self::CameraInfo(v) => Some(*v),
            _ => None,
        }
    }
}

/// Descriptor of a single command or inquiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub category: Category,
    /// Opcode, sub-opcode and parameter bytes.
    pub body: Vec<u8>,
    pub reply: ReplyShape,
    pub completion: Completion,
}

impl Operation {
    pub fn command(category: Category, body: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: OperationKind::Command,
            category,
            body: body.into(),
            reply: ReplyShape::None,
            completion: Completion::Await,
        }
    }

    pub fn inquiry(category: Category, body: impl Into<Vec<u8>>, reply: ReplyShape) -> Self {
        Self {
            kind: OperationKind::Inquiry,
            category,
            body: body.into(),
            reply,
            completion: Completion::Await,
        }
    }

    /// Treats the command as done once the device acknowledges it.
    pub fn ack_only(mut self) -> Self {
        self.completion = Completion::Ack;
        self
    }

    pub fn is_inquiry(&self) -> bool {
        self.kind == OperationKind::Inquiry
    }

    pub fn awaits_completion(&self) -> bool {
        self.completion == Completion::Await
    }

    pub fn encode(&self, recipient: Recipient) -> Result<ViscaPacket> {
        let mut body = Vec::with_capacity(self.body.len() + 2);
        body.push(self.kind as u8);
        body.push(self.category as u8);
        body.extend_from_slice(&self.body);
        ViscaPacket::new(recipient, body)
    }
}

type Builder = fn() -> Operation;

lazy_static! {
    static ref CATALOG: HashMap<&'static str, Builder> = {
        let mut m: HashMap<&'static str, Builder> = HashMap::new();
        m.extend(interface::CATALOG.iter().copied());
        m.extend(camera::CATALOG.iter().copied());
        m.extend(pan_tilt::CATALOG.iter().copied());
        m.extend(title::CATALOG.iter().copied());
        m.extend(tracking::CATALOG.iter().copied());
        m
    };
}

/// Looks up an operation which takes no parameters by its name, such as
/// `zoom_position_inquiry` or `pan_tilt_home`.
pub fn lookup(name: &str) -> Option<Operation> {
    CATALOG.get(name).map(|f| f())
}

/// All names accepted by [lookup], sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = CATALOG.keys().copied().collect();
    names.sort_unstable();
    names
}
