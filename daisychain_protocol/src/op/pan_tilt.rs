//! Pan-tilter operations (category `0x06`).
//!
//! Positions are signed 16-bit values in device steps, nibble-split on the
//! wire. Speeds are single bytes.
use super::{check_range, on_off, Builder, Category, Operation, ReplyShape, Value, TOGGLE};
use crate::{util::Nibble16, Result};

const IR_RECEIVE: u8 = 0x08;
const DRIVE: u8 = 0x01;
const ABSOLUTE_POSITION: u8 = 0x02;
const RELATIVE_POSITION: u8 = 0x03;
const HOME: u8 = 0x04;
const RESET: u8 = 0x05;
const DATA_SCREEN: u8 = 0x06;
const LIMIT: u8 = 0x07;
const LIMIT_SET: u8 = 0x00;
const LIMIT_CLEAR: u8 = 0x01;
const MODE_INQ: u8 = 0x10;
const MAX_SPEED_INQ: u8 = 0x11;
const POSITION_INQ: u8 = 0x12;
const VIDEO_SYSTEM_INQ: u8 = 0x23;

pub const MAX_PAN_SPEED: u8 = 0x18;
pub const MAX_TILT_SPEED: u8 = 0x14;
pub const PAN_RANGE: std::ops::RangeInclusive<i16> = -880..=880;
pub const TILT_RANGE: std::ops::RangeInclusive<i16> = -300..=300;

/// A pan/tilt position, or offset for [relative] moves.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PanTiltPosition {
    pub pan: i16,
    pub tilt: i16,
}

impl PanTiltPosition {
    pub const fn new(pan: i16, tilt: i16) -> Self {
        Self { pan, tilt }
    }

    /// Extracts a position from a [position_inquiry] reply.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::SignedPair(pan, tilt) => Some(Self::new(*pan, *tilt)),
            _ => None,
        }
    }

    fn nibbles(self) -> [u8; 8] {
        let mut o = [0; 8];
        o[..4].copy_from_slice(&Nibble16::from_signed(self.pan).to_bytes());
        o[4..].copy_from_slice(&Nibble16::from_signed(self.tilt).to_bytes());
        o
    }

    fn check(self, pan: std::ops::RangeInclusive<i16>, tilt: std::ops::RangeInclusive<i16>) -> Result<Self> {
        check_range("pan position", self.pan, pan)?;
        check_range("tilt position", self.tilt, tilt)?;
        Ok(self)
    }
}

/// Direction for [drive].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
    Stop,
}

impl Direction {
    /// Horizontal and vertical drive bytes.
    const fn bytes(self) -> [u8; 2] {
        const LEFT: u8 = 0x01;
        const RIGHT: u8 = 0x02;
        const UP: u8 = 0x01;
        const DOWN: u8 = 0x02;
        const STOP: u8 = 0x03;

        match self {
            Self::Up => [STOP, UP],
            Self::Down => [STOP, DOWN],
            Self::Left => [LEFT, STOP],
            Self::Right => [RIGHT, STOP],
            Self::UpLeft => [LEFT, UP],
            Self::UpRight => [RIGHT, UP],
            Self::DownLeft => [LEFT, DOWN],
            Self::DownRight => [RIGHT, DOWN],
            Self::Stop => [STOP, STOP],
        }
    }
}

fn speeds(pan_speed: u8, tilt_speed: u8) -> Result<[u8; 2]> {
    Ok([
        check_range("pan speed", pan_speed, 1..=MAX_PAN_SPEED)?,
        check_range("tilt speed", tilt_speed, 1..=MAX_TILT_SPEED)?,
    ])
}

/// Starts (or stops) a continuous move.
pub fn drive(direction: Direction, pan_speed: u8, tilt_speed: u8) -> Result<Operation> {
    let mut body = vec![DRIVE];
    body.extend_from_slice(&speeds(pan_speed, tilt_speed)?);
    body.extend_from_slice(&direction.bytes());
    Ok(Operation::command(Category::PanTilt, body))
}

/// Stops any continuous move.
///
/// Speeds are ignored when stopping, so the slowest valid speeds are sent.
/// Use [drive] with [Direction::Stop] to send others.
pub fn stop() -> Operation {
    let [h, v] = Direction::Stop.bytes();
    Operation::command(Category::PanTilt, [DRIVE, 0x01, 0x01, h, v])
}

fn position_command(
    opcode: u8,
    position: PanTiltPosition,
    pan_speed: u8,
    tilt_speed: u8,
) -> Result<Operation> {
    let mut body = vec![opcode];
    body.extend_from_slice(&speeds(pan_speed, tilt_speed)?);
    body.extend_from_slice(&position.nibbles());
    Ok(Operation::command(Category::PanTilt, body))
}

/// Moves to `position`, which must be within [PAN_RANGE] and [TILT_RANGE].
pub fn absolute(position: PanTiltPosition, pan_speed: u8, tilt_speed: u8) -> Result<Operation> {
    let position = position.check(PAN_RANGE, TILT_RANGE)?;
    position_command(ABSOLUTE_POSITION, position, pan_speed, tilt_speed)
}

/// Moves by `offset` from the current position.
pub fn relative(offset: PanTiltPosition, pan_speed: u8, tilt_speed: u8) -> Result<Operation> {
    let offset = offset.check(
        PAN_RANGE.start() * 2..=PAN_RANGE.end() * 2,
        TILT_RANGE.start() * 2..=TILT_RANGE.end() * 2,
    )?;
    position_command(RELATIVE_POSITION, offset, pan_speed, tilt_speed)
}

pub fn home() -> Operation {
    Operation::command(Category::PanTilt, [HOME])
}

/// Re-initialises the pan-tilter.
pub fn reset() -> Operation {
    Operation::command(Category::PanTilt, [RESET])
}

/// Corner of the travel limit box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum LimitCorner {
    DownLeft = 0x00,
    UpRight = 0x01,
}

pub fn limit_set(corner: LimitCorner, position: PanTiltPosition) -> Result<Operation> {
    let position = position.check(PAN_RANGE, TILT_RANGE)?;
    let mut body = vec![LIMIT, LIMIT_SET, corner as u8];
    body.extend_from_slice(&position.nibbles());
    Ok(Operation::command(Category::PanTilt, body))
}

pub fn limit_clear(corner: LimitCorner) -> Operation {
    Operation::command(
        Category::PanTilt,
        [
            LIMIT,
            LIMIT_CLEAR,
            corner as u8,
            0x07,
            0x0f,
            0x0f,
            0x0f,
            0x07,
            0x0f,
            0x0f,
            0x0f,
        ],
    )
}

/// Shows the pan-tilter's data screen on the video output.
pub fn data_screen(on: bool) -> Operation {
    Operation::command(Category::PanTilt, [DATA_SCREEN, on_off(on)])
}

pub fn data_screen_toggle() -> Operation {
    Operation::command(Category::PanTilt, [DATA_SCREEN, TOGGLE])
}

pub fn data_screen_inquiry() -> Operation {
    Operation::inquiry(Category::PanTilt, [DATA_SCREEN], ReplyShape::Byte)
}

/// Enables the infra-red remote control receiver.
pub fn ir_receive(on: bool) -> Operation {
    Operation::command(Category::PanTilt, [IR_RECEIVE, on_off(on)])
}

pub fn ir_receive_toggle() -> Operation {
    Operation::command(Category::PanTilt, [IR_RECEIVE, TOGGLE])
}

pub fn ir_receive_inquiry() -> Operation {
    Operation::inquiry(Category::PanTilt, [IR_RECEIVE], ReplyShape::Byte)
}

pub fn video_system_inquiry() -> Operation {
    Operation::inquiry(Category::PanTilt, [VIDEO_SYSTEM_INQ], ReplyShape::Byte)
}

pub fn mode_inquiry() -> Operation {
    Operation::inquiry(Category::PanTilt, [MODE_INQ], ReplyShape::Word)
}

/// Replies with the maximum pan and tilt speeds.
pub fn max_speed_inquiry() -> Operation {
    Operation::inquiry(Category::PanTilt, [MAX_SPEED_INQ], ReplyShape::BytePair)
}

/// Replies with the current [PanTiltPosition].
pub fn position_inquiry() -> Operation {
    Operation::inquiry(Category::PanTilt, [POSITION_INQ], ReplyShape::Nibble16Pair)
}

pub(super) const CATALOG: &[(&str, Builder)] = &[
    ("pan_tilt_stop", stop),
    ("pan_tilt_home", home),
    ("pan_tilt_reset", reset),
    ("pan_tilt_limit_clear_up_right", || {
        limit_clear(LimitCorner::UpRight)
    }),
    ("pan_tilt_limit_clear_down_left", || {
        limit_clear(LimitCorner::DownLeft)
    }),
    ("data_screen_on", || data_screen(true)),
    ("data_screen_off", || data_screen(false)),
    ("data_screen_toggle", data_screen_toggle),
    ("data_screen_inquiry", data_screen_inquiry),
    ("ir_receive_on", || ir_receive(true)),
    ("ir_receive_off", || ir_receive(false)),
    ("ir_receive_toggle", ir_receive_toggle),
    ("ir_receive_inquiry", ir_receive_inquiry),
    ("video_system_inquiry", video_system_inquiry),
    ("pan_tilt_mode_inquiry", mode_inquiry),
    ("pan_tilt_max_speed_inquiry", max_speed_inquiry),
    ("pan_tilt_position_inquiry", position_inquiry),
];

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Error, Recipient};

    fn wire(op: Operation) -> Result<Vec<u8>> {
        op.encode(Recipient::Device(1))?.encode()
    }

    #[test]
    fn drive_directions() -> Result<()> {
        assert_eq!(
            hex::decode("8101060118140101ff")?,
            wire(drive(Direction::UpLeft, MAX_PAN_SPEED, MAX_TILT_SPEED)?)?
        );
        assert_eq!(hex::decode("8101060101010303ff")?, wire(stop())?);
        assert!(matches!(
            drive(Direction::Up, 0, 1),
            Err(Error::ParameterOutOfRange)
        ));
        assert!(drive(Direction::Up, 1, MAX_TILT_SPEED + 1).is_err());
        Ok(())
    }

    #[test]
    fn absolute_position() -> Result<()> {
        let op = absolute(PanTiltPosition::new(-880, 300), 0x10, 0x10)?;
        assert_eq!(
            hex::decode("8101060210100f0c09000001020cff")?,
            wire(op)?
        );
        assert!(absolute(PanTiltPosition::new(881, 0), 1, 1).is_err());
        assert!(absolute(PanTiltPosition::new(0, -301), 1, 1).is_err());
        assert!(relative(PanTiltPosition::new(1000, 0), 1, 1).is_ok());
        Ok(())
    }

    #[test]
    fn limits() -> Result<()> {
        assert_eq!(
            hex::decode("810106070101070f0f0f070f0f0fff")?,
            wire(limit_clear(LimitCorner::UpRight))?
        );
        assert_eq!(
            hex::decode("8101060700000000010000000002ff")?,
            wire(limit_set(LimitCorner::DownLeft, PanTiltPosition::new(16, 2))?)?
        );
        Ok(())
    }

    #[test]
    fn position_reply() -> Result<()> {
        let v = position_inquiry()
            .reply
            .decode(&hex::decode("0f0c09000001020c")?)?;
        assert_eq!(
            Some(PanTiltPosition::new(-880, 300)),
            PanTiltPosition::from_value(&v)
        );
        Ok(())
    }
}
