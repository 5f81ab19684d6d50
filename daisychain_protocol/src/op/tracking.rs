//! EVI-D30/D31 auto-tracking (AT) and motion detection (MD) operations,
//! category `0x07`.
//!
//! Most are switches taking on (`0x02`), off (`0x03`) or toggle (`0x10`).
use super::{check_range, on_off, Builder, Category, Operation, ReplyShape, Value, TOGGLE};
use crate::Result;

const ATMD_START_STOP: u8 = 0x06;
const AT_CHASE: u8 = 0x07;
const MD_FRAME: u8 = 0x09;
const MD_DETECT: u8 = 0x0a;
const ATMD_MODE_INQ: u8 = 0x22;
const AT_MODE_INQ: u8 = 0x23;
const MD_MODE_INQ: u8 = 0x24;
const MD_ADJUST: u8 = 0x00;
const MD_REFTIME_INQ: u8 = 0x11;
const AT_LOST_INFO: u8 = 0x20;
const MD_LOST_INFO: u8 = 0x21;
const LOST_INFO: [u8; 2] = [0x20, 0x07];
const AT_POSITION_INQ: u8 = 0x20;
const MD_POSITION_INQ: u8 = 0x21;

/// Largest motion detection adjustment value.
pub const MAX_MD_ADJUST: u8 = 0x0f;

/// Tracking features which can be switched on, off or toggled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum TrackingSwitch {
    AutoTracking = 0x01,
    AutoTrackingAutoExposure = 0x02,
    AutoTrackingAutoZoom = 0x03,
    FrameDisplay = 0x04,
    AutoTrackingFrameOffset = 0x05,
    AutoTrackingChase = 0x07,
    MotionDetection = 0x08,
    AutoTrackingEntry = 0x15,
    MotionDetectionMeasureMode1 = 0x27,
    MotionDetectionMeasureMode2 = 0x28,
}

impl TrackingSwitch {
    pub fn set(self, on: bool) -> Operation {
        Operation::command(Category::Camera2, [self as u8, on_off(on)])
    }

    pub fn toggle(self) -> Operation {
        Operation::command(Category::Camera2, [self as u8, TOGGLE])
    }

    pub fn inquiry(self) -> Operation {
        Operation::inquiry(Category::Camera2, [self as u8], ReplyShape::Byte)
    }
}

/// Motion detection settings, adjusted with `81 01 07 00 ss 00 0p ff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum MdAdjust {
    YLevel = 0x0b,
    HueLevel = 0x0c,
    Size = 0x0d,
    DisplayTime = 0x0f,
    RefMode = 0x10,
}

impl MdAdjust {
    pub fn set(self, value: u8) -> Result<Operation> {
        let value = check_range("motion detection adjustment", value, 0..=MAX_MD_ADJUST)?;
        Ok(Operation::command(
            Category::Camera2,
            [MD_ADJUST, self as u8, 0x00, value],
        ))
    }

    pub fn inquiry(self) -> Operation {
        Operation::inquiry(Category::Camera2, [MD_ADJUST, self as u8], ReplyShape::Byte)
    }
}

/// Motion detection reference time.
///
/// There is no setter: its sub-code is the same as [MdAdjust::YLevel].
pub fn md_reftime_inquiry() -> Operation {
    Operation::inquiry(Category::Camera2, [MD_REFTIME_INQ], ReplyShape::Byte)
}

/// Asks the camera to report when auto-tracking loses its target.
pub fn at_lost_info() -> Operation {
    Operation::command(
        Category::Camera2,
        [AT_LOST_INFO, LOST_INFO[0], LOST_INFO[1]],
    )
}

/// Asks the camera to report when motion detection loses its target.
pub fn md_lost_info() -> Operation {
    Operation::command(
        Category::Camera2,
        [MD_LOST_INFO, LOST_INFO[0], LOST_INFO[1]],
    )
}

/// Tracked object position, from [at_position_inquiry] or
/// [md_position_inquiry].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectPosition {
    pub x: u8,
    pub y: u8,
    pub status: u8,
}

impl ObjectPosition {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Raw(b) if b.len() == 3 => Some(Self {
                x: b[0],
                y: b[1],
                status: b[2],
            }),
            _ => None,
        }
    }
}

pub fn at_position_inquiry() -> Operation {
    Operation::inquiry(Category::Camera2, [AT_POSITION_INQ], ReplyShape::Raw)
}

pub fn md_position_inquiry() -> Operation {
    Operation::inquiry(Category::Camera2, [MD_POSITION_INQ], ReplyShape::Raw)
}

/// Starts or stops tracking / detection, whichever mode is selected.
pub fn start_stop() -> Operation {
    Operation::command(Category::Camera2, [ATMD_START_STOP, TOGGLE])
}

/// Moves the chase to the next target.
pub fn chase_next() -> Operation {
    Operation::command(Category::Camera2, [AT_CHASE, TOGGLE])
}

/// Sets the motion detection frame.
pub fn md_frame() -> Operation {
    Operation::command(Category::Camera2, [MD_FRAME, TOGGLE])
}

/// Sets the motion detection reference.
pub fn md_detect() -> Operation {
    Operation::command(Category::Camera2, [MD_DETECT, TOGGLE])
}

pub fn atmd_mode_inquiry() -> Operation {
    Operation::inquiry(Category::Camera2, [ATMD_MODE_INQ], ReplyShape::Byte)
}

pub fn at_mode_inquiry() -> Operation {
    Operation::inquiry(Category::Camera2, [AT_MODE_INQ], ReplyShape::Word)
}

pub fn md_mode_inquiry() -> Operation {
    Operation::inquiry(Category::Camera2, [MD_MODE_INQ], ReplyShape::Word)
}

pub(super) const CATALOG: &[(&str, Builder)] = &[
    ("auto_tracking_on", || TrackingSwitch::AutoTracking.set(true)),
    ("auto_tracking_off", || TrackingSwitch::AutoTracking.set(false)),
    ("auto_tracking_toggle", || TrackingSwitch::AutoTracking.toggle()),
    ("motion_detection_on", || {
        TrackingSwitch::MotionDetection.set(true)
    }),
    ("motion_detection_off", || {
        TrackingSwitch::MotionDetection.set(false)
    }),
    ("tracking_start_stop", start_stop),
    ("tracking_chase_next", chase_next),
    ("md_frame", md_frame),
    ("md_detect", md_detect),
    ("atmd_mode_inquiry", atmd_mode_inquiry),
    ("at_mode_inquiry", at_mode_inquiry),
    ("at_entry_inquiry", || {
        TrackingSwitch::AutoTrackingEntry.inquiry()
    }),
    ("md_mode_inquiry", md_mode_inquiry),
    ("md_ylevel_inquiry", || MdAdjust::YLevel.inquiry()),
    ("md_huelevel_inquiry", || MdAdjust::HueLevel.inquiry()),
    ("md_size_inquiry", || MdAdjust::Size.inquiry()),
    ("md_disptime_inquiry", || MdAdjust::DisplayTime.inquiry()),
    ("md_refmode_inquiry", || MdAdjust::RefMode.inquiry()),
    ("md_reftime_inquiry", md_reftime_inquiry),
    ("at_lost_info", at_lost_info),
    ("md_lost_info", md_lost_info),
    ("at_position_inquiry", at_position_inquiry),
    ("md_position_inquiry", md_position_inquiry),
];
