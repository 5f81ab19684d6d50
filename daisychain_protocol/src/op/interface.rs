//! Device identity and housekeeping operations.
//!
//! Address set, clear and cancel have fixed bodies outside the
//! kind/category layout; see [ViscaPacket::address_set][crate::ViscaPacket::address_set],
//! [ViscaPacket::clear][crate::ViscaPacket::clear] and
//! [ViscaPacket::cancel][crate::ViscaPacket::cancel].
use super::{on_off, with_nibbles, Builder, Category, Operation, ReplyShape};
use binrw::binrw;

const DEVICE_INFO: u8 = 0x02;
const POWER: u8 = 0x00;
const KEYLOCK: u8 = 0x17;
const CAMERA_ID: u8 = 0x22;

/// Reply to a [device_info] inquiry.
///
/// ## Packet format
///
/// * `u16`: vendor ID
/// * `u16`: model ID
/// * `u16`: ROM version
/// * `u8`: number of sockets
#[binrw]
#[brw(big)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraInfo {
    pub vendor: u16,
    pub model: u16,
    pub rom_version: u16,
    pub socket_count: u8,
}

/// `8x 09 00 02 ff`
pub fn device_info() -> Operation {
    Operation::inquiry(Category::Interface, [DEVICE_INFO], ReplyShape::CameraInfo)
}

pub fn power(on: bool) -> Operation {
    Operation::command(Category::Camera, [POWER, on_off(on)])
}

pub fn power_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [POWER], ReplyShape::Byte)
}

/// Locks out the camera's own controls.
pub fn keylock(on: bool) -> Operation {
    Operation::command(Category::Camera, [KEYLOCK, on_off(on)])
}

pub fn keylock_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [KEYLOCK], ReplyShape::Byte)
}

pub fn set_camera_id(id: u16) -> Operation {
    Operation::command(Category::Camera, with_nibbles(&[CAMERA_ID], id))
}

pub fn camera_id_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [CAMERA_ID], ReplyShape::Nibble16)
}

pub(super) const CATALOG: &[(&str, Builder)] = &[
    ("device_info", device_info),
    ("power_on", || power(true)),
    ("power_off", || power(false)),
    ("power_inquiry", power_inquiry),
    ("keylock_on", || keylock(true)),
    ("keylock_off", || keylock(false)),
    ("keylock_inquiry", keylock_inquiry),
    ("camera_id_inquiry", camera_id_inquiry),
];
