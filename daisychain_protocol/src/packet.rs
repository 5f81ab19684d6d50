use crate::{Error, Result};
use binrw::{binrw, helpers::until_exclusive, BinRead, BinWrite};
use modular_bitfield::{bitfield, specifiers::B3, specifiers::B4};
use std::{fmt::Debug, io::Cursor};

/// Packet header byte.
///
/// ## Format
///
/// Fields from LSB to MSB:
///
/// * `u4 0x0f`: recipient address (`8` = broadcast, `0` = controller)
/// * `u3 0x70`: sender address (`0` = controller)
/// * `bit 0x80`: marker, always set
///
/// The controller addresses camera 1 with `0x81`; camera 1 replies with
/// `0x90`.
#[bitfield(bits = 8)]
#[repr(u8)]
#[derive(BinRead, BinWrite, Debug, Default, PartialEq, Eq, Clone, Copy)]
#[brw(big)]
#[br(map = From::<u8>::from)]
#[bw(map = |&x| Into::<u8>::into(x))]
pub struct Header {
    pub recipient: B4,
    pub sender: B3,
    pub marker: bool,
}

/// Destination of an outbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recipient {
    /// A single device, by bus address (`1..=7`).
    Device(u8),
    /// Every device on the bus.
    Broadcast,
}

impl Recipient {
    fn address(self) -> Result<u8> {
        match self {
            Recipient::Device(a) if (1..=ViscaPacket::MAX_DEVICES).contains(&a) => Ok(a),
            Recipient::Device(a) => {
                error!("device address {a} out of range");
                Err(Error::ParameterOutOfRange)
            }
            Recipient::Broadcast => Ok(ViscaPacket::BROADCAST_ADDRESS),
        }
    }
}

/// [ViscaPacket] is the unit of communication on a VISCA bus.
///
/// ## Packet format
///
/// * `u8`: [header][Header]
/// * 1 to 14 bytes: [body][Self::body]
/// * `u8`: terminator (`0xff`)
///
/// Outbound bodies start with a command (`0x01`) or inquiry (`0x09`) byte;
/// inbound bodies start with a status byte (see [Response][crate::Response]).
/// There is no checksum.
#[binrw]
#[derive(Clone, PartialEq, Eq)]
#[brw(big)]
pub struct ViscaPacket {
    pub header: Header,

    /// Everything between the header and the terminator.
    #[br(parse_with = until_exclusive(|&b: &u8| b == ViscaPacket::TERMINATOR))]
    #[bw(map = |b: &Vec<u8>| {
        let mut b = b.clone();
        b.push(ViscaPacket::TERMINATOR);
        b
    })]
    pub body: Vec<u8>,
}

impl ViscaPacket {
    pub const TERMINATOR: u8 = 0xff;
    pub const BROADCAST_ADDRESS: u8 = 8;
    pub const CONTROLLER_ADDRESS: u8 = 0;
    /// Highest address a device can be assigned.
    pub const MAX_DEVICES: u8 = 7;
    /// Maximum message length, including header and terminator.
    pub const MAX_PACKET_LENGTH: usize = 16;
    /// Longest run of bytes the [Framer] keeps while waiting for a
    /// terminator.
    pub const MAX_FRAME_LENGTH: usize = 32;

    /// Address set opcode, also the status byte of the echoed reply.
    pub const ADDRESS_SET: u8 = 0x30;
    pub const NETWORK_CHANGE: u8 = 0x38;

    /// Builds a controller-originated packet.
    pub fn new(recipient: Recipient, body: Vec<u8>) -> Result<Self> {
        let recipient = recipient.address()?;
        if body.is_empty() || body.len() + 2 > Self::MAX_PACKET_LENGTH {
            error!("packet body length {} out of range", body.len());
            return Err(Error::InvalidLength);
        }
        if body.contains(&Self::TERMINATOR) {
            error!("packet body contains a terminator: {}", hex::encode(&body));
            return Err(Error::ParameterOutOfRange);
        }

        Ok(Self {
            header: Header::new()
                .with_marker(true)
                .with_sender(Self::CONTROLLER_ADDRESS)
                .with_recipient(recipient),
            body,
        })
    }

    /// `88 30 01 ff`: starts address assignment from address 1.
    pub fn address_set() -> Self {
        Self {
            header: Header::new()
                .with_marker(true)
                .with_recipient(Self::BROADCAST_ADDRESS),
            body: vec![Self::ADDRESS_SET, 0x01],
        }
    }

    /// `8x 01 00 01 ff`: clears command buffers of one or all devices.
    pub fn clear(recipient: Recipient) -> Result<Self> {
        Self::new(recipient, vec![0x01, 0x00, 0x01])
    }

    /// `8x 2p ff`: cancels the command running in `socket`.
    pub fn cancel(device: u8, socket: u8) -> Result<Self> {
        if !(1..=2).contains(&socket) {
            error!("socket {socket} out of range");
            return Err(Error::ParameterOutOfRange);
        }
        Self::new(Recipient::Device(device), vec![0x20 | socket])
    }

    /// Parses a single terminated frame.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < 2 || frame.len() > Self::MAX_FRAME_LENGTH {
            return Err(Error::InvalidLength);
        }
        if frame.last() != Some(&Self::TERMINATOR) {
            return Err(Error::MalformedPacket(format!(
                "missing terminator: {}",
                hex::encode(frame)
            )));
        }

        let pkt = Self::read(&mut Cursor::new(frame))?;
        if !pkt.header.marker() {
            return Err(Error::MalformedPacket(format!(
                "bad header {:#04x}",
                u8::from(pkt.header)
            )));
        }
        Ok(pkt)
    }

    /// Serialises the packet, including the terminator.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::with_capacity(self.body.len() + 2));
        self.write(&mut out)?;
        Ok(out.into_inner())
    }

    /// Address of the device which sent this packet.
    pub fn source(&self) -> u8 {
        self.header.sender()
    }

    pub fn is_broadcast(&self) -> bool {
        self.header.recipient() == Self::BROADCAST_ADDRESS
    }
}

impl Debug for ViscaPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViscaPacket")
            .field("header", &format_args!("{:#04x}", u8::from(self.header)))
            .field("body", &hex::encode(&self.body))
            .finish()
    }
}

/// Splits a byte stream into [ViscaPacket]s at each terminator.
///
/// Reads from a serial port return arbitrary runs of bytes: a run may hold
/// several packets, or end part-way through one. Incomplete data is kept until
/// the next [push][Self::push].
#[derive(Debug, Default)]
pub struct Framer {
    buf: Vec<u8>,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Takes the next complete packet from the buffer, in arrival order.
    ///
    /// Returns [None] when no complete packet is buffered. A run longer than
    /// [ViscaPacket::MAX_FRAME_LENGTH] without a terminator is discarded and
    /// reported as [Error::MalformedPacket].
    pub fn next_packet(&mut self) -> Option<Result<ViscaPacket>> {
        if let Some(end) = self.buf.iter().position(|&b| b == ViscaPacket::TERMINATOR) {
            let frame: Vec<u8> = self.buf.drain(..=end).collect();
            return Some(ViscaPacket::decode(&frame));
        }

        if self.buf.len() > ViscaPacket::MAX_FRAME_LENGTH {
            let dropped = std::mem::take(&mut self.buf);
            return Some(Err(Error::MalformedPacket(format!(
                "{} bytes without terminator",
                dropped.len()
            ))));
        }

        None
    }

    /// Number of buffered bytes which are not yet part of a packet.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
