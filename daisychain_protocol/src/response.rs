//! Classification of packets received from the bus.
//!
//! The status byte (the second byte on the wire, after the header) tells what
//! kind of reply a packet is:
//!
//! Status | Meaning
//! ------ | -------
//! `0x30` | address set echo (discovery only)
//! `0x38` | network change notification
//! `0x4s` | ACK, command accepted into socket `s`
//! `0x5s` | completion of socket `s`; inquiry replies carry data after it
//! `0x6s` | error on socket `s`, next byte is an [ErrorCode]
//!
//! A broadcast echo of `01 00 01` is the reply to a broadcast clear.
use crate::{packet::ViscaPacket, Error, Result};
use num_traits::FromPrimitive;

/// Error codes reported by devices in a `0x6s` reply.
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    MessageLength = 0x01,
    Syntax = 0x02,
    CommandBufferFull = 0x03,
    CommandCancelled = 0x04,
    NoSocket = 0x05,
    NotExecutable = 0x41,
}

impl ErrorCode {
    pub fn from_code(code: u8) -> Option<Self> {
        Self::from_u8(code)
    }
}

/// A classified inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The address set packet came back around the chain. `next` is the
    /// address the next device would have taken, so `next - 1` devices are
    /// on the bus.
    Address { next: u8 },
    /// A broadcast clear came back around the chain.
    ClearEcho,
    /// A device reported that the chain changed and needs re-addressing.
    NetworkChange,
    Ack { socket: u8 },
    Completion { socket: u8, data: Vec<u8> },
    Error { socket: u8, code: u8 },
}

impl Response {
    const ADDRESS_SET: u8 = ViscaPacket::ADDRESS_SET;
    const NETWORK_CHANGE: u8 = ViscaPacket::NETWORK_CHANGE;
    const ACK: u8 = 0x40;
    const COMPLETION: u8 = 0x50;
    const ERROR: u8 = 0x60;
    const CLEAR_ECHO: [u8; 3] = [0x01, 0x00, 0x01];

    /// Classifies `pkt`.
    ///
    /// `discovering` must be set while an address set packet is outstanding;
    /// `0x30` replies are only meaningful then.
    pub fn classify(pkt: &ViscaPacket, discovering: bool) -> Result<Self> {
        let Some(&status) = pkt.body.first() else {
            return Err(Error::MalformedPacket("empty reply".to_string()));
        };

        if pkt.is_broadcast() && pkt.body == Self::CLEAR_ECHO {
            return Ok(Self::ClearEcho);
        }

        let socket = status & 0x0f;
        match status & 0xf0 {
            0x30 => match status {
                Self::ADDRESS_SET if discovering => match pkt.body.get(1) {
                    Some(&next) if pkt.body.len() == 2 => Ok(Self::Address { next }),
                    _ => Err(Error::MalformedPacket(format!(
                        "address reply: {}",
                        hex::encode(&pkt.body)
                    ))),
                },
                Self::NETWORK_CHANGE if !discovering => Ok(Self::NetworkChange),
                _ => Err(Error::UnexpectedResponse(format!(
                    "{status:#04x} (discovering: {discovering})"
                ))),
            },
            Self::ACK => Ok(Self::Ack { socket }),
            Self::COMPLETION => Ok(Self::Completion {
                socket,
                data: pkt.body[1..].to_vec(),
            }),
            Self::ERROR => match pkt.body.get(1) {
                Some(&code) => Ok(Self::Error { socket, code }),
                None => Err(Error::MalformedPacket(format!(
                    "error reply without code from device {}",
                    pkt.source()
                ))),
            },
            _ => Err(Error::UnexpectedResponse(format!(
                "status {status:#04x} from device {}",
                pkt.source()
            ))),
        }
    }

    /// Socket number this response refers to, if any.
    pub fn socket(&self) -> Option<u8> {
        match self {
            Self::Ack { socket } | Self::Completion { socket, .. } | Self::Error { socket, .. } => {
                Some(*socket)
            }
            _ => None,
        }
    }

    /// The decoded error code, if this is an error response with a known
    /// code.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Error { code, .. } => ErrorCode::from_code(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn classify(h: &str, discovering: bool) -> Result<Response> {
        Response::classify(&ViscaPacket::decode(&hex::decode(h)?)?, discovering)
    }

    #[test]
    fn ack_and_completion() -> Result<()> {
        assert_eq!(Response::Ack { socket: 1 }, classify("9041ff", false)?);
        assert_eq!(
            Response::Completion {
                socket: 1,
                data: vec![]
            },
            classify("9051ff", false)?
        );
        Ok(())
    }

    #[test]
    fn inquiry_reply() -> Result<()> {
        let r = classify("905000010203ff", false)?;
        assert_eq!(
            Response::Completion {
                socket: 0,
                data: vec![0, 1, 2, 3]
            },
            r
        );
        assert_eq!(Some(0), r.socket());
        Ok(())
    }

    #[test]
    fn errors() -> Result<()> {
        let r = classify("906141ff", false)?;
        assert_eq!(Response::Error { socket: 1, code: 0x41 }, r);
        assert_eq!(Some(ErrorCode::NotExecutable), r.error_code());

        let r = classify("a06204ff", false)?;
        assert_eq!(Some(ErrorCode::CommandCancelled), r.error_code());
        assert_eq!(Some(2), r.socket());

        let r = classify("906077ff", false)?;
        assert_eq!(None, r.error_code());

        assert!(matches!(
            classify("9060ff", false),
            Err(Error::MalformedPacket(_))
        ));
        Ok(())
    }

    #[test]
    fn address_reply() -> Result<()> {
        assert_eq!(Response::Address { next: 3 }, classify("883003ff", true)?);
        // Only valid while discovering
        assert!(matches!(
            classify("883003ff", false),
            Err(Error::UnexpectedResponse(_))
        ));
        Ok(())
    }

    #[test]
    fn network_change() -> Result<()> {
        assert_eq!(Response::NetworkChange, classify("a038ff", false)?);
        assert!(classify("a038ff", true).is_err());
        assert!(classify("9031ff", false).is_err());
        Ok(())
    }

    #[test]
    fn clear_echo() -> Result<()> {
        assert_eq!(Response::ClearEcho, classify("88010001ff", false)?);
        Ok(())
    }

    #[test]
    fn unknown_status() -> Result<()> {
        assert!(matches!(
            classify("9072ff", false),
            Err(Error::UnexpectedResponse(_))
        ));
        Ok(())
    }
}
