use crate::protocol::{ErrorCode, OperationKind};
use std::{io::Error as IoError, sync::Arc};
use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[cfg(test)]
    #[error(transparent)]
    FromHexError(#[from] hex::FromHexError),

    #[error(transparent)]
    IoError(#[from] IoError),

    #[error(transparent)]
    Serial(#[from] tokio_serial::Error),

    /// The serial line failed while this request was waiting on it.
    #[error("transport failed: {0}")]
    Transport(Arc<IoError>),

    #[error(transparent)]
    Protocol(#[from] crate::protocol::Error),

    #[error("data parse error: {0}")]
    BinRwError(#[from] binrw::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("channel unavailable, likely dropped")]
    ChannelUnavailable,

    #[error("internal error")]
    Internal,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("device reported message length error")]
    MessageLength,

    #[error("device reported syntax error")]
    Syntax,

    #[error("command buffer full")]
    CommandBufferFull,

    #[error("command cancelled")]
    CommandCancelled,

    #[error("no socket, or bus not addressed")]
    NoSocket,

    #[error("command not executable in the current mode")]
    NotExecutable,

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("expected {0:?} operation")]
    WrongKind(OperationKind),

    #[error("unknown device {0}")]
    UnknownDevice(u8),

    #[error("device reported error code {0:#04x}")]
    DeviceError(u8),
}

impl Error {
    /// Maps an error code from a `0x6s` reply.
    pub(crate) fn from_device(code: u8) -> Self {
        match ErrorCode::from_code(code) {
            Some(ErrorCode::MessageLength) => Self::MessageLength,
            Some(ErrorCode::Syntax) => Self::Syntax,
            Some(ErrorCode::CommandBufferFull) => Self::CommandBufferFull,
            Some(ErrorCode::CommandCancelled) => Self::CommandCancelled,
            Some(ErrorCode::NoSocket) => Self::NoSocket,
            Some(ErrorCode::NotExecutable) => Self::NotExecutable,
            None => Self::DeviceError(code),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn device_codes() {
        assert!(matches!(Error::from_device(0x03), Error::CommandBufferFull));
        assert!(matches!(Error::from_device(0x41), Error::NotExecutable));
        assert!(matches!(Error::from_device(0x7f), Error::DeviceError(0x7f)));
    }
}
