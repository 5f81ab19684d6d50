use thiserror::Error;

/// Error types.
#[derive(Debug, Error)]
pub enum Error {
    #[cfg(test)]
    #[error(transparent)]
    FromHexError(#[from] hex::FromHexError),

    #[error("invalid length")]
    InvalidLength,

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("parameter out of valid range")]
    ParameterOutOfRange,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("data parse error: {0}")]
    BinRwError(#[from] binrw::Error),
}
