#![doc = include_str!("../README.md")]

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate num_derive;

#[macro_use]
extern crate tracing;

mod error;
pub mod op;
mod packet;
mod response;
mod util;

pub use crate::{
    error::Error,
    op::{Category, Completion, Operation, OperationKind, ReplyShape, Value},
    packet::{Framer, Header, Recipient, ViscaPacket},
    response::{ErrorCode, Response},
    util::{from_nibbles, to_nibbles, Nibble16},
};

/// Result type.
pub type Result<T = ()> = std::result::Result<T, Error>;
