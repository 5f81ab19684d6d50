#![doc = include_str!("../README.md")]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate tracing;

mod config;
mod controller;
mod error;
mod sockets;
mod state;
mod transport;

pub use {
    crate::{
        config::{FullPolicy, SerialConfig, SessionConfig},
        controller::{CommandOutcome, ViscaController},
        error::Error,
        state::{BusState, Device, StateUpdate},
        transport::{open_serial, ViscaChannel},
    },
    daisychain_protocol as protocol,
};
pub type Result<T = ()> = std::result::Result<T, Error>;
