//! Transport layer for VISCA over a serial line.
//!
//! Cameras are daisy-chained on RS-232 (or RS-422), 8N1 with no flow control,
//! usually at 9600 baud. The line is half-duplex in practice: only one packet
//! should be outstanding at a time.
//!
//! [ViscaChannel] works with any byte stream, so tests and network bridges can
//! stand in for a serial port.
use crate::{
    config::SerialConfig,
    protocol::{Framer, ViscaPacket},
    Error, Result,
};
use binrw::BinWrite;
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Opens a serial port for VISCA.
pub fn open_serial(config: &SerialConfig) -> Result<SerialStream> {
    debug!("opening {} at {} baud", config.path, config.baud_rate);
    let port = tokio_serial::new(&config.path, config.baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()?;
    Ok(port)
}

pub struct ViscaChannel<T> {
    io: T,
    framer: Framer,
}

impl<T> ViscaChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T) -> Self {
        Self {
            io,
            framer: Framer::new(),
        }
    }

    pub async fn send(&mut self, packet: &ViscaPacket) -> Result {
        let mut out = Cursor::new(Vec::new());
        packet.write(&mut out)?;
        let out = out.into_inner();
        trace!(">>> {}", hex::encode(&out));
        self.io.write_all(&out).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Waits for the next well-formed packet.
    ///
    /// Malformed data is logged and skipped. Returns
    /// [Error::ChannelUnavailable] at end of stream.
    ///
    /// This is cancel safe: partial packets stay buffered.
    pub async fn recv(&mut self) -> Result<ViscaPacket> {
        let mut b = [0u8; ViscaPacket::MAX_FRAME_LENGTH];
        loop {
            while let Some(r) = self.framer.next_packet() {
                match r {
                    Ok(pkt) => return Ok(pkt),
                    Err(e) => warn!("dropping malformed data: {e}"),
                }
            }

            let l = self.io.read(&mut b).await?;
            if l == 0 {
                return Err(Error::ChannelUnavailable);
            }
            trace!("<<< {}", hex::encode(&b[..l]));
            self.framer.push(&b[..l]);
        }
    }
}
