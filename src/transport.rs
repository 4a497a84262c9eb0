//! Byte transport between the protocol engine and the modem.
//!
//! The engine only needs to write whole commands and to pick up whatever
//! bytes have arrived so far. [`SerialTransport`] provides that over a
//! `serialport` handle; tests and bench setups use [`crate::sim`].

use crate::constants::*;
use crate::error::Result;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

/// Duplex byte channel to the modem
pub trait Transport: Send {
    /// Write all bytes to the line
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Copy up to `buf.len()` already-received bytes into `buf` without blocking.
    /// Returns the number of bytes copied, possibly zero.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_available(buf)
    }
}

/// NM3 serial line (9600 8N1)
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port for the modem
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(STOP_BITS)
            .timeout(Duration::from_millis(POLL_INTERVAL_MS))
            .open()?;
        Ok(SerialTransport { port })
    }

    /// Wrap an already opened port
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        SerialTransport { port }
    }

    /// List available serial ports
    pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
        Ok(serialport::available_ports()?)
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = pending.min(buf.len());
        let n = self.port.read(&mut buf[..want])?;
        Ok(n)
    }
}
