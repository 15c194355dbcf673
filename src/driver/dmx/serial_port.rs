//! portable serial backend built on the serialport builder re-exported by tokio-serial
//! - used on platforms without the raw uart backend
//! - break is driven through `set_break` / `clear_break` of the port

use std::io::{self, Write};
use std::time::Duration;

use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::prelude::*;
use super::traits::DmxPort;
use crate::common::error::DriverError;
use crate::{debug, info, trace};

const LOG_TAG: &str = "serial_port.rs | serialport";

const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

pub struct SerialPortBackend {
    path: String,
    port: Option<Box<dyn SerialPort>>,
}

fn to_io(e: tokio_serial::Error) -> io::Error {
    match e.kind {
        tokio_serial::ErrorKind::Io(kind) => io::Error::new(kind, e.description),
        tokio_serial::ErrorKind::NoDevice => io::Error::new(io::ErrorKind::NotFound, e.description),
        _ => io::Error::new(io::ErrorKind::Other, e.description),
    }
}

fn is_interrupted(e: &tokio_serial::Error) -> bool {
    matches!(e.kind, tokio_serial::ErrorKind::Io(io::ErrorKind::Interrupted))
}

impl SerialPortBackend {
    pub fn open(path: &str) -> Result<Self, DriverError> {
        let port = loop {
            let res = tokio_serial::new(path, DMX_BAUD)
                .data_bits(DataBits::Eight)
                .stop_bits(StopBits::Two)
                .parity(Parity::None)
                .flow_control(FlowControl::None)
                .timeout(WRITE_TIMEOUT)
                .open();
            match res {
                Ok(port) => break port,
                Err(e) if is_interrupted(&e) => {
                    debug!(LOG_TAG, "open {} was interrupted, retrying", path);
                }
                Err(e) if matches!(e.kind, tokio_serial::ErrorKind::InvalidInput) => {
                    // the device exists but refused the line settings
                    return Err(DriverError::DeviceConfig {
                        path: path.to_string(),
                        source: to_io(e),
                    });
                }
                Err(e) => {
                    return Err(DriverError::DeviceOpen {
                        path: path.to_string(),
                        source: to_io(e),
                    })
                }
            }
        };

        info!(LOG_TAG, "opened {} at {} baud, 8N2", path, DMX_BAUD);
        Ok(SerialPortBackend {
            path: path.to_string(),
            port: Some(port),
        })
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is closed"))
    }
}

impl DmxPort for SerialPortBackend {
    fn name(&self) -> &str {
        self.path.as_str()
    }

    fn set_break(&mut self, enabled: bool) -> Result<(), DriverError> {
        let action = if enabled { "assert" } else { "clear" };
        let port = self
            .port()
            .map_err(|e| DriverError::BreakControl { action, source: e })?;
        loop {
            let res = if enabled {
                port.set_break()
            } else {
                port.clear_break()
            };
            match res {
                Ok(()) => return Ok(()),
                Err(e) if is_interrupted(&e) => continue,
                Err(e) => {
                    return Err(DriverError::BreakControl {
                        action,
                        source: to_io(e),
                    })
                }
            }
        }
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize, DriverError> {
        let port = self.port().map_err(DriverError::DeviceWrite)?;
        let written = port.write(buf).map_err(DriverError::DeviceWrite)?;
        trace!(LOG_TAG, "wrote {} bytes", written);
        if written != buf.len() {
            return Err(DriverError::ShortWrite {
                expected: buf.len(),
                written,
            });
        }
        Ok(written)
    }

    fn flush_output(&mut self) -> Result<(), DriverError> {
        let port = self.port().map_err(DriverError::Flush)?;
        port.flush().map_err(DriverError::Flush)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if self.port.take().is_some() {
            info!(LOG_TAG, "closed {}", self.path);
        }
        Ok(())
    }
}
