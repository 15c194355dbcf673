//! raw linux uart backend
//!
//! The port is programmed through `termios2` so the 250000 baud rate can be
//! set directly with `BOTHER`, and the break condition is driven with
//! `TIOCSBRK` / `TIOCCBRK`.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};

use super::prelude::*;
use super::traits::DmxPort;
use crate::common::error::DriverError;
use crate::{debug, info, trace, warn};

const LOG_TAG: &str = "uart_port.rs | linux uart";

pub struct UartPort {
    path: String,
    file: Option<File>,
}

/// run a libc call until it is not interrupted by a signal
fn retry_interrupted<F>(what: &str, mut call: F) -> io::Result<()>
where
    F: FnMut() -> libc::c_int,
{
    loop {
        if call() != -1 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
        debug!(LOG_TAG, "{} was interrupted, retrying", what);
    }
}

fn dmx_termios() -> libc::termios2 {
    // SAFETY: termios2 is a plain C struct, all-zero is a valid value
    let mut tio: libc::termios2 = unsafe { std::mem::zeroed() };
    tio.c_cflag = libc::CSTOPB | libc::CS8 | libc::CLOCAL | libc::CREAD | libc::BOTHER;
    tio.c_iflag = 0;
    tio.c_oflag = 0;
    tio.c_lflag = 0;
    tio.c_ispeed = DMX_BAUD;
    tio.c_ospeed = DMX_BAUD;
    tio.c_cc[libc::VTIME] = 1;
    tio.c_cc[libc::VMIN] = 0;
    tio
}

impl UartPort {
    /// open the device and program it for dmx512 (250000 baud, 8N2, no flow control)
    pub fn open(path: &str) -> Result<Self, DriverError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|e| DriverError::DeviceOpen {
                path: path.to_string(),
                source: e,
            })?;

        let port = UartPort {
            path: path.to_string(),
            file: Some(file),
        };
        // on failure the port is dropped here, which closes the descriptor
        port.configure()?;
        info!(LOG_TAG, "opened {} at {} baud, 8N2", path, DMX_BAUD);
        Ok(port)
    }

    fn fd(&self) -> io::Result<RawFd> {
        self.file
            .as_ref()
            .map(|f| f.as_raw_fd())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "uart port is closed"))
    }

    fn configure(&self) -> Result<(), DriverError> {
        let config_err = |e: io::Error| DriverError::DeviceConfig {
            path: self.path.clone(),
            source: e,
        };
        let fd = self.fd().map_err(config_err)?;

        // refuse other openers while we own the line
        retry_interrupted("TIOCEXCL", || unsafe { libc::ioctl(fd, libc::TIOCEXCL) })
            .map_err(config_err)?;

        let tio = dmx_termios();
        retry_interrupted("TCSETS2", || unsafe {
            libc::ioctl(fd, libc::TCSETS2, &tio as *const libc::termios2)
        })
        .map_err(config_err)?;

        Ok(())
    }
}

impl DmxPort for UartPort {
    fn name(&self) -> &str {
        self.path.as_str()
    }

    fn set_break(&mut self, enabled: bool) -> Result<(), DriverError> {
        let (action, request) = if enabled {
            ("assert", libc::TIOCSBRK)
        } else {
            ("clear", libc::TIOCCBRK)
        };
        let fd = self
            .fd()
            .map_err(|e| DriverError::BreakControl { action, source: e })?;
        retry_interrupted(action, || unsafe { libc::ioctl(fd, request) })
            .map_err(|e| DriverError::BreakControl { action, source: e })
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize, DriverError> {
        let fd = self.fd().map_err(DriverError::DeviceWrite)?;
        // one write(2) per call, a partial frame must not be silently completed
        let written = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if written < 0 {
            return Err(DriverError::DeviceWrite(io::Error::last_os_error()));
        }
        let written = written as usize;
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
        let fd = self.fd().map_err(DriverError::Flush)?;
        retry_interrupted("tcdrain", || unsafe { libc::tcdrain(fd) }).map_err(DriverError::Flush)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        match self.file.take() {
            Some(file) => {
                let fd = file.into_raw_fd();
                if unsafe { libc::close(fd) } == -1 {
                    return Err(DriverError::DeviceClose(io::Error::last_os_error()));
                }
                info!(LOG_TAG, "closed {}", self.path);
                Ok(())
            }
            None => {
                debug!(LOG_TAG, "{} already closed", self.path);
                Ok(())
            }
        }
    }
}

impl Drop for UartPort {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.close() {
                warn!(LOG_TAG, "closing {} on drop failed: {}", self.path, e);
            }
        }
    }
}
