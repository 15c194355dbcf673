use super::traits::DmxPort;
use crate::common::error::DriverError;
use crate::{debug, info, trace};

const LOG_TAG: &str = "dummy_port.rs | dummy dmx port";

/// dmx port without hardware, accepts every frame and drops it
#[derive(Debug, Default)]
pub struct DummyPort {
    closed: bool,
    breaks: u64,
    bytes_written: u64,
}

impl DummyPort {
    pub fn new() -> Self {
        info!(LOG_TAG, "dummy mode, no serial device will be opened");
        Self::default()
    }
}

impl DmxPort for DummyPort {
    fn name(&self) -> &str {
        "dummy"
    }

    fn set_break(&mut self, enabled: bool) -> Result<(), DriverError> {
        if enabled {
            self.breaks += 1;
        }
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize, DriverError> {
        self.bytes_written += buf.len() as u64;
        trace!(LOG_TAG, "discarding {} bytes", buf.len());
        Ok(buf.len())
    }

    fn flush_output(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if !self.closed {
            self.closed = true;
            debug!(
                LOG_TAG,
                "closed after {} frames, {} bytes", self.breaks, self.bytes_written
            );
        }
        Ok(())
    }
}
