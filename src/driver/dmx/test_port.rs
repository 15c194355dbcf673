//! port that journals every call, used by the render and bridge tests

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::traits::DmxPort;
use crate::common::error::DriverError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortOp {
    BreakOn,
    BreakOff,
    Write(Vec<u8>),
    Flush,
    Close,
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<(Instant, PortOp)>>>);

impl Journal {
    pub fn entries(&self) -> Vec<(Instant, PortOp)> {
        self.0.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<PortOp> {
        self.entries().into_iter().map(|(_, op)| op).collect()
    }

    pub fn count(&self, op: &PortOp) -> usize {
        self.ops().iter().filter(|o| *o == op).count()
    }

    /// bytes written between the n-th break and the next one
    pub fn frame_bytes(&self, n: usize) -> Vec<u8> {
        self.ops()
            .split(|op| *op == PortOp::BreakOn)
            .skip(1)
            .nth(n)
            .map(|ops| {
                ops.iter()
                    .filter_map(|op| match op {
                        PortOp::Write(bytes) => Some(bytes.clone()),
                        _ => None,
                    })
                    .flatten()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn push(&self, op: PortOp) {
        self.0.lock().unwrap().push((Instant::now(), op));
    }
}

#[derive(Debug, Default)]
pub struct RecordingPort {
    pub journal: Journal,
    pub fail_break: bool,
    /// accept at most this many bytes per write
    pub write_limit: Option<usize>,
    /// report a limited write as `Ok(n)` instead of `ShortWrite`
    pub partial_ok: bool,
}

impl RecordingPort {
    pub fn new() -> (Self, Journal) {
        let port = RecordingPort::default();
        let journal = port.journal.clone();
        (port, journal)
    }
}

impl DmxPort for RecordingPort {
    fn name(&self) -> &str {
        "recording"
    }

    fn set_break(&mut self, enabled: bool) -> Result<(), DriverError> {
        if self.fail_break {
            return Err(DriverError::BreakControl {
                action: if enabled { "assert" } else { "clear" },
                source: io::Error::new(io::ErrorKind::Other, "injected"),
            });
        }
        self.journal
            .push(if enabled { PortOp::BreakOn } else { PortOp::BreakOff });
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize, DriverError> {
        let accepted = self.write_limit.map_or(buf.len(), |l| l.min(buf.len()));
        self.journal.push(PortOp::Write(buf[..accepted].to_vec()));
        if accepted != buf.len() && !self.partial_ok {
            return Err(DriverError::ShortWrite {
                expected: buf.len(),
                written: accepted,
            });
        }
        Ok(accepted)
    }

    fn flush_output(&mut self) -> Result<(), DriverError> {
        self.journal.push(PortOp::Flush);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.journal.push(PortOp::Close);
        Ok(())
    }
}
