use crate::common::error::DriverError;

/// line-level access to a dmx512 serial transmitter
///
/// break and mark-after-break are line conditions, not bytes, so they are
/// part of the port interface instead of being folded into `write_bytes`.
pub trait DmxPort: Send {
    /// short name used in log lines
    fn name(&self) -> &str;

    /// assert (`true`) or clear (`false`) the break condition
    fn set_break(&mut self, enabled: bool) -> Result<(), DriverError>;

    /// write raw bytes and return how many were accepted
    ///
    /// the built-in ports report a short write as `DriverError::ShortWrite`,
    /// a port may also return `Ok(n)` with `n` below `buf.len()`
    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize, DriverError>;

    /// block until every written byte has left the transmitter
    fn flush_output(&mut self) -> Result<(), DriverError>;

    /// release the device; calling it again is a no-op
    fn close(&mut self) -> Result<(), DriverError>;
}
