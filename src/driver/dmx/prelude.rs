use std::time::Duration;

// dmx channel type
pub type DmxValue = u8;
// dmx address type, 0-based slot index
pub type DmxAddress = u16;
// dmx channel length
pub const DMX_CHANNEL_LEN: usize = 512;

/// null start code, first slot of every dimmer frame
pub const DMX_NULL_START: u8 = 0x00;
pub const DMX_BAUD: u32 = 250_000;

/// break hold, receivers need at least 92us
pub const BREAK_TIME: Duration = Duration::from_micros(110);
/// mark-after-break hold, receivers need at least 12us
pub const MAB_TIME: Duration = Duration::from_micros(20);
/// minimum break-to-break period; a full frame at 44Hz takes ~23ms
pub const MIN_FRAME_TIME: Duration = Duration::from_millis(33);
