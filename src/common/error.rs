use std::io;
use thiserror::Error;

/// errors raised by the dmx transport, the render loop and the art-net ingestion loop
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("cannot open dmx device {path}: {source}")]
    DeviceOpen { path: String, source: io::Error },

    #[error("cannot configure dmx device {path}: {source}")]
    DeviceConfig { path: String, source: io::Error },

    #[error("cannot {action} break condition: {source}")]
    BreakControl {
        action: &'static str,
        source: io::Error,
    },

    #[error("short write to dmx device, {written} of {expected} bytes accepted")]
    ShortWrite { expected: usize, written: usize },

    #[error("write to dmx device failed: {0}")]
    DeviceWrite(io::Error),

    #[error("cannot flush dmx device: {0}")]
    Flush(io::Error),

    #[error("cannot close dmx device: {0}")]
    DeviceClose(io::Error),

    #[error("dmx channel index {index} out of range")]
    ChannelOutOfRange { index: usize },

    #[error("dmx channel range {start}..{end} exceeds the universe")]
    ChannelRangeOverflow { start: usize, end: usize },

    #[error("cannot bind art-net listener on {addr}: {source}")]
    ListenerBind { addr: String, source: io::Error },

    #[error("art-net receive failed: {0}")]
    TransportReceive(io::Error),

    #[error("cannot start async runtime: {0}")]
    Runtime(io::Error),

    #[error("{0} worker thread panicked")]
    WorkerPanic(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

/// a datagram that could not be turned into a channel update
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed datagram: {0}")]
    Malformed(String),

    #[error("unsupported art-net opcode: {0}")]
    Unsupported(String),
}
