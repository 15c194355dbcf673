//! dmx 渲染线程
//! - 每一帧: break -> mark-after-break -> start code -> 512 通道 -> flush -> 补足帧间隔
//! - 任何一步出错都结束本帧并返回错误，不发送残缺的帧
//! - 每帧结束后检查停止信号

use std::thread;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::dmx_bus::DmxBus;
use super::prelude::*;
use super::traits::DmxPort;
use crate::common::error::DriverError;
use crate::{debug, error, info, trace};

const LOG_TAG: &str = "dmx_thread.rs | dmx worker";

/// drives one dmx port with the content of a bus
pub struct DmxRenderer {
    port: Box<dyn DmxPort>,
    bus: DmxBus,
    pad_leading_byte: bool,
}

impl DmxRenderer {
    pub fn new(port: Box<dyn DmxPort>, bus: DmxBus) -> Self {
        Self {
            port,
            bus,
            pad_leading_byte: false,
        }
    }

    /// write one extra zero byte before the start code, for adapters that eat the first byte
    pub fn with_leading_pad(mut self, enabled: bool) -> Self {
        self.pad_leading_byte = enabled;
        self
    }

    pub fn port_name(&self) -> &str {
        self.port.name()
    }

    /// transmit one complete frame and hold until the minimum frame period has passed
    pub fn render_frame(&mut self) -> Result<(), DriverError> {
        let start = Instant::now();

        self.port.set_break(true)?;
        thread::sleep(BREAK_TIME);
        self.port.set_break(false)?;
        thread::sleep(MAB_TIME);

        if self.pad_leading_byte {
            self.write_exact(&[DMX_NULL_START])?;
        }
        self.write_exact(&[DMX_NULL_START])?;

        let data = self.bus.snapshot();
        self.write_exact(&data)?;

        self.port.flush_output()?;

        let elapsed = start.elapsed();
        trace!(LOG_TAG, "frame sent in {:?}", elapsed);
        if let Some(remaining) = MIN_FRAME_TIME.checked_sub(elapsed) {
            thread::sleep(remaining);
        }
        Ok(())
    }

    fn write_exact(&mut self, buf: &[u8]) -> Result<(), DriverError> {
        let written = self.port.write_bytes(buf)?;
        // partial Ok(n) is allowed by DmxPort
        if written != buf.len() {
            return Err(DriverError::ShortWrite {
                expected: buf.len(),
                written,
            });
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), DriverError> {
        self.port.close()
    }
}

/// render frames until `shutdown` is cancelled or a frame fails
/// returns the number of frames sent
pub fn run_loop(renderer: &mut DmxRenderer, shutdown: &CancellationToken) -> Result<u64, DriverError> {
    info!(LOG_TAG, "dmx render loop is running, port: {}", renderer.port_name());
    let mut frames: u64 = 0;

    while !shutdown.is_cancelled() {
        if let Err(e) = renderer.render_frame() {
            error!(LOG_TAG, "frame {} failed, stopping output: {}", frames, e);
            return Err(e);
        }
        frames += 1;
        if frames % 1000 == 0 {
            debug!(LOG_TAG, "{} frames sent", frames);
        }
    }

    info!(LOG_TAG, "dmx render loop exited after {} frames", frames);
    Ok(frames)
}
