//! bridge manager
//! 启动 dmx 渲染线程和 art-net 接收线程，并负责有序关闭
//!
//! Starting -> Running -> Stopping -> Stopped
//! - Starting: 打开串口，绑定 udp 端口，任何一个失败都不会启动线程
//! - Running: 两个线程独立运行，只共享 dmx 总线和停止信号
//! - Stopping: 收到中断或某个线程退出后，通知两个线程停止并等待退出
//! - Stopped: 两个线程都已退出，串口已关闭
//!
//! 测试图案模式下不绑定 udp 端口，只启动渲染线程，所有通道固定为同一个值

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;

use super::entity::{BridgeEvent, BridgeState, Worker};
use crate::artnet_client::protocol::{ArtDmxDecoder, DmxDecoder};
use crate::artnet_client::receiver::{self, IngestStats};
use crate::common::error::DriverError;
use crate::common::setting::Settings;
use crate::driver::dmx::dmx_bus::DmxBus;
use crate::driver::dmx::dmx_thread::{self, DmxRenderer};
use crate::driver::dmx::port_factory::open_port;
use crate::driver::dmx::prelude::{DmxValue, DMX_CHANNEL_LEN};
use crate::driver::dmx::traits::DmxPort;
use crate::{debug, error, info, warn};

const LOG_TAG: &str = "manager.rs | bridge manager";

type RenderOutcome = (DmxRenderer, Result<u64, DriverError>);

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub listen: String,
    pub recv_timeout: Duration,
    pub pad_leading_byte: bool,
    /// render this level on every channel and leave art-net off
    pub test_pattern: Option<DmxValue>,
}

impl From<&Settings> for BridgeOptions {
    fn from(settings: &Settings) -> Self {
        BridgeOptions {
            listen: settings.artnet.listen.clone(),
            recv_timeout: Duration::from_millis(settings.artnet.recv_timeout_ms),
            pad_leading_byte: settings.dmx.pad_leading_byte,
            test_pattern: settings.dmx.test_pattern,
        }
    }
}

/// tells the manager that a worker is gone, also when the worker panicked
struct ExitNotice {
    worker: Worker,
    events_tx: Sender<BridgeEvent>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        // the manager may already be gone
        let _ = self.events_tx.send(BridgeEvent::WorkerExited(self.worker));
    }
}

pub struct BridgeManager {
    state: BridgeState,
    local_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    events_tx: Sender<BridgeEvent>,
    events_rx: Receiver<BridgeEvent>,
    render_handle: Option<JoinHandle<RenderOutcome>>,
    ingest_handle: Option<JoinHandle<Result<IngestStats, DriverError>>>,
}

impl BridgeManager {
    /// open the configured serial port and art-net listener, then start both workers
    /// with `dmx.test_pattern` set only the render worker runs
    pub fn launch(settings: &Settings) -> Result<Self, DriverError> {
        info!(LOG_TAG, "opening dmx device...");
        let port = open_port(&settings.dmx)?;
        Self::launch_with(port, Box::new(ArtDmxDecoder), BridgeOptions::from(settings))
    }

    pub fn launch_with(
        mut port: Box<dyn DmxPort>,
        decoder: Box<dyn DmxDecoder>,
        options: BridgeOptions,
    ) -> Result<Self, DriverError> {
        debug!(LOG_TAG, "state: {:?}", BridgeState::Starting);

        let listener = match options.test_pattern {
            Some(level) => {
                info!(LOG_TAG, "test pattern {} on all channels, art-net input disabled", level);
                None
            }
            None => match bind_listener(&options.listen) {
                Ok(bound) => Some(bound),
                Err(e) => {
                    // no partial start, give the serial device back
                    if let Err(close_err) = port.close() {
                        warn!(LOG_TAG, "closing {} failed: {}", port.name(), close_err);
                    }
                    return Err(DriverError::ListenerBind {
                        addr: options.listen,
                        source: e,
                    });
                }
            },
        };

        let bus = DmxBus::new();
        if let Some(level) = options.test_pattern {
            bus.set_channels(0, &[level; DMX_CHANNEL_LEN])?;
        }
        let shutdown = CancellationToken::new();
        let (events_tx, events_rx) = channel::unbounded();

        let mut manager = BridgeManager {
            state: BridgeState::Starting,
            local_addr: listener.as_ref().map(|(_, addr)| *addr),
            shutdown: shutdown.clone(),
            events_tx: events_tx.clone(),
            events_rx,
            render_handle: None,
            ingest_handle: None,
        };

        let mut renderer =
            DmxRenderer::new(port, bus.clone()).with_leading_pad(options.pad_leading_byte);
        let render_token = shutdown.clone();
        let render_notice = ExitNotice {
            worker: Worker::Render,
            events_tx: events_tx.clone(),
        };
        manager.render_handle = Some(
            thread::Builder::new()
                .name(String::from("dmx-render"))
                .spawn(move || {
                    let _notice = render_notice;
                    let res = dmx_thread::run_loop(&mut renderer, &render_token);
                    (renderer, res)
                })
                .map_err(DriverError::Runtime)?,
        );

        if let Some((socket, _)) = listener {
            let ingest_token = shutdown;
            let ingest_notice = ExitNotice {
                worker: Worker::Ingest,
                events_tx,
            };
            let spawned = thread::Builder::new()
                .name(String::from("artnet-ingest"))
                .spawn(move || {
                    let _notice = ingest_notice;
                    receiver::run_loop(
                        socket,
                        decoder.as_ref(),
                        &bus,
                        options.recv_timeout,
                        &ingest_token,
                    )
                });
            match spawned {
                Ok(handle) => manager.ingest_handle = Some(handle),
                Err(e) => {
                    // render is already running, take it down before giving up
                    let _ = manager.stop();
                    return Err(DriverError::Runtime(e));
                }
            }
        }

        manager.transition(BridgeState::Running);
        match manager.local_addr {
            Some(addr) => info!(LOG_TAG, "art-net listening on {}", addr),
            None => info!(LOG_TAG, "rendering test pattern only"),
        }
        Ok(manager)
    }

    fn transition(&mut self, next: BridgeState) {
        info!(LOG_TAG, "state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    #[cfg(test)]
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// address the art-net listener is bound to, `None` in test pattern mode
    #[cfg(test)]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// sender for external events, e.g. the ctrl-c handler
    pub fn event_sender(&self) -> Sender<BridgeEvent> {
        self.events_tx.clone()
    }

    /// block until an interrupt arrives or a worker exits, then shut down
    pub fn wait(self) -> Result<(), DriverError> {
        info!(LOG_TAG, "waiting for ctrl-c to exit...");
        // we hold a sender ourselves, so recv cannot fail on disconnect
        match self.events_rx.recv() {
            Ok(BridgeEvent::Interrupted) => info!(LOG_TAG, "interrupt received"),
            Ok(BridgeEvent::WorkerExited(worker)) => {
                warn!(LOG_TAG, "{} worker exited on its own", worker)
            }
            Err(e) => warn!(LOG_TAG, "event channel closed: {}", e),
        }
        self.stop()
    }

    /// signal both workers, wait for them, then release the serial device
    /// returns the first fatal error: render, then ingest, then close
    pub fn stop(mut self) -> Result<(), DriverError> {
        self.transition(BridgeState::Stopping);
        self.shutdown.cancel();

        info!(LOG_TAG, "waiting for threads to exit...");
        let (renderer, render_res) = match self.render_handle.take().map(JoinHandle::join) {
            Some(Ok((renderer, res))) => (Some(renderer), res.map(|_| ())),
            Some(Err(_)) => (None, Err(DriverError::WorkerPanic("dmx render"))),
            None => (None, Ok(())),
        };
        let ingest_res = match self.ingest_handle.take().map(JoinHandle::join) {
            Some(Ok(res)) => res.map(|_| ()),
            Some(Err(_)) => Err(DriverError::WorkerPanic("art-net ingest")),
            None => Ok(()),
        };

        // both workers are gone, nothing can touch the port anymore
        let close_res = match renderer {
            Some(mut renderer) => {
                info!(LOG_TAG, "closing dmx device {}", renderer.port_name());
                renderer.close()
            }
            None => Ok(()),
        };

        self.transition(BridgeState::Stopped);

        for res in [render_res, ingest_res, close_res] {
            if let Err(e) = res {
                error!(LOG_TAG, "bridge stopped with error: {}", e);
                return Err(e);
            }
        }
        info!(LOG_TAG, "bridge stopped");
        Ok(())
    }
}

fn bind_listener(listen: &str) -> io::Result<(UdpSocket, SocketAddr)> {
    let socket = UdpSocket::bind(listen)?;
    let addr = socket.local_addr()?;
    Ok((socket, addr))
}

impl Drop for BridgeManager {
    fn drop(&mut self) {
        // dropped without stop(): let the workers wind down on their own
        if self.state != BridgeState::Stopped {
            self.shutdown.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artnet_client::protocol::ChannelUpdate;
    use crate::common::error::DecodeError;
    use crate::common::logger::init_logger;
    use crate::driver::dmx::test_port::{PortOp, RecordingPort};
    use std::time::Instant;

    /// first byte is the offset, the rest is channel data
    struct OffsetDecoder;

    impl DmxDecoder for OffsetDecoder {
        fn decode(&self, datagram: &[u8]) -> Result<ChannelUpdate, DecodeError> {
            match datagram.split_first() {
                Some((offset, data)) if !data.is_empty() => Ok(ChannelUpdate {
                    offset: *offset as u16,
                    data: data.to_vec(),
                }),
                _ => Err(DecodeError::Malformed(String::from("empty"))),
            }
        }
    }

    fn options() -> BridgeOptions {
        BridgeOptions {
            listen: String::from("127.0.0.1:0"),
            recv_timeout: Duration::from_millis(100),
            pad_leading_byte: false,
            test_pattern: None,
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_run_and_interrupt() {
        init_logger("debug");
        let (port, journal) = RecordingPort::new();
        let manager = BridgeManager::launch_with(Box::new(port), Box::new(OffsetDecoder), options()).unwrap();
        assert_eq!(manager.state(), BridgeState::Running);
        let addr = manager.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[0, 255], addr).unwrap();
        // the value shows up on the wire
        assert!(wait_for(|| journal
            .ops()
            .iter()
            .any(|op| matches!(op, PortOp::Write(data) if data.len() == 512 && data[0] == 255))));

        let events = manager.event_sender();
        events.send(BridgeEvent::Interrupted).unwrap();
        // a second interrupt must not block or fail
        events.send(BridgeEvent::Interrupted).unwrap();

        let stopping_at = Instant::now();
        manager.wait().unwrap();
        assert!(stopping_at.elapsed() < Duration::from_millis(500));

        assert_eq!(journal.count(&PortOp::Close), 1);
        assert_eq!(journal.ops().last(), Some(&PortOp::Close));
        // listener is released
        UdpSocket::bind(addr).unwrap();
        // sending after shutdown is harmless
        let _ = events.send(BridgeEvent::Interrupted);
    }

    #[test]
    fn test_render_failure_stops_bridge() {
        init_logger("debug");
        let (mut port, journal) = RecordingPort::new();
        port.write_limit = Some(100);
        let manager = BridgeManager::launch_with(Box::new(port), Box::new(OffsetDecoder), options()).unwrap();
        let addr = manager.local_addr().unwrap();

        // no interrupt: the failing render worker wakes the manager itself
        assert!(matches!(manager.wait(), Err(DriverError::ShortWrite { .. })));
        assert_eq!(journal.count(&PortOp::Close), 1);
        UdpSocket::bind(addr).unwrap();
    }

    #[test]
    fn test_bind_failure_releases_port() {
        init_logger("debug");
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let (port, journal) = RecordingPort::new();
        let mut opts = options();
        opts.listen = taken.local_addr().unwrap().to_string();

        let res = BridgeManager::launch_with(Box::new(port), Box::new(OffsetDecoder), opts);
        assert!(matches!(res, Err(DriverError::ListenerBind { .. })));
        // nothing was rendered, the port was closed once
        assert_eq!(journal.ops(), vec![PortOp::Close]);
    }

    #[test]
    fn test_launch_from_settings_dummy() {
        init_logger("debug");
        let mut settings = Settings::default();
        settings.dmx.backend = crate::common::setting::DmxBackend::Dummy;
        settings.artnet.listen = String::from("127.0.0.1:0");

        let manager = BridgeManager::launch(&settings).unwrap();
        assert_eq!(manager.state(), BridgeState::Running);
        manager.stop().unwrap();
    }

    #[test]
    fn test_pattern_mode_renders_without_listener() {
        init_logger("debug");
        // the configured address is taken, test pattern mode must not try to bind it
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let (port, journal) = RecordingPort::new();
        let mut opts = options();
        opts.listen = taken.local_addr().unwrap().to_string();
        opts.test_pattern = Some(255);

        let manager = BridgeManager::launch_with(Box::new(port), Box::new(OffsetDecoder), opts).unwrap();
        assert_eq!(manager.state(), BridgeState::Running);
        assert_eq!(manager.local_addr(), None);
        assert!(wait_for(|| journal.count(&PortOp::BreakOn) >= 3));

        manager.event_sender().send(BridgeEvent::Interrupted).unwrap();
        manager.wait().unwrap();

        let frames = journal.count(&PortOp::BreakOn);
        assert!(frames >= 3);
        let mut expected = vec![0u8];
        expected.extend_from_slice(&[255; DMX_CHANNEL_LEN]);
        for n in 0..frames {
            assert_eq!(journal.frame_bytes(n), expected, "frame {}", n);
        }
        assert_eq!(journal.count(&PortOp::Close), 1);
        assert_eq!(journal.ops().last(), Some(&PortOp::Close));
    }

    #[test]
    fn test_pattern_from_settings() {
        let mut settings = Settings::default();
        settings.dmx.test_pattern = Some(128);
        assert_eq!(BridgeOptions::from(&settings).test_pattern, Some(128));
    }
}
