//! art-net 接收线程
//! - 带超时地接收 udp 数据报，超时不是错误，只是为了检查停止信号
//! - 无法解析的数据报记录日志后丢弃，不会中断循环
//! - 解析成功的数据写入 dmx 总线
//! - 除超时以外的接收错误视为致命错误，返回给 bridge manager

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::protocol::DmxDecoder;
use crate::common::error::{DecodeError, DriverError};
use crate::driver::dmx::dmx_bus::DmxBus;
use crate::{debug, error, info, trace, warn};

const LOG_TAG: &str = "receiver.rs | art-net receiver";

const RECV_BUFFER_LEN: usize = 4096;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub applied: u64,
    pub rejected: u64,
}

/// receive datagrams until `shutdown` is cancelled or the socket fails
/// the socket is released when this function returns
pub fn run_loop(
    socket: UdpSocket,
    decoder: &dyn DmxDecoder,
    bus: &DmxBus,
    recv_timeout: Duration,
    shutdown: &CancellationToken,
) -> Result<IngestStats, DriverError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DriverError::Runtime)?;

    rt.block_on(async {
        socket
            .set_nonblocking(true)
            .map_err(DriverError::TransportReceive)?;
        let socket = tokio::net::UdpSocket::from_std(socket).map_err(DriverError::TransportReceive)?;
        info!(LOG_TAG, "art-net receive loop is running on {:?}", socket.local_addr());

        let mut buf = [0u8; RECV_BUFFER_LEN];
        let mut stats = IngestStats::default();

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                res = tokio::time::timeout(recv_timeout, socket.recv_from(&mut buf)) => res,
            };

            match received {
                // timeout, go round and look at the shutdown signal again
                Err(_) => continue,
                Ok(Err(e)) => {
                    error!(LOG_TAG, "receive failed, stopping ingestion: {}", e);
                    return Err(DriverError::TransportReceive(e));
                }
                Ok(Ok((len, from))) => {
                    stats.received += 1;
                    if apply_datagram(&buf[..len], from, decoder, bus) {
                        stats.applied += 1;
                    } else {
                        stats.rejected += 1;
                    }
                }
            }
        }

        info!(
            LOG_TAG,
            "art-net receive loop exited, received: {}, applied: {}, rejected: {}",
            stats.received,
            stats.applied,
            stats.rejected
        );
        Ok(stats)
    })
}

/// decode one datagram and write it to the bus, returns false if it was dropped
fn apply_datagram(datagram: &[u8], from: SocketAddr, decoder: &dyn DmxDecoder, bus: &DmxBus) -> bool {
    let update = match decoder.decode(datagram) {
        Ok(update) => update,
        Err(DecodeError::Unsupported(opcode)) => {
            debug!(LOG_TAG, "ignoring {} from {}", opcode, from);
            return false;
        }
        Err(e) => {
            warn!(LOG_TAG, "received invalid packet from {}, ignoring: {}", from, e);
            return false;
        }
    };

    match bus.set_channels(update.offset, &update.data) {
        Ok(()) => {
            trace!(
                LOG_TAG,
                "applied {} channels at {} from {}",
                update.data.len(),
                update.offset,
                from
            );
            true
        }
        Err(e) => {
            warn!(LOG_TAG, "dropping update from {}: {}", from, e);
            false
        }
    }
}
