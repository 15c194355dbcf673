//! dmx port 工厂
//! 启动时根据配置选择一次后端，运行期间不再切换

use super::dummy_port::DummyPort;
use super::serial_port::SerialPortBackend;
use super::traits::DmxPort;
use crate::common::error::DriverError;
use crate::common::setting::{Dmx, DmxBackend};
use crate::info;

const LOG_TAG: &str = "port_factory.rs | dmx port factory";

pub fn open_port(config: &Dmx) -> Result<Box<dyn DmxPort>, DriverError> {
    info!(
        LOG_TAG,
        "opening dmx port {} with {:?} backend", config.serial_port, config.backend
    );
    match config.backend {
        DmxBackend::Uart => open_uart(config.serial_port.as_str()),
        DmxBackend::Serialport => Ok(Box::new(SerialPortBackend::open(config.serial_port.as_str())?)),
        DmxBackend::Dummy => Ok(Box::new(DummyPort::new())),
    }
}

#[cfg(target_os = "linux")]
fn open_uart(path: &str) -> Result<Box<dyn DmxPort>, DriverError> {
    Ok(Box::new(super::uart_port::UartPort::open(path)?))
}

#[cfg(not(target_os = "linux"))]
fn open_uart(path: &str) -> Result<Box<dyn DmxPort>, DriverError> {
    crate::warn!(LOG_TAG, "raw uart backend is linux only, using serialport backend");
    Ok(Box::new(SerialPortBackend::open(path)?))
}
