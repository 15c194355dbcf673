pub mod dmx_bus;
pub mod dmx_thread;
pub mod dummy_port;
pub mod port_factory;
pub mod prelude;
pub mod serial_port;
pub mod traits;
#[cfg(target_os = "linux")]
pub mod uart_port;

#[cfg(test)]
pub mod test_port;
