//! setting config file
//! - `config_{ENV}.toml` is read once and cached
//! - a missing file falls back to built-in defaults
//! - DMX_SERIAL_PORT / ARTNET_LISTEN / DMX_BACKEND / DMX_TEST_PATTERN override the file

use lazy_static::lazy_static;
use serde_derive::Deserialize;
use std::env;
use std::fs;
use std::io;
use std::path::Path;

use super::error::DriverError;

/// serial backend used to drive the dmx line
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DmxBackend {
    /// raw termios2 uart, linux only
    Uart,
    /// portable serialport backend
    Serialport,
    /// no hardware, frames are discarded
    Dummy,
}

impl DmxBackend {
    fn parse(s: &str) -> Result<Self, DriverError> {
        match s.to_ascii_lowercase().as_str() {
            "uart" => Ok(DmxBackend::Uart),
            "serialport" => Ok(DmxBackend::Serialport),
            "dummy" => Ok(DmxBackend::Dummy),
            other => Err(DriverError::Config(format!("unknown dmx backend: {}", other))),
        }
    }
}

/// where the settings came from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    File(String),
    /// the named file did not exist
    Defaults(String),
    #[default]
    Inline,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Env {
    pub env: String,
    pub log_level: String,
}

impl Default for Env {
    fn default() -> Self {
        Env {
            env: String::from("dev"),
            log_level: String::from("info"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Dmx {
    pub serial_port: String,
    pub backend: DmxBackend,
    // some usb adapters swallow the first byte after the break
    pub pad_leading_byte: bool,
    /// drive every channel at this level and ignore art-net, for hardware bring-up
    pub test_pattern: Option<u8>,
}

impl Default for Dmx {
    fn default() -> Self {
        Dmx {
            serial_port: String::from("/dev/ttyUSB0"),
            backend: DmxBackend::Uart,
            pad_leading_byte: false,
            test_pattern: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Artnet {
    pub listen: String,
    pub recv_timeout_ms: u64,
}

impl Default for Artnet {
    fn default() -> Self {
        Artnet {
            listen: String::from("0.0.0.0:6454"),
            recv_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub env: Env,
    pub dmx: Dmx,
    pub artnet: Artnet,
    #[serde(skip)]
    pub source: ConfigSource,
}

impl Settings {
    /// cached settings of the current process
    pub fn get() -> Result<&'static Self, DriverError> {
        // 给静态变量延迟赋值的宏
        lazy_static! {
            static ref CACHE: Result<Settings, String> = Settings::from_env().map_err(|e| e.to_string());
        }
        CACHE.as_ref().map_err(|e| DriverError::Config(e.clone()))
    }

    /// read `config_{ENV}.toml` and apply environment overrides
    pub fn from_env() -> Result<Self, DriverError> {
        let env_name = env::var("ENV").unwrap_or_else(|_| String::from("dev"));
        let file_path = format!("config_{}.toml", env_name);
        Settings::load(Path::new(&file_path), |key| env::var(key).ok())
    }

    fn load<F>(file_path: &Path, lookup: F) -> Result<Self, DriverError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // logger is not set up yet, main reports `source` once it is
        let mut settings = match fs::read_to_string(file_path) {
            Ok(content) => {
                let mut settings = Settings::from_toml(&content)?;
                settings.source = ConfigSource::File(file_path.display().to_string());
                settings
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Settings {
                source: ConfigSource::Defaults(file_path.display().to_string()),
                ..Settings::default()
            },
            Err(e) => {
                return Err(DriverError::Config(format!(
                    "cannot read config file {}: {}",
                    file_path.display(),
                    e
                )))
            }
        };

        settings.apply_overrides(lookup)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self, DriverError> {
        toml::from_str(content)
            .map_err(|e| DriverError::Config(format!("config file format invalid: {}", e)))
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), DriverError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("DMX_SERIAL_PORT") {
            self.dmx.serial_port = port;
        }
        if let Some(listen) = lookup("ARTNET_LISTEN") {
            self.artnet.listen = listen;
        }
        if let Some(backend) = lookup("DMX_BACKEND") {
            self.dmx.backend = DmxBackend::parse(&backend)?;
        }
        if let Some(level) = lookup("DMX_TEST_PATTERN") {
            let level = level.trim().parse::<u8>().map_err(|e| {
                DriverError::Config(format!("DMX_TEST_PATTERN must be 0-255: {}", e))
            })?;
            self.dmx.test_pattern = Some(level);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), DriverError> {
        if self.artnet.recv_timeout_ms == 0 {
            return Err(DriverError::Config(String::from(
                "artnet.recv_timeout_ms must be greater than zero",
            )));
        }
        if self.dmx.serial_port.is_empty() && self.dmx.backend != DmxBackend::Dummy {
            return Err(DriverError::Config(String::from("dmx.serial_port is empty")));
        }
        Ok(())
    }
}
