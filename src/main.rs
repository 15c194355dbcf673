mod artnet_client;
mod bridge;
mod common;
mod driver;

use bridge::entity::BridgeEvent;
use bridge::manager::BridgeManager;
use common::logger::init_logger;
use common::setting::{ConfigSource, Settings};
use dotenv::dotenv;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // 检查 env 文件
    dotenv().ok();

    // 加载 config
    let settings = Settings::get()?;

    // 设置 logger
    init_logger(settings.env.log_level.as_str());
    match &settings.source {
        ConfigSource::File(path) => log::info!("config loaded from {}, env: {}", path, settings.env.env),
        ConfigSource::Defaults(path) => log::warn!("no config file {}, using defaults", path),
        ConfigSource::Inline => {}
    }
    log::debug!("config: {:?}", settings);

    let manager = BridgeManager::launch(settings)?;

    let events = manager.event_sender();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = events.send(BridgeEvent::Interrupted);
    }) {
        log::error!("cannot install ctrl-c handler: {}", e);
        manager.stop()?;
        return Err(e.into());
    }

    // returns after both workers exited and the serial device was closed
    manager.wait()?;
    Ok(())
}
