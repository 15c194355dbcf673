//! dmx 总线数据
//! - 保存当前 512 个通道的数据
//! - 接收线程写入，渲染线程每帧读取一次
//! - 只保证单字节不撕裂，跨通道的撕裂下一帧即可恢复

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::prelude::*;
use crate::common::error::DriverError;

/// shared 512 slot universe, clones point to the same data
#[derive(Clone, Debug)]
pub struct DmxBus {
    data: Arc<Mutex<[DmxValue; DMX_CHANNEL_LEN]>>,
}

impl Default for DmxBus {
    fn default() -> Self {
        Self::new()
    }
}

impl DmxBus {
    /// all channels start at zero
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new([0; DMX_CHANNEL_LEN])),
        }
    }

    // a panicking writer cannot leave a byte array invalid
    fn lock(&self) -> MutexGuard<'_, [DmxValue; DMX_CHANNEL_LEN]> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 设置当前单个地址上的数据
    pub fn set_channel(&self, address: DmxAddress, value: DmxValue) -> Result<(), DriverError> {
        let index = address as usize;
        if index >= DMX_CHANNEL_LEN {
            return Err(DriverError::ChannelOutOfRange { index });
        }
        self.lock()[index] = value;
        Ok(())
    }

    /// 设置多个连续地址上的数据，越界时整体拒绝
    pub fn set_channels(&self, address: DmxAddress, values: &[DmxValue]) -> Result<(), DriverError> {
        let start = address as usize;
        let end = start + values.len();
        if end > DMX_CHANNEL_LEN {
            return Err(DriverError::ChannelRangeOverflow { start, end });
        }
        self.lock()[start..end].copy_from_slice(values);
        Ok(())
    }

    /// copy of the whole universe for one frame
    pub fn snapshot(&self) -> [DmxValue; DMX_CHANNEL_LEN] {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_is_dark() {
        let bus = DmxBus::new();
        assert!(bus.snapshot().iter().all(|v| *v == 0));
    }

    #[test]
    fn test_set_every_channel() {
        let bus = DmxBus::new();
        for i in 0..DMX_CHANNEL_LEN {
            let value = (i % 251) as u8 + 1;
            bus.set_channel(i as DmxAddress, value).unwrap();
            let data = bus.snapshot();
            assert_eq!(data[i], value);
            // untouched channels are still zero
            assert!(data[i + 1..].iter().all(|v| *v == 0));
        }
    }

    #[test]
    fn test_set_channel_leaves_neighbours() {
        let bus = DmxBus::new();
        bus.set_channels(0, &[9; DMX_CHANNEL_LEN]).unwrap();
        bus.set_channel(100, 42).unwrap();
        let data = bus.snapshot();
        assert_eq!(data[99], 9);
        assert_eq!(data[100], 42);
        assert_eq!(data[101], 9);
    }

    #[test]
    fn test_set_channel_out_of_range() {
        let bus = DmxBus::new();
        assert!(matches!(
            bus.set_channel(512, 1),
            Err(DriverError::ChannelOutOfRange { index: 512 })
        ));
        assert!(bus.set_channel(u16::MAX, 1).is_err());
        assert!(bus.snapshot().iter().all(|v| *v == 0));
    }

    #[test]
    fn test_set_channels_range() {
        let bus = DmxBus::new();
        bus.set_channels(10, &[1, 2, 3]).unwrap();
        let data = bus.snapshot();
        assert_eq!(&data[9..14], &[0, 1, 2, 3, 0]);

        // exactly fits the tail of the universe
        bus.set_channels(510, &[7, 8]).unwrap();
        assert_eq!(&bus.snapshot()[510..], &[7, 8]);
    }

    #[test]
    fn test_set_channels_overflow_does_not_mutate() {
        let bus = DmxBus::new();
        bus.set_channels(0, &[5; 4]).unwrap();
        let before = bus.snapshot();

        assert!(matches!(
            bus.set_channels(0, &[255; 600]),
            Err(DriverError::ChannelRangeOverflow { start: 0, end: 600 })
        ));
        assert!(bus.set_channels(511, &[1, 2]).is_err());
        assert_eq!(bus.snapshot(), before);
    }

    #[test]
    fn test_shared_between_threads() {
        let bus = DmxBus::new();
        let writer = bus.clone();
        thread::spawn(move || writer.set_channel(0, 255).unwrap())
            .join()
            .unwrap();
        assert_eq!(bus.snapshot()[0], 255);
    }
}
