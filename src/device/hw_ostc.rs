//! Heinrichs Weikamp OSTC/Frog device: the simplest family — one command
//! byte, one fixed-size raw dump, no framing at all. Grounded on
//! `original_source/src/hw_ostc.c`.

use crate::device::{Device, DeviceCommon, Event, EventMask, Progress};
use crate::error::Result;
use crate::transport::{read_exact, SerialConfig, Timeout, Transport};
use crate::util::buffer::Buffer;

#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub memory_size: usize,
    pub command: u8,
}

/// OSTC: 1hz big dump.
pub const OSTC_LAYOUT: Layout = Layout {
    memory_size: 0x10000,
    command: b'a',
};

/// Frog: smaller flash, same single-command protocol.
pub const FROG_LAYOUT: Layout = Layout {
    memory_size: 0x20000,
    command: b'a',
};

pub struct HwOstc<T: Transport> {
    transport: T,
    common: DeviceCommon,
    layout: Layout,
}

impl<T: Transport> HwOstc<T> {
    pub fn open(mut transport: T, layout: Layout) -> Result<Self> {
        transport.configure(SerialConfig {
            baudrate: 115200,
            databits: 8,
            parity: crate::transport::Parity::None,
            stopbits: crate::transport::StopBits::One,
            flowcontrol: crate::transport::FlowControl::None,
        })?;
        transport.set_timeout(Timeout::Block)?;
        Ok(HwOstc {
            transport,
            common: DeviceCommon::default(),
            layout,
        })
    }
}

impl<T: Transport> Device for HwOstc<T> {
    fn common(&mut self) -> &mut DeviceCommon {
        &mut self.common
    }

    fn fingerprint_size(&self) -> usize {
        0
    }

    fn dump(&mut self) -> Result<Buffer> {
        self.common.emit(
            EventMask::PROGRESS,
            Event::Progress(Progress {
                current: 0,
                maximum: self.layout.memory_size as u32,
            }),
        );

        self.transport.write(&[self.layout.command])?;

        let mut data = vec![0u8; self.layout.memory_size];
        read_exact(&mut self.transport, &mut data)?;

        self.common.emit(
            EventMask::PROGRESS,
            Event::Progress(Progress {
                current: self.layout.memory_size as u32,
                maximum: self.layout.memory_size as u32,
            }),
        );

        Ok(Buffer::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;

    #[test]
    fn dump_sends_single_command_byte_and_reads_raw_image() {
        let layout = Layout {
            memory_size: 64,
            command: b'a',
        };
        let mut mt = MemoryTransport::new();
        mt.push_inbound(&vec![0x7Eu8; layout.memory_size]);

        let mut device = HwOstc::open(mt, layout).unwrap();
        let data = device.dump().unwrap();

        assert_eq!(data.size(), layout.memory_size);
        assert!(data.data().iter().all(|&b| b == 0x7E));
    }
}
