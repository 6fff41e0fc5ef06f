//! Reefnet Sensus Pro device: a break-triggered handshake (the device
//! wakes up when it sees a serial break, unlike classic Sensus's `0x0A`
//! command byte) and a CRC-CCITT-framed dump, both grounded on
//! `original_source/src/reefnet_sensuspro.c`.

use crate::device::{ClockSync, Device, DeviceCommon, DevInfo, DiveCallback, Event, EventMask, Progress};
use crate::error::{Result, Status};
use crate::ringbuffer;
use crate::transport::{read_exact, PurgeDirection, Timeout, Transport};
use crate::util::buffer::Buffer;
use crate::util::checksum::crc_ccitt_uint16;
use crate::util::datetime::{DateTime, Ticks};
use crate::util::endian::{u16_le, u32_le};

const MEMORY_SIZE: usize = 56320;
const HANDSHAKE_SIZE: usize = 10;

pub struct ReefnetSensusPro<T: Transport> {
    transport: T,
    common: DeviceCommon,
    timestamp: u32,
    devtime: u32,
    systime: Ticks,
    handshake: [u8; HANDSHAKE_SIZE],
}

impl<T: Transport> ReefnetSensusPro<T> {
    pub fn open(mut transport: T) -> Result<Self> {
        transport.set_timeout(Timeout::Millis(3000))?;
        transport.purge(PurgeDirection::Both)?;
        Ok(ReefnetSensusPro {
            transport,
            common: DeviceCommon::default(),
            timestamp: 0,
            devtime: 0,
            systime: 0,
            handshake: [0; HANDSHAKE_SIZE],
        })
    }

    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    pub fn handshake_bytes(&self) -> [u8; HANDSHAKE_SIZE] {
        self.handshake
    }

    /// `reefnet_sensuspro_handshake`: assert break, read the handshake
    /// frame, verify its CRC, clear break.
    fn handshake(&mut self) -> Result<()> {
        self.transport.set_break(true)?;

        let mut frame = [0u8; HANDSHAKE_SIZE + 2];
        read_exact(&mut self.transport, &mut frame)?;

        self.transport.set_break(false)?;

        let crc = u16_le(&frame, HANDSHAKE_SIZE);
        let ccrc = crc_ccitt_uint16(&frame[..HANDSHAKE_SIZE]);
        if crc != ccrc {
            return Err(Status::protocol("unexpected handshake CRC"));
        }

        self.systime = DateTime::now_utc();
        self.devtime = u32_le(&frame, 6);
        self.handshake.copy_from_slice(&frame[..HANDSHAKE_SIZE]);

        self.common.emit(
            EventMask::CLOCK,
            Event::Clock(ClockSync {
                device_time: self.devtime as Ticks,
                host_time: self.systime,
            }),
        );
        self.common.emit(
            EventMask::DEVINFO,
            Event::DevInfo(DevInfo {
                model: frame[0] as u32,
                firmware: frame[1] as u32,
                serial: u16_le(&frame, 4) as u32,
            }),
        );

        self.transport.sleep(10);
        Ok(())
    }

    fn send(&mut self, command: u8) -> Result<()> {
        self.handshake()?;
        self.transport.write(&[command])?;
        Ok(())
    }
}

impl<T: Transport> Device for ReefnetSensusPro<T> {
    fn common(&mut self) -> &mut DeviceCommon {
        &mut self.common
    }

    fn fingerprint_size(&self) -> usize {
        4
    }

    fn set_fingerprint(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            self.timestamp = 0;
            self.common.fingerprint.clear();
            return Ok(());
        }
        if data.len() != 4 {
            return Err(Status::invalid_args("fingerprint must be 0 or 4 bytes"));
        }
        self.timestamp = u32_le(data, 0);
        self.common.fingerprint = data.to_vec();
        Ok(())
    }

    fn dump(&mut self) -> Result<Buffer> {
        self.common.emit(
            EventMask::PROGRESS,
            Event::Progress(Progress {
                current: 0,
                maximum: (MEMORY_SIZE + 2) as u32,
            }),
        );

        self.send(0xB4)?;

        let mut answer = vec![0u8; MEMORY_SIZE + 2];
        read_exact(&mut self.transport, &mut answer)?;

        let crc = u16_le(&answer, MEMORY_SIZE);
        let ccrc = crc_ccitt_uint16(&answer[..MEMORY_SIZE]);
        if crc != ccrc {
            return Err(Status::protocol("unexpected answer CRC"));
        }

        Ok(Buffer::from(answer[..MEMORY_SIZE].to_vec()))
    }

    fn foreach(&mut self, callback: &mut DiveCallback) -> Result<()> {
        let image = self.dump()?;
        let cutoff = self.timestamp;
        ringbuffer::sensus_extract_dives(image.data(), cutoff, |dive, timestamp| {
            let fp = timestamp.to_le_bytes();
            callback(dive, &fp)
        })
    }

    fn write(&mut self, _address: u32, data: &[u8]) -> Result<()> {
        // `reefnet_sensuspro_device_write_interval`: a single-byte
        // configuration write, modeled generically through the `Device`
        // write hook with address `0` selecting "sample interval".
        if data.len() != 1 {
            return Err(Status::invalid_args("sensus pro interval write is one byte"));
        }
        self.send(0xB5)?;
        self.transport.write(data)?;
        Ok(())
    }
}
