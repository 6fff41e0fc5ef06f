//! Reefnet Sensus (classic) device: an `OK`-framed handshake followed by a
//! single `DATA ... END` dump, with the ring-buffer extraction done
//! separately by [`crate::ringbuffer::sensus_extract_dives`]. Grounded on
//! `original_source/src/reefnet_sensus.c`.

use crate::device::{ClockSync, Device, DeviceCommon, DevInfo, DiveCallback, Event, EventMask, Progress};
use crate::error::{Result, Status};
use crate::ringbuffer;
use crate::transport::{read_exact, PurgeDirection, Timeout, Transport};
use crate::util::buffer::Buffer;
use crate::util::checksum::add_u16_le;
use crate::util::datetime::{DateTime, Ticks};
use crate::util::endian::{u16_le, u32_le};

const MEMORY_SIZE: usize = 56 * 1024;
const HANDSHAKE_SIZE: usize = 10;

pub struct ReefnetSensus<T: Transport> {
    transport: T,
    common: DeviceCommon,
    waiting: bool,
    timestamp: u32,
    devtime: u32,
    systime: Ticks,
}

impl<T: Transport> ReefnetSensus<T> {
    pub fn open(mut transport: T) -> Result<Self> {
        transport.set_timeout(Timeout::Millis(3000))?;
        transport.purge(PurgeDirection::Both)?;
        Ok(ReefnetSensus {
            transport,
            common: DeviceCommon::default(),
            waiting: false,
            timestamp: 0,
            devtime: 0,
            systime: 0,
        })
    }

    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    /// `reefnet_sensus_cancel`: tell a device waiting post-handshake to
    /// stand down, called implicitly by `close`.
    fn cancel(&mut self) -> Result<()> {
        self.transport.write(&[0x00])?;
        self.waiting = false;
        Ok(())
    }

    /// `reefnet_sensus_handshake`: send `0x0A`, read the 10+2-byte
    /// `OK`-prefixed handshake, emit clock/devinfo events.
    fn handshake(&mut self) -> Result<()> {
        self.transport.write(&[0x0A])?;

        let mut handshake = [0u8; HANDSHAKE_SIZE + 2];
        read_exact(&mut self.transport, &mut handshake)?;

        if &handshake[..2] != b"OK" {
            return Err(Status::protocol("unexpected handshake header"));
        }

        self.waiting = true;
        self.systime = DateTime::now_utc();
        self.devtime = u32_le(&handshake, 8);

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
                model: (handshake[2] - b'0') as u32,
                firmware: (handshake[3] - b'0') as u32,
                serial: u16_le(&handshake, 6) as u32,
            }),
        );

        self.transport.sleep(10);
        Ok(())
    }
}

impl<T: Transport> Device for ReefnetSensus<T> {
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
                maximum: (4 + MEMORY_SIZE + 2 + 3) as u32,
            }),
        );

        self.handshake()?;

        self.transport.write(&[0x40])?;
        self.waiting = false;

        let mut answer = vec![0u8; 4 + MEMORY_SIZE + 2 + 3];
        read_exact(&mut self.transport, &mut answer)?;

        if &answer[..4] != b"DATA" || &answer[answer.len() - 3..] != b"END" {
            return Err(Status::protocol("unexpected answer start or end byte(s)"));
        }

        let payload = &answer[4..4 + MEMORY_SIZE];
        let crc = u16_le(&answer, 4 + MEMORY_SIZE);
        let ccrc = add_u16_le(payload, 0x0000);
        if crc != ccrc {
            return Err(Status::protocol("unexpected answer CRC"));
        }

        Ok(Buffer::from(payload.to_vec()))
    }

    fn foreach(&mut self, callback: &mut DiveCallback) -> Result<()> {
        let image = self.dump()?;
        let cutoff = self.timestamp;
        ringbuffer::sensus_extract_dives(image.data(), cutoff, |dive, timestamp| {
            let fp = timestamp.to_le_bytes();
            callback(dive, &fp)
        })
    }

    fn close(&mut self) -> Result<()> {
        if self.waiting {
            self.cancel()?;
        }
        Ok(())
    }
}
