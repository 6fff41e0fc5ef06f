//! Suunto "Common2" family (Vyper 2, D9 and kin): XOR-framed request/reply
//! packets over a header-verified, length-checked, checksummed wire format.
//! Grounded on `original_source/src/suunto_d9.c`'s `suunto_d9_device_packet`
//! and `original_source/src/suunto_common2.h`'s layout/vtable shape.

use crate::device::{Device, DeviceCommon, DiveCallback, Event, EventMask, Progress};
use crate::error::{Result, Status};
use crate::ringbuffer;
use crate::transport::{read_exact, SerialConfig, Timeout, Transport};
use crate::util::buffer::Buffer;
use crate::util::checksum::xor_u8;
use crate::util::datetime::Ticks;
use crate::util::endian::u16_be;

/// Memory layout constants per model (§4.11-adjacent; these are the D9
/// family's `suunto_common2_layout_t`).
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub memsize: u32,
    pub rb_profile_begin: u32,
    pub rb_profile_end: u32,
}

pub const D9_LAYOUT: Layout = Layout {
    memsize: 0x8000,
    rb_profile_begin: 0x019A,
    rb_profile_end: 0x7FFE,
};

pub const D9TX_LAYOUT: Layout = Layout {
    memsize: 0x10000,
    rb_profile_begin: 0x019A,
    rb_profile_end: 0xFFFE,
};

/// A dive's ring-buffer peek distance used to locate the start-of-dive
/// marker byte; fixed across the family.
const PEEK: usize = 4;
/// Fingerprint window into each dive's header, analogous to
/// `suunto_eon.c`'s `FP_OFFSET`/`FP_SIZE`.
const FP_OFFSET: usize = 6;
const FP_SIZE: usize = 5;
/// Candidate baudrates tried in order during autodetection (§4.11's sibling
/// note: D4i/D6i/D9tx hint at 115200 first, everything else at 9600).
const BAUDRATES: [u32; 2] = [9600, 115200];

pub struct SuuntoCommon2<T: Transport> {
    transport: T,
    common: DeviceCommon,
    layout: Layout,
    version: [u8; 4],
}

impl<T: Transport> SuuntoCommon2<T> {
    /// Opens the link: 8N1, 3s timeout, DTR power-up, then autodetects the
    /// baudrate by probing `version()` (`suunto_d9_device_autodetect`).
    pub fn open(mut transport: T, layout: Layout, baud_hint_high: bool) -> Result<Self> {
        transport.set_timeout(Timeout::Millis(3000))?;
        let _ = transport.set_dtr(true);
        transport.sleep(100);
        transport.purge(crate::transport::PurgeDirection::Both)?;

        let mut device = SuuntoCommon2 {
            transport,
            common: DeviceCommon::default(),
            layout,
            version: [0; 4],
        };

        let order: [u32; 2] = if baud_hint_high {
            [BAUDRATES[1], BAUDRATES[0]]
        } else {
            BAUDRATES
        };

        let mut last_err = Status::Timeout;
        for baud in order {
            device.transport.configure(SerialConfig {
                baudrate: baud,
                databits: 8,
                parity: crate::transport::Parity::None,
                stopbits: crate::transport::StopBits::One,
                flowcontrol: crate::transport::FlowControl::None,
            })?;
            match device.fetch_version() {
                Ok(()) => {
                    tracing::info!(baud, "suunto common2 device detected");
                    return Ok(device);
                }
                Err(e) => {
                    tracing::debug!(baud, error = %e, "suunto common2 autodetect probe failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    fn fetch_version(&mut self) -> Result<()> {
        let answer = self.packet(&[0x0F, 0x00, 0x00], 4)?;
        self.version.copy_from_slice(&answer[3..7]);
        Ok(())
    }

    /// `suunto_d9_device_packet`: write command, verify echo, read answer,
    /// verify header byte / BE length / parameters / XOR checksum.
    fn packet(&mut self, command: &[u8], answer_payload_size: usize) -> Result<Vec<u8>> {
        if self.common.is_cancelled() {
            return Err(Status::Cancelled);
        }

        self.transport.write(command)?;

        let mut echo = vec![0u8; command.len()];
        read_exact(&mut self.transport, &mut echo)?;
        if echo != command {
            return Err(Status::protocol("unexpected command echo"));
        }

        let asize = answer_payload_size + 4;
        let mut answer = vec![0u8; asize];
        read_exact(&mut self.transport, &mut answer)?;

        if answer[0] != command[0] {
            return Err(Status::protocol("unexpected answer header"));
        }
        if u16_be(&answer, 1) as usize + 4 != asize {
            return Err(Status::protocol("unexpected answer size"));
        }
        if command.len() > 3 && answer[3..command.len()] != command[3..] {
            return Err(Status::protocol("unexpected answer parameters"));
        }
        let crc = answer[asize - 1];
        let ccrc = xor_u8(&answer[..asize - 1], 0x00);
        if crc != ccrc {
            return Err(Status::protocol("unexpected answer CRC"));
        }

        Ok(answer)
    }

    fn read_chunk(&mut self, address: u32, size: usize) -> Result<Vec<u8>> {
        let command = [
            0x05,
            ((address >> 8) & 0xFF) as u8,
            (address & 0xFF) as u8,
            size as u8,
        ];
        let answer = self.packet(&command, size)?;
        Ok(answer[3..3 + size].to_vec())
    }
}

impl<T: Transport> Device for SuuntoCommon2<T> {
    fn common(&mut self) -> &mut DeviceCommon {
        &mut self.common
    }

    fn fingerprint_size(&self) -> usize {
        5
    }

    fn read(&mut self, address: u32, data: &mut [u8]) -> Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let len = (data.len() - offset).min(0x78);
            let chunk = self.read_chunk(address + offset as u32, len)?;
            data[offset..offset + len].copy_from_slice(&chunk);
            offset += len;
        }
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let len = (data.len() - offset).min(0x78);
            let mut command = vec![0x06, ((address + offset as u32) >> 8) as u8, (address as u8).wrapping_add(offset as u8)];
            command.extend_from_slice(&data[offset..offset + len]);
            self.packet(&command, 0)?;
            offset += len;
        }
        Ok(())
    }

    fn dump(&mut self) -> Result<Buffer> {
        let mut out = Buffer::new(self.layout.memsize as usize);
        out.resize(self.layout.memsize as usize)?;

        self.common.emit(
            EventMask::PROGRESS,
            Event::Progress(Progress {
                current: 0,
                maximum: self.layout.memsize,
            }),
        );

        let mut offset = 0u32;
        while offset < self.layout.memsize {
            let len = (self.layout.memsize - offset).min(0x78) as usize;
            let chunk = self.read_chunk(offset, len)?;
            out.data_mut()[offset as usize..offset as usize + len].copy_from_slice(&chunk);
            offset += len as u32;
            self.common.emit(
                EventMask::PROGRESS,
                Event::Progress(Progress {
                    current: offset,
                    maximum: self.layout.memsize,
                }),
            );
        }

        Ok(out)
    }

    fn foreach(&mut self, callback: &mut DiveCallback) -> Result<()> {
        let image = self.dump()?;
        let data = image.data();

        let begin = self.layout.rb_profile_begin as usize;
        let end = self.layout.rb_profile_end as usize;

        let mut eop = begin;
        while eop < end {
            if data[eop] == 0x82 {
                break;
            }
            eop += 1;
        }
        if eop >= end {
            return Err(Status::protocol("end-of-profile marker not found"));
        }

        let fingerprint = self.common.fingerprint.clone();
        ringbuffer::suunto_extract_dives(data, begin, end, eop, PEEK, |dive| {
            if dive.len() < FP_OFFSET + FP_SIZE {
                return callback(dive, &[]);
            }
            let fp = &dive[FP_OFFSET..FP_OFFSET + FP_SIZE];
            if fingerprint.len() == FP_SIZE && fp == fingerprint[..] {
                return false;
            }
            callback(dive, fp)
        })
    }

    fn timesync(&mut self, ticks: Ticks) -> Result<()> {
        let dt = crate::util::datetime::DateTime::from_ticks_gmtime(ticks)
            .ok_or_else(|| Status::invalid_args("ticks out of range"))?;
        let command = [
            0x15,
            (dt.year % 100) as u8,
            dt.month as u8,
            dt.day as u8,
            dt.hour as u8,
            dt.minute as u8,
            dt.second as u8,
        ];
        self.packet(&command, 0)?;
        Ok(())
    }
}
