//! Mares Nemo device: a dump-only protocol with dual-packet redundancy —
//! every chunk of memory is sent twice, each copy separately checksummed,
//! and the host reconciles the pair. Grounded on
//! `original_source/src/mares_nemo.c`.

use crate::device::{Device, DeviceCommon};
use crate::error::{Result, Status};
use crate::transport::{PurgeDirection, SerialConfig, Timeout, Transport};
use crate::util::buffer::Buffer;
use crate::util::checksum::add_u8;

const MEMORY_SIZE: usize = 16384;
const PACKET_SIZE: usize = 256;
/// The device sends 20 consecutive `0xEE` sync bytes before the first
/// packet pair; a confused read position is resynchronized by discarding
/// anything that breaks the run.
const PREAMBLE_COUNT: usize = 20;
const PREAMBLE_BYTE: u8 = 0xEE;

pub struct MaresNemo<T: Transport> {
    transport: T,
    common: DeviceCommon,
}

impl<T: Transport> MaresNemo<T> {
    pub fn open(mut transport: T) -> Result<Self> {
        transport.configure(SerialConfig {
            baudrate: 9600,
            databits: 8,
            parity: crate::transport::Parity::None,
            stopbits: crate::transport::StopBits::One,
            flowcontrol: crate::transport::FlowControl::None,
        })?;
        transport.set_timeout(Timeout::Block)?;
        let _ = transport.set_dtr(true);
        let _ = transport.set_rts(true);
        Ok(MaresNemo {
            transport,
            common: DeviceCommon::default(),
        })
    }

    fn read_one(&mut self, buf: &mut [u8]) -> Result<u8> {
        let mut byte = [0u8; 1];
        let n = self.transport.read(&mut byte)?;
        if n == 0 {
            return Err(Status::Timeout);
        }
        buf[0] = byte[0];
        Ok(byte[0])
    }
}

impl<T: Transport> Device for MaresNemo<T> {
    fn common(&mut self) -> &mut DeviceCommon {
        &mut self.common
    }

    fn fingerprint_size(&self) -> usize {
        0
    }

    fn dump(&mut self) -> Result<Buffer> {
        let mut scratch = [0u8; 1];
        let mut run = 0;
        while run < PREAMBLE_COUNT {
            let byte = self.read_one(&mut scratch)?;
            if byte == PREAMBLE_BYTE {
                run += 1;
            } else {
                run = 0;
            }
        }

        let mut data = vec![0u8; MEMORY_SIZE];
        let mut nbytes = 0;
        while nbytes < MEMORY_SIZE {
            let mut packet = vec![0u8; (PACKET_SIZE + 1) * 2];
            crate::transport::read_exact(&mut self.transport, &mut packet)?;

            let crc1 = packet[PACKET_SIZE];
            let crc2 = packet[PACKET_SIZE * 2 + 1];
            let ccrc1 = add_u8(&packet[..PACKET_SIZE], 0x00);
            let ccrc2 = add_u8(&packet[PACKET_SIZE + 1..PACKET_SIZE * 2 + 1], 0x00);

            let chunk = match (crc1 == ccrc1, crc2 == ccrc2) {
                (true, true) => {
                    if packet[..PACKET_SIZE] != packet[PACKET_SIZE + 1..PACKET_SIZE * 2 + 1] {
                        tracing::warn!(nbytes, "mares nemo redundant packets disagree");
                        return Err(Status::protocol("redundant packets disagree"));
                    }
                    &packet[..PACKET_SIZE]
                }
                (true, false) => {
                    tracing::debug!(nbytes, "mares nemo packet B failed its checksum, using A");
                    &packet[..PACKET_SIZE]
                }
                (false, true) => {
                    tracing::debug!(nbytes, "mares nemo packet A failed its checksum, using B");
                    &packet[PACKET_SIZE + 1..PACKET_SIZE * 2 + 1]
                }
                (false, false) => {
                    tracing::warn!(nbytes, "mares nemo both redundant packets failed checksum");
                    return Err(Status::protocol("unexpected packet CRC"));
                }
            };

            data[nbytes..nbytes + PACKET_SIZE].copy_from_slice(chunk);
            nbytes += PACKET_SIZE;
        }

        Ok(Buffer::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;

    fn packet_pair(fill: u8, corrupt_second: bool) -> Vec<u8> {
        let mut out = vec![fill; PACKET_SIZE];
        out.push(add_u8(&out, 0x00));
        let mut second = vec![fill; PACKET_SIZE];
        let crc2 = add_u8(&second, 0x00);
        if corrupt_second {
            // Flip a data byte without updating crc2, so the second
            // packet's checksum now fails to match its (stale) content.
            second[0] ^= 0xFF;
        }
        out.extend_from_slice(&second);
        out.push(crc2);
        out
    }

    #[test]
    fn dump_recovers_when_only_first_packet_checksum_is_valid() {
        let mut mt = MemoryTransport::new();
        mt.push_inbound(&vec![PREAMBLE_BYTE; PREAMBLE_COUNT]);
        for _ in 0..(MEMORY_SIZE / PACKET_SIZE) {
            mt.push_inbound(&packet_pair(0x42, true));
        }

        let mut device = MaresNemo::open(mt).unwrap();
        let data = device.dump().unwrap();
        assert_eq!(data.size(), MEMORY_SIZE);
        assert!(data.data().iter().all(|&b| b == 0x42));
    }

    #[test]
    fn dump_rejects_when_both_packets_disagree_but_both_checksum_ok() {
        let mut mt = MemoryTransport::new();
        mt.push_inbound(&vec![PREAMBLE_BYTE; PREAMBLE_COUNT]);
        let mut first = vec![0x11u8; PACKET_SIZE];
        first.push(add_u8(&first, 0));
        let mut second = vec![0x22u8; PACKET_SIZE];
        second.push(add_u8(&second, 0));
        let mut packet = first;
        packet.extend_from_slice(&second);
        for _ in 0..(MEMORY_SIZE / PACKET_SIZE) {
            mt.push_inbound(&packet);
        }

        let mut device = MaresNemo::open(mt).unwrap();
        let err = device.dump().unwrap_err();
        assert!(matches!(err, Status::Protocol(_)));
    }
}
