//! In-memory transport test double.
//!
//! Not part of the original library (§1 scope explicitly excludes real
//! backends), but every family's device code is written against the
//! [`Transport`] trait, so an in-memory stand-in is what drives every
//! protocol unit test and the CLI's offline `dump`/`parse` commands
//! (§0/§4.12 of the expanded spec) — the same role a loopback pty plays
//! in the original's own test harness.

use std::collections::VecDeque;

use crate::error::{Result, Status};
use crate::transport::{PurgeDirection, SerialConfig, Timeout, Transport};

#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbound: VecDeque<u8>,
    pub written: Vec<u8>,
    timeout: Option<Timeout>,
    dtr: bool,
    rts: bool,
    brk: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to be returned by future `read` calls, in order. Tests
    /// call this to script a device's response after observing a write.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    pub fn pending(&self) -> usize {
        self.inbound.len()
    }
}

impl Transport for MemoryTransport {
    fn set_timeout(&mut self, timeout: Timeout) -> Result<()> {
        self.timeout = Some(timeout);
        Ok(())
    }

    fn configure(&mut self, _config: SerialConfig) -> Result<()> {
        Ok(())
    }

    fn set_break(&mut self, level: bool) -> Result<()> {
        self.brk = level;
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.dtr = level;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.rts = level;
        Ok(())
    }

    fn get_lines(&mut self) -> Result<u32> {
        Ok((self.dtr as u32) | ((self.rts as u32) << 1) | ((self.brk as u32) << 2))
    }

    fn get_available(&mut self) -> Result<usize> {
        Ok(self.inbound.len())
    }

    fn poll(&mut self, _timeout_ms: u32) -> Result<bool> {
        Ok(!self.inbound.is_empty())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.inbound.is_empty() {
            return Err(Status::Timeout);
        }
        let n = buf.len().min(self.inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.inbound.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.written.extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn purge(&mut self, direction: PurgeDirection) -> Result<()> {
        match direction {
            PurgeDirection::Input | PurgeDirection::Both => self.inbound.clear(),
            PurgeDirection::Output => {}
        }
        Ok(())
    }

    fn sleep(&mut self, _ms: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_reports_timeout_on_empty() {
        let mut t = MemoryTransport::new();
        let mut buf = [0u8; 4];
        assert_eq!(t.read(&mut buf).unwrap_err(), Status::Timeout);
    }

    #[test]
    fn write_then_read_round_trip() {
        let mut t = MemoryTransport::new();
        t.write(&[1, 2, 3]).unwrap();
        assert_eq!(t.written, vec![1, 2, 3]);
        t.push_inbound(&[9, 8]);
        let mut buf = [0u8; 2];
        assert_eq!(t.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [9, 8]);
    }
}
