//! Device framework (§4.2): the common lifecycle, event/cancel dispatch,
//! and fingerprint machinery shared by every family, plus the per-family
//! implementations in the sibling modules.
//!
//! §9 calls for "a trait-object with optional methods (returning
//! `Unsupported` by default)" over the original's C vtable — that's
//! exactly [`Device`]: every method has a default body returning
//! `Status::Unsupported`, and families override only what they support.

pub mod hw_ostc;
pub mod mares_nemo;
pub mod reefnet_sensus;
pub mod reefnet_sensuspro;
pub mod reefnet_sensusultra;
pub mod suunto_common2;
pub mod suunto_vyper;

use bitflags::bitflags;

use crate::error::{Result, Status};
use crate::util::buffer::Buffer;
use crate::util::datetime::Ticks;

bitflags! {
    /// §4.2 event mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u32 {
        const WAITING  = 1 << 0;
        const PROGRESS = 1 << 1;
        const DEVINFO  = 1 << 2;
        const CLOCK    = 1 << 3;
        const VENDOR   = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: u32,
    pub maximum: u32,
}

#[derive(Debug, Clone)]
pub struct DevInfo {
    pub model: u32,
    pub firmware: u32,
    pub serial: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ClockSync {
    pub device_time: Ticks,
    pub host_time: Ticks,
}

#[derive(Debug, Clone)]
pub struct VendorBlob {
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum Event {
    Waiting,
    Progress(Progress),
    DevInfo(DevInfo),
    Clock(ClockSync),
    Vendor(VendorBlob),
}

pub type EventCallback = Box<dyn FnMut(Event) + Send>;
pub type CancelPredicate = Box<dyn FnMut() -> bool + Send>;
/// Receives a dive's raw blob and its fingerprint view; returns `false`
/// to stop enumeration early (a user abort, not an error — §4.4).
pub type DiveCallback<'a> = dyn FnMut(&[u8], &[u8]) -> bool + 'a;

/// State shared by every family (§4.2 "Common state").
#[derive(Default)]
pub struct DeviceCommon {
    pub fingerprint: Vec<u8>,
    event_mask: EventMask,
    event_cb: Option<EventCallback>,
    cancel: Option<CancelPredicate>,
}

impl DeviceCommon {
    pub fn emit(&mut self, bit: EventMask, event: Event) {
        if self.event_mask.contains(bit) {
            if let Some(cb) = &mut self.event_cb {
                cb(event);
            }
        }
    }

    /// Checked at every suspension point (§4.3 "Suspension points", §5).
    pub fn is_cancelled(&mut self) -> bool {
        self.cancel.as_mut().map(|c| c()).unwrap_or(false)
    }
}

impl std::fmt::Debug for DeviceCommon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCommon")
            .field("fingerprint", &self.fingerprint)
            .field("event_mask", &self.event_mask)
            .finish()
    }
}

/// The common device contract (§4.2). Every operation defaults to
/// `Unsupported`; a family overrides exactly the operations its protocol
/// exposes (e.g. Mares Nemo implements only `dump`; Suunto Vyper2
/// implements `read`/`write`/`dump`/`foreach`/`timesync`).
pub trait Device {
    fn common(&mut self) -> &mut DeviceCommon;

    /// The family's exact fingerprint size in bytes; `0` is always legal
    /// too and clears the fingerprint (§4.2 invariant).
    fn fingerprint_size(&self) -> usize;

    fn set_fingerprint(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            self.common().fingerprint.clear();
            return Ok(());
        }
        if data.len() != self.fingerprint_size() {
            return Err(Status::invalid_args(format!(
                "fingerprint must be 0 or {} bytes, got {}",
                self.fingerprint_size(),
                data.len()
            )));
        }
        self.common().fingerprint = data.to_vec();
        Ok(())
    }

    fn set_events(&mut self, mask: EventMask, callback: Option<EventCallback>) -> Result<()> {
        let common = self.common();
        common.event_mask = mask;
        common.event_cb = callback;
        Ok(())
    }

    fn set_cancel(&mut self, predicate: Option<CancelPredicate>) -> Result<()> {
        self.common().cancel = predicate;
        Ok(())
    }

    fn read(&mut self, _address: u32, _buf: &mut [u8]) -> Result<()> {
        Err(Status::Unsupported)
    }

    fn write(&mut self, _address: u32, _buf: &[u8]) -> Result<()> {
        Err(Status::Unsupported)
    }

    fn dump(&mut self) -> Result<Buffer> {
        Err(Status::Unsupported)
    }

    fn foreach(&mut self, _callback: &mut DiveCallback) -> Result<()> {
        Err(Status::Unsupported)
    }

    fn timesync(&mut self, _ticks: Ticks) -> Result<()> {
        Err(Status::Unsupported)
    }

    /// Idempotent-on-repeat; never closes the transport (§3 invariant).
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        common: DeviceCommon,
    }

    impl Device for Stub {
        fn common(&mut self) -> &mut DeviceCommon {
            &mut self.common
        }

        fn fingerprint_size(&self) -> usize {
            4
        }
    }

    #[test]
    fn fingerprint_wrong_size_is_invalid_args() {
        let mut d = Stub {
            common: DeviceCommon::default(),
        };
        assert!(d.set_fingerprint(&[1, 2, 3]).is_err());
        assert!(d.set_fingerprint(&[1, 2, 3, 4]).is_ok());
        assert!(d.set_fingerprint(&[]).is_ok());
        assert!(d.common().fingerprint.is_empty());
    }

    #[test]
    fn unimplemented_ops_return_unsupported() {
        let mut d = Stub {
            common: DeviceCommon::default(),
        };
        assert_eq!(d.dump().unwrap_err(), Status::Unsupported);
        assert_eq!(d.timesync(0).unwrap_err(), Status::Unsupported);
    }

    #[test]
    fn cancel_predicate_is_polled() {
        let mut d = Stub {
            common: DeviceCommon::default(),
        };
        let mut calls = 0;
        d.set_cancel(Some(Box::new(move || {
            calls += 1;
            calls >= 2
        })))
        .unwrap();
        assert!(!d.common().is_cancelled());
        assert!(d.common().is_cancelled());
    }
}
