//! Transport abstraction (§4.1): a byte-oriented full-duplex stream with
//! timeouts, line signals, ioctls, and purge/drain/sleep, shared by every
//! family's device implementation.
//!
//! The real serial/USB/BLE backends are out of scope (§1) — this module
//! defines the contract and ships two concrete transports: [`ble`] (the
//! teacher's `btleplug`-backed connection, generalized to this trait) and
//! [`memory`] (an in-memory test double every unit test and the CLI's
//! offline commands drive against).

pub mod ble;
pub mod memory;

use bitflags::bitflags;

use crate::error::Result;

bitflags! {
    /// §3 "Transport kind". `Custom` transports are modeled simply as
    /// another `Box<dyn Transport>` — there is no separate vtable type in
    /// this design (§9: trait objects replace the C vtable).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransportKindMask: u32 {
        const SERIAL    = 1 << 0;
        const IRDA      = 1 << 1;
        const USB       = 1 << 2;
        const USB_HID   = 1 << 3;
        const BLUETOOTH = 1 << 4;
        const BLE       = 1 << 5;
        const CUSTOM    = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Serial,
    IrDA,
    Usb,
    UsbHid,
    Bluetooth,
    Ble,
    Custom,
}

impl TransportKind {
    pub fn mask(self) -> TransportKindMask {
        match self {
            TransportKind::Serial => TransportKindMask::SERIAL,
            TransportKind::IrDA => TransportKindMask::IRDA,
            TransportKind::Usb => TransportKindMask::USB,
            TransportKind::UsbHid => TransportKindMask::USB_HID,
            TransportKind::Bluetooth => TransportKindMask::BLUETOOTH,
            TransportKind::Ble => TransportKindMask::BLE,
            TransportKind::Custom => TransportKindMask::CUSTOM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    OneAndHalf,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Hardware,
    Software,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baudrate: u32,
    pub databits: u8,
    pub parity: Parity,
    pub stopbits: StopBits,
    pub flowcontrol: FlowControl,
}

/// `set_timeout` mode (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until all requested bytes arrive.
    Block,
    /// Return immediately with whatever is already buffered.
    Immediate,
    /// Block up to this many milliseconds; short reads are not an error.
    Millis(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeDirection {
    Input,
    Output,
    Both,
}

/// (dir, type, nr, size) ioctl request word, per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoctlRequest {
    pub read: bool,
    pub write: bool,
    pub kind: u8,
    pub nr: u8,
    pub size: u16,
}

impl IoctlRequest {
    pub const fn encode(self) -> u32 {
        let dir = (self.read as u32) | ((self.write as u32) << 1);
        (dir << 30) | ((self.size as u32) << 16) | ((self.kind as u32) << 8) | self.nr as u32
    }

    pub const fn decode(word: u32) -> Self {
        IoctlRequest {
            read: word & (1 << 30) != 0,
            write: word & (1 << 31) != 0,
            kind: ((word >> 8) & 0xFF) as u8,
            nr: (word & 0xFF) as u8,
            size: ((word >> 16) & 0x3FFF) as u16,
        }
    }
}

/// The byte-stream contract every family's device code is written against.
/// §4.1: any method may return `Unsupported` for transports that don't
/// implement it (e.g. `configure` on BLE).
pub trait Transport: Send {
    fn set_timeout(&mut self, timeout: Timeout) -> Result<()>;

    fn configure(&mut self, _config: SerialConfig) -> Result<()> {
        Err(crate::error::Status::Unsupported)
    }

    fn set_break(&mut self, _level: bool) -> Result<()> {
        Err(crate::error::Status::Unsupported)
    }

    fn set_dtr(&mut self, _level: bool) -> Result<()> {
        Err(crate::error::Status::Unsupported)
    }

    fn set_rts(&mut self, _level: bool) -> Result<()> {
        Err(crate::error::Status::Unsupported)
    }

    fn get_lines(&mut self) -> Result<u32> {
        Err(crate::error::Status::Unsupported)
    }

    fn get_available(&mut self) -> Result<usize>;

    fn poll(&mut self, timeout_ms: u32) -> Result<bool>;

    /// Reads up to `buf.len()` bytes, returning the number actually read.
    /// A short read under a `Timeout::Millis`/`Timeout::Immediate` mode is
    /// not an error; a short read never happens under `Timeout::Block`
    /// except as a transport failure.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes all of `buf`; a short write is always an error (§4.1).
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    fn ioctl(&mut self, _request: IoctlRequest, _buf: &mut Vec<u8>) -> Result<()> {
        Err(crate::error::Status::Unsupported)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn purge(&mut self, _direction: PurgeDirection) -> Result<()> {
        Ok(())
    }

    fn sleep(&mut self, ms: u32);
}

/// Reads exactly `buf.len()` bytes or fails, the shape most family
/// protocols want (`serial_read` in the original always means "fill the
/// whole buffer or report an error").
pub fn read_exact(transport: &mut dyn Transport, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = transport.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(crate::error::Status::Timeout);
        }
        filled += n;
    }
    Ok(())
}
