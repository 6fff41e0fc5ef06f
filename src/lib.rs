//! divelink: a transport-agnostic library for talking to recreational
//! dive computers and decoding their dive logs.
//!
//! The crate is organized the way the device family it's modeling is:
//! [`transport`] is the byte pipe (serial, BLE, or the in-memory test
//! double), [`device`] drives each family's handshake/dump/foreach
//! protocol over a transport, [`ringbuffer`] holds the two circular-buffer
//! extraction algorithms shared across families, and [`parser`] turns a
//! raw dive blob into typed fields and a sample stream. [`descriptor`]
//! is the static vendor/product/family registry used to pick a device
//! implementation for a detected transport.

pub mod descriptor;
pub mod device;
pub mod error;
pub mod log;
pub mod parser;
pub mod ringbuffer;
pub mod transport;
pub mod util;

pub use error::{Result, Status};
