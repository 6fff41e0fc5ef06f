//! Growable byte buffer (§4.9), grounded on `original_source/include/libdivecomputer/buffer.h`.
//!
//! Dumpers that assemble pages newest-first (Sensus Ultra's incremental
//! page parsing, §4.4) use `prepend` to build the image in forward byte
//! order while receiving pages in reverse chronological order.

use crate::error::{Result, Status};

/// A dynamically resizable byte buffer, the Rust counterpart of
/// `dc_buffer_t`. Reallocation failure in the original maps to `NoMemory`;
/// here that would only happen on genuine allocator exhaustion, which
/// `Vec` reports via abort rather than `Result` — `reserve`/`resize`
/// still return `Result` to preserve the call shape family code expects.
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    pub fn new(capacity: usize) -> Self {
        Buffer {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        self.data.reserve(capacity.saturating_sub(self.data.len()));
        Ok(())
    }

    pub fn resize(&mut self, size: usize) -> Result<()> {
        self.data.resize(size, 0);
        Ok(())
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// O(n) insert-at-front (memmove in the original).
    pub fn prepend(&mut self, bytes: &[u8]) -> Result<()> {
        self.data.splice(0..0, bytes.iter().copied());
        Ok(())
    }

    pub fn insert(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        if offset > self.data.len() {
            return Err(Status::invalid_args("insert offset out of range"));
        }
        self.data.splice(offset..offset, bytes.iter().copied());
        Ok(())
    }

    pub fn slice(&self, offset: usize, size: usize) -> Result<&[u8]> {
        self.data
            .get(offset..offset + size)
            .ok_or_else(|| Status::invalid_args("slice out of range"))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Buffer { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_keeps_forward_order() {
        let mut buf = Buffer::new(0);
        buf.append(&[3, 4]).unwrap();
        buf.prepend(&[1, 2]).unwrap();
        assert_eq!(buf.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn slice_bounds_checked() {
        let mut buf = Buffer::new(0);
        buf.append(&[1, 2, 3]).unwrap();
        assert_eq!(buf.slice(1, 2).unwrap(), &[2, 3]);
        assert!(buf.slice(2, 5).is_err());
    }
}
