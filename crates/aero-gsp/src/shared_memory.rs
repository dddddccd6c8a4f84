//! The GSP shared memory block holding the client command buffers.

use core::ops::Range;

use crate::error::{GspError, GspResult};
use crate::sync::Handle;

/// Bounds-checked view of the GSP shared memory block.
///
/// The block is written by the guest client and by the GSP service; every access goes through a
/// range check so a bad header index can never reach outside the block.
#[derive(Clone, Debug)]
pub struct SharedMemory {
    handle: Handle,
    data: Vec<u8>,
}

impl SharedMemory {
    pub fn new(handle: Handle, size: usize) -> Self {
        Self {
            handle,
            data: vec![0; size],
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, offset: usize, len: usize) -> GspResult<Range<usize>> {
        let oob = GspError::SharedMemoryOutOfBounds {
            offset,
            len,
            size: self.data.len(),
        };
        let end = offset.checked_add(len).ok_or(oob.clone())?;
        if end > self.data.len() {
            return Err(oob);
        }
        Ok(offset..end)
    }

    pub fn read_into(&self, offset: usize, dst: &mut [u8]) -> GspResult<()> {
        let range = self.range(offset, dst.len())?;
        dst.copy_from_slice(&self.data[range]);
        Ok(())
    }

    pub fn write_from(&mut self, offset: usize, src: &[u8]) -> GspResult<()> {
        let range = self.range(offset, src.len())?;
        self.data[range].copy_from_slice(src);
        Ok(())
    }

    pub fn read_u32(&self, offset: usize) -> GspResult<u32> {
        let mut buf = [0u8; 4];
        self.read_into(offset, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) -> GspResult<()> {
        self.write_from(offset, &value.to_le_bytes())
    }
}
