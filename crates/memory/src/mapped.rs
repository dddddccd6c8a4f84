use crate::phys::{GuestMemory, GuestMemoryError, GuestMemoryResult};
use core::fmt;

/// A block of guest virtual address space `[base, base + data.len())` backed by host memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestMemoryRegion {
    pub base: u32,
    data: Vec<u8>,
}

impl GuestMemoryRegion {
    #[inline]
    fn end(&self) -> u64 {
        u64::from(self.base) + self.data.len() as u64
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

/// Errors mapping a region into a [`MappedGuestMemory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedGuestMemoryError {
    /// A region has zero length.
    EmptyRegion { base: u32 },
    /// `base + size` does not fit in the 32-bit guest address space.
    AddressOverflow { base: u32, size: usize },
    /// The new region overlaps an existing one.
    Overlap {
        base: u32,
        size: usize,
        existing_base: u32,
    },
}

impl fmt::Display for MappedGuestMemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappedGuestMemoryError::EmptyRegion { base } => {
                write!(f, "guest memory region at 0x{base:08x} is empty")
            }
            MappedGuestMemoryError::AddressOverflow { base, size } => write!(
                f,
                "guest memory region at 0x{base:08x} (size=0x{size:x}) overflows the address space"
            ),
            MappedGuestMemoryError::Overlap {
                base,
                size,
                existing_base,
            } => write!(
                f,
                "guest memory region at 0x{base:08x} (size=0x{size:x}) overlaps region at 0x{existing_base:08x}"
            ),
        }
    }
}

impl std::error::Error for MappedGuestMemoryError {}

/// Sparse guest virtual memory assembled from disjoint, individually allocated regions.
///
/// An access is only serviced when a single region covers it entirely; anything touching a hole
/// fails with [`GuestMemoryError::Unmapped`]. This mirrors how a service would translate a guest
/// pointer into one host allocation.
#[derive(Debug, Clone, Default)]
pub struct MappedGuestMemory {
    regions: Vec<GuestMemoryRegion>,
}

impl MappedGuestMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `size` zeroed bytes at `base`.
    pub fn map(&mut self, base: u32, size: usize) -> Result<(), MappedGuestMemoryError> {
        if size == 0 {
            return Err(MappedGuestMemoryError::EmptyRegion { base });
        }
        let end = u64::from(base) + size as u64;
        if end > 1u64 << 32 {
            return Err(MappedGuestMemoryError::AddressOverflow { base, size });
        }

        let idx = self.regions.partition_point(|r| r.end() <= u64::from(base));
        if let Some(next) = self.regions.get(idx) {
            if u64::from(next.base) < end {
                return Err(MappedGuestMemoryError::Overlap {
                    base,
                    size,
                    existing_base: next.base,
                });
            }
        }

        self.regions.insert(
            idx,
            GuestMemoryRegion {
                base,
                data: vec![0u8; size],
            },
        );
        Ok(())
    }

    pub fn regions(&self) -> &[GuestMemoryRegion] {
        &self.regions
    }

    /// Returns `(region index, offset into region)` when one region covers `[vaddr, vaddr + len)`.
    fn translate(&self, vaddr: u32, len: usize) -> GuestMemoryResult<(usize, usize)> {
        let unmapped = GuestMemoryError::Unmapped { vaddr, len };
        let end = u64::from(vaddr).saturating_add(len as u64);

        // Regions are sorted and disjoint, so `end()` is strictly increasing.
        let idx = self.regions.partition_point(|r| r.end() <= u64::from(vaddr));
        let region = self.regions.get(idx).ok_or(unmapped.clone())?;
        if vaddr < region.base || end > region.end() {
            return Err(unmapped);
        }
        Ok((idx, (vaddr - region.base) as usize))
    }
}

impl GuestMemory for MappedGuestMemory {
    fn check_access(&self, vaddr: u32, len: usize) -> GuestMemoryResult<()> {
        self.translate(vaddr, len).map(|_| ())
    }

    fn read_into(&self, vaddr: u32, dst: &mut [u8]) -> GuestMemoryResult<()> {
        let (idx, off) = self.translate(vaddr, dst.len())?;
        dst.copy_from_slice(&self.regions[idx].data[off..off + dst.len()]);
        Ok(())
    }

    fn write_from(&mut self, vaddr: u32, src: &[u8]) -> GuestMemoryResult<()> {
        let (idx, off) = self.translate(vaddr, src.len())?;
        self.regions[idx].data[off..off + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn read_vec(&self, vaddr: u32, len: usize) -> GuestMemoryResult<Vec<u8>> {
        let (idx, off) = self.translate(vaddr, len)?;
        Ok(self.regions[idx].data[off..off + len].to_vec())
    }

    fn copy(&mut self, src: u32, dst: u32, len: usize) -> GuestMemoryResult<()> {
        let (src_idx, src_off) = self.translate(src, len)?;
        let (dst_idx, dst_off) = self.translate(dst, len)?;
        if src_idx == dst_idx {
            self.regions[src_idx]
                .data
                .copy_within(src_off..src_off + len, dst_off);
        } else {
            let buf = self.regions[src_idx].data[src_off..src_off + len].to_vec();
            self.regions[dst_idx].data[dst_off..dst_off + len].copy_from_slice(&buf);
        }
        Ok(())
    }
}
