use core::fmt;

/// Errors returned by [`GuestMemory`] backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestMemoryError {
    /// The requested address range runs past the end of the backing storage.
    OutOfRange { vaddr: u32, len: usize, size: u64 },
    /// No mapping covers the requested address range.
    Unmapped { vaddr: u32, len: usize },
    /// The requested size cannot be represented by the current platform's `usize`.
    SizeTooLarge { size: u64 },
}

impl fmt::Display for GuestMemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestMemoryError::OutOfRange { vaddr, len, size } => write!(
                f,
                "guest memory access out of range: vaddr=0x{vaddr:08x} len={len} size=0x{size:x}"
            ),
            GuestMemoryError::Unmapped { vaddr, len } => write!(
                f,
                "guest memory access to unmapped range: vaddr=0x{vaddr:08x} len={len}"
            ),
            GuestMemoryError::SizeTooLarge { size } => {
                write!(f, "guest memory size {size} does not fit in usize")
            }
        }
    }
}

impl std::error::Error for GuestMemoryError {}

pub type GuestMemoryResult<T> = Result<T, GuestMemoryError>;

/// Guest *virtual* memory as reachable from an HLE service.
///
/// Reads are `&self`; implementations translate `vaddr` and either service the whole range or fail
/// without touching `dst`/the backing store.
///
/// `len` arguments usually come straight from guest commands, so the provided methods call
/// [`GuestMemory::check_access`] before allocating anything sized by them.
pub trait GuestMemory {
    /// Fails exactly when `read_into`/`write_from` of `len` bytes at `vaddr` would fail.
    fn check_access(&self, vaddr: u32, len: usize) -> GuestMemoryResult<()>;

    /// Reads bytes from guest memory into `dst`.
    fn read_into(&self, vaddr: u32, dst: &mut [u8]) -> GuestMemoryResult<()>;

    /// Writes bytes from `src` into guest memory.
    fn write_from(&mut self, vaddr: u32, src: &[u8]) -> GuestMemoryResult<()>;

    fn read_u32_le(&self, vaddr: u32) -> GuestMemoryResult<u32> {
        let mut buf = [0u8; 4];
        self.read_into(vaddr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_u32_le(&mut self, vaddr: u32, value: u32) -> GuestMemoryResult<()> {
        self.write_from(vaddr, &value.to_le_bytes())
    }

    /// Reads `len` bytes starting at `vaddr` into a freshly allocated buffer.
    fn read_vec(&self, vaddr: u32, len: usize) -> GuestMemoryResult<Vec<u8>> {
        self.check_access(vaddr, len)?;
        let mut buf = vec![0u8; len];
        self.read_into(vaddr, &mut buf)?;
        Ok(buf)
    }

    /// Raw byte copy between two guest ranges.
    ///
    /// The source is fully read before the destination is written, so overlapping ranges behave
    /// like `memmove`.
    fn copy(&mut self, src: u32, dst: u32, len: usize) -> GuestMemoryResult<()> {
        self.check_access(dst, len)?;
        let buf = self.read_vec(src, len)?;
        self.write_from(dst, &buf)
    }
}

pub(crate) fn check_range(size: u64, vaddr: u32, len: usize) -> GuestMemoryResult<(usize, usize)> {
    let end = u64::from(vaddr)
        .checked_add(len as u64)
        .ok_or(GuestMemoryError::OutOfRange { vaddr, len, size })?;
    if end > size {
        return Err(GuestMemoryError::OutOfRange { vaddr, len, size });
    }
    // `end <= size` and `size` came from a `usize` length.
    Ok((vaddr as usize, end as usize))
}

/// Dense (contiguous) guest memory starting at virtual address 0.
#[derive(Debug, Clone)]
pub struct DenseMemory {
    data: Box<[u8]>,
}

impl DenseMemory {
    pub fn new(size: u64) -> GuestMemoryResult<Self> {
        let size_usize =
            usize::try_from(size).map_err(|_| GuestMemoryError::SizeTooLarge { size })?;
        Ok(Self {
            data: vec![0u8; size_usize].into_boxed_slice(),
        })
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl GuestMemory for DenseMemory {
    fn check_access(&self, vaddr: u32, len: usize) -> GuestMemoryResult<()> {
        check_range(self.size(), vaddr, len).map(|_| ())
    }

    fn read_into(&self, vaddr: u32, dst: &mut [u8]) -> GuestMemoryResult<()> {
        let (start, end) = check_range(self.size(), vaddr, dst.len())?;
        dst.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_from(&mut self, vaddr: u32, src: &[u8]) -> GuestMemoryResult<()> {
        let (start, end) = check_range(self.size(), vaddr, src.len())?;
        self.data[start..end].copy_from_slice(src);
        Ok(())
    }

    fn read_vec(&self, vaddr: u32, len: usize) -> GuestMemoryResult<Vec<u8>> {
        let (start, end) = check_range(self.size(), vaddr, len)?;
        Ok(self.data[start..end].to_vec())
    }

    fn copy(&mut self, src: u32, dst: u32, len: usize) -> GuestMemoryResult<()> {
        let (src_start, src_end) = check_range(self.size(), src, len)?;
        let (dst_start, _) = check_range(self.size(), dst, len)?;
        self.data.copy_within(src_start..src_end, dst_start);
        Ok(())
    }
}
