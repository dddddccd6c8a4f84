//! Raw GPU register window proxy (`WriteHWRegs` / `ReadHWRegs`).
//!
//! A request names a byte offset into the hardware register window and a byte size. The whole
//! request is validated before the first register access, so a rejected request touches nothing.

use tracing::{error, trace};

use crate::error::{GspError, GspResult};
use crate::regs::{GpuRegisterBus, HW_REGS_VADDR_BASE, HW_REGS_WINDOW_SIZE};

/// Validates a window request and returns the number of words it covers.
pub fn validate_range(addr: u32, size: u32) -> GspResult<usize> {
    if u64::from(addr) + u64::from(size) >= u64::from(HW_REGS_WINDOW_SIZE) {
        return Err(GspError::RegisterRangeOutOfBounds { addr, size });
    }
    if size % 4 != 0 {
        return Err(GspError::UnalignedRegisterSize { size });
    }
    Ok((size / 4) as usize)
}

fn validate_request(addr: u32, size: u32, available: usize) -> GspResult<usize> {
    let words = validate_range(addr, size)?;
    if available < words {
        return Err(GspError::RegisterBufferTooSmall {
            required: words,
            available,
        });
    }
    Ok(words)
}

/// Writes `size / 4` words from `src` to the register window starting at offset `addr`.
pub fn write_registers(
    regs: &mut dyn GpuRegisterBus,
    addr: u32,
    size: u32,
    src: &[u32],
) -> GspResult<()> {
    let words = validate_request(addr, size, src.len()).map_err(|err| {
        error!("GSP: rejected register write: {err}");
        err
    })?;

    // `addr + size` is below the window size, so none of this can overflow.
    let base = HW_REGS_VADDR_BASE + addr;
    for (i, value) in src[..words].iter().enumerate() {
        let vaddr = base + 4 * i as u32;
        trace!("GSP: hw reg write 0x{vaddr:08x} <- 0x{value:08x}");
        regs.write_hw(vaddr, *value);
    }
    Ok(())
}

/// Reads `size / 4` words from the register window starting at offset `addr` into `dst`.
pub fn read_registers(
    regs: &mut dyn GpuRegisterBus,
    addr: u32,
    size: u32,
    dst: &mut [u32],
) -> GspResult<()> {
    let words = validate_request(addr, size, dst.len()).map_err(|err| {
        error!("GSP: rejected register read: {err}");
        err
    })?;

    let base = HW_REGS_VADDR_BASE + addr;
    for (i, slot) in dst[..words].iter_mut().enumerate() {
        *slot = regs.read_hw(base + 4 * i as u32);
    }
    Ok(())
}
