//! GPU register ids and the register bus boundary.
//!
//! The GPU exposes two distinct views:
//! - *logical registers*, addressed by a small integer id (`0x1EF00000 + 4 * id` on hardware),
//!   which the GX command handlers program directly, and
//! - a byte-addressed *hardware register window* starting at `0x1EB00000`, which the raw
//!   `WriteHWRegs` / `ReadHWRegs` service calls proxy into (see [`crate::proxy`]).

use std::collections::BTreeMap;

use tracing::warn;

/// Guest virtual address of logical register id 0.
pub const GPU_REGS_VADDR_BASE: u32 = 0x1EF0_0000;

/// Guest virtual address the raw register window offsets are relative to.
pub const HW_REGS_VADDR_BASE: u32 = 0x1EB0_0000;

/// Exclusive upper bound on `offset + size` for proxied register window accesses.
pub const HW_REGS_WINDOW_SIZE: u32 = 0x0042_0000;

/// Number of logical register ids.
pub const GPU_REG_COUNT: u32 = 0x1000;

/// Memory fill engine: two back-to-back 4-register descriptors.
pub mod memory_fill {
    pub const BASE: u32 = 0x004;

    /// Registers per fill descriptor.
    pub const BLOCK_STRIDE: u32 = 4;

    pub const START: u32 = 0;
    pub const END: u32 = 1;
    pub const SIZE: u32 = 2;
    pub const VALUE: u32 = 3;
}

/// Display transfer / texture copy engine.
pub mod display_transfer {
    pub const BASE: u32 = 0x300;

    pub const INPUT_ADDRESS: u32 = BASE;
    pub const OUTPUT_ADDRESS: u32 = BASE + 1;
    pub const OUTPUT_SIZE: u32 = BASE + 2;
    pub const INPUT_SIZE: u32 = BASE + 3;
    pub const FLAGS: u32 = BASE + 4;
    pub const TRIGGER: u32 = BASE + 6;
}

/// Command list processor.
pub mod command_processor {
    pub const BASE: u32 = 0x638;

    /// Command list size, in 8-byte units.
    pub const SIZE: u32 = BASE;
    /// Command list physical address, in 8-byte units.
    pub const ADDRESS: u32 = BASE + 2;
    pub const TRIGGER: u32 = BASE + 4;
}

/// One logical register write, as produced by [`crate::command::GxCommand::register_writes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterWrite {
    pub id: u32,
    pub value: u32,
}

impl RegisterWrite {
    pub const fn new(id: u32, value: u32) -> Self {
        Self { id, value }
    }
}

/// Boundary between the GSP service and the GPU register engine.
///
/// Accesses are synchronous and infallible once the caller has validated them; implementations
/// decide what out-of-range ids do.
pub trait GpuRegisterBus {
    fn read_reg(&mut self, id: u32) -> u32;
    fn write_reg(&mut self, id: u32, value: u32);

    /// Reads one word of the hardware register window at absolute address `vaddr`.
    fn read_hw(&mut self, vaddr: u32) -> u32;
    /// Writes one word of the hardware register window at absolute address `vaddr`.
    fn write_hw(&mut self, vaddr: u32, value: u32);
}

/// In-memory GPU register state.
///
/// Logical registers and the hardware register window have separate backing storage. Window words
/// that were never written read back as zero.
#[derive(Clone, Debug)]
pub struct GpuRegisterFile {
    regs: Vec<u32>,
    hw: BTreeMap<u32, u32>,
}

impl Default for GpuRegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuRegisterFile {
    pub fn new() -> Self {
        Self {
            regs: vec![0; GPU_REG_COUNT as usize],
            hw: BTreeMap::new(),
        }
    }

    /// Current value of logical register `id` (0 for unknown ids).
    pub fn reg(&self, id: u32) -> u32 {
        self.regs.get(id as usize).copied().unwrap_or(0)
    }

    /// Current value of the hardware window word at absolute address `vaddr`.
    pub fn hw(&self, vaddr: u32) -> u32 {
        self.hw.get(&vaddr).copied().unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.regs.fill(0);
        self.hw.clear();
    }
}

impl GpuRegisterBus for GpuRegisterFile {
    fn read_reg(&mut self, id: u32) -> u32 {
        match self.regs.get(id as usize) {
            Some(value) => *value,
            None => {
                warn!("unknown GPU register read: id=0x{id:x}");
                0
            }
        }
    }

    fn write_reg(&mut self, id: u32, value: u32) {
        match self.regs.get_mut(id as usize) {
            Some(slot) => *slot = value,
            None => warn!("unknown GPU register write: id=0x{id:x} value=0x{value:08x}"),
        }
    }

    fn read_hw(&mut self, vaddr: u32) -> u32 {
        self.hw(vaddr)
    }

    fn write_hw(&mut self, vaddr: u32, value: u32) {
        self.hw.insert(vaddr, value);
    }
}
