//! GX command buffers in GSP shared memory.
//!
//! Layout per client thread `t`:
//!
//! ```text
//! 0x800 + t * 0x200 + 0x00   header (u32): index [0, 8), number_commands [8, 16)
//! 0x800 + t * 0x200 + 0x20   slot 0 (0x20 bytes)
//! 0x800 + t * 0x200 + 0x40   slot 1
//! ...
//! ```
//!
//! The client writes a command into the slot selected by `index`, bumps `number_commands`, and
//! triggers the queue. Each trigger processes exactly one slot and decrements `number_commands`;
//! `index` is left alone, so advancing it is up to the client.

use memory::GuestMemory;
use tracing::{debug, info, warn};

use crate::command::{self, GxCommand, GX_COMMAND_SIZE_BYTES};
use crate::error::{GspError, GspResult};
use crate::observer::GpuDebugObserver;
use crate::regs::GpuRegisterBus;
use crate::shared_memory::SharedMemory;
use crate::sync::Handle;

/// Offset of thread 0's command buffer inside shared memory.
pub const GX_CMD_BUFFER_OFFSET: usize = 0x800;
/// Size of each thread's command buffer.
pub const GX_CMD_BUFFER_STRIDE: usize = 0x200;
/// Offset of slot 0 from the start of a command buffer.
pub const GX_CMD_SLOTS_OFFSET: usize = 0x20;
/// Largest `number_commands` a client may have outstanding.
pub const GX_MAX_PENDING_COMMANDS: u32 = 15;

const SHARED_MEMORY_PAGE_SIZE: usize = 0x1000;

/// Shared memory block size needed for `num_threads` command buffers, rounded up to a page.
pub fn shared_memory_size(num_threads: u32) -> usize {
    let end = GX_CMD_BUFFER_OFFSET + num_threads as usize * GX_CMD_BUFFER_STRIDE;
    end.div_ceil(SHARED_MEMORY_PAGE_SIZE) * SHARED_MEMORY_PAGE_SIZE
}

/// Byte offset of `thread_id`'s command buffer header.
pub fn cmd_buffer_offset(thread_id: u32) -> usize {
    GX_CMD_BUFFER_OFFSET + thread_id as usize * GX_CMD_BUFFER_STRIDE
}

/// Byte offset of slot `index` in `thread_id`'s command buffer.
///
/// Indices are 8 bits wide, so slots past 14 run into the next thread's buffer; the shared memory
/// bounds check is what keeps them inside the block.
pub fn cmd_slot_offset(thread_id: u32, index: u32) -> usize {
    cmd_buffer_offset(thread_id) + GX_CMD_SLOTS_OFFSET + index as usize * GX_COMMAND_SIZE_BYTES
}

/// GX command buffer header word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandBufferHeader(u32);

impl CommandBufferHeader {
    const INDEX_SHIFT: u32 = 0;
    const NUMBER_COMMANDS_SHIFT: u32 = 8;
    const FIELD_MASK: u32 = 0xFF;

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Slot currently selected by the client.
    pub const fn index(self) -> u32 {
        (self.0 >> Self::INDEX_SHIFT) & Self::FIELD_MASK
    }

    /// Commands written but not yet processed.
    pub const fn number_commands(self) -> u32 {
        (self.0 >> Self::NUMBER_COMMANDS_SHIFT) & Self::FIELD_MASK
    }

    pub const fn with_index(self, index: u32) -> Self {
        let mask = Self::FIELD_MASK << Self::INDEX_SHIFT;
        Self((self.0 & !mask) | ((index & Self::FIELD_MASK) << Self::INDEX_SHIFT))
    }

    pub const fn with_number_commands(self, n: u32) -> Self {
        let mask = Self::FIELD_MASK << Self::NUMBER_COMMANDS_SHIFT;
        Self((self.0 & !mask) | ((n & Self::FIELD_MASK) << Self::NUMBER_COMMANDS_SHIFT))
    }

    pub const fn is_pending(self) -> bool {
        self.number_commands() != 0
    }
}

/// Consumer side of the per-thread GX command buffers.
#[derive(Clone, Debug)]
pub struct GxCommandQueue {
    shared_memory: SharedMemory,
    num_threads: u32,
    verbose: bool,
}

impl GxCommandQueue {
    pub fn new(shared_memory: Handle, num_threads: u32, verbose: bool) -> Self {
        Self {
            shared_memory: SharedMemory::new(shared_memory, shared_memory_size(num_threads)),
            num_threads,
            verbose,
        }
    }

    pub fn num_threads(&self) -> u32 {
        self.num_threads
    }

    pub fn shared_memory(&self) -> &SharedMemory {
        &self.shared_memory
    }

    /// Client-side access to the shared block.
    pub fn shared_memory_mut(&mut self) -> &mut SharedMemory {
        &mut self.shared_memory
    }

    fn check_thread(&self, thread_id: u32) -> GspResult<()> {
        if thread_id >= self.num_threads {
            return Err(GspError::InvalidThreadId {
                thread_id,
                num_threads: self.num_threads,
            });
        }
        Ok(())
    }

    pub fn header(&self, thread_id: u32) -> GspResult<CommandBufferHeader> {
        self.check_thread(thread_id)?;
        let raw = self.shared_memory.read_u32(cmd_buffer_offset(thread_id))?;
        Ok(CommandBufferHeader::from_raw(raw))
    }

    pub fn set_header(&mut self, thread_id: u32, header: CommandBufferHeader) -> GspResult<()> {
        self.check_thread(thread_id)?;
        self.shared_memory
            .write_u32(cmd_buffer_offset(thread_id), header.raw())
    }

    pub fn read_slot(&self, thread_id: u32, index: u32) -> GspResult<[u8; GX_COMMAND_SIZE_BYTES]> {
        self.check_thread(thread_id)?;
        let mut slot = [0u8; GX_COMMAND_SIZE_BYTES];
        self.shared_memory
            .read_into(cmd_slot_offset(thread_id, index), &mut slot)?;
        Ok(slot)
    }

    pub fn write_slot(
        &mut self,
        thread_id: u32,
        index: u32,
        slot: &[u8; GX_COMMAND_SIZE_BYTES],
    ) -> GspResult<()> {
        self.check_thread(thread_id)?;
        self.shared_memory
            .write_from(cmd_slot_offset(thread_id, index), slot)
    }

    /// Client helper: writes `cmd` into the slot after the pending ones and bumps the count.
    ///
    /// Returns the slot index used.
    pub fn enqueue(&mut self, thread_id: u32, cmd: &GxCommand) -> GspResult<u32> {
        let header = self.header(thread_id)?;
        if header.number_commands() >= GX_MAX_PENDING_COMMANDS {
            return Err(GspError::CommandQueueFull { thread_id });
        }
        let index = (header.index() + header.number_commands()) & CommandBufferHeader::FIELD_MASK;
        self.write_slot(thread_id, index, &cmd.encode())?;
        self.set_header(
            thread_id,
            header.with_number_commands(header.number_commands() + 1),
        )?;
        Ok(index)
    }

    /// Processes the command in the slot selected by `thread_id`'s header.
    ///
    /// Exactly one command runs per call, whatever `number_commands` says. Failures while executing
    /// the command (unknown ids, unreadable guest memory) are logged and the command still
    /// finishes; only an invalid thread id or an out-of-bounds slot aborts before anything runs.
    pub fn process_next(
        &mut self,
        thread_id: u32,
        regs: &mut dyn GpuRegisterBus,
        mem: &mut dyn GuestMemory,
        observer: &mut dyn GpuDebugObserver,
    ) -> GspResult<GxCommand> {
        let header = self.header(thread_id)?;
        let slot = self.read_slot(thread_id, header.index())?;
        let cmd = command::decode(&slot);

        if self.verbose {
            info!(
                thread_id,
                index = header.index(),
                pending = header.number_commands(),
                ?cmd,
                "GSP: GX command"
            );
        } else {
            debug!(
                thread_id,
                index = header.index(),
                pending = header.number_commands(),
                ?cmd,
                "GSP: GX command"
            );
        }

        if let Err(err) = command::execute(&cmd, regs, mem, observer) {
            warn!(thread_id, ?cmd, "GSP: GX command failed: {err}");
        }

        self.finish_command(thread_id, &slot, observer)?;
        Ok(cmd)
    }

    fn finish_command(
        &mut self,
        thread_id: u32,
        slot: &[u8; GX_COMMAND_SIZE_BYTES],
        observer: &mut dyn GpuDebugObserver,
    ) -> GspResult<()> {
        observer.gx_command_processed(slot);

        let header = self.header(thread_id)?;
        let pending = match header.number_commands().checked_sub(1) {
            Some(pending) => pending,
            None => {
                warn!(thread_id, "GSP: GX command processed with no commands pending");
                0
            }
        };
        self.set_header(thread_id, header.with_number_commands(pending))
    }
}
