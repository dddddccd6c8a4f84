//! Graphics debugger hooks.
//!
//! Observers are notification sinks only: nothing they do feeds back into command processing.
//! Borrowed buffers are only valid for the duration of the callback.

use std::collections::VecDeque;

use crate::command::{self, GxCommand, GX_COMMAND_SIZE_BYTES};

pub trait GpuDebugObserver {
    /// A `SetCommandListLast` command handed `command_list` (read from guest `address`) to the GPU.
    fn command_list_called(&mut self, _address: u32, _command_list: &[u8], _size: u32) {}

    /// A GX command slot finished processing. Called before the pending count is decremented.
    fn gx_command_processed(&mut self, _slot: &[u8; GX_COMMAND_SIZE_BYTES]) {}
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDebugObserver;

impl GpuDebugObserver for NullDebugObserver {}

impl<T: GpuDebugObserver + ?Sized> GpuDebugObserver for &mut T {
    fn command_list_called(&mut self, address: u32, command_list: &[u8], size: u32) {
        (**self).command_list_called(address, command_list, size);
    }

    fn gx_command_processed(&mut self, slot: &[u8; GX_COMMAND_SIZE_BYTES]) {
        (**self).gx_command_processed(slot);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandListRecord {
    pub address: u32,
    pub size: u32,
    pub data: Vec<u8>,
}

/// Keeps the most recent GX commands and command lists for inspection.
///
/// Both histories are bounded by `capacity`; the oldest entry is dropped first. A capacity of 0
/// keeps nothing but still counts.
#[derive(Clone, Debug)]
pub struct GxCommandHistory {
    capacity: usize,
    commands: VecDeque<GxCommand>,
    command_lists: VecDeque<CommandListRecord>,
    total_commands: u64,
}

impl Default for GxCommandHistory {
    fn default() -> Self {
        Self::new(64)
    }
}

impl GxCommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            commands: VecDeque::new(),
            command_lists: VecDeque::new(),
            total_commands: 0,
        }
    }

    pub fn commands(&self) -> &VecDeque<GxCommand> {
        &self.commands
    }

    pub fn command_lists(&self) -> &VecDeque<CommandListRecord> {
        &self.command_lists
    }

    /// Number of commands observed since creation or the last [`Self::clear`].
    pub fn total_commands(&self) -> u64 {
        self.total_commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.command_lists.clear();
        self.total_commands = 0;
    }

    fn push_bounded<T>(capacity: usize, queue: &mut VecDeque<T>, item: T) {
        if capacity == 0 {
            return;
        }
        while queue.len() >= capacity {
            queue.pop_front();
        }
        queue.push_back(item);
    }
}

impl GpuDebugObserver for GxCommandHistory {
    fn command_list_called(&mut self, address: u32, command_list: &[u8], size: u32) {
        let record = CommandListRecord {
            address,
            size,
            data: command_list.to_vec(),
        };
        Self::push_bounded(self.capacity, &mut self.command_lists, record);
    }

    fn gx_command_processed(&mut self, slot: &[u8; GX_COMMAND_SIZE_BYTES]) {
        self.total_commands = self.total_commands.saturating_add(1);
        Self::push_bounded(self.capacity, &mut self.commands, command::decode(slot));
    }
}
