//! GX command slot decoding and execution.
//!
//! A slot is 32 bytes: word 0 carries the command id in bits `[0, 8)`, words 1..8 hold the
//! command-specific payload as little-endian `u32`s.
//!
//! [`decode`] and [`GxCommand::register_writes`] are pure; [`execute`] is the only function that
//! touches GPU registers, guest memory or the debug observer.

use memory::GuestMemory;
use tracing::{error, trace, warn};

use crate::error::GspResult;
use crate::observer::GpuDebugObserver;
use crate::regs::{command_processor, display_transfer, memory_fill, GpuRegisterBus, RegisterWrite};

pub const GX_COMMAND_SIZE_BYTES: usize = 0x20;

const GX_COMMAND_WORDS: usize = GX_COMMAND_SIZE_BYTES / 4;
const GX_COMMAND_ID_MASK: u32 = 0xFF;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GxCommandId {
    RequestDma = 0x00,
    SetCommandListLast = 0x01,
    SetMemoryFill = 0x02,
    SetDisplayTransfer = 0x03,
    SetTextureCopy = 0x04,
    SetCommandListFirst = 0x05,
}

impl GxCommandId {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0x00 => Some(Self::RequestDma),
            0x01 => Some(Self::SetCommandListLast),
            0x02 => Some(Self::SetMemoryFill),
            0x03 => Some(Self::SetDisplayTransfer),
            0x04 => Some(Self::SetTextureCopy),
            0x05 => Some(Self::SetCommandListFirst),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DmaRequest {
    pub source_address: u32,
    pub dest_address: u32,
    pub size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandList {
    pub address: u32,
    pub size: u32,
}

/// Two independent fill descriptors; the hardware runs them in parallel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryFill {
    pub start1: u32,
    pub value1: u32,
    pub end1: u32,
    pub start2: u32,
    pub value2: u32,
    pub end2: u32,
}

/// Payload shared by display transfers and texture copies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageCopy {
    pub in_address: u32,
    pub out_address: u32,
    pub in_size: u32,
    pub out_size: u32,
    pub flags: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GxCommand {
    RequestDma(DmaRequest),
    /// Carries the whole command list; the matching `SetCommandListFirst` is a no-op.
    SetCommandListLast(CommandList),
    SetMemoryFill(MemoryFill),
    SetDisplayTransfer(ImageCopy),
    SetTextureCopy(ImageCopy),
    SetCommandListFirst,
    /// Unrecognised command id (bits `[0, 8)` of word 0).
    Unknown(u32),
}

fn slot_words(slot: &[u8; GX_COMMAND_SIZE_BYTES]) -> [u32; GX_COMMAND_WORDS] {
    core::array::from_fn(|i| {
        let o = i * 4;
        u32::from_le_bytes([slot[o], slot[o + 1], slot[o + 2], slot[o + 3]])
    })
}

/// Decodes one command slot.
pub fn decode(slot: &[u8; GX_COMMAND_SIZE_BYTES]) -> GxCommand {
    let w = slot_words(slot);
    let raw_id = w[0] & GX_COMMAND_ID_MASK;

    let image_copy = || ImageCopy {
        in_address: w[1],
        out_address: w[2],
        in_size: w[3],
        out_size: w[4],
        flags: w[5],
    };

    match GxCommandId::from_u32(raw_id) {
        Some(GxCommandId::RequestDma) => GxCommand::RequestDma(DmaRequest {
            source_address: w[1],
            dest_address: w[2],
            size: w[3],
        }),
        Some(GxCommandId::SetCommandListLast) => GxCommand::SetCommandListLast(CommandList {
            address: w[1],
            size: w[2],
        }),
        Some(GxCommandId::SetMemoryFill) => GxCommand::SetMemoryFill(MemoryFill {
            start1: w[1],
            value1: w[2],
            end1: w[3],
            start2: w[4],
            value2: w[5],
            end2: w[6],
        }),
        Some(GxCommandId::SetDisplayTransfer) => GxCommand::SetDisplayTransfer(image_copy()),
        Some(GxCommandId::SetTextureCopy) => GxCommand::SetTextureCopy(image_copy()),
        Some(GxCommandId::SetCommandListFirst) => GxCommand::SetCommandListFirst,
        None => GxCommand::Unknown(raw_id),
    }
}

impl GxCommand {
    /// Raw command id (bits `[0, 8)` of word 0).
    pub fn raw_id(&self) -> u32 {
        match self {
            GxCommand::RequestDma(_) => GxCommandId::RequestDma as u32,
            GxCommand::SetCommandListLast(_) => GxCommandId::SetCommandListLast as u32,
            GxCommand::SetMemoryFill(_) => GxCommandId::SetMemoryFill as u32,
            GxCommand::SetDisplayTransfer(_) => GxCommandId::SetDisplayTransfer as u32,
            GxCommand::SetTextureCopy(_) => GxCommandId::SetTextureCopy as u32,
            GxCommand::SetCommandListFirst => GxCommandId::SetCommandListFirst as u32,
            GxCommand::Unknown(id) => *id,
        }
    }

    pub fn id(&self) -> Option<GxCommandId> {
        GxCommandId::from_u32(self.raw_id())
    }

    /// Encodes the command the way a guest client lays it out in its command buffer.
    pub fn encode(&self) -> [u8; GX_COMMAND_SIZE_BYTES] {
        let mut w = [0u32; GX_COMMAND_WORDS];
        w[0] = self.raw_id() & GX_COMMAND_ID_MASK;
        match *self {
            GxCommand::RequestDma(p) => {
                w[1] = p.source_address;
                w[2] = p.dest_address;
                w[3] = p.size;
            }
            GxCommand::SetCommandListLast(p) => {
                w[1] = p.address;
                w[2] = p.size;
            }
            GxCommand::SetMemoryFill(p) => {
                w[1..7].copy_from_slice(&[
                    p.start1, p.value1, p.end1, p.start2, p.value2, p.end2,
                ]);
            }
            GxCommand::SetDisplayTransfer(p) | GxCommand::SetTextureCopy(p) => {
                w[1..6].copy_from_slice(&[
                    p.in_address,
                    p.out_address,
                    p.in_size,
                    p.out_size,
                    p.flags,
                ]);
            }
            GxCommand::SetCommandListFirst | GxCommand::Unknown(_) => {}
        }

        let mut out = [0u8; GX_COMMAND_SIZE_BYTES];
        for (chunk, word) in out.chunks_exact_mut(4).zip(w) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Logical register writes this command performs, in issue order.
    ///
    /// Addresses are programmed in 8-byte units. `RequestDma`, `SetCommandListFirst` and unknown
    /// commands write no registers.
    pub fn register_writes(&self) -> Vec<RegisterWrite> {
        match *self {
            GxCommand::SetCommandListLast(p) => vec![
                RegisterWrite::new(command_processor::ADDRESS, p.address >> 3),
                RegisterWrite::new(command_processor::SIZE, p.size >> 3),
                RegisterWrite::new(command_processor::TRIGGER, 1),
            ],
            GxCommand::SetMemoryFill(p) => {
                let blocks = [(p.start1, p.end1, p.value1), (p.start2, p.end2, p.value2)];
                let mut writes = Vec::with_capacity(8);
                for (i, (start, end, value)) in blocks.into_iter().enumerate() {
                    let base = memory_fill::BASE + i as u32 * memory_fill::BLOCK_STRIDE;
                    writes.extend([
                        RegisterWrite::new(base + memory_fill::START, start >> 3),
                        RegisterWrite::new(base + memory_fill::END, end >> 3),
                        RegisterWrite::new(base + memory_fill::SIZE, end.wrapping_sub(start)),
                        RegisterWrite::new(base + memory_fill::VALUE, value),
                    ]);
                }
                writes
            }
            // The input size register sits after the output size register but is programmed
            // first.
            GxCommand::SetDisplayTransfer(p) | GxCommand::SetTextureCopy(p) => vec![
                RegisterWrite::new(display_transfer::INPUT_ADDRESS, p.in_address >> 3),
                RegisterWrite::new(display_transfer::OUTPUT_ADDRESS, p.out_address >> 3),
                RegisterWrite::new(display_transfer::INPUT_SIZE, p.in_size),
                RegisterWrite::new(display_transfer::OUTPUT_SIZE, p.out_size),
                RegisterWrite::new(display_transfer::FLAGS, p.flags),
                RegisterWrite::new(display_transfer::TRIGGER, 1),
            ],
            GxCommand::RequestDma(_) | GxCommand::SetCommandListFirst | GxCommand::Unknown(_) => {
                Vec::new()
            }
        }
    }
}

/// Applies `cmd` to the GPU.
///
/// Register writes always complete. Guest memory failures (DMA, command list readback) are
/// returned after logging; they never leave registers half-programmed.
pub fn execute(
    cmd: &GxCommand,
    regs: &mut dyn GpuRegisterBus,
    mem: &mut dyn GuestMemory,
    observer: &mut dyn GpuDebugObserver,
) -> GspResult<()> {
    for write in cmd.register_writes() {
        trace!("GSP: GPU reg 0x{:03x} <- 0x{:08x}", write.id, write.value);
        regs.write_reg(write.id, write.value);
    }

    match *cmd {
        GxCommand::RequestDma(p) => {
            mem.copy(p.source_address, p.dest_address, p.size as usize)
                .map_err(|err| {
                    warn!(
                        "GSP: DMA 0x{:08x} -> 0x{:08x} (size=0x{:x}) failed: {err}",
                        p.source_address, p.dest_address, p.size
                    );
                    err
                })?;
        }
        GxCommand::SetCommandListLast(p) => {
            let list = mem.read_vec(p.address, p.size as usize).map_err(|err| {
                warn!(
                    "GSP: command list at 0x{:08x} (size=0x{:x}) is not readable: {err}",
                    p.address, p.size
                );
                err
            })?;
            observer.command_list_called(p.address, &list, p.size);
        }
        GxCommand::Unknown(id) => {
            error!("GSP: unknown command 0x{id:08X}");
        }
        GxCommand::SetMemoryFill(_)
        | GxCommand::SetDisplayTransfer(_)
        | GxCommand::SetTextureCopy(_)
        | GxCommand::SetCommandListFirst => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GspError;
    use crate::observer::NullDebugObserver;
    use crate::regs::GpuRegisterFile;
    use memory::{GuestMemoryError, MappedGuestMemory};
    use pretty_assertions::assert_eq;

    fn slot(words: &[u32]) -> [u8; GX_COMMAND_SIZE_BYTES] {
        let mut out = [0u8; GX_COMMAND_SIZE_BYTES];
        for (i, w) in words.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        out
    }

    fn values(writes: &[RegisterWrite]) -> Vec<u32> {
        writes.iter().map(|w| w.value).collect()
    }

    #[test]
    fn decode_reads_payload_in_slot_order() {
        assert_eq!(
            decode(&slot(&[0x02, 0x1000, 0xAA, 0x2000, 0x3000, 0xBB, 0x3500])),
            GxCommand::SetMemoryFill(MemoryFill {
                start1: 0x1000,
                value1: 0xAA,
                end1: 0x2000,
                start2: 0x3000,
                value2: 0xBB,
                end2: 0x3500,
            })
        );
        assert_eq!(
            decode(&slot(&[0x00, 0x1400_0000, 0x1F00_0000, 0x80])),
            GxCommand::RequestDma(DmaRequest {
                source_address: 0x1400_0000,
                dest_address: 0x1F00_0000,
                size: 0x80,
            })
        );
        assert_eq!(decode(&slot(&[0x05, 1, 2, 3])), GxCommand::SetCommandListFirst);
    }

    #[test]
    fn decode_only_looks_at_the_low_byte_of_the_id() {
        // Bits above the id byte are flags on hardware.
        assert_eq!(
            decode(&slot(&[0x0100_0001, 0x1800_0000, 0x800])),
            GxCommand::SetCommandListLast(CommandList {
                address: 0x1800_0000,
                size: 0x800,
            })
        );
        assert_eq!(decode(&slot(&[0xFFFF_FF7F])), GxCommand::Unknown(0x7F));
    }

    #[test]
    fn texture_copy_and_display_transfer_share_payload_layout() {
        let words = [0, 0x1800_0000, 0x1F00_0000, 0x0190_00F0, 0x0140_00F0, 0x1001];
        let mut dt = words;
        dt[0] = 0x03;
        let mut tc = words;
        tc[0] = 0x04;

        let GxCommand::SetDisplayTransfer(a) = decode(&slot(&dt)) else {
            panic!("expected display transfer");
        };
        let GxCommand::SetTextureCopy(b) = decode(&slot(&tc)) else {
            panic!("expected texture copy");
        };
        assert_eq!(a, b);
        assert_eq!(
            GxCommand::SetDisplayTransfer(a).register_writes(),
            GxCommand::SetTextureCopy(b).register_writes()
        );
    }

    #[test]
    fn encode_matches_decode_layout() {
        let cmd = GxCommand::SetDisplayTransfer(ImageCopy {
            in_address: 1,
            out_address: 2,
            in_size: 3,
            out_size: 4,
            flags: 5,
        });
        assert_eq!(cmd.encode(), slot(&[3, 1, 2, 3, 4, 5]));
        assert_eq!(GxCommand::Unknown(0x1234).encode(), slot(&[0x34]));
    }

    #[test]
    fn memory_fill_register_sequence() {
        let cmd = GxCommand::SetMemoryFill(MemoryFill {
            start1: 0x1000,
            value1: 0xAA,
            end1: 0x2000,
            start2: 0x3000,
            value2: 0xBB,
            end2: 0x3500,
        });
        let writes = cmd.register_writes();
        assert_eq!(
            values(&writes),
            vec![0x200, 0x400, 0x1000, 0xAA, 0x600, 0x6A0, 0x500, 0xBB]
        );
        let ids: Vec<u32> = writes.iter().map(|w| w.id).collect();
        assert_eq!(ids, (memory_fill::BASE..memory_fill::BASE + 8).collect::<Vec<_>>());
    }

    #[test]
    fn memory_fill_length_wraps_instead_of_panicking() {
        let cmd = GxCommand::SetMemoryFill(MemoryFill {
            start1: 0x2000,
            value1: 0,
            end1: 0x1000,
            start2: 0,
            value2: 0,
            end2: 0,
        });
        assert_eq!(cmd.register_writes()[2].value, 0xFFFF_F000);
    }

    #[test]
    fn command_list_register_sequence() {
        let cmd = GxCommand::SetCommandListLast(CommandList {
            address: 0x1800_0000,
            size: 0x800,
        });
        assert_eq!(
            cmd.register_writes(),
            vec![
                RegisterWrite::new(command_processor::ADDRESS, 0x0300_0000),
                RegisterWrite::new(command_processor::SIZE, 0x100),
                RegisterWrite::new(command_processor::TRIGGER, 1),
            ]
        );
    }

    #[test]
    fn display_transfer_programs_input_size_before_output_size() {
        let cmd = GxCommand::SetDisplayTransfer(ImageCopy {
            in_address: 0x1800_0008,
            out_address: 0x1F00_0010,
            in_size: 0x0190_00F0,
            out_size: 0x0140_00F0,
            flags: 0x1001,
        });
        assert_eq!(
            cmd.register_writes(),
            vec![
                RegisterWrite::new(display_transfer::BASE, 0x0300_0001),
                RegisterWrite::new(display_transfer::BASE + 1, 0x03E0_0002),
                RegisterWrite::new(display_transfer::BASE + 3, 0x0190_00F0),
                RegisterWrite::new(display_transfer::BASE + 2, 0x0140_00F0),
                RegisterWrite::new(display_transfer::BASE + 4, 0x1001),
                RegisterWrite::new(display_transfer::BASE + 6, 1),
            ]
        );
    }

    #[test]
    fn commands_without_register_effects() {
        assert!(GxCommand::SetCommandListFirst.register_writes().is_empty());
        assert!(GxCommand::Unknown(0x42).register_writes().is_empty());
        assert!(GxCommand::RequestDma(DmaRequest {
            source_address: 0,
            dest_address: 0,
            size: 0,
        })
        .register_writes()
        .is_empty());
    }

    #[test]
    fn execute_dma_copies_guest_memory() {
        let mut mem = MappedGuestMemory::new();
        mem.map(0x1400_0000, 0x100).unwrap();
        mem.map(0x1F00_0000, 0x100).unwrap();
        mem.write_from(0x1400_0000, &[1, 2, 3, 4, 5]).unwrap();

        let mut regs = GpuRegisterFile::new();
        let cmd = GxCommand::RequestDma(DmaRequest {
            source_address: 0x1400_0000,
            dest_address: 0x1F00_0010,
            size: 5,
        });
        execute(&cmd, &mut regs, &mut mem, &mut NullDebugObserver).unwrap();

        assert_eq!(mem.read_vec(0x1F00_0010, 5).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn execute_dma_from_unmapped_memory_is_reported() {
        let mut mem = MappedGuestMemory::new();
        mem.map(0x1F00_0000, 0x100).unwrap();
        let mut regs = GpuRegisterFile::new();
        let cmd = GxCommand::RequestDma(DmaRequest {
            source_address: 0x1400_0000,
            dest_address: 0x1F00_0000,
            size: 4,
        });

        let err = execute(&cmd, &mut regs, &mut mem, &mut NullDebugObserver).unwrap_err();
        assert_eq!(
            err,
            GspError::from(GuestMemoryError::Unmapped {
                vaddr: 0x1400_0000,
                len: 4
            })
        );
        assert_eq!(mem.read_u32_le(0x1F00_0000).unwrap(), 0);
    }

    #[test]
    fn execute_programs_registers_even_when_command_list_is_unreadable() {
        let mut mem = MappedGuestMemory::new();
        let mut regs = GpuRegisterFile::new();
        let cmd = GxCommand::SetCommandListLast(CommandList {
            address: 0x1800_0000,
            size: 0x800,
        });

        assert!(execute(&cmd, &mut regs, &mut mem, &mut NullDebugObserver).is_err());
        assert_eq!(regs.reg(command_processor::ADDRESS), 0x0300_0000);
        assert_eq!(regs.reg(command_processor::SIZE), 0x100);
        assert_eq!(regs.reg(command_processor::TRIGGER), 1);
    }
}
