//! GSP (GPU service) GX command queue device model.
//!
//! Guest clients talk to the emulated GPU through a shared memory block: each client thread owns
//! a 0x200-byte command buffer at `0x800 + thread_id * 0x200` holding a bit-packed header followed
//! by 32-byte command slots. After writing a command the client triggers the queue, and
//! [`GspGpu::trigger_cmd_req_queue`] decodes exactly one slot into a fixed sequence of GPU register
//! writes (or a guest memory copy).
//!
//! The pieces, leaf first:
//! - [`regs`]: register ids, address windows, and the [`regs::GpuRegisterBus`] boundary to the GPU
//!   engine.
//! - [`proxy`]: validated raw register window reads/writes (`WriteHWRegs` / `ReadHWRegs`).
//! - [`command`]: pure slot decoding plus the single side-effecting `execute` step.
//! - [`queue`]: command buffer layout, header accessors, and per-trigger processing.
//! - [`sync`]: interrupt relay queue registration.
//! - [`observer`]: optional debugger hooks.
//!
//! Everything runs synchronously on the caller's thread; nothing here spawns work or blocks.
#![forbid(unsafe_code)]

pub mod command;
pub mod error;
pub mod gsp;
pub mod observer;
pub mod proxy;
pub mod queue;
pub mod regs;
pub mod shared_memory;
pub mod sync;

pub use command::{GxCommand, GxCommandId, GX_COMMAND_SIZE_BYTES};
pub use error::{GspError, GspResult};
pub use gsp::{GspConfig, GspGpu};
pub use memory::{GuestMemory, GuestMemoryError};
pub use observer::{GpuDebugObserver, GxCommandHistory, NullDebugObserver};
pub use queue::{CommandBufferHeader, GxCommandQueue};
pub use regs::{GpuRegisterBus, GpuRegisterFile, RegisterWrite};
pub use shared_memory::SharedMemory;
pub use sync::{EventSignaler, Handle, RegisteredClient, SyncChannel, GX_CLIENT_THREAD_ID};
