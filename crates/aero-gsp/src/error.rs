use memory::GuestMemoryError;
use thiserror::Error;

/// Errors surfaced by the GSP device model.
///
/// None of these are fatal: the failing operation is abandoned before it has any side effect and
/// the device stays usable. The one unrecoverable condition (a null interrupt event handle) panics
/// instead, see [`crate::sync::SyncChannel::register_client`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GspError {
    #[error("register range out of bounds: address=0x{addr:08x} size=0x{size:08x}")]
    RegisterRangeOutOfBounds { addr: u32, size: u32 },

    #[error("register access size 0x{size:08x} is not word aligned")]
    UnalignedRegisterSize { size: u32 },

    #[error("register buffer holds {available} words but the access needs {required}")]
    RegisterBufferTooSmall { required: usize, available: usize },

    #[error("shared memory access out of bounds: offset=0x{offset:x} len={len} size=0x{size:x}")]
    SharedMemoryOutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("GX thread id {thread_id} out of range (threads={num_threads})")]
    InvalidThreadId { thread_id: u32, num_threads: u32 },

    #[error("GX command buffer for thread {thread_id} already holds the maximum pending commands")]
    CommandQueueFull { thread_id: u32 },

    #[error(transparent)]
    GuestMemory(#[from] GuestMemoryError),
}

pub type GspResult<T> = Result<T, GspError>;
