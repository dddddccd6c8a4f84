//! Guest memory as seen by HLE services.
//!
//! Services never hold raw host pointers into guest memory. Every access goes through
//! [`GuestMemory`], which translates a 32-bit guest virtual address and fails with
//! [`GuestMemoryError`] when the range is not backed.

pub mod mapped;
pub mod phys;

pub use mapped::{GuestMemoryRegion, MappedGuestMemory, MappedGuestMemoryError};
pub use phys::{DenseMemory, GuestMemory, GuestMemoryError, GuestMemoryResult};
