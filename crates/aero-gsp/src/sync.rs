//! Interrupt relay queue registration (`RegisterInterruptRelayQueue`).

use tracing::debug;

/// Kernel object handle as seen by the guest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u32);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

/// Kernel-side event operations the GSP service needs.
pub trait EventSignaler {
    /// Signals `event` once, waking any waiter.
    fn signal(&mut self, event: Handle);

    /// Pins `event` in the signaled state; later waits pass through immediately.
    fn set_permanent_signal(&mut self, event: Handle);
}

/// Result of a successful registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisteredClient {
    /// Index of the client's command buffer in shared memory.
    pub thread_id: u32,
    /// Handle the client maps to reach the command buffers.
    pub shared_memory: Handle,
}

/// Command buffer served by `TriggerCmdReqQueue`. Every client shares it.
pub const GX_CLIENT_THREAD_ID: u32 = 0;

#[derive(Clone, Debug, Default)]
pub struct SyncChannel {
    event: Option<Handle>,
    flags: u32,
}

impl SyncChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread id whose command buffer the trigger processes.
    pub fn thread_id(&self) -> u32 {
        GX_CLIENT_THREAD_ID
    }

    pub fn event(&self) -> Option<Handle> {
        self.event
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Binds `event` as the GX completion event and hands the caller command buffer 0.
    ///
    /// The event is signaled and then pinned signaled for good. GX commands execute synchronously
    /// inside the trigger call, so by the time the client waits the work is already done. This
    /// only holds while command execution stays synchronous.
    ///
    /// A later registration rebinds the event; all clients keep submitting through buffer 0.
    ///
    /// # Panics
    ///
    /// Panics when `event` is the null handle: a client that registers without an event has
    /// broken the protocol and cannot be serviced.
    pub fn register_client(
        &mut self,
        flags: u32,
        event: Handle,
        shared_memory: Handle,
        events: &mut dyn EventSignaler,
    ) -> RegisteredClient {
        if event.is_null() {
            panic!("GSP: interrupt relay queue event handle is not valid");
        }

        events.signal(event);
        events.set_permanent_signal(event);

        self.event = Some(event);
        self.flags = flags;

        let thread_id = GX_CLIENT_THREAD_ID;
        debug!(thread_id, flags, event = event.0, "GSP: registered interrupt relay queue");
        RegisteredClient {
            thread_id,
            shared_memory,
        }
    }
}
