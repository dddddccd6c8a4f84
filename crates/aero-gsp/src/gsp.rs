//! The GSP service context and its service-call entry points.

use memory::GuestMemory;

use crate::command::GxCommand;
use crate::error::GspResult;
use crate::observer::{GpuDebugObserver, NullDebugObserver};
use crate::proxy;
use crate::queue::GxCommandQueue;
use crate::regs::GpuRegisterBus;
use crate::shared_memory::SharedMemory;
use crate::sync::{EventSignaler, Handle, RegisteredClient, SyncChannel};

#[derive(Clone, Debug)]
pub struct GspConfig {
    /// Number of client command buffers in shared memory.
    pub num_threads: u32,
    /// Log every GX command at `info` instead of `debug`.
    pub verbose: bool,
}

impl Default for GspConfig {
    fn default() -> Self {
        Self {
            num_threads: 4,
            verbose: false,
        }
    }
}

/// GSP GPU service state.
///
/// Owns the shared memory block, the client registration, and the debug observer. The GPU
/// register engine and guest memory are borrowed per call.
#[derive(Debug)]
pub struct GspGpu<O = NullDebugObserver> {
    cfg: GspConfig,
    queue: GxCommandQueue,
    sync: SyncChannel,
    observer: O,
}

impl GspGpu<NullDebugObserver> {
    pub fn new(cfg: GspConfig, shared_memory: Handle) -> Self {
        Self::with_observer(cfg, shared_memory, NullDebugObserver)
    }
}

impl<O: GpuDebugObserver> GspGpu<O> {
    pub fn with_observer(cfg: GspConfig, shared_memory: Handle, observer: O) -> Self {
        Self {
            queue: GxCommandQueue::new(shared_memory, cfg.num_threads, cfg.verbose),
            sync: SyncChannel::new(),
            observer,
            cfg,
        }
    }

    pub fn config(&self) -> &GspConfig {
        &self.cfg
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn queue(&self) -> &GxCommandQueue {
        &self.queue
    }

    /// Client view of the command buffers (tests and HLE clients write commands through this).
    pub fn queue_mut(&mut self) -> &mut GxCommandQueue {
        &mut self.queue
    }

    pub fn shared_memory(&self) -> &SharedMemory {
        self.queue.shared_memory()
    }

    pub fn sync(&self) -> &SyncChannel {
        &self.sync
    }

    /// `WriteHWRegs`: copies `size / 4` words from `src` into the GPU register window at `reg_addr`.
    pub fn write_hw_regs(
        &mut self,
        regs: &mut dyn GpuRegisterBus,
        reg_addr: u32,
        size: u32,
        src: &[u32],
    ) -> GspResult<()> {
        proxy::write_registers(regs, reg_addr, size, src)
    }

    /// `ReadHWRegs`: copies `size / 4` words of the GPU register window at `reg_addr` into `dst`.
    pub fn read_hw_regs(
        &mut self,
        regs: &mut dyn GpuRegisterBus,
        reg_addr: u32,
        size: u32,
        dst: &mut [u32],
    ) -> GspResult<()> {
        proxy::read_registers(regs, reg_addr, size, dst)
    }

    /// `RegisterInterruptRelayQueue`. See [`SyncChannel::register_client`].
    pub fn register_interrupt_relay_queue(
        &mut self,
        flags: u32,
        event: Handle,
        events: &mut dyn EventSignaler,
    ) -> RegisteredClient {
        let shared_memory = self.queue.shared_memory().handle();
        self.sync.register_client(flags, event, shared_memory, events)
    }

    /// `TriggerCmdReqQueue`: processes one GX command from the shared client command buffer.
    pub fn trigger_cmd_req_queue(
        &mut self,
        regs: &mut dyn GpuRegisterBus,
        mem: &mut dyn GuestMemory,
    ) -> GspResult<GxCommand> {
        let thread_id = self.sync.thread_id();
        self.process_next(thread_id, regs, mem)
    }

    /// Processes one GX command from `thread_id`'s command buffer.
    pub fn process_next(
        &mut self,
        thread_id: u32,
        regs: &mut dyn GpuRegisterBus,
        mem: &mut dyn GuestMemory,
    ) -> GspResult<GxCommand> {
        self.queue
            .process_next(thread_id, regs, mem, &mut self.observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ImageCopy, MemoryFill};
    use crate::observer::GxCommandHistory;
    use crate::regs::{display_transfer, memory_fill, GpuRegisterFile, HW_REGS_VADDR_BASE};
    use memory::MappedGuestMemory;

    struct NoEvents;

    impl EventSignaler for NoEvents {
        fn signal(&mut self, _event: Handle) {}
        fn set_permanent_signal(&mut self, _event: Handle) {}
    }

    #[test]
    fn registration_hands_out_the_shared_memory_handle() {
        let mut gsp = GspGpu::new(GspConfig::default(), Handle(0x77));
        let client = gsp.register_interrupt_relay_queue(1, Handle(5), &mut NoEvents);
        assert_eq!(client.shared_memory, Handle(0x77));
        assert_eq!(client.thread_id, 0);
        assert_eq!(gsp.shared_memory().size(), 0x1000);
    }

    #[test]
    fn earlier_client_still_triggers_its_own_command_after_another_registers() {
        let mut gsp = GspGpu::with_observer(
            GspConfig {
                num_threads: 2,
                verbose: true,
            },
            Handle(1),
            GxCommandHistory::default(),
        );
        let first = gsp.register_interrupt_relay_queue(0, Handle(5), &mut NoEvents);
        let second = gsp.register_interrupt_relay_queue(0, Handle(6), &mut NoEvents);
        assert_eq!(first.thread_id, second.thread_id);

        let fill = GxCommand::SetMemoryFill(MemoryFill {
            start1: 0x1800_0000,
            value1: 0x1234,
            end1: 0x1800_0100,
            start2: 0,
            value2: 0,
            end2: 0,
        });
        gsp.queue_mut().enqueue(first.thread_id, &fill).unwrap();

        let mut regs = GpuRegisterFile::new();
        let mut mem = MappedGuestMemory::new();
        assert_eq!(gsp.trigger_cmd_req_queue(&mut regs, &mut mem).unwrap(), fill);

        assert_eq!(
            regs.reg(memory_fill::BASE + memory_fill::START),
            0x1800_0000 >> 3
        );
        assert_eq!(regs.reg(memory_fill::BASE + memory_fill::VALUE), 0x1234);
        assert_eq!(
            gsp.queue()
                .header(first.thread_id)
                .unwrap()
                .number_commands(),
            0
        );
        assert_eq!(gsp.sync().event(), Some(Handle(6)));
    }

    #[test]
    fn process_next_serves_any_command_buffer() {
        let mut gsp = GspGpu::with_observer(
            GspConfig {
                num_threads: 2,
                verbose: false,
            },
            Handle(1),
            GxCommandHistory::default(),
        );

        let copy = GxCommand::SetTextureCopy(ImageCopy {
            in_address: 0x1800_0000,
            out_address: 0x1800_1000,
            in_size: 0x10,
            out_size: 0x20,
            flags: 0x8,
        });
        gsp.queue_mut().enqueue(1, &copy).unwrap();

        let mut regs = GpuRegisterFile::new();
        let mut mem = MappedGuestMemory::new();
        assert_eq!(gsp.process_next(1, &mut regs, &mut mem).unwrap(), copy);

        assert_eq!(regs.reg(display_transfer::OUTPUT_SIZE), 0x20);
        assert_eq!(regs.reg(display_transfer::INPUT_SIZE), 0x10);
        assert_eq!(regs.reg(display_transfer::TRIGGER), 1);
        assert_eq!(gsp.observer().commands().back(), Some(&copy));
        assert_eq!(gsp.queue().header(1).unwrap().number_commands(), 0);
        assert_eq!(gsp.queue().header(0).unwrap().number_commands(), 0);
    }

    #[test]
    fn hw_reg_calls_go_through_the_proxy() {
        let mut gsp = GspGpu::new(GspConfig::default(), Handle(1));
        let mut regs = GpuRegisterFile::new();

        gsp.write_hw_regs(&mut regs, 0x400, 8, &[0x11, 0x22]).unwrap();
        assert_eq!(regs.hw(HW_REGS_VADDR_BASE + 0x404), 0x22);

        let mut out = [0u32; 2];
        gsp.read_hw_regs(&mut regs, 0x400, 8, &mut out).unwrap();
        assert_eq!(out, [0x11, 0x22]);

        assert!(gsp.write_hw_regs(&mut regs, 0x400, 7, &[0; 2]).is_err());
    }
}
