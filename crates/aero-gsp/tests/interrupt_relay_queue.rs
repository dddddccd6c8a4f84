use aero_gsp::{EventSignaler, GspConfig, GspGpu, Handle};

/// Minimal kernel event table: tracks signaled / permanently signaled state per handle.
#[derive(Default)]
struct EventTable {
    signaled: Vec<Handle>,
    permanent: Vec<Handle>,
}

impl EventSignaler for EventTable {
    fn signal(&mut self, event: Handle) {
        self.signaled.push(event);
    }

    fn set_permanent_signal(&mut self, event: Handle) {
        self.permanent.push(event);
    }
}

#[test]
fn registration_pins_the_event_signaled() {
    let mut gsp = GspGpu::new(GspConfig::default(), Handle(0x1000));
    let mut events = EventTable::default();

    let client = gsp.register_interrupt_relay_queue(0x1, Handle(0x2000), &mut events);

    assert_eq!(client.thread_id, 0);
    assert_eq!(client.shared_memory, Handle(0x1000));
    assert_eq!(events.signaled, vec![Handle(0x2000)]);
    assert_eq!(events.permanent, vec![Handle(0x2000)]);
    assert_eq!(gsp.sync().event(), Some(Handle(0x2000)));
}

#[test]
fn later_registrations_rebind_the_event_and_share_buffer_zero() {
    let mut gsp = GspGpu::new(
        GspConfig {
            num_threads: 1,
            ..GspConfig::default()
        },
        Handle(0x1000),
    );
    let mut events = EventTable::default();

    for event in 0x10..0x18 {
        let client = gsp.register_interrupt_relay_queue(0, Handle(event), &mut events);
        assert_eq!(client.thread_id, 0);
    }
    assert_eq!(events.signaled.len(), 8);
    assert_eq!(gsp.sync().event(), Some(Handle(0x17)));
}

#[test]
#[should_panic(expected = "event handle is not valid")]
fn null_event_handle_never_returns() {
    let mut gsp = GspGpu::new(GspConfig::default(), Handle(0x1000));
    let mut events = EventTable::default();
    let _ = gsp.register_interrupt_relay_queue(0, Handle(0), &mut events);
}
