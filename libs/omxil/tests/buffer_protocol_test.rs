// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer ownership protocol between a controller and its components.

mod common;

use std::time::Duration;

use common::{allocate_port, port_definition, test_core, TestController};
use omxil::processors::{PASSTHROUGH_COMPONENT, SINK_COMPONENT, SINK_STATS_INDEX};
use omxil::{
    BufferFlags, BufferHeader, Command, CommandComplete, Component, ComponentState, Event, Mark,
    Notification, OmxError, Param, ParamIndex, SinkStats,
};

const BUDGET: u64 = 64 * 1024 * 1024;

/// Move `component` to `Executing`, allocating every port.
fn start(controller: &mut TestController, component: &Component) -> Vec<Vec<BufferHeader>> {
    component
        .send_command(Command::StateSet(ComponentState::Idle))
        .unwrap();
    let pools = (0..component.port_count())
        .map(|port| allocate_port(component, port))
        .collect();
    controller.wait_complete(component.id(), CommandComplete::StateSet(ComponentState::Idle));
    controller.transition(component, ComponentState::Executing);
    pools
}

fn sink_stats(sink: &Component) -> SinkStats {
    match sink
        .get_parameter(ParamIndex::Vendor(SINK_STATS_INDEX))
        .unwrap()
    {
        Param::Vendor { value, .. } => serde_json::from_value(value).unwrap(),
        other => panic!("unexpected parameter {:?}", other),
    }
}

#[test]
fn test_empty_this_buffer_round_trip() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let sink = controller.create(&core, SINK_COMPONENT);
    let mut pools = start(&mut controller, &sink);

    for (i, mut buffer) in pools.remove(0).into_iter().enumerate() {
        let id = buffer.id();
        buffer.write(&[i as u8; 100]).unwrap();
        buffer.set_timestamp(33_000 * i as i64);
        sink.empty_this_buffer(buffer).unwrap();

        let returned = controller.wait_empty_done(sink.id());
        assert_eq!(returned.id(), id);
        assert_eq!(returned.filled_len(), 0);
        assert_eq!(returned.input_port_index(), 0);
    }

    let stats = sink_stats(&sink);
    assert_eq!(stats.buffers, 2);
    assert_eq!(stats.bytes, 200);
    assert_eq!(stats.last_timestamp, 33_000);
}

#[test]
fn test_fill_this_buffer_respects_capacity() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let filter = controller.create(&core, PASSTHROUGH_COMPONENT);
    let mut pools = start(&mut controller, &filter);
    let mut outputs = pools.remove(1);
    let mut inputs = pools.remove(0);

    let output = outputs.remove(0);
    let output_id = output.id();
    filter.fill_this_buffer(output).unwrap();

    let mut input = inputs.remove(0);
    input.write(b"payload").unwrap();
    input.set_timestamp(1_000);
    input.set_flags(BufferFlags::END_OF_FRAME);
    filter.empty_this_buffer(input).unwrap();

    let filled = controller.wait_fill_done(filter.id());
    assert_eq!(filled.id(), output_id);
    assert_eq!(filled.payload(), b"payload");
    assert!(filled.filled_len() <= filled.alloc_len());
    assert!(filled.offset() + filled.filled_len() <= filled.alloc_len());
    assert_eq!(filled.timestamp(), 1_000);
    assert_eq!(filled.flags(), BufferFlags::END_OF_FRAME);

    let emptied = controller.wait_empty_done(filter.id());
    assert_eq!(emptied.filled_len(), 0);
}

#[test]
fn test_truncation_is_a_stream_error() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let filter = controller.create(&core, PASSTHROUGH_COMPONENT);

    let mut def = port_definition(&filter, 0);
    def.buffer_size = 8192;
    filter.set_parameter(Param::PortDefinition(def)).unwrap();

    let mut pools = start(&mut controller, &filter);
    let output = pools[1].remove(0);
    let mut input = pools[0].remove(0);
    input.write(&[7u8; 6000]).unwrap();

    filter.fill_this_buffer(output).unwrap();
    filter.empty_this_buffer(input).unwrap();

    controller.wait_error(filter.id(), OmxError::Overflow);
    let filled = controller.wait_fill_done(filter.id());
    assert_eq!(filled.filled_len(), 4096);
    assert_eq!(filter.get_state(), ComponentState::Executing);
}

#[test]
fn test_flush_returns_buffers_in_receipt_order() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let filter = controller.create(&core, PASSTHROUGH_COMPONENT);
    let mut pools = start(&mut controller, &filter);
    controller.transition(&filter, ComponentState::Pause);

    let outputs = pools.remove(1);
    let inputs = pools.remove(0);
    let input_ids: Vec<_> = inputs.iter().map(|b| b.id()).collect();
    let output_ids: Vec<_> = outputs.iter().map(|b| b.id()).collect();

    // Paused: everything stays queued.
    for mut buffer in inputs {
        buffer.write(b"queued").unwrap();
        filter.empty_this_buffer(buffer).unwrap();
    }
    for buffer in outputs {
        filter.fill_this_buffer(buffer).unwrap();
    }
    assert!(!controller.has_buffer_done(filter.id(), Duration::from_millis(100)));

    filter.send_command(Command::Flush(0)).unwrap();
    for expected in &input_ids {
        match controller.next_from(filter.id()) {
            Notification::EmptyBufferDone(buffer) => {
                assert_eq!(&buffer.id(), expected);
                assert_eq!(buffer.filled_len(), 0);
            }
            other => panic!("unexpected notification {:?}", other),
        }
    }
    match controller.next_from(filter.id()) {
        Notification::Event(Event::CmdComplete(CommandComplete::Flush(0))) => {}
        other => panic!("unexpected notification {:?}", other),
    }
    // The output port was not touched.
    assert!(!controller.has_buffer_done(filter.id(), Duration::from_millis(50)));
    assert_eq!(filter.get_state(), ComponentState::Pause);

    filter.send_command(Command::Flush(1)).unwrap();
    for expected in &output_ids {
        match controller.next_from(filter.id()) {
            Notification::FillBufferDone(buffer) => assert_eq!(&buffer.id(), expected),
            other => panic!("unexpected notification {:?}", other),
        }
    }
    controller.wait_complete(filter.id(), CommandComplete::Flush(1));
}

#[test]
fn test_pause_keeps_buffers_queued() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let sink = controller.create(&core, SINK_COMPONENT);
    let mut pools = start(&mut controller, &sink);
    controller.transition(&sink, ComponentState::Pause);

    let mut buffer = pools[0].remove(0);
    let id = buffer.id();
    buffer.write(b"held").unwrap();
    sink.empty_this_buffer(buffer).unwrap();
    assert!(!controller.has_buffer_done(sink.id(), Duration::from_millis(100)));

    controller.transition(&sink, ComponentState::Executing);
    assert_eq!(controller.wait_empty_done(sink.id()).id(), id);
    assert_eq!(sink_stats(&sink).bytes, 4);
}

#[test]
fn test_stop_returns_held_buffers() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let filter = controller.create(&core, PASSTHROUGH_COMPONENT);
    let mut pools = start(&mut controller, &filter);

    // No output buffers: inputs wait in the component.
    for mut buffer in pools.remove(0) {
        buffer.write(b"waiting").unwrap();
        filter.empty_this_buffer(buffer).unwrap();
    }

    filter
        .send_command(Command::StateSet(ComponentState::Idle))
        .unwrap();
    let mut returned = 0;
    loop {
        match controller.next_from(filter.id()) {
            Notification::EmptyBufferDone(_) => returned += 1,
            Notification::Event(Event::CmdComplete(CommandComplete::StateSet(
                ComponentState::Idle,
            ))) => break,
            other => panic!("unexpected notification {:?}", other),
        }
    }
    assert_eq!(returned, 2);
    assert_eq!(filter.get_state(), ComponentState::Idle);
}

#[test]
fn test_port_disable_returns_buffers_before_completion() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let filter = controller.create(&core, PASSTHROUGH_COMPONENT);
    let mut pools = start(&mut controller, &filter);
    let mut outputs = pools.remove(1);

    for mut buffer in pools.remove(0) {
        buffer.write(b"pending").unwrap();
        filter.empty_this_buffer(buffer).unwrap();
    }

    filter.send_command(Command::PortDisable(0)).unwrap();
    let mut returned = 0;
    loop {
        match controller.next_from(filter.id()) {
            Notification::EmptyBufferDone(buffer) => {
                returned += 1;
                filter.free_buffer(buffer).unwrap();
            }
            Notification::Event(Event::CmdComplete(CommandComplete::PortDisable(0))) => break,
            other => panic!("unexpected notification {:?}", other),
        }
    }
    assert_eq!(returned, 2);
    assert!(!port_definition(&filter, 0).enabled);
    assert_eq!(filter.get_state(), ComponentState::Executing);

    // Re-enable and repopulate while executing; data flows again.
    filter.send_command(Command::PortEnable(0)).unwrap();
    let mut inputs = allocate_port(&filter, 0);
    controller.wait_complete(filter.id(), CommandComplete::PortEnable(0));
    assert!(port_definition(&filter, 0).populated);

    filter.fill_this_buffer(outputs.remove(0)).unwrap();
    let mut input = inputs.remove(0);
    input.write(b"again").unwrap();
    filter.empty_this_buffer(input).unwrap();
    assert_eq!(controller.wait_fill_done(filter.id()).payload(), b"again");
}

/// Input-only consumer that takes its time over every buffer.
struct SlowSink;

impl omxil::ComponentProcessor for SlowSink {
    fn ports(&self) -> Vec<omxil::PortDefinition> {
        vec![omxil::PortDefinition::input(0, omxil::PortDomain::Other).with_buffers(2, 256)]
    }

    fn process(&mut self, io: &mut omxil::ProcessIo<'_>) -> omxil::Result<()> {
        if let Some(buffer) = io.pop_input(0) {
            std::thread::sleep(Duration::from_millis(150));
            io.return_input(buffer);
        }
        Ok(())
    }
}

fn slow_sink() -> Box<dyn omxil::ComponentProcessor> {
    Box::new(SlowSink)
}

#[test]
fn test_port_disable_waits_for_buffers_queued_before_it() {
    let core = test_core(BUDGET);
    core.register_component("OMX.test.slow_sink", &[], slow_sink)
        .unwrap();
    let mut controller = TestController::new();
    let sink = controller.create(&core, "OMX.test.slow_sink");
    let mut pools = start(&mut controller, &sink);

    // Both buffers are accepted while the first is still being consumed.
    let mut submitted = Vec::new();
    for mut buffer in pools.remove(0) {
        buffer.write(b"queued").unwrap();
        submitted.push(buffer.id());
        sink.empty_this_buffer(buffer).unwrap();
    }
    sink.send_command(Command::PortDisable(0)).unwrap();

    let mut returned = Vec::new();
    loop {
        match controller.next_from(sink.id()) {
            Notification::EmptyBufferDone(buffer) => {
                returned.push(buffer.id());
                sink.free_buffer(buffer).unwrap();
            }
            Notification::Event(Event::CmdComplete(CommandComplete::PortDisable(0))) => break,
            other => panic!("unexpected notification {:?}", other),
        }
    }
    assert_eq!(returned, submitted);
    assert!(!port_definition(&sink, 0).enabled);
    assert_eq!(sink.get_state(), ComponentState::Executing);
}

#[test]
fn test_mark_reaches_target() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let sink = controller.create(&core, SINK_COMPONENT);
    let mut pools = start(&mut controller, &sink);

    sink.send_command(Command::MarkBuffer {
        port: 0,
        mark: Mark::new(sink.id().clone(), 42),
    })
    .unwrap();
    controller.wait_complete(sink.id(), CommandComplete::MarkBuffer(0));

    let mut buffer = pools[0].remove(0);
    buffer.write(b"marked").unwrap();
    sink.empty_this_buffer(buffer).unwrap();
    controller.wait_event(sink.id(), &Event::Mark { data: 42 });
    assert!(controller.wait_empty_done(sink.id()).mark().is_none());
}

#[test]
fn test_mark_for_another_component_is_carried_to_output() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let filter = controller.create(&core, PASSTHROUGH_COMPONENT);
    let downstream = controller.create(&core, SINK_COMPONENT);
    let mut pools = start(&mut controller, &filter);

    let mark = Mark::new(downstream.id().clone(), 7);
    filter
        .send_command(Command::MarkBuffer {
            port: 0,
            mark: mark.clone(),
        })
        .unwrap();
    assert_eq!(
        filter.send_command(Command::MarkBuffer {
            port: 1,
            mark: mark.clone(),
        }),
        Err(OmxError::BadPortIndex)
    );

    filter.fill_this_buffer(pools[1].remove(0)).unwrap();
    let mut input = pools[0].remove(0);
    input.write(b"x").unwrap();
    filter.empty_this_buffer(input).unwrap();

    let filled = controller.wait_fill_done(filter.id());
    assert_eq!(filled.mark(), Some(&mark));
}

#[test]
fn test_end_of_stream_on_sink() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let sink = controller.create(&core, SINK_COMPONENT);
    let mut pools = start(&mut controller, &sink);

    let mut buffer = pools[0].remove(0);
    buffer.write(b"last").unwrap();
    buffer.set_flags(BufferFlags::EOS);
    sink.empty_this_buffer(buffer).unwrap();

    controller.wait_event(
        sink.id(),
        &Event::BufferFlag {
            port: 0,
            flags: BufferFlags::EOS,
        },
    );
    let returned = controller.wait_empty_done(sink.id());
    assert!(!returned.is_eos());
    assert_eq!(sink_stats(&sink).end_of_streams, 1);
}

#[test]
fn test_synchronous_rejections_return_the_buffer() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let filter = controller.create(&core, PASSTHROUGH_COMPONENT);
    let other = controller.create(&core, SINK_COMPONENT);

    filter
        .send_command(Command::StateSet(ComponentState::Idle))
        .unwrap();
    let mut inputs = allocate_port(&filter, 0);
    let mut outputs = allocate_port(&filter, 1);
    controller.wait_complete(filter.id(), CommandComplete::StateSet(ComponentState::Idle));

    // Not running yet.
    let input = inputs.remove(0);
    let id = input.id();
    let rejected = filter.empty_this_buffer(input).unwrap_err();
    assert_eq!(rejected.error, OmxError::IncorrectStateOperation);
    let input = rejected.into_buffer();
    assert_eq!(input.id(), id);

    controller.transition(&filter, ComponentState::Executing);

    // Wrong direction.
    let output = outputs.remove(0);
    let rejected = filter.empty_this_buffer(output).unwrap_err();
    assert_eq!(rejected.error, OmxError::BadPortIndex);
    let output = rejected.into_buffer();
    let rejected = filter.fill_this_buffer(input).unwrap_err();
    assert_eq!(rejected.error, OmxError::BadPortIndex);
    let input = rejected.into_buffer();

    // A buffer the port never registered.
    other
        .send_command(Command::StateSet(ComponentState::Idle))
        .unwrap();
    let foreign = allocate_port(&other, 0).remove(0);
    let rejected = filter.empty_this_buffer(foreign).unwrap_err();
    assert_eq!(rejected.error, OmxError::BadParameter);
    let rejected = filter.free_buffer(rejected.into_buffer()).unwrap_err();
    assert_eq!(rejected.error, OmxError::BadParameter);

    // Buffers cannot be added to a populated port outside Loaded.
    assert_eq!(
        filter.allocate_buffer(0, 4096).err(),
        Some(OmxError::IncorrectStateOperation)
    );

    // Accepted buffers still flow.
    filter.fill_this_buffer(output).unwrap();
    let mut input = input;
    input.write(b"ok").unwrap();
    filter.empty_this_buffer(input).unwrap();
    assert_eq!(controller.wait_fill_done(filter.id()).payload(), b"ok");
}

#[test]
fn test_freeing_a_needed_buffer_reports_unpopulated() {
    let core = test_core(BUDGET);
    let mut controller = TestController::new();
    let sink = controller.create(&core, SINK_COMPONENT);
    let mut pools = start(&mut controller, &sink);

    sink.free_buffer(pools[0].remove(0)).unwrap();
    controller.wait_error(sink.id(), OmxError::PortUnpopulated);
    assert!(!port_definition(&sink, 0).populated);
    assert_eq!(sink.get_state(), ComponentState::Executing);
}
