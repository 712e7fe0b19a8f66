// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Component behavior plug-in.

use std::collections::VecDeque;

use crate::core::buffer::BufferHeader;
use crate::core::error::{OmxError, Result};
use crate::core::events::Event;
use crate::core::port::PortDefinition;

/// Defines what a component does with its buffers.
///
/// The framework owns the state machine, the port bookkeeping and the
/// buffer routing; a processor only sees the buffers queued on its enabled
/// ports through [`ProcessIo`].
///
/// # Lifecycle
///
/// 1. `ports()` - called once when the component is created
/// 2. `acquire_resources()` - `Loaded -> Idle`
/// 3. `process()` - repeatedly while `Executing`, as long as it makes progress
/// 4. `flush()` - on flush, port disable and stop; hand back held buffers
/// 5. `release_resources()` - `Idle -> Loaded`
pub trait ComponentProcessor: Send + 'static {
    /// Ports of the component, indexed from 0.
    fn ports(&self) -> Vec<PortDefinition>;

    /// Component version reported by `Component::version`.
    fn component_version(&self) -> [u8; 4] {
        [1, 0, 0, 0]
    }

    /// Resource demand on top of the port buffers.
    fn extra_resource_bytes(&self) -> u64 {
        0
    }

    fn acquire_resources(&mut self, _ports: &[PortDefinition]) -> Result<()> {
        Ok(())
    }

    fn release_resources(&mut self) {}

    /// Consume queued input and fill queued output.
    ///
    /// Stream errors (`StreamCorrupt`, `Underflow`, `Overflow`, vendor codes)
    /// are reported as events and processing continues. Any other error
    /// moves the component to `Invalid`.
    fn process(&mut self, io: &mut ProcessIo<'_>) -> Result<()>;

    /// Drop partial state for `port` and return any buffer still held.
    fn flush(&mut self, _port: u32, _io: &mut ProcessIo<'_>) {}

    /// Called by `set_config` before the value is stored.
    fn set_config(&mut self, _index: u32, _value: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    /// Live config values owned by the processor. `None` falls back to the stored value.
    fn get_config(&self, _index: u32) -> Option<serde_json::Value> {
        None
    }

    fn get_vendor_parameter(&self, _index: u32) -> Result<serde_json::Value> {
        Err(OmxError::UnsupportedIndex)
    }

    fn set_vendor_parameter(&mut self, _index: u32, _value: &serde_json::Value) -> Result<()> {
        Err(OmxError::UnsupportedIndex)
    }

    fn vendor_command(&mut self, _code: u32, _param: u32) -> Result<()> {
        Err(OmxError::NotImplemented)
    }
}

/// What a processor produced during one call, applied by the worker in order.
#[derive(Debug)]
pub(crate) enum ProcessOutcome {
    InputDone(BufferHeader),
    OutputReady(BufferHeader),
    Event(Event),
}

/// Processor view of the port queues.
///
/// Input queues hold filled buffers waiting to be consumed, output queues hold
/// empty buffers waiting to be filled, both in receipt order.
pub struct ProcessIo<'a> {
    ports: &'a [PortDefinition],
    queues: &'a mut [VecDeque<BufferHeader>],
    outcomes: Vec<ProcessOutcome>,
}

impl<'a> ProcessIo<'a> {
    pub(crate) fn new(
        ports: &'a [PortDefinition],
        queues: &'a mut [VecDeque<BufferHeader>],
    ) -> Self {
        Self {
            ports,
            queues,
            outcomes: Vec::new(),
        }
    }

    pub(crate) fn into_outcomes(self) -> Vec<ProcessOutcome> {
        self.outcomes
    }

    pub fn ports(&self) -> &[PortDefinition] {
        self.ports
    }

    pub fn port(&self, index: u32) -> Option<&PortDefinition> {
        self.ports.get(index as usize)
    }

    fn queue_for(&mut self, index: u32, input: bool) -> Option<&mut VecDeque<BufferHeader>> {
        let def = self.ports.get(index as usize)?;
        if !def.enabled || def.is_input() != input {
            return None;
        }
        self.queues.get_mut(index as usize)
    }

    pub fn input_available(&self, port: u32) -> usize {
        match self.ports.get(port as usize) {
            Some(def) if def.enabled && def.is_input() => self.queues[port as usize].len(),
            _ => 0,
        }
    }

    pub fn output_available(&self, port: u32) -> usize {
        match self.ports.get(port as usize) {
            Some(def) if def.enabled && def.is_output() => self.queues[port as usize].len(),
            _ => 0,
        }
    }

    pub fn peek_input(&self, port: u32) -> Option<&BufferHeader> {
        match self.ports.get(port as usize) {
            Some(def) if def.enabled && def.is_input() => self.queues[port as usize].front(),
            _ => None,
        }
    }

    pub fn pop_input(&mut self, port: u32) -> Option<BufferHeader> {
        self.queue_for(port, true)?.pop_front()
    }

    pub fn pop_output(&mut self, port: u32) -> Option<BufferHeader> {
        self.queue_for(port, false)?.pop_front()
    }

    /// Put a partially consumed input back at the head of its queue.
    pub fn requeue_input(&mut self, buffer: BufferHeader) {
        let port = buffer.input_port_index();
        match self.queue_for(port, true) {
            Some(queue) => queue.push_front(buffer),
            None => self.outcomes.push(ProcessOutcome::InputDone(buffer)),
        }
    }

    /// Put an unused output buffer back at the head of its queue.
    pub fn requeue_output(&mut self, buffer: BufferHeader) {
        let port = buffer.output_port_index();
        match self.queue_for(port, false) {
            Some(queue) => queue.push_front(buffer),
            None => self.outcomes.push(ProcessOutcome::OutputReady(buffer)),
        }
    }

    /// Hand a consumed input buffer back. Its fill state is reset on return.
    pub fn return_input(&mut self, buffer: BufferHeader) {
        self.outcomes.push(ProcessOutcome::InputDone(buffer));
    }

    /// Hand a filled output buffer back.
    pub fn emit_output(&mut self, buffer: BufferHeader) {
        self.outcomes.push(ProcessOutcome::OutputReady(buffer));
    }

    pub fn port_settings_changed(&mut self, port: u32) {
        self.outcomes
            .push(ProcessOutcome::Event(Event::PortSettingsChanged { port }));
    }

    /// Report a stream error without leaving the current state.
    pub fn report_error(&mut self, error: OmxError) {
        self.outcomes.push(ProcessOutcome::Event(Event::Error(error)));
    }
}
