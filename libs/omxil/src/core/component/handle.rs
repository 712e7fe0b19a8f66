// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Controller-facing component handle.
//!
//! Every entry point here is a non-blocking handoff: it validates what can be
//! validated against the projected state, then enqueues onto the worker's
//! FIFO. Outcomes arrive through [`ComponentCallbacks`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{SendError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use super::component_id::ComponentId;
use super::work::WorkItem;
use super::worker::{self, WorkerTimeouts};
use crate::core::buffer::{BufferAllocator, BufferHeader};
use crate::core::callbacks::{ComponentCallbacks, Dispatcher};
use crate::core::command::Command;
use crate::core::config::CoreConfig;
use crate::core::error::{OmxError, RejectedBuffer, Result};
use crate::core::events::Event;
use crate::core::params::{Param, ParamIndex, PriorityMgmt};
use crate::core::port::{resolve_target, Port, PortDirection, NO_PORT};
use crate::core::processor::ComponentProcessor;
use crate::core::resources::{ResourceManager, ResourceNotifier};
use crate::core::state::ComponentState;

/// Version of the component contract implemented by this crate.
pub const SPEC_VERSION: [u8; 4] = [1, 1, 2, 0];

/// Result of `Component::version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentVersion {
    pub name: String,
    pub component_version: [u8; 4],
    pub spec_version: [u8; 4],
    pub uuid: ComponentId,
}

/// Actual and projected state.
///
/// `projected` is the state the component will be in once every queued
/// state command has executed; synchronous checks run against it.
#[derive(Debug)]
pub(crate) struct Status {
    pub(crate) state: ComponentState,
    pub(crate) projected: ComponentState,
    pub(crate) pending_state_commands: usize,
}

/// State shared between the handle, the worker and tunnel peers.
///
/// Lock order: `status` before `ports`. Never hold a lock of one component
/// while locking another, except in tunnel setup which orders by id.
pub(crate) struct ComponentInner {
    pub(crate) id: ComponentId,
    pub(crate) name: String,
    pub(crate) status: Mutex<Status>,
    pub(crate) ports: Mutex<Vec<Port>>,
    pub(crate) processor: Arc<Mutex<Box<dyn ComponentProcessor>>>,
    pub(crate) configs: Mutex<HashMap<u32, serde_json::Value>>,
    pub(crate) priority: Mutex<PriorityMgmt>,
    pub(crate) work_tx: Sender<WorkItem>,
    pub(crate) dispatcher: Dispatcher,
}

impl ComponentInner {
    pub(crate) fn state(&self) -> ComponentState {
        self.status.lock().state
    }

    pub(crate) fn set_state(&self, state: ComponentState) {
        let mut status = self.status.lock();
        let previous = status.state;
        status.state = state;
        if status.pending_state_commands == 0 {
            status.projected = state;
        }
        drop(status);
        if previous != state {
            tracing::debug!("[{}] {} -> {}", self.id, previous, state);
        }
    }

    /// A state command left the queue, successful or not.
    pub(crate) fn finish_state_command(&self) {
        let mut status = self.status.lock();
        status.pending_state_commands = status.pending_state_commands.saturating_sub(1);
        if status.pending_state_commands == 0 {
            status.projected = status.state;
        }
    }

    pub(crate) fn enqueue(&self, item: WorkItem) {
        if self.work_tx.send(item).is_err() {
            tracing::warn!("[{}] Worker is gone, work item dropped", self.id);
        }
    }

    pub(crate) fn emit(&self, event: Event) {
        self.dispatcher.event(event);
    }
}

/// Returned by [`Component::destroy`] when the component is still active.
#[derive(Error, Debug)]
#[error("cannot destroy component: {error}")]
pub struct DestroyRejected {
    pub error: OmxError,
    pub component: Component,
}

/// Handle to a running component instance.
///
/// Dropping the handle stops the worker and dispatcher threads.
pub struct Component {
    inner: Arc<ComponentInner>,
    resources: Arc<ResourceManager>,
    shutdown_tx: Sender<()>,
    worker: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Component {
    pub(crate) fn spawn(
        name: &str,
        processor: Box<dyn ComponentProcessor>,
        callbacks: Arc<dyn ComponentCallbacks>,
        resources: Arc<ResourceManager>,
        config: &CoreConfig,
    ) -> Result<Self> {
        let id = ComponentId::new();

        let defs = processor.ports();
        for (position, def) in defs.iter().enumerate() {
            if def.index as usize != position {
                tracing::error!(
                    "[{}] {} declares port {} at position {}",
                    id,
                    name,
                    def.index,
                    position
                );
                return Err(OmxError::InvalidComponent);
            }
        }
        let ports: Vec<Port> = defs.into_iter().map(Port::new).collect();

        let (work_tx, work_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let (dispatcher, dispatcher_thread) =
            Dispatcher::spawn(id.clone(), callbacks, config.slow_callback_threshold())?;

        let inner = Arc::new(ComponentInner {
            id: id.clone(),
            name: name.to_string(),
            status: Mutex::new(Status {
                state: ComponentState::Loaded,
                projected: ComponentState::Loaded,
                pending_state_commands: 0,
            }),
            ports: Mutex::new(ports),
            processor: Arc::new(Mutex::new(processor)),
            configs: Mutex::new(HashMap::new()),
            priority: Mutex::new(PriorityMgmt::default()),
            work_tx: work_tx.clone(),
            dispatcher,
        });

        let notifier: ResourceNotifier = Arc::new(move |notice| {
            let _ = work_tx.send(WorkItem::Resources(notice));
        });
        resources.attach(&id, notifier);

        let timeouts = WorkerTimeouts {
            population: config.port_population_timeout(),
            release: config.port_release_timeout(),
        };
        let worker = match worker::spawn(
            Arc::clone(&inner),
            work_rx,
            shutdown_rx,
            Arc::clone(&resources),
            timeouts,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                resources.detach(&id);
                inner.dispatcher.stop();
                let _ = dispatcher_thread.join();
                return Err(e);
            }
        };

        tracing::info!("[{}] Created component {}", id, name);

        Ok(Self {
            inner,
            resources,
            shutdown_tx,
            worker: Some(worker),
            dispatcher: Some(dispatcher_thread),
        })
    }

    pub fn id(&self) -> &ComponentId {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn version(&self) -> ComponentVersion {
        ComponentVersion {
            name: self.inner.name.clone(),
            component_version: self.inner.processor.lock().component_version(),
            spec_version: SPEC_VERSION,
            uuid: self.inner.id.clone(),
        }
    }

    pub fn get_state(&self) -> ComponentState {
        self.inner.state()
    }

    pub fn port_count(&self) -> u32 {
        self.inner.ports.lock().len() as u32
    }

    pub(crate) fn inner(&self) -> &Arc<ComponentInner> {
        &self.inner
    }

    /// Queue a command. Completion or failure is reported through events.
    ///
    /// State commands are checked against the state the component will be
    /// in after every command already queued, so `SameState` and
    /// `IncorrectStateTransition` are reported here when they can be.
    pub fn send_command(&self, command: Command) -> Result<()> {
        {
            let mut status = self.inner.status.lock();
            if status.state == ComponentState::Invalid {
                return Err(OmxError::InvalidState);
            }

            match &command {
                Command::StateSet(target) => {
                    status.projected.check_transition(*target)?;
                    status.projected = *target;
                    status.pending_state_commands += 1;
                }
                Command::Flush(target) => {
                    resolve_target(*target, self.inner.ports.lock().len())?;
                }
                Command::PortDisable(target) => {
                    let mut ports = self.inner.ports.lock();
                    for index in resolve_target(*target, ports.len())? {
                        let port = &mut ports[index as usize];
                        if port.def.enabled {
                            port.disable_pending = true;
                        }
                    }
                }
                Command::PortEnable(target) => {
                    let mut ports = self.inner.ports.lock();
                    for index in resolve_target(*target, ports.len())? {
                        let port = &mut ports[index as usize];
                        if !port.def.enabled {
                            port.enable_pending = true;
                        }
                    }
                }
                Command::MarkBuffer { port, .. } => {
                    let ports = self.inner.ports.lock();
                    match ports.get(*port as usize) {
                        Some(p) if p.def.is_input() => {}
                        _ => return Err(OmxError::BadPortIndex),
                    }
                }
                Command::Extension { .. } => {}
            }
        }

        tracing::debug!("[{}] Queued command {:?}", self.inner.id, command);
        self.inner
            .work_tx
            .send(WorkItem::Command(command))
            .map_err(|_| OmxError::InvalidState)
    }

    pub fn get_parameter(&self, index: ParamIndex) -> Result<Param> {
        if self.inner.state() == ComponentState::Invalid {
            return Err(OmxError::InvalidState);
        }

        match index {
            ParamIndex::PortDefinition(port) => {
                let ports = self.inner.ports.lock();
                let p = ports.get(port as usize).ok_or(OmxError::BadPortIndex)?;
                Ok(Param::PortDefinition(p.definition()))
            }
            ParamIndex::BufferSupplier(port) => {
                let ports = self.inner.ports.lock();
                let p = ports.get(port as usize).ok_or(OmxError::BadPortIndex)?;
                Ok(Param::BufferSupplier {
                    port,
                    supplier: p.def.buffer_supplier,
                })
            }
            ParamIndex::PriorityMgmt => Ok(Param::PriorityMgmt(*self.inner.priority.lock())),
            ParamIndex::Vendor(index) => {
                let value = self.inner.processor.lock().get_vendor_parameter(index)?;
                Ok(Param::Vendor { index, value })
            }
        }
    }

    /// Change a parameter. Legal in `Loaded`, or on a disabled port for
    /// port parameters.
    pub fn set_parameter(&self, param: Param) -> Result<()> {
        let status = self.inner.status.lock();
        if status.state == ComponentState::Invalid {
            return Err(OmxError::InvalidState);
        }
        let loaded =
            status.state == ComponentState::Loaded && status.projected == ComponentState::Loaded;

        let mut ports = self.inner.ports.lock();
        if let Some(index) = param.port() {
            let port = ports.get(index as usize).ok_or(OmxError::BadPortIndex)?;
            let disabled = !port.def.enabled && !port.enable_pending;
            if !loaded && !disabled {
                return Err(OmxError::IncorrectStateOperation);
            }
        } else if !loaded {
            return Err(OmxError::IncorrectStateOperation);
        }

        match param {
            Param::PortDefinition(def) => {
                let port = &mut ports[def.index as usize];
                if def.direction != port.def.direction || def.domain != port.def.domain {
                    return Err(OmxError::BadParameter);
                }
                if def.buffer_count_actual < port.def.buffer_count_min || def.buffer_size == 0 {
                    return Err(OmxError::BadParameter);
                }
                if port.is_tunneled() && def.buffer_size < port.def.buffer_size {
                    return Err(OmxError::UnsupportedSetting);
                }
                port.def.buffer_count_actual = def.buffer_count_actual;
                port.def.buffer_size = def.buffer_size;
                tracing::debug!(
                    "[{}] Port {}: {} x {} bytes",
                    self.inner.id,
                    def.index,
                    def.buffer_count_actual,
                    def.buffer_size
                );
                Ok(())
            }
            Param::BufferSupplier { port, supplier } => {
                let p = &mut ports[port as usize];
                if p.is_tunneled() {
                    return Err(OmxError::IncorrectStateOperation);
                }
                p.def.buffer_supplier = supplier;
                Ok(())
            }
            Param::PriorityMgmt(priority) => {
                *self.inner.priority.lock() = priority;
                Ok(())
            }
            Param::Vendor { index, value } => {
                drop(ports);
                drop(status);
                self.inner
                    .processor
                    .lock()
                    .set_vendor_parameter(index, &value)
            }
        }
    }

    pub fn get_config(&self, index: u32) -> Result<serde_json::Value> {
        if self.inner.state() == ComponentState::Invalid {
            return Err(OmxError::InvalidState);
        }
        if let Some(value) = self.inner.processor.lock().get_config(index) {
            return Ok(value);
        }
        self.inner
            .configs
            .lock()
            .get(&index)
            .cloned()
            .ok_or(OmxError::UnsupportedIndex)
    }

    /// Change a config value. Legal in any state but `Invalid`.
    pub fn set_config(&self, index: u32, value: serde_json::Value) -> Result<()> {
        if self.inner.state() == ComponentState::Invalid {
            return Err(OmxError::InvalidState);
        }
        self.inner.processor.lock().set_config(index, &value)?;
        self.inner.configs.lock().insert(index, value);
        Ok(())
    }

    /// Register controller-owned memory as a buffer of `port`.
    pub fn use_buffer(&self, port: u32, data: Vec<u8>) -> Result<BufferHeader> {
        self.register_buffer(port, data.into_boxed_slice(), BufferAllocator::Controller)
    }

    /// Have the component allocate a `size` byte buffer for `port`.
    pub fn allocate_buffer(&self, port: u32, size: usize) -> Result<BufferHeader> {
        self.register_buffer(port, vec![0u8; size].into_boxed_slice(), BufferAllocator::Component)
    }

    fn register_buffer(
        &self,
        port: u32,
        data: Box<[u8]>,
        allocator: BufferAllocator,
    ) -> Result<BufferHeader> {
        let status = self.inner.status.lock();
        if status.state == ComponentState::Invalid {
            return Err(OmxError::InvalidState);
        }
        let mut ports = self.inner.ports.lock();
        let p = ports.get_mut(port as usize).ok_or(OmxError::BadPortIndex)?;
        // Outside a port enable, buffers are only taken on the way to Idle.
        let heading_to_idle = status.state.below_idle()
            && matches!(
                status.projected,
                ComponentState::Idle | ComponentState::WaitForResources
            );
        let allowed = p.enable_pending || (heading_to_idle && p.def.enabled);
        if !allowed || p.is_tunneled() {
            return Err(OmxError::IncorrectStateOperation);
        }

        let mut buffer = BufferHeader::new(data, allocator);
        if p.def.is_input() {
            buffer.set_input_port_index(port);
        } else {
            buffer.set_output_port_index(port);
        }
        p.register(buffer.id(), buffer.alloc_len(), allocator)?;
        tracing::trace!(
            "[{}] Port {}: registered {} ({} bytes)",
            self.inner.id,
            port,
            buffer.id(),
            buffer.alloc_len()
        );

        drop(ports);
        drop(status);
        self.inner.enqueue(WorkItem::Wake);
        Ok(buffer)
    }

    /// Give a buffer back for good.
    ///
    /// Legal in any state. Freeing from a port the component still needs
    /// (enabled, not being disabled, no pending return to `Loaded`) is
    /// reported with a `PortUnpopulated` error event.
    pub fn free_buffer(&self, buffer: BufferHeader) -> std::result::Result<(), RejectedBuffer> {
        let port = header_port(&buffer);
        let (slot, report) = {
            let status = self.inner.status.lock();
            let mut ports = self.inner.ports.lock();
            let Some(p) = ports.get_mut(port as usize) else {
                return Err(RejectedBuffer::new(OmxError::BadPortIndex, buffer));
            };
            if p.is_tunneled() {
                return Err(RejectedBuffer::new(OmxError::IncorrectStateOperation, buffer));
            }
            let Some(slot) = p.unregister(buffer.id()) else {
                return Err(RejectedBuffer::new(OmxError::BadParameter, buffer));
            };
            let report = matches!(
                status.state,
                ComponentState::Idle | ComponentState::Executing | ComponentState::Pause
            ) && status.projected != ComponentState::Loaded
                && p.def.enabled
                && !p.disable_pending;
            (slot, report)
        };

        tracing::trace!(
            "[{}] Port {}: freed {} ({} bytes, {:?} allocated)",
            self.inner.id,
            port,
            buffer.id(),
            slot.alloc_len,
            slot.allocator
        );
        if report {
            tracing::warn!("[{}] Port {} unpopulated while in use", self.inner.id, port);
            self.inner.emit(Event::Error(OmxError::PortUnpopulated));
        }
        self.inner.enqueue(WorkItem::Wake);
        Ok(())
    }

    /// Hand a filled buffer to its input port.
    pub fn empty_this_buffer(
        &self,
        buffer: BufferHeader,
    ) -> std::result::Result<(), RejectedBuffer> {
        self.submit(buffer, PortDirection::Input)
    }

    /// Hand an empty buffer to its output port.
    pub fn fill_this_buffer(
        &self,
        buffer: BufferHeader,
    ) -> std::result::Result<(), RejectedBuffer> {
        self.submit(buffer, PortDirection::Output)
    }

    fn submit(
        &self,
        buffer: BufferHeader,
        direction: PortDirection,
    ) -> std::result::Result<(), RejectedBuffer> {
        let port = match direction {
            PortDirection::Input => buffer.input_port_index(),
            PortDirection::Output => buffer.output_port_index(),
        };
        if let Err(e) = self.check_submission(port, direction, &buffer) {
            tracing::debug!(
                "[{}] Rejected {} on port {}: {}",
                self.inner.id,
                buffer.id(),
                port,
                e
            );
            return Err(RejectedBuffer::new(e, buffer));
        }

        tracing::trace!("[{}] Port {}: accepted {}", self.inner.id, port, buffer.id());
        let item = match direction {
            PortDirection::Input => WorkItem::EmptyThisBuffer(buffer),
            PortDirection::Output => WorkItem::FillThisBuffer(buffer),
        };
        match self.inner.work_tx.send(item) {
            Ok(()) => Ok(()),
            Err(SendError(WorkItem::EmptyThisBuffer(buffer)))
            | Err(SendError(WorkItem::FillThisBuffer(buffer))) => {
                Err(RejectedBuffer::new(OmxError::InvalidState, buffer))
            }
            Err(_) => Ok(()),
        }
    }

    fn check_submission(
        &self,
        port: u32,
        direction: PortDirection,
        buffer: &BufferHeader,
    ) -> Result<()> {
        let status = self.inner.status.lock();
        if status.state == ComponentState::Invalid {
            return Err(OmxError::InvalidState);
        }
        if !status.projected.is_running() {
            return Err(OmxError::IncorrectStateOperation);
        }

        let ports = self.inner.ports.lock();
        let p = ports.get(port as usize).ok_or(OmxError::BadPortIndex)?;
        if p.def.direction != direction {
            return Err(OmxError::BadPortIndex);
        }
        if p.is_tunneled() || !p.accepts_submissions() {
            return Err(OmxError::IncorrectStateOperation);
        }
        if !p.owns(buffer.id()) {
            return Err(OmxError::BadParameter);
        }
        Ok(())
    }

    /// Stop the component and release its threads.
    ///
    /// Only legal in `Loaded` or `Invalid`; otherwise the handle is given back.
    pub fn destroy(self) -> std::result::Result<(), DestroyRejected> {
        match self.get_state() {
            ComponentState::Loaded | ComponentState::Invalid => {
                drop(self);
                Ok(())
            }
            _ => Err(DestroyRejected {
                error: OmxError::IncorrectStateOperation,
                component: self,
            }),
        }
    }

    fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let id = self.inner.id.clone();

        let _ = self.shutdown_tx.send(());
        if worker.join().is_err() {
            tracing::error!("[{}] Worker thread panicked", id);
        }

        crate::core::tunnel::detach_all(&self.inner);

        self.inner.dispatcher.stop();
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                tracing::error!("[{}] Callback dispatcher panicked", id);
            }
        }

        self.resources.detach(&id);
        tracing::info!("[{}] Destroyed component {}", id, self.inner.name);
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.get_state())
            .finish()
    }
}

/// Port a controller buffer belongs to.
fn header_port(buffer: &BufferHeader) -> u32 {
    if buffer.input_port_index() != NO_PORT {
        buffer.input_port_index()
    } else {
        buffer.output_port_index()
    }
}
