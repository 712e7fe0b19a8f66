// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Component worker thread.
//!
//! Owns the buffer queues and executes everything on the work queue in
//! submission order: commands, controller buffers, tunnel traffic and
//! resource notices. Long-running transitions (population, release, stop)
//! wait by pumping the queue, handling tunnel traffic immediately and
//! deferring everything else, so two tunneled components waiting on each
//! other always make progress.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use super::component_id::ComponentId;
use super::handle::ComponentInner;
use super::work::WorkItem;
use crate::core::buffer::{BufferAllocator, BufferHeader, Mark};
use crate::core::command::{Command, CommandComplete};
use crate::core::error::{OmxError, Result};
use crate::core::events::Event;
use crate::core::port::{resolve_target, PortDefinition, PortDirection, TunnelLink};
use crate::core::processor::{ComponentProcessor, ProcessIo, ProcessOutcome};
use crate::core::resources::{ResourceManager, ResourceNotice};
use crate::core::state::ComponentState;

#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerTimeouts {
    pub(crate) population: Duration,
    pub(crate) release: Duration,
}

pub(crate) fn spawn(
    inner: Arc<ComponentInner>,
    rx: Receiver<WorkItem>,
    shutdown_rx: Receiver<()>,
    resources: Arc<ResourceManager>,
    timeouts: WorkerTimeouts,
) -> Result<JoinHandle<()>> {
    let (port_count, has_outputs) = {
        let ports = inner.ports.lock();
        (ports.len(), ports.iter().any(|p| p.def.is_output()))
    };

    let worker = Worker {
        id: inner.id.clone(),
        processor: Arc::clone(&inner.processor),
        inner,
        rx,
        shutdown_rx,
        resources,
        timeouts,
        queues: (0..port_count).map(|_| VecDeque::new()).collect(),
        parked: (0..port_count).map(|_| VecDeque::new()).collect(),
        pending_marks: (0..port_count).map(|_| VecDeque::new()).collect(),
        carried_marks: VecDeque::new(),
        deferred: VecDeque::new(),
        has_outputs,
        active: false,
        awaiting_grant: false,
        grant_lost: false,
        shutting_down: false,
        held: None,
    };

    std::thread::Builder::new()
        .name(format!("omx-{}", worker.id))
        .spawn(move || worker.run())
        .map_err(|e| {
            tracing::error!("Failed to spawn component worker: {}", e);
            OmxError::InsufficientResources
        })
}

struct Worker {
    id: ComponentId,
    inner: Arc<ComponentInner>,
    processor: Arc<Mutex<Box<dyn ComponentProcessor>>>,
    rx: Receiver<WorkItem>,
    shutdown_rx: Receiver<()>,
    resources: Arc<ResourceManager>,
    timeouts: WorkerTimeouts,
    /// Per port, in receipt order: filled buffers on inputs, empty buffers on outputs.
    queues: Vec<VecDeque<BufferHeader>>,
    /// Buffers of a supplying input port kept home while they cannot be sent.
    parked: Vec<VecDeque<BufferHeader>>,
    /// Marks waiting for the next buffer accepted on an input port.
    pending_marks: Vec<VecDeque<Mark>>,
    /// Marks for other components, attached to the next emitted output.
    carried_marks: VecDeque<Mark>,
    deferred: VecDeque<WorkItem>,
    has_outputs: bool,
    /// Executing or Pause: buffers are accepted and tunnel traffic flows.
    active: bool,
    awaiting_grant: bool,
    grant_lost: bool,
    shutting_down: bool,
    /// Completions and errors of the state command in progress, emitted once
    /// the projected state is settled.
    held: Option<Vec<Event>>,
}

impl Worker {
    fn run(mut self) {
        tracing::debug!("[{}] Worker started", self.id);

        while !self.shutting_down {
            let item = match self.deferred.pop_front() {
                Some(item) => item,
                None => {
                    let rx = self.rx.clone();
                    let shutdown_rx = self.shutdown_rx.clone();
                    crossbeam_channel::select! {
                        recv(shutdown_rx) -> _ => break,
                        recv(rx) -> msg => match msg {
                            Ok(item) => item,
                            Err(_) => break,
                        },
                    }
                }
            };

            self.handle(item);
            self.run_processor();
        }

        self.teardown();
        tracing::debug!("[{}] Worker stopped", self.id);
    }

    fn handle(&mut self, item: WorkItem) {
        match item {
            WorkItem::Command(command) => self.execute(command),
            WorkItem::EmptyThisBuffer(buffer) => {
                self.accept_from_controller(buffer, PortDirection::Input)
            }
            WorkItem::FillThisBuffer(buffer) => {
                self.accept_from_controller(buffer, PortDirection::Output)
            }
            WorkItem::Resources(notice) => self.on_resources(notice),
            other => self.handle_tunnel(other),
        }
    }

    /// Items that never wait behind a transition in progress.
    fn handle_tunnel(&mut self, item: WorkItem) {
        match item {
            WorkItem::TunnelFilled(buffer) => self.on_tunnel_filled(buffer),
            WorkItem::TunnelEmptied(buffer) => self.on_tunnel_emptied(buffer),
            WorkItem::TunnelHome(buffer) => self.on_tunnel_home(buffer),
            WorkItem::TunnelResume(port) => self.resume_supplier(port),
            WorkItem::Wake => {}
            other => self.deferred.push_back(other),
        }
    }

    /// Pump the work queue until `ready` holds or `timeout` elapses.
    fn wait_until(&mut self, timeout: Duration, ready: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let rx = self.rx.clone();
        let shutdown_rx = self.shutdown_rx.clone();

        loop {
            if ready(&*self) {
                return true;
            }
            if self.shutting_down {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            crossbeam_channel::select! {
                recv(shutdown_rx) -> _ => self.shutting_down = true,
                recv(rx) -> msg => match msg {
                    Ok(item) => self.handle_tunnel(item),
                    Err(_) => self.shutting_down = true,
                },
                default(remaining) => {}
            }
        }
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    fn execute(&mut self, command: Command) {
        tracing::debug!("[{}] Executing {:?}", self.id, command);

        match command {
            Command::StateSet(target) => {
                self.held = Some(Vec::new());
                self.change_state(target);
                let held = self.held.take().unwrap_or_default();
                self.inner.finish_state_command();
                for event in held {
                    self.inner.emit(event);
                }
            }
            Command::Flush(target) => {
                for port in self.targets(target) {
                    self.flush_port(port);
                    if self.active {
                        self.resume_port(port);
                    }
                    self.complete(CommandComplete::Flush(port));
                }
            }
            Command::PortDisable(target) => {
                for port in self.targets(target) {
                    self.disable_port(port);
                }
            }
            Command::PortEnable(target) => {
                for port in self.targets(target) {
                    self.enable_port(port);
                }
            }
            Command::MarkBuffer { port, mark } => match self.pending_marks.get_mut(port as usize) {
                Some(marks) => {
                    marks.push_back(mark);
                    self.complete(CommandComplete::MarkBuffer(port));
                }
                None => self.report(OmxError::BadPortIndex),
            },
            Command::Extension { code, param } => {
                let result = self.processor.lock().vendor_command(code, param);
                match result {
                    Ok(()) => self.complete(CommandComplete::Extension(code)),
                    Err(e) => self.report(e),
                }
            }
        }
    }

    fn targets(&mut self, target: u32) -> Vec<u32> {
        match resolve_target(target, self.queues.len()) {
            Ok(ports) => ports,
            Err(e) => {
                self.report(e);
                Vec::new()
            }
        }
    }

    fn change_state(&mut self, target: ComponentState) {
        use ComponentState::*;

        let current = self.inner.state();
        if let Err(e) = current.check_transition(target) {
            tracing::warn!(
                "[{}] StateSet({}) rejected in {}: {}",
                self.id,
                target,
                current,
                e
            );
            self.report(e);
            return;
        }

        match (current, target) {
            (Loaded, Idle) => self.load_to_idle(),
            (Loaded, WaitForResources) => self.enter_wait_for_resources(),
            (WaitForResources, Loaded) => self.leave_wait_for_resources(),
            (Idle, Loaded) => self.idle_to_loaded(),
            (Idle, Executing) => self.start(),
            (Executing, Pause) | (Pause, Executing) => {
                self.inner.set_state(target);
                self.complete(CommandComplete::StateSet(target));
            }
            (Executing | Pause, Idle) => {
                if self.stop() {
                    self.complete(CommandComplete::StateSet(Idle));
                }
            }
            _ => self.report(OmxError::IncorrectStateTransition),
        }
    }

    fn load_to_idle(&mut self) {
        let demand = self.resource_demand();
        if let Err(e) = self.resources.reserve(&self.id, demand) {
            tracing::warn!(
                "[{}] Cannot reserve {} bytes, staying in Loaded",
                self.id,
                demand
            );
            self.report(e);
            return;
        }

        match self.acquire_and_populate() {
            Ok(()) => {
                self.inner.set_state(ComponentState::Idle);
                self.complete(CommandComplete::StateSet(ComponentState::Idle));
            }
            Err(e) => self.report(e),
        }
    }

    /// Second half of `Loaded -> Idle`, with the grant already reserved.
    /// Rolls back completely on failure.
    fn acquire_and_populate(&mut self) -> Result<()> {
        let defs = self.definitions();
        let acquired = self.processor.lock().acquire_resources(&defs);
        if let Err(e) = acquired {
            tracing::warn!("[{}] Processor failed to acquire resources: {}", self.id, e);
            self.resources.release(&self.id);
            return Err(e);
        }

        let ports = self.enabled_ports();
        if let Err(e) = self.populate(&ports) {
            tracing::warn!("[{}] Population failed, rolling back to Loaded", self.id);
            self.depopulate(&ports);
            self.processor.lock().release_resources();
            self.resources.release(&self.id);
            return Err(e);
        }

        self.grant_lost = false;
        Ok(())
    }

    fn enter_wait_for_resources(&mut self) {
        let demand = self.resource_demand();
        match self.resources.wait_for(&self.id, demand) {
            Ok(()) => {
                self.awaiting_grant = true;
                self.inner.set_state(ComponentState::WaitForResources);
                self.complete(CommandComplete::StateSet(ComponentState::WaitForResources));
            }
            Err(e) => self.report(e),
        }
    }

    fn leave_wait_for_resources(&mut self) {
        self.awaiting_grant = false;
        if !self.resources.cancel_wait(&self.id) {
            // Granted but not yet consumed.
            self.resources.release(&self.id);
        }
        self.inner.set_state(ComponentState::Loaded);
        self.complete(CommandComplete::StateSet(ComponentState::Loaded));
    }

    fn idle_to_loaded(&mut self) {
        let ports = self.enabled_ports();
        let release = self.timeouts.release;
        if !self.wait_until(release, |w| w.all_released(&ports)) {
            tracing::warn!(
                "[{}] Ports still populated after {:?}, staying in Idle",
                self.id,
                release
            );
            self.report(OmxError::PortUnresponsiveDuringDeallocation);
            return;
        }

        self.depopulate(&ports);
        self.processor.lock().release_resources();
        self.resources.release(&self.id);
        self.grant_lost = false;
        self.inner.set_state(ComponentState::Loaded);
        self.complete(CommandComplete::StateSet(ComponentState::Loaded));
    }

    fn start(&mut self) {
        if self.grant_lost {
            let demand = self.resource_demand();
            if let Err(e) = self.resources.reserve(&self.id, demand) {
                tracing::warn!("[{}] Resources still unavailable, staying in Idle", self.id);
                self.report(e);
                return;
            }
            self.grant_lost = false;
        }

        self.inner.set_state(ComponentState::Executing);
        self.active = true;
        for port in self.enabled_ports() {
            self.resume_port(port);
        }
        self.complete(CommandComplete::StateSet(ComponentState::Executing));
    }

    /// `Executing | Pause -> Idle`. Returns false if supplied buffers did not
    /// come home in time; the component is in `Idle` either way.
    fn stop(&mut self) -> bool {
        self.active = false;
        for port in 0..self.queues.len() as u32 {
            self.flush_port(port);
        }

        let ports: Vec<u32> = (0..self.queues.len() as u32).collect();
        let home = self.wait_until(self.timeouts.release, |w| w.suppliers_home(&ports));
        self.inner.set_state(ComponentState::Idle);
        if !home {
            tracing::warn!("[{}] Tunneled buffers did not return on stop", self.id);
            self.report(OmxError::PortUnresponsiveDuringStop);
        }
        home
    }

    fn disable_port(&mut self, port: u32) {
        let enabled = self.inner.ports.lock()[port as usize].def.enabled;
        if !enabled {
            self.inner.ports.lock()[port as usize].disable_pending = false;
            self.complete(CommandComplete::PortDisable(port));
            return;
        }

        self.inner.ports.lock()[port as usize].disabling = true;
        self.flush_port(port);
        let release = self.timeouts.release;
        if !self.wait_until(release, |w| w.all_released(&[port])) {
            {
                let mut ports = self.inner.ports.lock();
                let p = &mut ports[port as usize];
                p.disable_pending = false;
                p.disabling = false;
            }
            tracing::warn!("[{}] Port {} buffers not freed, disable aborted", self.id, port);
            self.report(OmxError::PortUnresponsiveDuringDeallocation);
            return;
        }

        self.depopulate(&[port]);
        {
            let mut ports = self.inner.ports.lock();
            let p = &mut ports[port as usize];
            p.def.enabled = false;
            p.disable_pending = false;
            p.disabling = false;
        }
        if !self.inner.state().below_idle() {
            self.resize_grant();
        }
        tracing::debug!("[{}] Port {} disabled", self.id, port);
        self.complete(CommandComplete::PortDisable(port));
    }

    fn enable_port(&mut self, port: u32) {
        let enabled = self.inner.ports.lock()[port as usize].def.enabled;
        let state = self.inner.state();
        if enabled || state.below_idle() {
            {
                let mut ports = self.inner.ports.lock();
                let p = &mut ports[port as usize];
                p.def.enabled = true;
                p.enable_pending = false;
            }
            self.complete(CommandComplete::PortEnable(port));
            return;
        }

        if let Err(e) = self.resources.reserve(&self.id, self.resource_demand()) {
            self.inner.ports.lock()[port as usize].enable_pending = false;
            self.report(e);
            return;
        }
        self.grant_lost = false;

        match self.populate(&[port]) {
            Ok(()) => {
                {
                    let mut ports = self.inner.ports.lock();
                    let p = &mut ports[port as usize];
                    p.def.enabled = true;
                    p.enable_pending = false;
                }
                if self.active {
                    self.resume_port(port);
                }
                tracing::debug!("[{}] Port {} enabled", self.id, port);
                self.complete(CommandComplete::PortEnable(port));
            }
            Err(e) => {
                self.depopulate(&[port]);
                self.inner.ports.lock()[port as usize].enable_pending = false;
                self.resize_grant();
                self.report(e);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Population
    // ---------------------------------------------------------------------

    fn populate(&mut self, ports: &[u32]) -> Result<()> {
        for &port in ports {
            self.allocate_tunnel_buffers(port)?;
        }

        let population = self.timeouts.population;
        if self.wait_until(population, |w| w.all_populated(ports)) {
            Ok(())
        } else {
            tracing::warn!(
                "[{}] Ports {:?} not populated after {:?}",
                self.id,
                ports,
                population
            );
            Err(OmxError::PortUnresponsiveDuringAllocation)
        }
    }

    /// Allocate the buffers of a supplying port and register them on both ends.
    fn allocate_tunnel_buffers(&mut self, port: u32) -> Result<()> {
        let (link, missing, size, is_output) = {
            let ports = self.inner.ports.lock();
            let p = &ports[port as usize];
            match &p.tunnel {
                Some(link) if link.supplier => (
                    link.clone(),
                    (p.def.buffer_count_actual as usize).saturating_sub(p.slots.len()),
                    p.def.buffer_size,
                    p.def.is_output(),
                ),
                _ => return Ok(()),
            }
        };
        let peer = link
            .peer
            .upgrade()
            .ok_or(OmxError::PortUnresponsiveDuringAllocation)?;

        for _ in 0..missing {
            let mut buffer =
                BufferHeader::new(vec![0u8; size].into_boxed_slice(), BufferAllocator::Component);
            if is_output {
                buffer.set_output_port_index(port);
                buffer.set_input_port_index(link.peer_port);
            } else {
                buffer.set_input_port_index(port);
                buffer.set_output_port_index(link.peer_port);
            }

            self.inner.ports.lock()[port as usize].register(
                buffer.id(),
                size,
                BufferAllocator::Component,
            )?;
            let registered = match peer.ports.lock().get_mut(link.peer_port as usize) {
                Some(peer_port) => {
                    peer_port.register(buffer.id(), size, BufferAllocator::Component)
                }
                None => Err(OmxError::BadPortIndex),
            };
            if let Err(e) = registered {
                self.inner.ports.lock()[port as usize].unregister(buffer.id());
                peer.enqueue(WorkItem::Wake);
                return Err(e);
            }

            if is_output {
                self.queues[port as usize].push_back(buffer);
            } else {
                self.parked[port as usize].push_back(buffer);
            }
        }

        tracing::trace!(
            "[{}] Port {}: supplied {} buffers to {}",
            self.id,
            port,
            missing,
            link.peer_id
        );
        peer.enqueue(WorkItem::Wake);
        Ok(())
    }

    /// Free every buffer this component supplied on `ports`.
    fn depopulate(&mut self, ports: &[u32]) {
        for &port in ports {
            let Some(link) = self.tunnel(port).filter(|l| l.supplier) else {
                continue;
            };

            let mut home: Vec<BufferHeader> = self.queues[port as usize].drain(..).collect();
            home.extend(self.parked[port as usize].drain(..));

            {
                let mut own = self.inner.ports.lock();
                for buffer in &home {
                    own[port as usize].unregister(buffer.id());
                }
            }
            if let Some(peer) = link.peer.upgrade() {
                if let Some(peer_port) = peer.ports.lock().get_mut(link.peer_port as usize) {
                    for buffer in &home {
                        peer_port.unregister(buffer.id());
                    }
                }
                peer.enqueue(WorkItem::Wake);
            }
            tracing::trace!("[{}] Port {}: freed {} supplied buffers", self.id, port, home.len());
        }
    }

    fn all_populated(&self, ports: &[u32]) -> bool {
        let guard = self.inner.ports.lock();
        ports.iter().all(|&i| guard[i as usize].is_populated())
    }

    /// Non-supplier ports hold no buffers and every supplied buffer is home.
    fn all_released(&self, ports: &[u32]) -> bool {
        let guard = self.inner.ports.lock();
        ports.iter().all(|&i| {
            let p = &guard[i as usize];
            if p.is_supplier() {
                self.home_count(i) >= p.slots.len()
            } else {
                p.is_unpopulated()
            }
        })
    }

    fn suppliers_home(&self, ports: &[u32]) -> bool {
        let guard = self.inner.ports.lock();
        ports.iter().all(|&i| {
            let p = &guard[i as usize];
            !p.is_supplier() || self.home_count(i) >= p.slots.len()
        })
    }

    fn home_count(&self, port: u32) -> usize {
        self.queues[port as usize].len() + self.parked[port as usize].len()
    }

    // ---------------------------------------------------------------------
    // Resources
    // ---------------------------------------------------------------------

    fn resource_demand(&self) -> u64 {
        let ports: u64 = self
            .inner
            .ports
            .lock()
            .iter()
            .filter(|p| p.def.enabled || p.enable_pending)
            .map(|p| p.def.resource_bytes())
            .sum();
        ports + self.processor.lock().extra_resource_bytes()
    }

    /// Match the grant to the current demand after a port came or went.
    /// A preempted component holds no grant and does not get one back here.
    fn resize_grant(&mut self) {
        if self.grant_lost {
            return;
        }
        if let Err(e) = self.resources.reserve(&self.id, self.resource_demand()) {
            tracing::warn!("[{}] Could not resize resource grant: {}", self.id, e);
        }
    }

    fn on_resources(&mut self, notice: ResourceNotice) {
        match notice {
            ResourceNotice::Granted => {
                if !self.awaiting_grant {
                    return;
                }
                self.awaiting_grant = false;
                tracing::debug!("[{}] Resources granted", self.id);
                match self.acquire_and_populate() {
                    Ok(()) => {
                        self.inner.set_state(ComponentState::Idle);
                        self.inner.emit(Event::ResourcesAcquired);
                    }
                    Err(e) => {
                        self.inner.set_state(ComponentState::Loaded);
                        self.report(e);
                    }
                }
            }
            ResourceNotice::Preempted => {
                self.grant_lost = true;
                match self.inner.state() {
                    ComponentState::Executing | ComponentState::Pause => {
                        self.report(OmxError::ResourcesPreempted);
                        self.stop();
                    }
                    ComponentState::Idle => self.report(OmxError::ResourcesLost),
                    _ => {}
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Buffer flow
    // ---------------------------------------------------------------------

    fn accept_from_controller(&mut self, buffer: BufferHeader, direction: PortDirection) {
        let port = match direction {
            PortDirection::Input => buffer.input_port_index(),
            PortDirection::Output => buffer.output_port_index(),
        };
        if !self.inner.state().is_running() || !self.accepts(port) {
            tracing::warn!(
                "[{}] {} arrived on port {} in {}, returning it",
                self.id,
                buffer.id(),
                port,
                self.inner.state()
            );
            self.report(OmxError::IncorrectStateOperation);
            match direction {
                PortDirection::Input => self.inner.dispatcher.empty_buffer_done(buffer),
                PortDirection::Output => self.inner.dispatcher.fill_buffer_done(buffer),
            }
            return;
        }

        match direction {
            PortDirection::Input => self.queue_input(port, buffer),
            PortDirection::Output => self.queues[port as usize].push_back(buffer),
        }
    }

    fn queue_input(&mut self, port: u32, mut buffer: BufferHeader) {
        if buffer.mark().is_none() {
            if let Some(mark) = self.pending_marks[port as usize].pop_front() {
                buffer.set_mark(mark);
            }
        }
        tracing::trace!("[{}] Port {}: queued {}", self.id, port, buffer.id());
        self.queues[port as usize].push_back(buffer);
    }

    fn on_tunnel_filled(&mut self, buffer: BufferHeader) {
        let port = buffer.input_port_index();
        if !self.owns(port, &buffer) {
            self.reject_foreign(buffer);
            return;
        }
        if self.active && self.accepts(port) {
            self.queue_input(port, buffer);
        } else {
            self.release_input(port, buffer);
        }
    }

    fn on_tunnel_emptied(&mut self, buffer: BufferHeader) {
        let port = buffer.output_port_index();
        if !self.owns(port, &buffer) {
            self.reject_foreign(buffer);
            return;
        }
        let supplier = self.tunnel(port).is_some_and(|l| l.supplier);
        if supplier || (self.active && self.accepts(port)) {
            self.queues[port as usize].push_back(buffer);
        } else {
            self.release_output(port, buffer);
        }
    }

    fn on_tunnel_home(&mut self, mut buffer: BufferHeader) {
        let port = buffer.input_port_index();
        if !self.owns(port, &buffer) {
            self.reject_foreign(buffer);
            return;
        }
        buffer.clear();
        self.parked[port as usize].push_back(buffer);
    }

    /// A tunnel delivered a buffer this port never registered.
    fn reject_foreign(&mut self, buffer: BufferHeader) {
        tracing::error!("[{}] Unknown buffer {} from tunnel", self.id, buffer.id());
        drop(buffer);
        self.enter_invalid(OmxError::Undefined);
    }

    /// Let buffers flow on a tunneled port again after start, enable or flush.
    fn resume_port(&mut self, port: u32) {
        let Some(link) = self.tunnel(port) else {
            return;
        };
        if link.supplier {
            self.resume_supplier(port);
        } else if let Some(peer) = link.peer.upgrade() {
            peer.enqueue(WorkItem::TunnelResume(link.peer_port));
        }
    }

    /// Send parked input buffers to the peer output for filling.
    fn resume_supplier(&mut self, port: u32) {
        if !self.active || !self.accepts(port) {
            return;
        }
        let Some(link) = self.tunnel(port).filter(|l| l.supplier) else {
            return;
        };
        let Some(peer) = link.peer.upgrade() else {
            return;
        };
        while let Some(buffer) = self.parked[port as usize].pop_front() {
            peer.enqueue(WorkItem::TunnelEmptied(buffer));
        }
    }

    fn run_processor(&mut self) {
        while !self.shutting_down && self.inner.state() == ComponentState::Executing {
            if self.queues.iter().all(VecDeque::is_empty) {
                return;
            }

            let defs = self.processing_view();
            let (result, outcomes) = {
                let mut io = ProcessIo::new(&defs, &mut self.queues);
                let result = self.processor.lock().process(&mut io);
                (result, io.into_outcomes())
            };
            let progressed = outcomes
                .iter()
                .any(|o| !matches!(o, ProcessOutcome::Event(_)));
            self.apply(outcomes);

            if let Err(e) = result {
                if e.is_stream_error() {
                    tracing::warn!("[{}] Stream error: {}", self.id, e);
                    self.report(e);
                } else {
                    self.enter_invalid(e);
                    return;
                }
            }
            if !progressed {
                return;
            }
        }
    }

    fn apply(&mut self, outcomes: Vec<ProcessOutcome>) {
        for outcome in outcomes {
            match outcome {
                ProcessOutcome::InputDone(buffer) => self.complete_input(buffer),
                ProcessOutcome::OutputReady(buffer) => self.complete_output(buffer),
                ProcessOutcome::Event(event) => self.inner.emit(event),
            }
        }
    }

    /// The processor consumed an input buffer.
    fn complete_input(&mut self, mut buffer: BufferHeader) {
        let port = buffer.input_port_index();
        if let Some(mark) = buffer.take_mark() {
            if mark.target == self.id {
                tracing::debug!("[{}] Mark {} reached its target", self.id, mark.data);
                self.inner.emit(Event::Mark { data: mark.data });
            } else {
                self.carried_marks.push_back(mark);
            }
        }
        if buffer.is_eos() && !self.has_outputs {
            tracing::debug!("[{}] End of stream consumed on port {}", self.id, port);
            self.inner.emit(Event::BufferFlag {
                port,
                flags: buffer.flags(),
            });
        }
        self.release_input(port, buffer);
    }

    /// The processor filled an output buffer.
    fn complete_output(&mut self, mut buffer: BufferHeader) {
        let port = buffer.output_port_index();
        if buffer.mark().is_none() {
            if let Some(mark) = self.carried_marks.pop_front() {
                buffer.set_mark(mark);
            }
        }
        if buffer.is_eos() {
            tracing::debug!("[{}] End of stream emitted on port {}", self.id, port);
            self.inner.emit(Event::BufferFlag {
                port,
                flags: buffer.flags(),
            });
        }

        match self.tunnel(port) {
            None => self.inner.dispatcher.fill_buffer_done(buffer),
            Some(link) => match link.peer.upgrade() {
                Some(peer) => peer.enqueue(WorkItem::TunnelFilled(buffer)),
                None if link.supplier => {
                    buffer.clear();
                    self.queues[port as usize].push_back(buffer);
                }
                None => tracing::warn!("[{}] Tunnel peer gone, dropping {}", self.id, buffer.id()),
            },
        }
    }

    /// Send an input buffer back to whoever fills it.
    fn release_input(&mut self, port: u32, mut buffer: BufferHeader) {
        buffer.clear();
        match self.tunnel(port) {
            None => self.inner.dispatcher.empty_buffer_done(buffer),
            Some(link) => {
                let send = !link.supplier || (self.active && self.accepts(port));
                match link.peer.upgrade() {
                    Some(peer) if send => peer.enqueue(WorkItem::TunnelEmptied(buffer)),
                    _ if link.supplier => self.parked[port as usize].push_back(buffer),
                    _ => tracing::warn!("[{}] Tunnel peer gone, dropping {}", self.id, buffer.id()),
                }
            }
        }
    }

    /// Send an unfilled output buffer back to its owner.
    fn release_output(&mut self, port: u32, mut buffer: BufferHeader) {
        buffer.clear();
        match self.tunnel(port) {
            None => self.inner.dispatcher.fill_buffer_done(buffer),
            Some(link) if link.supplier => self.queues[port as usize].push_back(buffer),
            Some(link) => match link.peer.upgrade() {
                Some(peer) => peer.enqueue(WorkItem::TunnelHome(buffer)),
                None => tracing::warn!("[{}] Tunnel peer gone, dropping {}", self.id, buffer.id()),
            },
        }
    }

    /// Return every buffer queued on `port` to its owner, in receipt order.
    fn flush_port(&mut self, port: u32) {
        let defs = self.definitions();
        let outcomes = {
            let mut io = ProcessIo::new(&defs, &mut self.queues);
            self.processor.lock().flush(port, &mut io);
            io.into_outcomes()
        };
        self.apply(outcomes);
        self.drain_port(port);
        tracing::trace!("[{}] Port {} flushed", self.id, port);
    }

    fn drain_port(&mut self, port: u32) {
        let (is_input, supplier) = {
            let ports = self.inner.ports.lock();
            let p = &ports[port as usize];
            (p.def.is_input(), p.is_supplier())
        };
        if !is_input && supplier {
            // Already home.
            return;
        }

        let queued: Vec<BufferHeader> = self.queues[port as usize].drain(..).collect();
        for buffer in queued {
            if is_input {
                self.release_input(port, buffer);
            } else {
                self.release_output(port, buffer);
            }
        }
    }

    fn enter_invalid(&mut self, error: OmxError) {
        tracing::error!("[{}] Unrecoverable error, entering Invalid: {}", self.id, error);
        self.active = false;
        for port in 0..self.queues.len() as u32 {
            self.drain_port(port);
        }
        {
            let mut status = self.inner.status.lock();
            status.state = ComponentState::Invalid;
            status.projected = ComponentState::Invalid;
        }
        self.report(OmxError::InvalidState);
    }

    fn teardown(&mut self) {
        let state = self.inner.state();
        self.active = false;
        for port in 0..self.queues.len() as u32 {
            self.drain_port(port);
        }
        if matches!(
            state,
            ComponentState::Idle | ComponentState::Executing | ComponentState::Pause
        ) {
            self.processor.lock().release_resources();
        }
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn tunnel(&self, port: u32) -> Option<TunnelLink> {
        self.inner
            .ports
            .lock()
            .get(port as usize)
            .and_then(|p| p.tunnel.clone())
    }

    fn accepts(&self, port: u32) -> bool {
        self.inner
            .ports
            .lock()
            .get(port as usize)
            .is_some_and(|p| p.accepts_buffers())
    }

    fn owns(&self, port: u32, buffer: &BufferHeader) -> bool {
        self.inner
            .ports
            .lock()
            .get(port as usize)
            .is_some_and(|p| p.owns(buffer.id()))
    }

    fn enabled_ports(&self) -> Vec<u32> {
        self.inner
            .ports
            .lock()
            .iter()
            .filter(|p| p.def.enabled)
            .map(|p| p.index())
            .collect()
    }

    fn definitions(&self) -> Vec<PortDefinition> {
        self.inner.ports.lock().iter().map(|p| p.definition()).collect()
    }

    /// Definitions as the processor sees them: ports being disabled are hidden.
    fn processing_view(&self) -> Vec<PortDefinition> {
        self.inner
            .ports
            .lock()
            .iter()
            .map(|p| {
                let mut def = p.definition();
                def.enabled = p.accepts_buffers();
                def
            })
            .collect()
    }

    fn complete(&mut self, completed: CommandComplete) {
        tracing::debug!("[{}] Completed {:?}", self.id, completed);
        self.notify(Event::CmdComplete(completed));
    }

    fn report(&mut self, error: OmxError) {
        self.notify(Event::Error(error));
    }

    fn notify(&mut self, event: Event) {
        match self.held.as_mut() {
            Some(held) => held.push(event),
            None => self.inner.emit(event),
        }
    }
}
