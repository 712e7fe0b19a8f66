// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Demo pipeline: the controller feeds a passthrough whose output is
//! tunneled into a sink, then tears everything down again.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::Receiver;
use omxil::processors::{PASSTHROUGH_COMPONENT, SINK_COMPONENT, SINK_STATS_INDEX};
use omxil::{
    BufferFlags, BufferHeader, ChannelCallbacks, Command, CommandComplete, Component,
    ComponentId, ComponentNotification, ComponentState, Core, CoreConfig, Event, Notification,
    OmxError, Param, ParamIndex,
};

/// Frame duration used for timestamps, in microseconds.
const FRAME_US: i64 = 33_333;

/// Controller state for one run.
struct Session {
    rx: Receiver<ComponentNotification>,
    timeout: Duration,
    /// Filter input buffers currently owned by the controller.
    free: Vec<BufferHeader>,
    /// Events that arrived while waiting for something else.
    events: Vec<(ComponentId, Event)>,
}

impl Session {
    fn next(&self) -> Result<ComponentNotification> {
        self.rx
            .recv_timeout(self.timeout)
            .map_err(|_| anyhow!("No callback within {:?}", self.timeout))
    }

    /// Bookkeeping for a callback nobody is waiting on.
    fn absorb(&mut self, n: ComponentNotification) -> Result<()> {
        match n.notification {
            Notification::EmptyBufferDone(buffer) => self.free.push(buffer),
            Notification::FillBufferDone(buffer) => {
                tracing::debug!("[{}] Unexpected output buffer {}", n.component, buffer.id());
            }
            Notification::Event(Event::Error(e)) => {
                bail!("Component {} reported an error: {}", n.component, e)
            }
            Notification::Event(event) => {
                tracing::debug!("[{}] {:?}", n.component, event);
                self.events.push((n.component, event));
            }
        }
        Ok(())
    }

    fn await_event(&mut self, component: &Component, expected: &Event) -> Result<()> {
        let seen = self
            .events
            .iter()
            .position(|(id, event)| id == component.id() && event == expected);
        if let Some(pos) = seen {
            self.events.remove(pos);
            return Ok(());
        }

        loop {
            let n = self.next()?;
            let hit = &n.component == component.id()
                && matches!(&n.notification, Notification::Event(event) if event == expected);
            if hit {
                return Ok(());
            }
            self.absorb(n)?;
        }
    }

    fn await_complete(&mut self, component: &Component, completed: CommandComplete) -> Result<()> {
        self.await_event(component, &Event::CmdComplete(completed))
    }

    fn transition(&mut self, component: &Component, target: ComponentState) -> Result<()> {
        component.send_command(Command::StateSet(target))?;
        self.await_complete(component, CommandComplete::StateSet(target))?;
        tracing::info!("{} -> {}", component.name(), target);
        Ok(())
    }

    /// Block until `count` input buffers are back with the controller.
    fn reclaim(&mut self, count: usize) -> Result<()> {
        while self.free.len() < count {
            let n = self.next()?;
            self.absorb(n)?;
        }
        Ok(())
    }
}

fn port_definition(component: &Component, port: u32) -> Result<omxil::PortDefinition> {
    match component.get_parameter(ParamIndex::PortDefinition(port))? {
        Param::PortDefinition(def) => Ok(def),
        other => bail!("Unexpected parameter {:?}", other),
    }
}

/// Grow both filter ports so a `size` byte payload fits.
fn fit_buffers(filter: &Component, size: usize) -> Result<()> {
    for port in 0..filter.port_count() {
        let mut def = port_definition(filter, port)?;
        if def.buffer_size < size {
            def.buffer_size = size;
            filter.set_parameter(Param::PortDefinition(def))?;
        }
    }
    Ok(())
}

pub fn run(config_dir: &Path, buffers: usize, size: usize, timeout_secs: u64) -> Result<()> {
    if buffers == 0 {
        bail!("--buffers must be at least 1");
    }

    let core = Core::new(CoreConfig::load_or_default(config_dir));
    let (callbacks, rx) = ChannelCallbacks::new();
    let callbacks = Arc::new(callbacks);

    let filter = core
        .create_component(PASSTHROUGH_COMPONENT, callbacks.clone())
        .context("Failed to create passthrough")?;
    let sink = core
        .create_component(SINK_COMPONENT, callbacks)
        .context("Failed to create sink")?;
    fit_buffers(&filter, size)?;

    let supplier = core.setup_tunnel(&filter, 1, &sink, 0)?;
    tracing::info!("Tunnel {}:1 -> {}:0, {:?} supplies", filter.id(), sink.id(), supplier);

    let mut session = Session {
        rx,
        timeout: Duration::from_secs(timeout_secs),
        free: Vec::new(),
        events: Vec::new(),
    };

    // Loaded -> Idle: the controller populates the filter input, the tunnel
    // populates itself.
    filter.send_command(Command::StateSet(ComponentState::Idle))?;
    sink.send_command(Command::StateSet(ComponentState::Idle))?;
    let input = port_definition(&filter, 0)?;
    for _ in 0..input.buffer_count_actual {
        session
            .free
            .push(filter.allocate_buffer(0, input.buffer_size)?);
    }
    let pool = session.free.len();
    session.await_complete(&filter, CommandComplete::StateSet(ComponentState::Idle))?;
    session.await_complete(&sink, CommandComplete::StateSet(ComponentState::Idle))?;

    // Downstream first so nothing reaches a stopped sink.
    session.transition(&sink, ComponentState::Executing)?;
    session.transition(&filter, ComponentState::Executing)?;

    let started = Instant::now();
    for frame in 0..buffers {
        session.reclaim(1)?;
        let Some(mut buffer) = session.free.pop() else {
            bail!("No input buffer available");
        };
        let payload = vec![(frame % 251) as u8; size];
        buffer.write(&payload)?;
        buffer.set_timestamp(frame as i64 * FRAME_US);
        buffer.set_duration(FRAME_US);
        if frame + 1 == buffers {
            buffer.set_flags(BufferFlags::EOS);
        }
        filter
            .empty_this_buffer(buffer)
            .map_err(OmxError::from)?;
    }

    session.await_event(
        &sink,
        &Event::BufferFlag {
            port: 0,
            flags: BufferFlags::EOS,
        },
    )?;
    let elapsed = started.elapsed();

    let stats = match sink.get_parameter(ParamIndex::Vendor(SINK_STATS_INDEX))? {
        Param::Vendor { value, .. } => value,
        other => bail!("Unexpected parameter {:?}", other),
    };

    // Executing -> Idle -> Loaded, upstream first so tunneled buffers come home.
    session.reclaim(pool)?;
    session.transition(&filter, ComponentState::Idle)?;
    session.transition(&sink, ComponentState::Idle)?;
    filter.send_command(Command::StateSet(ComponentState::Loaded))?;
    sink.send_command(Command::StateSet(ComponentState::Loaded))?;
    for buffer in session.free.drain(..) {
        filter.free_buffer(buffer).map_err(OmxError::from)?;
    }
    session.await_complete(&filter, CommandComplete::StateSet(ComponentState::Loaded))?;
    session.await_complete(&sink, CommandComplete::StateSet(ComponentState::Loaded))?;

    core.teardown_tunnel(&filter, 1, &sink, 0)?;
    filter.destroy().map_err(|rejected| rejected.error)?;
    sink.destroy().map_err(|rejected| rejected.error)?;

    println!("Streamed {} buffers of {} bytes in {:?}", buffers, size, elapsed);
    println!("  sink buffers:        {}", stats["buffers"]);
    println!("  sink bytes:          {}", stats["bytes"]);
    println!("  end of streams:      {}", stats["end_of_streams"]);
    println!("  last timestamp (us): {}", stats["last_timestamp"]);

    Ok(())
}
