// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Shared controller harness for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use omxil::{
    BufferHeader, ChannelCallbacks, Command, CommandComplete, Component, ComponentId,
    ComponentNotification, ComponentState, Core, CoreConfig, Event, Notification, OmxError,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// Core with short timeouts so unresponsive-port paths finish quickly.
pub fn test_core(budget_bytes: u64) -> Core {
    let mut config = CoreConfig::default();
    config.resources.budget_bytes = budget_bytes;
    config.timeouts.port_population_ms = 300;
    config.timeouts.port_release_ms = 300;
    Core::new(config)
}

/// Controller side of one or more components: receives every callback and
/// keeps what a wait did not ask for, so nothing is lost between waits.
pub struct TestController {
    callbacks: ChannelCallbacks,
    rx: Receiver<ComponentNotification>,
    backlog: VecDeque<ComponentNotification>,
}

impl TestController {
    pub fn new() -> Self {
        let (callbacks, rx) = ChannelCallbacks::new();
        Self {
            callbacks,
            rx,
            backlog: VecDeque::new(),
        }
    }

    pub fn create(&self, core: &Core, name: &str) -> Component {
        core.create_component(name, Arc::new(self.callbacks.clone()))
            .unwrap()
    }

    /// Next notification from `component`, in delivery order.
    pub fn next_from(&mut self, component: &ComponentId) -> Notification {
        self.take(WAIT, |n| &n.component == component)
            .unwrap_or_else(|| panic!("no notification from {}", component))
    }

    pub fn wait_event(&mut self, component: &ComponentId, expected: &Event) {
        let found = self.take(WAIT, |n| {
            &n.component == component
                && matches!(&n.notification, Notification::Event(e) if e == expected)
        });
        assert!(found.is_some(), "{} never reported {:?}", component, expected);
    }

    pub fn wait_complete(&mut self, component: &ComponentId, completed: CommandComplete) {
        self.wait_event(component, &Event::CmdComplete(completed));
    }

    pub fn wait_error(&mut self, component: &ComponentId, error: OmxError) {
        self.wait_event(component, &Event::Error(error));
    }

    pub fn wait_empty_done(&mut self, component: &ComponentId) -> BufferHeader {
        match self.take(WAIT, |n| {
            &n.component == component && matches!(n.notification, Notification::EmptyBufferDone(_))
        }) {
            Some(Notification::EmptyBufferDone(buffer)) => buffer,
            _ => panic!("{} never returned an input buffer", component),
        }
    }

    pub fn wait_fill_done(&mut self, component: &ComponentId) -> BufferHeader {
        match self.take(WAIT, |n| {
            &n.component == component && matches!(n.notification, Notification::FillBufferDone(_))
        }) {
            Some(Notification::FillBufferDone(buffer)) => buffer,
            _ => panic!("{} never returned an output buffer", component),
        }
    }

    /// Events from `component` seen so far or arriving within `window`.
    pub fn drain_events(&mut self, component: &ComponentId, window: Duration) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(Notification::Event(event)) = self.take(window, |n| {
            &n.component == component && matches!(n.notification, Notification::Event(_))
        }) {
            events.push(event);
        }
        events
    }

    /// Whether a buffer callback from `component` is pending.
    pub fn has_buffer_done(&mut self, component: &ComponentId, window: Duration) -> bool {
        self.pump(window);
        self.backlog.iter().any(|n| {
            &n.component == component
                && matches!(
                    n.notification,
                    Notification::EmptyBufferDone(_) | Notification::FillBufferDone(_)
                )
        })
    }

    /// Drive `component` to `target` and wait for the completion.
    pub fn transition(&mut self, component: &Component, target: ComponentState) {
        component.send_command(Command::StateSet(target)).unwrap();
        self.wait_complete(component.id(), CommandComplete::StateSet(target));
        assert_eq!(component.get_state(), target);
    }

    fn take(
        &mut self,
        timeout: Duration,
        matches: impl Fn(&ComponentNotification) -> bool,
    ) -> Option<Notification> {
        if let Some(pos) = self.backlog.iter().position(&matches) {
            return self.backlog.remove(pos).map(|n| n.notification);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(n) if matches(&n) => return Some(n.notification),
                Ok(n) => self.backlog.push_back(n),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    fn pump(&mut self, window: Duration) {
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(n) => self.backlog.push_back(n),
                Err(_) => return,
            }
        }
    }
}

/// Allocate the full buffer count of `port` at the port's buffer size.
pub fn allocate_port(component: &Component, port: u32) -> Vec<BufferHeader> {
    let def = port_definition(component, port);
    (0..def.buffer_count_actual)
        .map(|_| component.allocate_buffer(port, def.buffer_size).unwrap())
        .collect()
}

pub fn port_definition(component: &Component, port: u32) -> omxil::PortDefinition {
    match component
        .get_parameter(omxil::ParamIndex::PortDefinition(port))
        .unwrap()
    {
        omxil::Param::PortDefinition(def) => def,
        other => panic!("unexpected parameter {:?}", other),
    }
}
