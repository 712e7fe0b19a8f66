// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Controller callbacks and the dispatcher that invokes them.
//!
//! A component never calls into the controller from its worker thread. The
//! worker enqueues notifications on a channel and a per-component dispatcher
//! thread drains it, so the worker never blocks on a slow controller and
//! callbacks arrive in the order their causes were processed.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::core::buffer::BufferHeader;
use crate::core::component::ComponentId;
use crate::core::error::{OmxError, Result};
use crate::core::events::Event;

/// Capability implemented by the controller.
///
/// Implementations must return quickly; heavy work belongs on another thread.
pub trait ComponentCallbacks: Send + Sync + 'static {
    fn on_event(&self, component: &ComponentId, event: Event);

    /// An input buffer was consumed and is owned by the controller again.
    fn empty_buffer_done(&self, component: &ComponentId, buffer: BufferHeader);

    /// An output buffer was filled and is owned by the controller again.
    fn fill_buffer_done(&self, component: &ComponentId, buffer: BufferHeader);
}

/// Everything a component reports, as a value.
#[derive(Debug)]
pub enum Notification {
    Event(Event),
    EmptyBufferDone(BufferHeader),
    FillBufferDone(BufferHeader),
}

/// Message delivered by [`ChannelCallbacks`].
#[derive(Debug)]
pub struct ComponentNotification {
    pub component: ComponentId,
    pub notification: Notification,
}

/// Callbacks that forward every notification into a channel.
#[derive(Clone)]
pub struct ChannelCallbacks {
    tx: Sender<ComponentNotification>,
}

impl ChannelCallbacks {
    pub fn new() -> (Self, Receiver<ComponentNotification>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    fn forward(&self, component: &ComponentId, notification: Notification) {
        let _ = self.tx.send(ComponentNotification {
            component: component.clone(),
            notification,
        });
    }
}

impl ComponentCallbacks for ChannelCallbacks {
    fn on_event(&self, component: &ComponentId, event: Event) {
        self.forward(component, Notification::Event(event));
    }

    fn empty_buffer_done(&self, component: &ComponentId, buffer: BufferHeader) {
        self.forward(component, Notification::EmptyBufferDone(buffer));
    }

    fn fill_buffer_done(&self, component: &ComponentId, buffer: BufferHeader) {
        self.forward(component, Notification::FillBufferDone(buffer));
    }
}

enum DispatchItem {
    Notify(Notification),
    Stop,
}

/// Sending half held by the component.
pub(crate) struct Dispatcher {
    tx: Sender<DispatchItem>,
}

impl Dispatcher {
    pub(crate) fn spawn(
        component: ComponentId,
        callbacks: Arc<dyn ComponentCallbacks>,
        slow_callback: Duration,
    ) -> Result<(Self, JoinHandle<()>)> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = std::thread::Builder::new()
            .name(format!("omx-cb-{}", component))
            .spawn(move || run_dispatch_loop(component, callbacks, rx, slow_callback))
            .map_err(|e| {
                tracing::error!("Failed to spawn callback dispatcher: {}", e);
                OmxError::InsufficientResources
            })?;
        Ok((Self { tx }, handle))
    }

    pub(crate) fn event(&self, event: Event) {
        self.notify(Notification::Event(event));
    }

    pub(crate) fn empty_buffer_done(&self, buffer: BufferHeader) {
        self.notify(Notification::EmptyBufferDone(buffer));
    }

    pub(crate) fn fill_buffer_done(&self, buffer: BufferHeader) {
        self.notify(Notification::FillBufferDone(buffer));
    }

    /// Deliver everything queued so far, then stop the dispatcher thread.
    pub(crate) fn stop(&self) {
        let _ = self.tx.send(DispatchItem::Stop);
    }

    fn notify(&self, notification: Notification) {
        if self.tx.send(DispatchItem::Notify(notification)).is_err() {
            tracing::warn!("Callback dispatcher is gone, notification dropped");
        }
    }
}

fn run_dispatch_loop(
    component: ComponentId,
    callbacks: Arc<dyn ComponentCallbacks>,
    rx: Receiver<DispatchItem>,
    slow_callback: Duration,
) {
    tracing::trace!("[{}] Callback dispatcher started", component);

    for item in rx {
        let notification = match item {
            DispatchItem::Notify(notification) => notification,
            DispatchItem::Stop => break,
        };

        let started = Instant::now();
        let kind = match notification {
            Notification::Event(event) => {
                callbacks.on_event(&component, event);
                "event"
            }
            Notification::EmptyBufferDone(buffer) => {
                callbacks.empty_buffer_done(&component, buffer);
                "empty_buffer_done"
            }
            Notification::FillBufferDone(buffer) => {
                callbacks.fill_buffer_done(&component, buffer);
                "fill_buffer_done"
            }
        };

        let elapsed = started.elapsed();
        if elapsed > slow_callback {
            tracing::warn!(
                "[{}] Slow {} callback: {:?} (limit {:?})",
                component,
                kind,
                elapsed,
                slow_callback
            );
        }
    }

    tracing::trace!("[{}] Callback dispatcher stopped", component);
}
