// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Process-wide resource budget shared by all components of a core.
//!
//! A component reserves the bytes of its buffer pools on `Loaded -> Idle`
//! and gives them back on `Idle -> Loaded` or destruction. Components parked
//! in `WaitForResources` queue up here and are granted in FIFO order as
//! budget frees up.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::component::ComponentId;
use crate::core::error::{OmxError, Result};

/// Asynchronous outcome delivered to a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceNotice {
    /// A queued wait was satisfied; the grant is already reserved.
    Granted,
    /// The grant was revoked.
    Preempted,
}

pub(crate) type ResourceNotifier = Arc<dyn Fn(ResourceNotice) + Send + Sync>;

struct Waiter {
    component: ComponentId,
    demand: u64,
}

#[derive(Default)]
struct ResourceState {
    granted: HashMap<ComponentId, u64>,
    waiters: VecDeque<Waiter>,
    notifiers: HashMap<ComponentId, ResourceNotifier>,
}

impl ResourceState {
    fn used(&self) -> u64 {
        self.granted.values().sum()
    }

    /// Grant queued waiters that fit, strictly in arrival order.
    fn grant_waiters(&mut self, budget: u64) -> Vec<ResourceNotifier> {
        let mut woken = Vec::new();
        while let Some(front) = self.waiters.front() {
            if self.used() + front.demand > budget {
                break;
            }
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            tracing::debug!(
                "[{}] Resources granted to waiter ({} bytes)",
                waiter.component,
                waiter.demand
            );
            self.granted.insert(waiter.component.clone(), waiter.demand);
            if let Some(notifier) = self.notifiers.get(&waiter.component) {
                woken.push(Arc::clone(notifier));
            }
        }
        woken
    }
}

/// Byte budget with FIFO waiters and preemption.
pub struct ResourceManager {
    budget: u64,
    state: Mutex<ResourceState>,
}

impl ResourceManager {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            state: Mutex::new(ResourceState::default()),
        }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn available(&self) -> u64 {
        self.budget.saturating_sub(self.state.lock().used())
    }

    /// Bytes currently granted to `component`.
    pub fn granted(&self, component: &ComponentId) -> u64 {
        self.state.lock().granted.get(component).copied().unwrap_or(0)
    }

    /// Number of components parked in `WaitForResources`.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    pub(crate) fn attach(&self, component: &ComponentId, notifier: ResourceNotifier) {
        self.state.lock().notifiers.insert(component.clone(), notifier);
    }

    /// Forget `component` entirely, returning its grant to the pool.
    pub(crate) fn detach(&self, component: &ComponentId) {
        let woken = {
            let mut state = self.state.lock();
            state.notifiers.remove(component);
            state.waiters.retain(|w| &w.component != component);
            state.granted.remove(component);
            state.grant_waiters(self.budget)
        };
        notify_all(woken, ResourceNotice::Granted);
    }

    /// Set the grant of `component` to `bytes`, failing without side effects
    /// if the budget cannot cover it.
    pub(crate) fn reserve(&self, component: &ComponentId, bytes: u64) -> Result<()> {
        let mut state = self.state.lock();
        let current = state.granted.get(component).copied().unwrap_or(0);
        let others = state.used() - current;
        if others.saturating_add(bytes) > self.budget {
            tracing::debug!(
                "[{}] Reservation of {} bytes refused ({} of {} in use)",
                component,
                bytes,
                others,
                self.budget
            );
            return Err(OmxError::InsufficientResources);
        }
        state.granted.insert(component.clone(), bytes);
        Ok(())
    }

    pub(crate) fn release(&self, component: &ComponentId) {
        let woken = {
            let mut state = self.state.lock();
            if state.granted.remove(component).is_none() {
                return;
            }
            state.grant_waiters(self.budget)
        };
        notify_all(woken, ResourceNotice::Granted);
    }

    /// Queue `component` for `demand` bytes. Granted immediately if it is the
    /// only waiter and the budget allows.
    pub(crate) fn wait_for(&self, component: &ComponentId, demand: u64) -> Result<()> {
        if demand > self.budget {
            return Err(OmxError::InsufficientResources);
        }
        let woken = {
            let mut state = self.state.lock();
            state.waiters.retain(|w| &w.component != component);
            state.waiters.push_back(Waiter {
                component: component.clone(),
                demand,
            });
            state.grant_waiters(self.budget)
        };
        notify_all(woken, ResourceNotice::Granted);
        Ok(())
    }

    /// Leave the wait queue. Returns false when the wait was already granted.
    pub(crate) fn cancel_wait(&self, component: &ComponentId) -> bool {
        let mut state = self.state.lock();
        let before = state.waiters.len();
        state.waiters.retain(|w| &w.component != component);
        state.waiters.len() != before
    }

    /// Revoke the grant of `component`.
    ///
    /// The component is told asynchronously and drops to `Idle`.
    pub fn preempt(&self, component: &ComponentId) -> Result<()> {
        let (notifier, woken) = {
            let mut state = self.state.lock();
            if state.granted.remove(component).is_none() {
                return Err(OmxError::BadParameter);
            }
            let notifier = state.notifiers.get(component).cloned();
            (notifier, state.grant_waiters(self.budget))
        };
        tracing::info!("[{}] Resources preempted", component);
        if let Some(notifier) = notifier {
            notifier(ResourceNotice::Preempted);
        }
        notify_all(woken, ResourceNotice::Granted);
        Ok(())
    }
}

fn notify_all(notifiers: Vec<ResourceNotifier>, notice: ResourceNotice) {
    for notifier in notifiers {
        notifier(notice);
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResourceManager")
            .field("budget", &self.budget)
            .field("used", &state.used())
            .field("waiters", &state.waiters.len())
            .finish()
    }
}
