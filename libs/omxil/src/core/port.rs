// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Ports: the data endpoints of a component.

use std::collections::HashMap;
use std::sync::Weak;

use serde::{Deserialize, Serialize};

use crate::core::buffer::{BufferAllocator, BufferId};
use crate::core::component::{ComponentId, ComponentInner};
use crate::core::error::{OmxError, Result};

/// Port index addressing every port of a component (flush, enable, disable).
pub const ALL_PORTS: u32 = 0xFFFF_FFFF;

/// Port index meaning "no port".
pub const NO_PORT: u32 = 0xFFFF_FFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDomain {
    Audio,
    Video,
    Image,
    Other,
}

/// Which side of a tunnel allocates the buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum BufferSupplier {
    #[default]
    Unspecified = 0,
    Input = 1,
    Output = 2,
}

/// Port definition, readable through `ParamIndex::PortDefinition`.
///
/// `enabled` and `populated` are reported by the component and ignored on set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub index: u32,
    pub direction: PortDirection,
    pub domain: PortDomain,
    pub buffer_count_min: u32,
    pub buffer_count_actual: u32,
    pub buffer_size: usize,
    pub enabled: bool,
    pub populated: bool,
    pub buffer_supplier: BufferSupplier,
}

impl PortDefinition {
    pub const DEFAULT_BUFFER_COUNT: u32 = 2;
    pub const DEFAULT_BUFFER_SIZE: usize = 4096;

    pub fn new(index: u32, direction: PortDirection, domain: PortDomain) -> Self {
        Self {
            index,
            direction,
            domain,
            buffer_count_min: 1,
            buffer_count_actual: Self::DEFAULT_BUFFER_COUNT,
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            enabled: true,
            populated: false,
            buffer_supplier: BufferSupplier::Unspecified,
        }
    }

    pub fn input(index: u32, domain: PortDomain) -> Self {
        Self::new(index, PortDirection::Input, domain)
    }

    pub fn output(index: u32, domain: PortDomain) -> Self {
        Self::new(index, PortDirection::Output, domain)
    }

    pub fn with_buffers(mut self, count: u32, size: usize) -> Self {
        self.buffer_count_actual = count;
        self.buffer_count_min = self.buffer_count_min.min(count);
        self.buffer_size = size;
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }

    /// Bytes reserved from the resource budget when this port is populated.
    pub fn resource_bytes(&self) -> u64 {
        self.buffer_count_actual as u64 * self.buffer_size as u64
    }
}

/// Record of one buffer registered on a port.
#[derive(Debug, Clone)]
pub(crate) struct BufferSlot {
    pub(crate) alloc_len: usize,
    pub(crate) allocator: BufferAllocator,
}

/// Negotiated tunnel, recorded on both ends.
#[derive(Debug, Clone)]
pub(crate) struct TunnelLink {
    pub(crate) peer: Weak<ComponentInner>,
    pub(crate) peer_id: ComponentId,
    pub(crate) peer_port: u32,
    /// This end allocates the buffers.
    pub(crate) supplier: bool,
}

/// Runtime state of a port, guarded by the component's port mutex.
#[derive(Debug)]
pub(crate) struct Port {
    pub(crate) def: PortDefinition,
    pub(crate) slots: HashMap<BufferId, BufferSlot>,
    pub(crate) enable_pending: bool,
    /// A `PortDisable` has been queued; closes the port to new submissions.
    pub(crate) disable_pending: bool,
    /// The worker is executing the disable.
    pub(crate) disabling: bool,
    pub(crate) tunnel: Option<TunnelLink>,
}

impl Port {
    pub(crate) fn new(def: PortDefinition) -> Self {
        Self {
            def,
            slots: HashMap::new(),
            enable_pending: false,
            disable_pending: false,
            disabling: false,
            tunnel: None,
        }
    }

    pub(crate) fn index(&self) -> u32 {
        self.def.index
    }

    pub(crate) fn is_populated(&self) -> bool {
        self.slots.len() >= self.def.buffer_count_actual as usize
    }

    pub(crate) fn is_unpopulated(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn is_tunneled(&self) -> bool {
        self.tunnel.is_some()
    }

    pub(crate) fn is_supplier(&self) -> bool {
        self.tunnel.as_ref().is_some_and(|t| t.supplier)
    }

    /// Takes buffer traffic already queued ahead of any disable.
    pub(crate) fn accepts_buffers(&self) -> bool {
        self.def.enabled && !self.disabling
    }

    /// Accepts new submissions from the controller.
    pub(crate) fn accepts_submissions(&self) -> bool {
        self.def.enabled && !self.disable_pending
    }

    /// Snapshot with the live `enabled`/`populated` flags.
    pub(crate) fn definition(&self) -> PortDefinition {
        let mut def = self.def.clone();
        def.populated = self.is_populated();
        def
    }

    pub(crate) fn register(
        &mut self,
        id: BufferId,
        alloc_len: usize,
        allocator: BufferAllocator,
    ) -> Result<()> {
        if alloc_len < self.def.buffer_size {
            return Err(OmxError::BadParameter);
        }
        if self.is_populated() {
            return Err(OmxError::IncorrectStateOperation);
        }
        self.slots.insert(id, BufferSlot { alloc_len, allocator });
        Ok(())
    }

    pub(crate) fn unregister(&mut self, id: BufferId) -> Option<BufferSlot> {
        self.slots.remove(&id)
    }

    pub(crate) fn owns(&self, id: BufferId) -> bool {
        self.slots.contains_key(&id)
    }
}

/// Expand a port target (`ALL_PORTS` or one index) into port indices.
pub(crate) fn resolve_target(target: u32, port_count: usize) -> Result<Vec<u32>> {
    if target == ALL_PORTS {
        return Ok((0..port_count as u32).collect());
    }
    if (target as usize) < port_count {
        Ok(vec![target])
    } else {
        Err(OmxError::BadPortIndex)
    }
}

/// Supplier negotiation: the input's explicit preference wins, then the
/// output's, and the output port supplies by default.
pub(crate) fn negotiate_supplier(output: BufferSupplier, input: BufferSupplier) -> BufferSupplier {
    match (input, output) {
        (BufferSupplier::Unspecified, BufferSupplier::Unspecified) => BufferSupplier::Output,
        (BufferSupplier::Unspecified, preference) => preference,
        (preference, _) => preference,
    }
}
