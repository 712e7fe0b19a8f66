// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Parameter indices understood by every component.
//!
//! Only the structures the state machine itself depends on are modelled.
//! Codec specific parameters go through `Vendor` indices and are handled by
//! the processor.

use serde::{Deserialize, Serialize};

use crate::core::port::{BufferSupplier, PortDefinition};

/// First index reserved for vendor parameters.
pub const VENDOR_PARAM_START: u32 = 0x7F00_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamIndex {
    PortDefinition(u32),
    BufferSupplier(u32),
    PriorityMgmt,
    Vendor(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriorityMgmt {
    pub group_priority: u32,
    pub group_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    PortDefinition(PortDefinition),
    BufferSupplier { port: u32, supplier: BufferSupplier },
    PriorityMgmt(PriorityMgmt),
    Vendor { index: u32, value: serde_json::Value },
}

impl Param {
    pub fn index(&self) -> ParamIndex {
        match self {
            Self::PortDefinition(def) => ParamIndex::PortDefinition(def.index),
            Self::BufferSupplier { port, .. } => ParamIndex::BufferSupplier(*port),
            Self::PriorityMgmt(_) => ParamIndex::PriorityMgmt,
            Self::Vendor { index, .. } => ParamIndex::Vendor(*index),
        }
    }

    /// Port the parameter applies to, if any.
    pub fn port(&self) -> Option<u32> {
        match self.index() {
            ParamIndex::PortDefinition(port) | ParamIndex::BufferSupplier(port) => Some(port),
            ParamIndex::PriorityMgmt | ParamIndex::Vendor(_) => None,
        }
    }
}
