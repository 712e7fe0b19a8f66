// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Component state machine types.
//!
//! ```text
//!                      StateSet(WaitForResources)
//!        ┌────────┐ ──────────────────────────► ┌──────────────────┐
//!        │ Loaded │                             │ WaitForResources │
//!        └────────┘ ◄────────────────────────── └──────────────────┘
//!          │    ▲        StateSet(Loaded)               │
//!  Idle    │    │ Loaded                                │ resources acquired
//!          ▼    │                                       ▼
//!        ┌────────┐ ◄──────────────────────────────────────
//!        │  Idle  │
//!        └────────┘ ◄──────────────┐
//!          │    ▲                  │ Idle
//!  Exec    │    │ Idle             │
//!          ▼    │                  │
//!       ┌───────────┐  Pause   ┌───────┐
//!       │ Executing │ ───────► │ Pause │
//!       └───────────┘ ◄─────── └───────┘
//!                     Executing
//!
//! Invalid: entered on unrecoverable internal corruption, terminal.
//! ```

use serde::{Deserialize, Serialize};

use crate::core::error::{OmxError, Result};

/// State of a component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ComponentState {
    /// Internal data is corrupt. Only destruction is possible.
    Invalid = 0,
    /// Created, no resources held.
    Loaded = 1,
    /// Resources acquired and ports populated, not processing.
    Idle = 2,
    /// Processing buffers.
    Executing = 3,
    /// Buffers accepted and queued, processing suspended.
    Pause = 4,
    /// Waiting for the resource manager to grant resources.
    WaitForResources = 5,
}

impl Default for ComponentState {
    fn default() -> Self {
        Self::Loaded
    }
}

impl ComponentState {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::Loaded),
            2 => Ok(Self::Idle),
            3 => Ok(Self::Executing),
            4 => Ok(Self::Pause),
            5 => Ok(Self::WaitForResources),
            _ => Err(OmxError::BadParameter),
        }
    }

    /// Buffers may be exchanged with the controller.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Executing | Self::Pause)
    }

    /// Port buffer pools may be mutated by the controller.
    pub fn below_idle(self) -> bool {
        matches!(self, Self::Loaded | Self::WaitForResources)
    }

    /// Validate a controller requested transition.
    ///
    /// `WaitForResources -> Idle` is component initiated and therefore not a
    /// legal command.
    pub fn check_transition(self, to: ComponentState) -> Result<()> {
        if self == Self::Invalid {
            return Err(OmxError::InvalidState);
        }
        if self == to {
            return Err(OmxError::SameState);
        }
        match (self, to) {
            (Self::Loaded, Self::Idle)
            | (Self::Loaded, Self::WaitForResources)
            | (Self::WaitForResources, Self::Loaded)
            | (Self::Idle, Self::Loaded)
            | (Self::Idle, Self::Executing)
            | (Self::Executing, Self::Idle)
            | (Self::Executing, Self::Pause)
            | (Self::Pause, Self::Idle)
            | (Self::Pause, Self::Executing) => Ok(()),
            _ => Err(OmxError::IncorrectStateTransition),
        }
    }
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid => write!(f, "Invalid"),
            Self::Loaded => write!(f, "Loaded"),
            Self::Idle => write!(f, "Idle"),
            Self::Executing => write!(f, "Executing"),
            Self::Pause => write!(f, "Pause"),
            Self::WaitForResources => write!(f, "WaitForResources"),
        }
    }
}
