// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use crate::core::buffer::BufferFlags;
use crate::core::command::CommandComplete;
use crate::core::error::OmxError;

/// Wire codes of the event kinds.
pub mod codes {
    pub const CMD_COMPLETE: u32 = 0;
    pub const ERROR: u32 = 1;
    pub const MARK: u32 = 2;
    pub const PORT_SETTINGS_CHANGED: u32 = 3;
    pub const BUFFER_FLAG: u32 = 4;
    pub const RESOURCES_ACQUIRED: u32 = 5;
}

/// Events a component reports to its controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A previously sent command finished.
    CmdComplete(CommandComplete),
    /// Asynchronous failure.
    Error(OmxError),
    /// A marked buffer reached its target component.
    Mark { data: u64 },
    /// The port definition changed; the controller should re-read it.
    PortSettingsChanged { port: u32 },
    /// A buffer flag (end of stream) was detected on `port`.
    BufferFlag { port: u32, flags: BufferFlags },
    /// Resources were granted and the component moved `WaitForResources -> Idle`.
    ResourcesAcquired,
}

impl Event {
    pub fn code(&self) -> u32 {
        match self {
            Self::CmdComplete(_) => codes::CMD_COMPLETE,
            Self::Error(_) => codes::ERROR,
            Self::Mark { .. } => codes::MARK,
            Self::PortSettingsChanged { .. } => codes::PORT_SETTINGS_CHANGED,
            Self::BufferFlag { .. } => codes::BUFFER_FLAG,
            Self::ResourcesAcquired => codes::RESOURCES_ACQUIRED,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}
