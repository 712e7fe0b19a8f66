// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use crate::core::buffer::Mark;
use crate::core::error::{OmxError, Result};
use crate::core::state::ComponentState;

/// Wire codes of the standard commands.
pub mod codes {
    pub const STATE_SET: u32 = 0;
    pub const FLUSH: u32 = 1;
    pub const PORT_DISABLE: u32 = 2;
    pub const PORT_ENABLE: u32 = 3;
    pub const MARK_BUFFER: u32 = 4;
    /// First code reserved for Khronos standard extensions.
    pub const KHRONOS_EXTENSIONS: u32 = 0x6F00_0000;
    /// First code reserved for vendor extensions.
    pub const VENDOR_START: u32 = 0x7F00_0000;
}

/// Commands accepted by `Component::send_command`.
///
/// Port targets accept [`ALL_PORTS`](crate::core::port::ALL_PORTS).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StateSet(ComponentState),
    Flush(u32),
    PortDisable(u32),
    PortEnable(u32),
    MarkBuffer { port: u32, mark: Mark },
    /// Extension command, `code >= 0x6F000000`. Executed by the processor.
    Extension { code: u32, param: u32 },
}

impl Command {
    pub fn code(&self) -> u32 {
        match self {
            Self::StateSet(_) => codes::STATE_SET,
            Self::Flush(_) => codes::FLUSH,
            Self::PortDisable(_) => codes::PORT_DISABLE,
            Self::PortEnable(_) => codes::PORT_ENABLE,
            Self::MarkBuffer { .. } => codes::MARK_BUFFER,
            Self::Extension { code, .. } => *code,
        }
    }

    /// Decode a raw `(command, param)` pair.
    ///
    /// `MarkBuffer` carries a structured payload and cannot be decoded this way.
    pub fn from_raw(code: u32, param: u32) -> Result<Self> {
        match code {
            codes::STATE_SET => Ok(Self::StateSet(ComponentState::from_code(param)?)),
            codes::FLUSH => Ok(Self::Flush(param)),
            codes::PORT_DISABLE => Ok(Self::PortDisable(param)),
            codes::PORT_ENABLE => Ok(Self::PortEnable(param)),
            codes::MARK_BUFFER => Err(OmxError::BadParameter),
            c if c >= codes::KHRONOS_EXTENSIONS => Ok(Self::Extension { code, param }),
            _ => Err(OmxError::UnsupportedIndex),
        }
    }

    pub fn extension(code: u32, param: u32) -> Result<Self> {
        if code < codes::KHRONOS_EXTENSIONS {
            return Err(OmxError::BadParameter);
        }
        Ok(Self::Extension { code, param })
    }
}

/// Payload of a command-complete event: which command finished, and its
/// state or port argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandComplete {
    StateSet(ComponentState),
    Flush(u32),
    PortDisable(u32),
    PortEnable(u32),
    MarkBuffer(u32),
    Extension(u32),
}

impl CommandComplete {
    pub fn command_code(&self) -> u32 {
        match self {
            Self::StateSet(_) => codes::STATE_SET,
            Self::Flush(_) => codes::FLUSH,
            Self::PortDisable(_) => codes::PORT_DISABLE,
            Self::PortEnable(_) => codes::PORT_ENABLE,
            Self::MarkBuffer(_) => codes::MARK_BUFFER,
            Self::Extension(code) => *code,
        }
    }
}
