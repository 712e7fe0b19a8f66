// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::core::buffer::BufferHeader;

/// First code of the standard error range.
pub const ERROR_CODE_BASE: u32 = 0x8000_1000;

/// Inclusive range reserved for vendor specific errors.
pub const VENDOR_ERROR_MIN: u32 = 0x9000_0000;
pub const VENDOR_ERROR_MAX: u32 = 0x9000_FFFF;

/// Component error taxonomy.
///
/// Every variant maps to a fixed wire code (see [`OmxError::code`]). Parameter and
/// state errors are returned synchronously; resource and stream errors usually
/// travel through [`Event::Error`](crate::core::Event::Error).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OmxError {
    #[error("Insufficient resources")]
    InsufficientResources,

    #[error("Undefined error")]
    Undefined,

    #[error("Invalid component name")]
    InvalidComponentName,

    #[error("Component not found")]
    ComponentNotFound,

    #[error("Invalid component")]
    InvalidComponent,

    #[error("Bad parameter")]
    BadParameter,

    #[error("Not implemented")]
    NotImplemented,

    #[error("Buffer underflow")]
    Underflow,

    #[error("Buffer overflow")]
    Overflow,

    #[error("Hardware failure")]
    Hardware,

    #[error("Component is in the Invalid state")]
    InvalidState,

    #[error("Stream is corrupt")]
    StreamCorrupt,

    #[error("Ports are not compatible")]
    PortsNotCompatible,

    #[error("Resources lost")]
    ResourcesLost,

    #[error("No more items")]
    NoMore,

    #[error("Version mismatch")]
    VersionMismatch,

    #[error("Not ready")]
    NotReady,

    #[error("Timeout")]
    Timeout,

    #[error("Component is already in the requested state")]
    SameState,

    #[error("Resources preempted")]
    ResourcesPreempted,

    #[error("Port unresponsive during buffer allocation")]
    PortUnresponsiveDuringAllocation,

    #[error("Port unresponsive during buffer deallocation")]
    PortUnresponsiveDuringDeallocation,

    #[error("Port unresponsive during stop")]
    PortUnresponsiveDuringStop,

    #[error("Incorrect state transition")]
    IncorrectStateTransition,

    #[error("Operation not allowed in the current state")]
    IncorrectStateOperation,

    #[error("Unsupported setting")]
    UnsupportedSetting,

    #[error("Unsupported index")]
    UnsupportedIndex,

    #[error("Bad port index")]
    BadPortIndex,

    #[error("Port unpopulated")]
    PortUnpopulated,

    #[error("Vendor error {0:#010x}")]
    Vendor(u32),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, OmxError>;

impl OmxError {
    /// Wire code of this error.
    pub fn code(&self) -> u32 {
        match self {
            Self::InsufficientResources => 0x8000_1000,
            Self::Undefined => 0x8000_1001,
            Self::InvalidComponentName => 0x8000_1002,
            Self::ComponentNotFound => 0x8000_1003,
            Self::InvalidComponent => 0x8000_1004,
            Self::BadParameter => 0x8000_1005,
            Self::NotImplemented => 0x8000_1006,
            Self::Underflow => 0x8000_1007,
            Self::Overflow => 0x8000_1008,
            Self::Hardware => 0x8000_1009,
            Self::InvalidState => 0x8000_100A,
            Self::StreamCorrupt => 0x8000_100B,
            Self::PortsNotCompatible => 0x8000_100C,
            Self::ResourcesLost => 0x8000_100D,
            Self::NoMore => 0x8000_100E,
            Self::VersionMismatch => 0x8000_100F,
            Self::NotReady => 0x8000_1010,
            Self::Timeout => 0x8000_1011,
            Self::SameState => 0x8000_1012,
            Self::ResourcesPreempted => 0x8000_1013,
            Self::PortUnresponsiveDuringAllocation => 0x8000_1014,
            Self::PortUnresponsiveDuringDeallocation => 0x8000_1015,
            Self::PortUnresponsiveDuringStop => 0x8000_1016,
            Self::IncorrectStateTransition => 0x8000_1017,
            Self::IncorrectStateOperation => 0x8000_1018,
            Self::UnsupportedSetting => 0x8000_1019,
            Self::UnsupportedIndex => 0x8000_101A,
            Self::BadPortIndex => 0x8000_101B,
            Self::PortUnpopulated => 0x8000_101C,
            Self::Vendor(code) => *code,
            // Ambient failures have no dedicated code on the wire.
            Self::Configuration(_) => 0x8000_1001,
        }
    }

    /// Decode a wire error code. `0` (no error) and unknown codes yield `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        let err = match code {
            0x8000_1000 => Self::InsufficientResources,
            0x8000_1001 => Self::Undefined,
            0x8000_1002 => Self::InvalidComponentName,
            0x8000_1003 => Self::ComponentNotFound,
            0x8000_1004 => Self::InvalidComponent,
            0x8000_1005 => Self::BadParameter,
            0x8000_1006 => Self::NotImplemented,
            0x8000_1007 => Self::Underflow,
            0x8000_1008 => Self::Overflow,
            0x8000_1009 => Self::Hardware,
            0x8000_100A => Self::InvalidState,
            0x8000_100B => Self::StreamCorrupt,
            0x8000_100C => Self::PortsNotCompatible,
            0x8000_100D => Self::ResourcesLost,
            0x8000_100E => Self::NoMore,
            0x8000_100F => Self::VersionMismatch,
            0x8000_1010 => Self::NotReady,
            0x8000_1011 => Self::Timeout,
            0x8000_1012 => Self::SameState,
            0x8000_1013 => Self::ResourcesPreempted,
            0x8000_1014 => Self::PortUnresponsiveDuringAllocation,
            0x8000_1015 => Self::PortUnresponsiveDuringDeallocation,
            0x8000_1016 => Self::PortUnresponsiveDuringStop,
            0x8000_1017 => Self::IncorrectStateTransition,
            0x8000_1018 => Self::IncorrectStateOperation,
            0x8000_1019 => Self::UnsupportedSetting,
            0x8000_101A => Self::UnsupportedIndex,
            0x8000_101B => Self::BadPortIndex,
            0x8000_101C => Self::PortUnpopulated,
            VENDOR_ERROR_MIN..=VENDOR_ERROR_MAX => Self::Vendor(code),
            _ => return None,
        };
        Some(err)
    }

    /// Build a vendor error, rejecting codes outside the vendor range.
    pub fn vendor(code: u32) -> Result<Self> {
        if (VENDOR_ERROR_MIN..=VENDOR_ERROR_MAX).contains(&code) {
            Ok(Self::Vendor(code))
        } else {
            Err(Self::BadParameter)
        }
    }

    /// Errors in the data stream. Reported as events, the component keeps its state.
    pub fn is_stream_error(&self) -> bool {
        matches!(
            self,
            Self::StreamCorrupt | Self::Underflow | Self::Overflow | Self::Vendor(_)
        )
    }

    /// Errors that force the component into `Invalid`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Hardware | Self::InvalidState | Self::Undefined | Self::InvalidComponent
        )
    }
}

/// A buffer call that failed synchronously.
///
/// The header travels back to the caller so ownership is never lost.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct RejectedBuffer {
    pub error: OmxError,
    pub buffer: BufferHeader,
}

impl RejectedBuffer {
    pub fn new(error: OmxError, buffer: BufferHeader) -> Self {
        Self { error, buffer }
    }

    pub fn into_buffer(self) -> BufferHeader {
        self.buffer
    }
}

impl From<RejectedBuffer> for OmxError {
    fn from(rejected: RejectedBuffer) -> Self {
        rejected.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_start_at_base() {
        assert_eq!(OmxError::InsufficientResources.code(), ERROR_CODE_BASE);
        assert_eq!(OmxError::PortUnpopulated.code(), 0x8000_101C);
        assert_eq!(OmxError::SameState.code(), 0x8000_1012);
    }

    #[test]
    fn test_from_code_decodes_known_and_vendor_codes() {
        assert_eq!(
            OmxError::from_code(0x8000_1017),
            Some(OmxError::IncorrectStateTransition)
        );
        assert_eq!(
            OmxError::from_code(0x9000_0042),
            Some(OmxError::Vendor(0x9000_0042))
        );
        assert_eq!(OmxError::from_code(0), None);
        assert_eq!(OmxError::from_code(0x8000_2000), None);
    }

    #[test]
    fn test_vendor_range_is_enforced() {
        assert!(OmxError::vendor(0x9000_FFFF).is_ok());
        assert_eq!(OmxError::vendor(0x9001_0000), Err(OmxError::BadParameter));
        assert_eq!(OmxError::vendor(0x8000_1000), Err(OmxError::BadParameter));
    }

    #[test]
    fn test_error_classification() {
        assert!(OmxError::StreamCorrupt.is_stream_error());
        assert!(OmxError::Overflow.is_stream_error());
        assert!(!OmxError::InsufficientResources.is_stream_error());
        assert!(OmxError::Hardware.is_fatal());
        assert!(!OmxError::Underflow.is_fatal());
    }
}
