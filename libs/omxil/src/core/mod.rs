// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod buffer;
pub mod callbacks;
pub mod command;
pub mod component;
pub mod config;
pub mod error;
pub mod events;
pub mod omx_core;
pub mod params;
pub mod port;
pub mod processor;
pub mod processors;
pub mod registry;
pub mod resources;
pub mod state;
pub mod tunnel;

pub use buffer::{BufferAllocator, BufferFlags, BufferHeader, BufferId, Mark};
pub use callbacks::{ChannelCallbacks, ComponentCallbacks, ComponentNotification, Notification};
pub use command::{Command, CommandComplete};
pub use component::{Component, ComponentId, ComponentVersion, DestroyRejected, SPEC_VERSION};
pub use config::CoreConfig;
pub use error::{OmxError, RejectedBuffer, Result};
pub use events::Event;
pub use omx_core::{core, deinit, init, Core};
pub use params::{Param, ParamIndex, PriorityMgmt};
pub use port::{BufferSupplier, PortDefinition, PortDirection, PortDomain, ALL_PORTS, NO_PORT};
pub use processor::{ComponentProcessor, ProcessIo};
pub use processors::{PassthroughProcessor, SinkProcessor, SinkStats};
pub use registry::{ComponentFactory, ComponentRegistration, ComponentRegistry};
pub use resources::ResourceManager;
pub use state::ComponentState;
