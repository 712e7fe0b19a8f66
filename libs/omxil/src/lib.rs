// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! OpenMAX IL style media components.
//!
//! A [`Component`] is a state machine with input and output ports. The
//! controller drives it with [`Command`]s and moves [`BufferHeader`]s in and
//! out of it; the component answers through [`ComponentCallbacks`]. What a
//! component does with its buffers is supplied by a [`ComponentProcessor`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use omxil::{ChannelCallbacks, Command, ComponentState, Core, CoreConfig};
//!
//! let core = Core::new(CoreConfig::default());
//! let (callbacks, _events) = ChannelCallbacks::new();
//! let sink = core.create_component("OMX.omxil.sink", Arc::new(callbacks))?;
//! sink.send_command(Command::StateSet(ComponentState::Idle))?;
//! # Ok::<(), omxil::OmxError>(())
//! ```

// Re-export inventory for `register_component!`
pub use inventory;

pub mod core;

pub use crate::core::*;
