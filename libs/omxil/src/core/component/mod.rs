// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod component_id;
mod handle;
mod work;
mod worker;

pub use component_id::ComponentId;
pub use handle::{Component, ComponentVersion, DestroyRejected, SPEC_VERSION};

pub(crate) use handle::ComponentInner;
pub(crate) use work::WorkItem;
