// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Reference processors shipped with the crate.

mod passthrough;
mod sink;

pub use passthrough::{PassthroughProcessor, PASSTHROUGH_COMPONENT, PASSTHROUGH_STATS_INDEX};
pub use sink::{SinkProcessor, SinkStats, SINK_COMPONENT, SINK_STATS_INDEX};
