// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use crate::core::error::{OmxError, Result};
use crate::core::params::VENDOR_PARAM_START;
use crate::core::port::{PortDefinition, PortDomain};
use crate::core::processor::{ComponentProcessor, ProcessIo};
use crate::register_component;

pub const SINK_COMPONENT: &str = "OMX.omxil.sink";

/// Vendor parameter holding [`SinkStats`] as JSON.
pub const SINK_STATS_INDEX: u32 = VENDOR_PARAM_START + 0x20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkStats {
    pub buffers: u64,
    pub bytes: u64,
    pub end_of_streams: u64,
    pub last_timestamp: i64,
}

/// Consumes every buffer on port 0 and keeps counters.
#[derive(Debug)]
pub struct SinkProcessor {
    domain: PortDomain,
    stats: SinkStats,
}

impl SinkProcessor {
    pub fn new(domain: PortDomain) -> Self {
        Self {
            domain,
            stats: SinkStats::default(),
        }
    }

    pub fn create() -> Box<dyn ComponentProcessor> {
        Box::new(Self::new(PortDomain::Other))
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }
}

impl ComponentProcessor for SinkProcessor {
    fn ports(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::input(0, self.domain)]
    }

    fn process(&mut self, io: &mut ProcessIo<'_>) -> Result<()> {
        while let Some(buffer) = io.pop_input(0) {
            self.stats.buffers += 1;
            self.stats.bytes += buffer.filled_len() as u64;
            self.stats.last_timestamp = buffer.timestamp();
            if buffer.is_eos() {
                self.stats.end_of_streams += 1;
            }
            io.return_input(buffer);
        }
        Ok(())
    }

    fn get_vendor_parameter(&self, index: u32) -> Result<serde_json::Value> {
        match index {
            SINK_STATS_INDEX => serde_json::to_value(self.stats).map_err(|e| {
                OmxError::Configuration(format!("Failed to encode sink stats: {}", e))
            }),
            _ => Err(OmxError::UnsupportedIndex),
        }
    }

    fn set_vendor_parameter(&mut self, index: u32, value: &serde_json::Value) -> Result<()> {
        match index {
            // Any write resets the counters.
            SINK_STATS_INDEX if value.is_null() || value.is_object() => {
                self.stats = SinkStats::default();
                Ok(())
            }
            SINK_STATS_INDEX => Err(OmxError::BadParameter),
            _ => Err(OmxError::UnsupportedIndex),
        }
    }
}

register_component!(SINK_COMPONENT, ["sink.null"], SinkProcessor::create);
