// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde_json::json;

use crate::core::error::{OmxError, Result};
use crate::core::params::VENDOR_PARAM_START;
use crate::core::port::{PortDefinition, PortDomain};
use crate::core::processor::{ComponentProcessor, ProcessIo};
use crate::register_component;

pub const PASSTHROUGH_COMPONENT: &str = "OMX.omxil.passthrough";

/// Vendor parameter reporting `{"forwarded": n, "truncated": n}`.
pub const PASSTHROUGH_STATS_INDEX: u32 = VENDOR_PARAM_START + 0x10;

const INPUT: u32 = 0;
const OUTPUT: u32 = 1;

/// Copies each input payload into an output buffer: port 0 in, port 1 out.
///
/// Timestamp, duration, tick count and flags are carried over. A payload
/// larger than the output buffer is truncated and reported as `Overflow`.
#[derive(Debug)]
pub struct PassthroughProcessor {
    domain: PortDomain,
    buffer_count: u32,
    buffer_size: usize,
    forwarded: u64,
    truncated: u64,
}

impl PassthroughProcessor {
    pub fn new(domain: PortDomain, buffer_count: u32, buffer_size: usize) -> Self {
        Self {
            domain,
            buffer_count,
            buffer_size,
            forwarded: 0,
            truncated: 0,
        }
    }

    pub fn create() -> Box<dyn ComponentProcessor> {
        Box::new(Self::default())
    }
}

impl Default for PassthroughProcessor {
    fn default() -> Self {
        Self::new(
            PortDomain::Other,
            PortDefinition::DEFAULT_BUFFER_COUNT,
            PortDefinition::DEFAULT_BUFFER_SIZE,
        )
    }
}

impl ComponentProcessor for PassthroughProcessor {
    fn ports(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition::input(INPUT, self.domain)
                .with_buffers(self.buffer_count, self.buffer_size),
            PortDefinition::output(OUTPUT, self.domain)
                .with_buffers(self.buffer_count, self.buffer_size),
        ]
    }

    fn process(&mut self, io: &mut ProcessIo<'_>) -> Result<()> {
        while io.input_available(INPUT) > 0 && io.output_available(OUTPUT) > 0 {
            let (Some(input), Some(mut output)) = (io.pop_input(INPUT), io.pop_output(OUTPUT))
            else {
                break;
            };

            let payload = input.payload();
            let len = payload.len().min(output.alloc_len());
            output.write(&payload[..len])?;
            output.set_timestamp(input.timestamp());
            output.set_duration(input.duration());
            output.set_tick_count(input.tick_count());
            output.set_flags(input.flags());

            if len < payload.len() {
                self.truncated += 1;
                io.report_error(OmxError::Overflow);
            }
            self.forwarded += 1;

            io.return_input(input);
            io.emit_output(output);
        }
        Ok(())
    }

    fn get_vendor_parameter(&self, index: u32) -> Result<serde_json::Value> {
        match index {
            PASSTHROUGH_STATS_INDEX => Ok(json!({
                "forwarded": self.forwarded,
                "truncated": self.truncated,
            })),
            _ => Err(OmxError::UnsupportedIndex),
        }
    }
}

register_component!(
    PASSTHROUGH_COMPONENT,
    ["filter.passthrough"],
    PassthroughProcessor::create
);
