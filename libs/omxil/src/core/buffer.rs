// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer headers: the ownership token that moves between controller and component.
//!
//! A [`BufferHeader`] is never shared. Whoever holds the value owns the payload
//! and its bookkeeping fields; handing it to `empty_this_buffer` /
//! `fill_this_buffer` moves it into the component until the matching done
//! callback moves it back.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::core::component::ComponentId;
use crate::core::error::{OmxError, Result};
use crate::core::port::NO_PORT;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Arena handle of a buffer. Ports index their buffer records by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BufferId(u64);

impl BufferId {
    pub(crate) fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

bitflags! {
    /// Per-buffer flags. Values are wire compatible.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct BufferFlags: u32 {
        /// Last buffer emitted on the port.
        const EOS = 0x0000_0001;
        /// First buffer of a stream carrying the start time.
        const START_TIME = 0x0000_0002;
        /// Decode but do not render.
        const DECODE_ONLY = 0x0000_0004;
        /// Payload is known to be corrupt.
        const DATA_CORRUPT = 0x0000_0008;
        /// Buffer ends a frame.
        const END_OF_FRAME = 0x0000_0010;
    }
}

/// Party that allocated the payload memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferAllocator {
    /// Memory came from the controller (`use_buffer`).
    Controller,
    /// Memory was allocated by a component (`allocate_buffer`, tunnel supplier).
    Component,
}

/// Observation mark carried by a buffer until it reaches `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mark {
    pub target: ComponentId,
    pub data: u64,
}

impl Mark {
    pub fn new(target: ComponentId, data: u64) -> Self {
        Self { target, data }
    }
}

/// Metadata and payload of one media buffer.
///
/// Invariant: `offset + filled_len <= alloc_len`, enforced by every mutator.
pub struct BufferHeader {
    id: BufferId,
    data: Box<[u8]>,
    allocator: BufferAllocator,
    filled_len: usize,
    offset: usize,
    timestamp: i64,
    duration: i64,
    tick_count: u32,
    flags: BufferFlags,
    input_port_index: u32,
    output_port_index: u32,
    mark: Option<Mark>,
    app_private: Option<Box<dyn Any + Send>>,
}

impl BufferHeader {
    pub(crate) fn new(data: Box<[u8]>, allocator: BufferAllocator) -> Self {
        Self {
            id: BufferId::next(),
            data,
            allocator,
            filled_len: 0,
            offset: 0,
            timestamp: 0,
            duration: 0,
            tick_count: 0,
            flags: BufferFlags::empty(),
            input_port_index: NO_PORT,
            output_port_index: NO_PORT,
            mark: None,
            app_private: None,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn allocator(&self) -> BufferAllocator {
        self.allocator
    }

    /// Allocated capacity in bytes.
    pub fn alloc_len(&self) -> usize {
        self.data.len()
    }

    pub fn filled_len(&self) -> usize {
        self.filled_len
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Valid data: `offset..offset + filled_len`.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.filled_len]
    }

    /// Whole allocation, for producers writing in place before `set_range`.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Declare the valid data range.
    pub fn set_range(&mut self, offset: usize, filled_len: usize) -> Result<()> {
        match offset.checked_add(filled_len) {
            Some(end) if end <= self.data.len() => {
                self.offset = offset;
                self.filled_len = filled_len;
                Ok(())
            }
            _ => Err(OmxError::BadParameter),
        }
    }

    /// Replace the payload with `bytes`, starting at offset 0.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.data.len() {
            return Err(OmxError::Overflow);
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.offset = 0;
        self.filled_len = bytes.len();
        Ok(())
    }

    /// Append `bytes` after the current payload.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let start = self.offset + self.filled_len;
        let end = start.checked_add(bytes.len()).ok_or(OmxError::Overflow)?;
        if end > self.data.len() {
            return Err(OmxError::Overflow);
        }
        self.data[start..end].copy_from_slice(bytes);
        self.filled_len += bytes.len();
        Ok(())
    }

    /// Mark the buffer as empty. Flags and timing are reset too.
    pub fn clear(&mut self) {
        self.offset = 0;
        self.filled_len = 0;
        self.flags = BufferFlags::empty();
        self.timestamp = 0;
        self.duration = 0;
    }

    /// Timestamp in microsecond ticks.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn set_duration(&mut self, duration: i64) {
        self.duration = duration;
    }

    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    pub fn set_tick_count(&mut self, tick_count: u32) {
        self.tick_count = tick_count;
    }

    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: BufferFlags) {
        self.flags = flags;
    }

    pub fn insert_flags(&mut self, flags: BufferFlags) {
        self.flags.insert(flags);
    }

    pub fn is_eos(&self) -> bool {
        self.flags.contains(BufferFlags::EOS)
    }

    pub fn input_port_index(&self) -> u32 {
        self.input_port_index
    }

    pub fn output_port_index(&self) -> u32 {
        self.output_port_index
    }

    pub(crate) fn set_input_port_index(&mut self, port: u32) {
        self.input_port_index = port;
    }

    pub(crate) fn set_output_port_index(&mut self, port: u32) {
        self.output_port_index = port;
    }

    pub fn mark(&self) -> Option<&Mark> {
        self.mark.as_ref()
    }

    pub fn set_mark(&mut self, mark: Mark) {
        self.mark = Some(mark);
    }

    pub fn take_mark(&mut self) -> Option<Mark> {
        self.mark.take()
    }

    /// Controller bookkeeping attached to this buffer.
    pub fn app_private(&self) -> Option<&(dyn Any + Send)> {
        self.app_private.as_deref()
    }

    pub fn set_app_private(&mut self, value: Box<dyn Any + Send>) {
        self.app_private = Some(value);
    }

    pub fn take_app_private(&mut self) -> Option<Box<dyn Any + Send>> {
        self.app_private.take()
    }
}

impl fmt::Debug for BufferHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferHeader")
            .field("id", &self.id)
            .field("alloc_len", &self.data.len())
            .field("filled_len", &self.filled_len)
            .field("offset", &self.offset)
            .field("timestamp", &self.timestamp)
            .field("flags", &self.flags)
            .field("input_port_index", &self.input_port_index)
            .field("output_port_index", &self.output_port_index)
            .field("mark", &self.mark)
            .finish_non_exhaustive()
    }
}
