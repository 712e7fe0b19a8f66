// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use crate::core::buffer::BufferHeader;
use crate::core::command::Command;
use crate::core::resources::ResourceNotice;

/// Items on a component's FIFO work queue.
///
/// Controller calls and tunnel peers only ever enqueue; the worker thread is
/// the single consumer and the only place component state moves.
#[derive(Debug)]
pub(crate) enum WorkItem {
    Command(Command),
    /// Filled buffer from the controller for an input port.
    EmptyThisBuffer(BufferHeader),
    /// Empty buffer from the controller for an output port.
    FillThisBuffer(BufferHeader),
    /// Filled buffer from the peer's output for one of our input ports.
    TunnelFilled(BufferHeader),
    /// Consumed buffer from the peer's input for one of our output ports.
    TunnelEmptied(BufferHeader),
    /// Unfilled buffer handed back by a non-supplier output to our supplying input.
    TunnelHome(BufferHeader),
    /// The peer of our supplying `port` can take buffers again.
    TunnelResume(u32),
    Resources(ResourceNotice),
    /// Port registrations changed; re-check whatever the worker is waiting on.
    Wake,
}
