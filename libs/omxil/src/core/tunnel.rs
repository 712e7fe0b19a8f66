// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Direct port-to-port buffer exchange between two components.
//!
//! Setup negotiates which end supplies the buffers and records a
//! [`TunnelLink`] on both ports. From then on the controller only sends
//! commands; data moves between the two workers.

use std::sync::Arc;

use parking_lot::MutexGuard;

use crate::core::component::{Component, ComponentInner};
use crate::core::error::{OmxError, Result};
use crate::core::port::{negotiate_supplier, BufferSupplier, Port, TunnelLink};
use crate::core::state::ComponentState;

/// Connect `output`'s port `out_port` to `input`'s port `in_port`.
///
/// Both ports must be quiescent: the component in `Loaded` or the port
/// disabled. Buffer count and size are raised to the larger requirement of
/// the two ends. Returns the negotiated supplier.
pub fn setup_tunnel(
    output: &Component,
    out_port: u32,
    input: &Component,
    in_port: u32,
) -> Result<BufferSupplier> {
    let out_inner = output.inner();
    let in_inner = input.inner();
    if out_inner.id == in_inner.id {
        return Err(OmxError::BadParameter);
    }

    let out_loaded = quiescent_state(out_inner)?;
    let in_loaded = quiescent_state(in_inner)?;

    let (mut out_ports, mut in_ports) = lock_pair(out_inner, in_inner);
    let out = out_ports
        .get_mut(out_port as usize)
        .filter(|p| p.def.is_output())
        .ok_or(OmxError::BadPortIndex)?;
    let inp = in_ports
        .get_mut(in_port as usize)
        .filter(|p| p.def.is_input())
        .ok_or(OmxError::BadPortIndex)?;

    for (port, loaded) in [(&*out, out_loaded), (&*inp, in_loaded)] {
        let disabled = !port.def.enabled && !port.enable_pending;
        if !(loaded || disabled) || port.is_tunneled() || !port.is_unpopulated() {
            return Err(OmxError::IncorrectStateOperation);
        }
    }
    if out.def.domain != inp.def.domain {
        return Err(OmxError::PortsNotCompatible);
    }

    let supplier = negotiate_supplier(out.def.buffer_supplier, inp.def.buffer_supplier);
    let count = out.def.buffer_count_actual.max(inp.def.buffer_count_actual);
    let count_min = out.def.buffer_count_min.max(inp.def.buffer_count_min);
    let size = out.def.buffer_size.max(inp.def.buffer_size);
    for port in [&mut *out, &mut *inp] {
        port.def.buffer_count_actual = count;
        port.def.buffer_count_min = count_min;
        port.def.buffer_size = size;
        port.def.buffer_supplier = supplier;
    }

    out.tunnel = Some(TunnelLink {
        peer: Arc::downgrade(in_inner),
        peer_id: in_inner.id.clone(),
        peer_port: in_port,
        supplier: supplier == BufferSupplier::Output,
    });
    inp.tunnel = Some(TunnelLink {
        peer: Arc::downgrade(out_inner),
        peer_id: out_inner.id.clone(),
        peer_port: out_port,
        supplier: supplier == BufferSupplier::Input,
    });

    tracing::info!(
        "[{}] Tunnel {}:{} -> {}:{} ({:?} supplies {} x {} bytes)",
        out_inner.id,
        out_inner.id,
        out_port,
        in_inner.id,
        in_port,
        supplier,
        count,
        size
    );
    Ok(supplier)
}

/// Remove the tunnel between the two ports. Both must be unpopulated.
pub fn teardown_tunnel(
    output: &Component,
    out_port: u32,
    input: &Component,
    in_port: u32,
) -> Result<()> {
    let out_inner = output.inner();
    let in_inner = input.inner();
    if out_inner.id == in_inner.id {
        return Err(OmxError::BadParameter);
    }

    let (mut out_ports, mut in_ports) = lock_pair(out_inner, in_inner);
    let out = out_ports
        .get_mut(out_port as usize)
        .ok_or(OmxError::BadPortIndex)?;
    let inp = in_ports.get_mut(in_port as usize).ok_or(OmxError::BadPortIndex)?;

    let linked = |port: &Port, peer: &ComponentInner, peer_port: u32| {
        port.tunnel
            .as_ref()
            .is_some_and(|l| l.peer_id == peer.id && l.peer_port == peer_port)
    };
    if !linked(&*out, in_inner, in_port) || !linked(&*inp, out_inner, out_port) {
        return Err(OmxError::BadParameter);
    }
    if !out.is_unpopulated() || !inp.is_unpopulated() {
        return Err(OmxError::IncorrectStateOperation);
    }

    out.tunnel = None;
    inp.tunnel = None;
    tracing::info!(
        "[{}] Tunnel {}:{} -> {}:{} removed",
        out_inner.id,
        out_inner.id,
        out_port,
        in_inner.id,
        in_port
    );
    Ok(())
}

/// Cut every tunnel of a component that is going away.
///
/// Buffers it supplied are forgotten by the peer so the peer can unpopulate.
pub(crate) fn detach_all(inner: &Arc<ComponentInner>) {
    let links: Vec<TunnelLink> = inner
        .ports
        .lock()
        .iter_mut()
        .filter_map(|p| p.tunnel.take())
        .collect();

    for link in links {
        let Some(peer) = link.peer.upgrade() else {
            continue;
        };
        {
            let mut peer_ports = peer.ports.lock();
            if let Some(peer_port) = peer_ports.get_mut(link.peer_port as usize) {
                if peer_port.tunnel.as_ref().is_some_and(|t| t.peer_id == inner.id) {
                    peer_port.tunnel = None;
                    if link.supplier {
                        peer_port.slots.clear();
                    }
                }
            }
        }
        tracing::debug!(
            "[{}] Detached tunnel to {}:{}",
            inner.id,
            link.peer_id,
            link.peer_port
        );
        peer.enqueue(crate::core::component::WorkItem::Wake);
    }
}

/// Whether the component is in `Loaded`. Fails for `Invalid`.
fn quiescent_state(inner: &ComponentInner) -> Result<bool> {
    let status = inner.status.lock();
    match status.state {
        ComponentState::Invalid => Err(OmxError::InvalidState),
        state => Ok(state == ComponentState::Loaded && status.projected == ComponentState::Loaded),
    }
}

/// Lock the port tables of two components in id order.
fn lock_pair<'a>(
    first: &'a ComponentInner,
    second: &'a ComponentInner,
) -> (MutexGuard<'a, Vec<Port>>, MutexGuard<'a, Vec<Port>>) {
    if first.id < second.id {
        let a = first.ports.lock();
        let b = second.ports.lock();
        (a, b)
    } else {
        let b = second.ports.lock();
        let a = first.ports.lock();
        (a, b)
    }
}
