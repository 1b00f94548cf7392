// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The state machine: SEND, SEND_RECEIVE, RECEIVE, REPLY. Pairs a sender to
// exactly one receiver, drives the direct buffer-to-buffer copy, and
// unwinds fully (unpin, dequeue, drop refs) on every exit path including
// cancellation.

use std::sync::Arc;

use crate::buffer_copy;
use crate::device::Device;
use crate::endpoint::{Endpoint, EndpointState, REPLY_SLOT, SEND_SLOT};
use crate::error::{trace_err, IpcError, Result};
use crate::handle::Handle;
use crate::ids::{Pid, Tid};
use crate::page_map::PageMap;
use crate::process::Process;

/// One user-space buffer descriptor: `addr`/`len` in, bytes-transferred out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgDescriptor {
    pub addr: usize,
    pub len: usize,
}

impl MsgDescriptor {
    pub fn new(addr: usize, len: usize) -> MsgDescriptor {
        MsgDescriptor { addr, len }
    }
}

/// What RECEIVE reports back to the caller about the sender it paired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveInfo {
    pub sender_pid: Pid,
    pub sender_tid: Tid,
    pub reply_required: bool,
}

fn resolve_local(device: &Device, handle: &Handle) -> Result<(Arc<Process>, Arc<Endpoint>)> {
    let process = device
        .table()
        .lookup_process(handle.pid())
        .ok_or_else(|| trace_err!(IpcError::InvalidHandle, "rendezvous: no process for handle"))?;
    let ep = handle.resolve_checked(device, &process)?;
    Ok((process, ep))
}

fn resolve_remote(device: &Device, pid: Pid, tid: Tid) -> Result<(Arc<Process>, Arc<Endpoint>)> {
    let process = device
        .table()
        .lookup_process(pid)
        .ok_or_else(|| trace_err!(IpcError::NotFound, "rendezvous: dest process {pid} not found"))?;
    let ep = device
        .table()
        .lookup_endpoint(&process, tid)
        .map_err(|_| trace_err!(IpcError::NotFound, "rendezvous: dest {pid} {tid} not found"))?;
    Ok((process, ep))
}

fn pin_all(msgs: &[MsgDescriptor]) -> Result<Vec<PageMap>> {
    let mut maps = Vec::with_capacity(msgs.len());
    for m in msgs {
        maps.push(PageMap::pin(m.addr, m.len)?);
    }
    Ok(maps)
}

fn publish_lengths(msgs: &mut [MsgDescriptor], lens: &[usize]) {
    for (i, m) in msgs.iter_mut().enumerate() {
        m.len = lens.get(i).copied().unwrap_or(0);
    }
}

fn is_linked(remote_ep: &Arc<Endpoint>, local_ep: &Arc<Endpoint>) -> bool {
    remote_ep
        .sender_queue
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .any(|e| Arc::ptr_eq(e, local_ep))
}

fn unlink(remote_ep: &Arc<Endpoint>, local_ep: &Arc<Endpoint>) {
    remote_ep
        .sender_queue
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .retain(|e| !Arc::ptr_eq(e, local_ep));
}

fn enqueue(remote_ep: &Arc<Endpoint>, local_ep: &Arc<Endpoint>) {
    remote_ep
        .sender_queue
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push_back(Arc::clone(local_ep));
    local_ep.set_state(EndpointState::Enqueued);
    remote_ep.wait.notify_all();
}

/// Runs SEND or SEND_RECEIVE — identical except for whether reply buffers
/// are pinned and `waiting_for_reply` is asserted across the dequeue.
fn send_impl(
    device: &Device,
    handle: &Handle,
    dest_pid: Pid,
    dest_tid: Tid,
    smsgs: &mut [MsgDescriptor],
    rmsgs: Option<&mut [MsgDescriptor]>,
) -> Result<()> {
    let (local_process, local_ep) = resolve_local(device, handle)?;
    let (remote_process, remote_ep) = resolve_remote(device, dest_pid, dest_tid)?;

    let send_maps = pin_all(smsgs)?;
    let reply_maps = match &rmsgs {
        Some(r) => Some(pin_all(r)?),
        None => None,
    };

    local_ep.put_slot(SEND_SLOT, send_maps);
    let awaiting_reply = reply_maps.is_some();
    if let Some(maps) = reply_maps {
        local_ep.put_slot(REPLY_SLOT, maps);
    }
    local_ep.set_waiting_for_reply(awaiting_reply);

    enqueue(&remote_ep, &local_ep);

    let blocked = || is_linked(&remote_ep, &local_ep) || local_ep.is_waiting_for_reply();
    let result = local_ep.wait.wait_while(blocked, None);

    let outcome = match result {
        Ok(()) => {
            let send_lens = local_ep.take_result_lengths(SEND_SLOT);
            publish_lengths(smsgs, &send_lens);
            local_ep.take_slot(SEND_SLOT);
            if let Some(rmsgs) = rmsgs {
                let reply_lens = local_ep.take_result_lengths(REPLY_SLOT);
                publish_lengths(rmsgs, &reply_lens);
                local_ep.take_slot(REPLY_SLOT);
            }
            local_ep.set_state(EndpointState::Idle);
            Ok(())
        }
        Err(e) => {
            unlink(&remote_ep, &local_ep);
            local_ep.set_waiting_for_reply(false);
            local_ep.take_slot(SEND_SLOT);
            local_ep.take_slot(REPLY_SLOT);
            local_ep.set_state(EndpointState::Idle);
            Err(e)
        }
    };

    device.table().sweep_if_zombie(&remote_process, &remote_ep);
    device.table().sweep_if_zombie(&local_process, &local_ep);
    outcome
}

/// SEND: deliver `smsgs` to `(dest_pid, dest_tid)` and block until received.
pub(crate) fn send(
    device: &Device,
    handle: &Handle,
    dest_pid: Pid,
    dest_tid: Tid,
    smsgs: &mut [MsgDescriptor],
) -> Result<()> {
    send_impl(device, handle, dest_pid, dest_tid, smsgs, None)
}

/// SEND_RECEIVE: deliver `smsgs`, then block until `(dest_pid, dest_tid)`
/// replies into `rmsgs`.
pub(crate) fn send_receive(
    device: &Device,
    handle: &Handle,
    dest_pid: Pid,
    dest_tid: Tid,
    smsgs: &mut [MsgDescriptor],
    rmsgs: &mut [MsgDescriptor],
) -> Result<()> {
    send_impl(device, handle, dest_pid, dest_tid, smsgs, Some(rmsgs))
}

/// RECEIVE: block until a sender is queued, copy its buffers into `rmsgs`.
pub(crate) fn receive(
    device: &Device,
    handle: &Handle,
    rmsgs: &mut [MsgDescriptor],
) -> Result<ReceiveInfo> {
    let (local_process, local_ep) = resolve_local(device, handle)?;

    let recv_maps = pin_all(rmsgs)?;
    local_ep.put_slot(SEND_SLOT, recv_maps);

    let blocked = || {
        local_ep
            .sender_queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    };
    if let Err(e) = local_ep.wait.wait_while(blocked, None) {
        local_ep.take_slot(SEND_SLOT);
        return Err(e);
    }

    // Peek only — the sender stays linked on our queue, and therefore
    // parked on its own `wait`, until the copy below has fully run and its
    // result lengths are published. Unlinking any earlier would let a
    // spurious wakeup (permitted by `Condvar::wait`) observe the sender's
    // "not linked" predicate as already satisfied and return early, racing
    // the still-in-progress copy out from under its buffers.
    let sender_ep = local_ep
        .sender_queue
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .front()
        .cloned()
        .expect("wait_while guarantees sender_queue is non-empty here");

    let sender_process = sender_ep
        .process
        .upgrade()
        .ok_or_else(|| trace_err!(IpcError::Internal, "receive: sender's process vanished"))?;
    let sender_pid = sender_process.pid;
    let sender_tid = sender_ep.tid;
    let reply_required = sender_ep.is_waiting_for_reply();

    let sender_maps = sender_ep.take_slot(SEND_SLOT).unwrap_or_default();
    let receiver_maps = local_ep.take_slot(SEND_SLOT).unwrap_or_default();

    let n = sender_maps.len().max(receiver_maps.len());
    let mut sender_lens = vec![0usize; sender_maps.len()];
    let mut receiver_lens = vec![0usize; receiver_maps.len()];
    for i in 0..n {
        if let (Some(s), Some(d)) = (sender_maps.get(i), receiver_maps.get(i)) {
            let copied = buffer_copy::copy(d, s);
            sender_lens[i] = copied;
            receiver_lens[i] = copied;
        }
    }
    drop(sender_maps);
    drop(receiver_maps);

    sender_ep.set_result_lengths(SEND_SLOT, sender_lens);
    publish_lengths(rmsgs, &receiver_lens);

    // Only now unlink the sender from our queue — its wait predicate can
    // safely observe "not linked" from this point on, since the copy and
    // the result-length publication it reads back are already done.
    unlink(&local_ep, &sender_ep);

    if reply_required {
        sender_ep.set_state(EndpointState::AwaitingReply);
    } else {
        sender_ep.set_state(EndpointState::Idle);
        sender_ep.wait.notify_all();
    }
    local_ep.set_state(EndpointState::Idle);

    device.table().sweep_if_zombie(&sender_process, &sender_ep);
    device.table().sweep_if_zombie(&local_process, &local_ep);

    log::debug!(
        "receive: {} paired with sender {sender_pid} {sender_tid}, reply_required={reply_required}",
        local_ep.tid
    );

    Ok(ReceiveInfo {
        sender_pid,
        sender_tid,
        reply_required,
    })
}

/// REPLY: answer a sender previously returned by RECEIVE, identified by the
/// `(dest_pid, dest_tid)` the caller echoes back from that RECEIVE's
/// [`ReceiveInfo`]. Never blocks: the replier performs the copy itself
/// against the sender's still-pinned reply slot and wakes it directly.
pub(crate) fn reply(
    device: &Device,
    handle: &Handle,
    dest_pid: Pid,
    dest_tid: Tid,
    rmsgs: &mut [MsgDescriptor],
) -> Result<()> {
    let (local_process, local_ep) = resolve_local(device, handle)?;
    let (sender_process, sender_ep) = resolve_remote(device, dest_pid, dest_tid)?;

    let replier_maps = pin_all(rmsgs)?;
    local_ep.put_slot(REPLY_SLOT, replier_maps);

    let sender_maps = match sender_ep.take_slot(REPLY_SLOT) {
        Some(maps) => maps,
        None => {
            // Release what we just pinned for this call before failing —
            // nothing else will ever take this slot back out.
            local_ep.take_slot(REPLY_SLOT);
            return Err(trace_err!(
                IpcError::NotFound,
                "reply: {dest_pid} {dest_tid} is not awaiting a reply"
            ));
        }
    };
    let replier_maps = local_ep.take_slot(REPLY_SLOT).unwrap_or_default();

    let n = sender_maps.len().max(replier_maps.len());
    let mut sender_lens = vec![0usize; sender_maps.len()];
    let mut replier_lens = vec![0usize; replier_maps.len()];
    for i in 0..n {
        if let (Some(d), Some(s)) = (sender_maps.get(i), replier_maps.get(i)) {
            let copied = buffer_copy::copy(d, s);
            sender_lens[i] = copied;
            replier_lens[i] = copied;
        }
    }
    drop(sender_maps);
    drop(replier_maps);

    sender_ep.set_result_lengths(REPLY_SLOT, sender_lens);
    publish_lengths(rmsgs, &replier_lens);

    sender_ep.set_waiting_for_reply(false);
    sender_ep.set_state(EndpointState::Idle);
    sender_ep.wait.notify_all();
    local_ep.set_state(EndpointState::Idle);

    device.table().sweep_if_zombie(&sender_process, &sender_ep);
    device.table().sweep_if_zombie(&local_process, &local_ep);

    log::debug!("reply: {} replied to {dest_pid} {dest_tid}", local_ep.tid);

    Ok(())
}
