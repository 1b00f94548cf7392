// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A single receiving-thread identity: its pending-sender queue, wait
// condition, and the two buffer slots used by the rendezvous state machine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::ids::Tid;
use crate::page_map::PageMap;
use crate::process::Process;
use crate::wait::Waiter;

/// Index of the send-phase buffer slot (used by SEND, SEND_RECEIVE, and by
/// RECEIVE on the receiver's own side).
pub(crate) const SEND_SLOT: usize = 0;
/// Index of the reply-phase buffer slot (used by SEND_RECEIVE and REPLY).
pub(crate) const REPLY_SLOT: usize = 1;

/// Observable lifecycle state of an endpoint, for logging and tests.
///
/// The actual synchronization is driven by queue membership and wait
/// predicates, not by branching on this enum — it exists purely so a log
/// line or an assertion can say what an endpoint is doing without reaching
/// into its queue and flags by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Idle,
    Enqueued,
    AwaitingReply,
    Zombie,
}

fn state_from_u8(v: u8) -> EndpointState {
    match v {
        1 => EndpointState::Enqueued,
        2 => EndpointState::AwaitingReply,
        3 => EndpointState::Zombie,
        _ => EndpointState::Idle,
    }
}

pub(crate) struct Endpoint {
    pub tid: Tid,
    pub process: Weak<Process>,
    pub creation_nonce: u64,
    zombie: AtomicBool,
    waiting_for_reply: AtomicBool,
    state: AtomicU8,
    /// Other endpoints currently blocked on *this* endpoint as their
    /// destination, oldest first. Only meaningful while this endpoint acts
    /// as a receiver.
    pub sender_queue: Mutex<VecDeque<Arc<Endpoint>>>,
    pub wait: Waiter,
    buffers: [Mutex<Option<Vec<PageMap>>>; 2],
    /// Per-buffer byte counts the *other* side of the current operation
    /// publishes here before waking this endpoint.
    result_lengths: [Mutex<Vec<usize>>; 2],
}

impl Endpoint {
    pub fn new(tid: Tid, process: Weak<Process>, creation_nonce: u64) -> Endpoint {
        Endpoint {
            tid,
            process,
            creation_nonce,
            zombie: AtomicBool::new(false),
            waiting_for_reply: AtomicBool::new(false),
            state: AtomicU8::new(0),
            sender_queue: Mutex::new(VecDeque::new()),
            wait: Waiter::new(),
            buffers: [Mutex::new(None), Mutex::new(None)],
            result_lengths: [Mutex::new(Vec::new()), Mutex::new(Vec::new())],
        }
    }

    pub fn is_zombie(&self) -> bool {
        self.zombie.load(Ordering::Acquire)
    }

    pub fn mark_zombie(&self) {
        self.zombie.store(true, Ordering::Release);
        self.state.store(3, Ordering::Release);
    }

    pub fn is_waiting_for_reply(&self) -> bool {
        self.waiting_for_reply.load(Ordering::Acquire)
    }

    pub fn set_waiting_for_reply(&self, v: bool) {
        self.waiting_for_reply.store(v, Ordering::Release);
    }

    pub fn state(&self) -> EndpointState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, s: EndpointState) {
        if self.is_zombie() && s != EndpointState::Zombie {
            // A zombie never reverts to a live state; an in-flight
            // operation finishing up must not resurrect the observable
            // state after HANDLE_PUT has already marked it.
            return;
        }
        let v = match s {
            EndpointState::Idle => 0,
            EndpointState::Enqueued => 1,
            EndpointState::AwaitingReply => 2,
            EndpointState::Zombie => 3,
        };
        self.state.store(v, Ordering::Release);
    }

    pub fn put_slot(&self, slot: usize, maps: Vec<PageMap>) {
        *self.buffers[slot].lock().unwrap_or_else(|e| e.into_inner()) = Some(maps);
    }

    pub fn take_slot(&self, slot: usize) -> Option<Vec<PageMap>> {
        self.buffers[slot]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    pub fn with_slot<R>(&self, slot: usize, f: impl FnOnce(Option<&Vec<PageMap>>) -> R) -> R {
        let guard = self.buffers[slot].lock().unwrap_or_else(|e| e.into_inner());
        f(guard.as_ref())
    }

    pub fn set_result_lengths(&self, slot: usize, lengths: Vec<usize>) {
        *self.result_lengths[slot]
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = lengths;
    }

    pub fn take_result_lengths(&self, slot: usize) -> Vec<usize> {
        std::mem::take(
            &mut *self.result_lengths[slot]
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        )
    }

    pub fn pid(&self) -> Option<crate::ids::Pid> {
        self.process.upgrade().map(|p| p.pid)
    }
}
