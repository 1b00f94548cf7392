// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A namespaced container owning one EndpointTable, and a registry owning N
// independent Devices. Models the module/device-node lifecycle contract
// (open N named instances, look one up, flush a closing process) without
// binding to a real kernel device node — see SPEC_FULL.md §1/§6.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::config::DeviceCount;
use crate::error::{trace_err, IpcError, Result};
use crate::handle::Handle;
use crate::ids::{Pid, Tid};
use crate::rendezvous::{self, MsgDescriptor, ReceiveInfo};
use crate::table::EndpointTable;

pub const VERSION: (i32, i32, i32) = (0, 1, 0);

/// One independent rendezvous namespace.
pub struct Device {
    name: String,
    table: EndpointTable,
    nonce_counter: AtomicU64,
}

impl Device {
    fn new(name: impl Into<String>) -> Device {
        Device {
            name: name.into(),
            table: EndpointTable::new(),
            nonce_counter: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn table(&self) -> &EndpointTable {
        &self.table
    }

    pub(crate) fn next_nonce(&self) -> u64 {
        self.nonce_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Ensures `pid` has a Process structure, creating one if this is its
    /// first endpoint open on this device. Idempotent.
    pub fn open_process(&self, pid: Pid) {
        self.table.get_or_create_process(pid);
        log::trace!("device[{}]: opened {pid}", self.name);
    }

    /// Flushes `pid`'s non-zombie endpoints (as if its descriptor had been
    /// closed) and drops the Process entry once empty.
    pub fn close_process(&self, pid: Pid) {
        if let Some(process) = self.table.lookup_process(pid) {
            self.table.flush_process(&process);
            self.table.remove_process_if_empty(pid);
        }
        log::trace!("device[{}]: closed {pid}", self.name);
    }

    pub fn version() -> (i32, i32, i32) {
        VERSION
    }

    /// SEND: deliver `smsgs` to `(dest_pid, dest_tid)` and block until a
    /// matching RECEIVE accepts them. See [`crate::rendezvous`] for the
    /// full state machine.
    pub fn send(
        &self,
        handle: &Handle,
        dest_pid: Pid,
        dest_tid: Tid,
        smsgs: &mut [MsgDescriptor],
    ) -> Result<()> {
        rendezvous::send(self, handle, dest_pid, dest_tid, smsgs)
    }

    /// SEND_RECEIVE: deliver `smsgs`, then block until `(dest_pid, dest_tid)`
    /// replies into `rmsgs`.
    pub fn send_receive(
        &self,
        handle: &Handle,
        dest_pid: Pid,
        dest_tid: Tid,
        smsgs: &mut [MsgDescriptor],
        rmsgs: &mut [MsgDescriptor],
    ) -> Result<()> {
        rendezvous::send_receive(self, handle, dest_pid, dest_tid, smsgs, rmsgs)
    }

    /// RECEIVE: block until a sender is queued, then copy its buffers into
    /// `rmsgs`.
    pub fn receive(&self, handle: &Handle, rmsgs: &mut [MsgDescriptor]) -> Result<ReceiveInfo> {
        rendezvous::receive(self, handle, rmsgs)
    }

    /// REPLY: answer a sender previously returned by [`Device::receive`],
    /// identified by the `(dest_pid, dest_tid)` echoed back from that
    /// call's [`ReceiveInfo`].
    pub fn reply(
        &self,
        handle: &Handle,
        dest_pid: Pid,
        dest_tid: Tid,
        rmsgs: &mut [MsgDescriptor],
    ) -> Result<()> {
        rendezvous::reply(self, handle, dest_pid, dest_tid, rmsgs)
    }
}

/// Owns a fixed number of independently-addressable [`Device`]s, created at
/// startup from the configured device count (`IPC_RENDEZVOUS_DEVICES`).
pub struct Registry {
    devices: RwLock<BTreeMap<String, Arc<Device>>>,
}

impl Registry {
    pub fn new(count: DeviceCount) -> Registry {
        let mut devices = BTreeMap::new();
        for i in 0..count.get() {
            let name = format!("rendezvous{i}");
            devices.insert(name.clone(), Arc::new(Device::new(name)));
        }
        Registry {
            devices: RwLock::new(devices),
        }
    }

    pub fn from_env() -> Registry {
        Registry::new(DeviceCount::from_env())
    }

    pub fn get(&self, name: &str) -> Result<Arc<Device>> {
        self.devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| trace_err!(IpcError::NotFound, "device registry: no device named {name}"))
    }

    pub fn names(&self) -> Vec<String> {
        self.devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}
