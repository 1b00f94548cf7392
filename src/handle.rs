// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Opaque per-thread identifier. Bound at acquisition to the caller's thread
// identity; every operation that takes a Handle must reject a caller whose
// current thread identity no longer matches it.

use std::sync::Arc;

use crate::device::Device;
use crate::endpoint::Endpoint;
use crate::error::{trace_err, IpcError, Result};
use crate::ids::{current_tid, Pid, Tid};
use crate::process::Process;
use crate::table::LookupMode;

/// An opaque identifier a thread must present to participate in rendezvous
/// operations.
///
/// The `uuid` the control surface hands back to callers (§6) is the
/// `{tid, nonce}` pair flattened; `nonce` is a per-device monotonic counter
/// rather than a bare reuse of `tid`, so a handle from a thread whose id was
/// later recycled by the OS cannot be mistaken for the new thread's handle
/// (see DESIGN.md, Open Question 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    pub(crate) pid: Pid,
    pub(crate) tid: Tid,
    pub(crate) nonce: u64,
}

impl Handle {
    /// The 128-bit-equivalent opaque value the control surface reports as
    /// `uuid`: the high 64 bits are the nonce, the low 64 the tid.
    pub fn uuid(&self) -> u128 {
        ((self.nonce as u128) << 64) | self.tid.0 as u128
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Acquires a handle for the calling thread within `pid`'s process on
    /// `device`. Fails with [`IpcError::AlreadyExists`] if this thread
    /// already holds one.
    pub fn acquire(device: &Device, pid: Pid) -> Result<Handle> {
        let tid = current_tid();
        let process = device.table().get_or_create_process(pid);
        let nonce = device.next_nonce();
        let _ep = device
            .table()
            .get_endpoint(&process, tid, nonce, LookupMode::CreateExclusive)?;
        log::debug!("handle: acquired {pid} {tid} nonce={nonce}");
        Ok(Handle { pid, tid, nonce })
    }

    /// Releases this handle. The calling thread's current identity must
    /// match the handle; marks the endpoint zombie and drops the creator
    /// reference.
    pub fn release(self, device: &Device) -> Result<()> {
        self.check_caller_identity()?;
        let process = device
            .table()
            .lookup_process(self.pid)
            .ok_or_else(|| trace_err!(IpcError::InvalidHandle, "handle: release: no such process"))?;
        let ep = self.resolve_checked(device, &process)?;
        ep.mark_zombie();
        device.table().sweep_if_zombie(&process, &ep);
        device.table().remove_process_if_empty(self.pid);
        log::debug!("handle: released {} {}", self.pid, self.tid);
        Ok(())
    }

    /// Delivers an asynchronous cancel to whatever operation this handle's
    /// endpoint is currently blocked in, modeling the out-of-scope kernel
    /// signal that would unblock a real blocked `ioctl`.
    ///
    /// Unlike every other `Handle` method, the calling thread need not be
    /// the thread the handle was issued to — interrupt is how a controller
    /// (a test, a timeout watchdog) cancels *another* thread's in-flight
    /// wait, so the caller-identity check that guards SEND/RECEIVE/REPLY
    /// does not apply here.
    pub fn interrupt(&self, device: &Device) -> Result<()> {
        let process = device
            .table()
            .lookup_process(self.pid)
            .ok_or_else(|| trace_err!(IpcError::InvalidHandle, "handle: interrupt: no such process"))?;
        let ep = device
            .table()
            .lookup_endpoint(&process, self.tid)
            .map_err(|_| trace_err!(IpcError::InvalidHandle, "handle: interrupt: no live endpoint"))?;
        if ep.creation_nonce != self.nonce {
            return Err(trace_err!(
                IpcError::InvalidHandle,
                "handle: interrupt: stale handle for {}",
                self.tid
            ));
        }
        ep.wait.interrupt();
        Ok(())
    }

    fn check_caller_identity(&self) -> Result<()> {
        if current_tid() != self.tid {
            return Err(trace_err!(
                IpcError::InvalidHandle,
                "handle: caller thread identity does not match handle"
            ));
        }
        Ok(())
    }

    /// Resolves this handle to its endpoint, taking a strong reference and
    /// checking both the caller's thread identity and the handle's nonce
    /// against the endpoint's creation nonce (rejecting a stale handle whose
    /// `tid` has since been reassigned to a new `acquire`).
    pub(crate) fn resolve_checked(
        &self,
        device: &Device,
        process: &Arc<Process>,
    ) -> Result<Arc<Endpoint>> {
        self.check_caller_identity()?;
        let ep = device
            .table()
            .lookup_endpoint(process, self.tid)
            .map_err(|_| trace_err!(IpcError::InvalidHandle, "handle: no live endpoint for {}", self.tid))?;
        if ep.creation_nonce != self.nonce {
            return Err(trace_err!(
                IpcError::InvalidHandle,
                "handle: stale handle for {} (nonce mismatch)",
                self.tid
            ));
        }
        Ok(ep)
    }
}
