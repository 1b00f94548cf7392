// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Two levels of ordered associative containers: a process map keyed by pid,
// and (inside each Process) an endpoint map keyed by tid, each guarded by
// its own mutex. Lookups hand back Arc clones — in safe Rust that clone
// *is* a strong reference, which is what closes the race a weak/non-
// counting lookup followed by an identity check would otherwise have
// (see DESIGN.md, Open Question 3).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::endpoint::Endpoint;
use crate::error::{trace_err, IpcError, Result};
use crate::ids::{Pid, Tid};
use crate::process::Process;

/// How [`EndpointTable::get_endpoint`] should treat a missing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LookupMode {
    /// Fail with [`IpcError::NotFound`] if no live (non-zombie) endpoint exists.
    Existing,
    /// Fail with [`IpcError::AlreadyExists`] if a live endpoint already exists;
    /// otherwise create one, replacing a lingering zombie entry for the same
    /// `tid` if present.
    CreateExclusive,
}

pub(crate) struct EndpointTable {
    processes: Mutex<BTreeMap<Pid, Arc<Process>>>,
}

impl EndpointTable {
    pub fn new() -> EndpointTable {
        EndpointTable {
            processes: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get_or_create_process(&self, pid: Pid) -> Arc<Process> {
        let mut procs = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(procs.entry(pid).or_insert_with(|| Arc::new(Process::new(pid))))
    }

    pub fn lookup_process(&self, pid: Pid) -> Option<Arc<Process>> {
        let procs = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        procs.get(&pid).cloned()
    }

    /// Drops the table's own reference to `pid`'s [`Process`] if its
    /// endpoint map is empty and no other strong reference to the `Process`
    /// remains outstanding, besides the caller's own (every caller reaches
    /// this through a `lookup_process` clone it is still holding, so the
    /// table's entry plus that clone is the floor, not `1`).
    pub fn remove_process_if_empty(&self, pid: Pid) {
        let mut procs = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(p) = procs.get(&pid) {
            let empty = p.endpoints.lock().unwrap_or_else(|e| e.into_inner()).is_empty();
            if empty && Arc::strong_count(p) <= 2 {
                procs.remove(&pid);
            }
        }
    }

    pub fn get_endpoint(
        &self,
        process: &Arc<Process>,
        tid: Tid,
        nonce: u64,
        mode: LookupMode,
    ) -> Result<Arc<Endpoint>> {
        let mut eps = process.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        match mode {
            LookupMode::Existing => match eps.get(&tid) {
                Some(ep) if !ep.is_zombie() => Ok(Arc::clone(ep)),
                _ => Err(trace_err!(
                    IpcError::NotFound,
                    "endpoint_table: {} {} not found",
                    process.pid,
                    tid
                )),
            },
            LookupMode::CreateExclusive => {
                if let Some(existing) = eps.get(&tid) {
                    if !existing.is_zombie() {
                        return Err(trace_err!(
                            IpcError::AlreadyExists,
                            "endpoint_table: {} {} already has a live endpoint",
                            process.pid,
                            tid
                        ));
                    }
                }
                let ep = Arc::new(Endpoint::new(tid, Arc::downgrade(process), nonce));
                eps.insert(tid, Arc::clone(&ep));
                Ok(ep)
            }
        }
    }

    /// Looks up `tid` without the exclusive/not-found distinction, used by
    /// `SEND`/`RECEIVE`/`REPLY` to resolve a *destination* rather than the
    /// caller's own endpoint.
    pub fn lookup_endpoint(&self, process: &Arc<Process>, tid: Tid) -> Result<Arc<Endpoint>> {
        self.get_endpoint(process, tid, 0, LookupMode::Existing)
    }

    /// If `ep` has been marked zombie and this was the last strong
    /// reference besides the table's own, removes it from `process`'s map.
    /// Called after every operation that held a transient strong reference
    /// to an endpoint it did not itself create, so a concurrent HANDLE_PUT
    /// is cleaned up promptly once the in-flight operation finishes with it.
    pub fn sweep_if_zombie(&self, process: &Arc<Process>, ep: &Arc<Endpoint>) {
        if !ep.is_zombie() {
            return;
        }
        let mut eps = process.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stored) = eps.get(&ep.tid) {
            if Arc::ptr_eq(stored, ep) && Arc::strong_count(stored) <= 2 {
                eps.remove(&ep.tid);
            }
        }
    }

    /// Marks every non-zombie endpoint belonging to `process` as zombie and
    /// sweeps it, mirroring the creator reference being dropped when the
    /// owning descriptor is closed. Endpoints with other live strong
    /// references (an in-flight operation) are kept alive, zombie, until
    /// that operation finishes and calls [`sweep_if_zombie`](Self::sweep_if_zombie).
    pub fn flush_process(&self, process: &Arc<Process>) {
        let snapshot: Vec<Arc<Endpoint>> = process
            .endpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for ep in &snapshot {
            ep.mark_zombie();
            self.sweep_if_zombie(process, ep);
        }
    }
}
