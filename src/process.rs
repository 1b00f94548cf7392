// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::endpoint::Endpoint;
use crate::ids::{Pid, Tid};

/// One process's bookkeeping within a [`Device`](crate::device::Device):
/// the ordered map from thread id to that thread's [`Endpoint`].
pub(crate) struct Process {
    pub pid: Pid,
    pub endpoints: Mutex<BTreeMap<Tid, Arc<Endpoint>>>,
}

impl Process {
    pub fn new(pid: Pid) -> Process {
        Process {
            pid,
            endpoints: Mutex::new(BTreeMap::new()),
        }
    }
}
