// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Process/thread identity newtypes and the helpers a real dispatcher would
// use to stamp a request header with the caller's credentials before
// handing it to the rendezvous core.

use std::fmt;
#[cfg(not(target_os = "linux"))]
use std::sync::atomic::{AtomicU64, Ordering};

/// A process identifier, as seen by [`EndpointTable`](crate::table::EndpointTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u64);

/// A thread identifier, unique within a [`Pid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(pub u64);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{}", self.0)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid:{}", self.0)
    }
}

/// Returns the calling OS process's identity.
///
/// All simulated "processes" that a test or demo wishes to model as
/// distinct must supply their own [`Pid`] explicitly (see module docs) —
/// this only reports the real OS pid, used as the default when a caller
/// does not otherwise distinguish itself.
pub fn current_pid() -> Pid {
    Pid(std::process::id() as u64)
}

/// Returns a thread identifier for the calling OS thread.
///
/// On Linux this is the real kernel thread id (`gettid(2)`), stable for the
/// life of the thread and guaranteed distinct from every other live thread's
/// id, matching what a real device driver would read out of `current->pid`.
/// On other Unix platforms, and as a portable fallback, a process-wide
/// monotonic counter is assigned to each thread the first time it calls
/// this function and cached in a thread-local for the thread's lifetime.
pub fn current_tid() -> Tid {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: gettid(2) takes no arguments and cannot fail.
        let tid = unsafe { libc::syscall(libc::SYS_gettid) };
        return Tid(tid as u64);
    }
    #[cfg(not(target_os = "linux"))]
    {
        thread_local! {
            static TID: u64 = next_fallback_tid();
        }
        fn next_fallback_tid() -> u64 {
            static NEXT: AtomicU64 = AtomicU64::new(1);
            NEXT.fetch_add(1, Ordering::Relaxed)
        }
        TID.with(|t| Tid(*t))
    }
}
