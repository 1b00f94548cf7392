// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// In-process wait/notify primitive. Every Endpoint owns one. Shaped after
// the teacher's named cross-process Waiter (condition + mutex + quit flag,
// predicate-checked in a loop) but scoped to this process: all endpoints
// sharing a Device live in the same address space here, so a plain
// Mutex+Condvar pair stands in for the named primitive a real cross-process
// deployment would need.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{IpcError, Result};

/// Blocks the owning thread until a predicate is false, or until interrupted.
///
/// `interrupt()` models delivery of an asynchronous cancel signal to the
/// thread currently blocked in [`Waiter::wait_while`] — the out-of-scope
/// kernel mechanism is a real POSIX signal; here it is an explicit call a
/// caller makes against the same `Waiter` from another thread.
pub struct Waiter {
    lock: Mutex<()>,
    cond: Condvar,
    interrupted: AtomicBool,
}

impl Waiter {
    pub fn new() -> Waiter {
        Waiter {
            lock: Mutex::new(()),
            cond: Condvar::new(),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Blocks while `pred()` is true, rechecking it each time this waiter is
    /// notified. Returns `Ok(())` once `pred()` is observed false, or
    /// `Err(IpcError::Interrupted)` if [`interrupt`](Waiter::interrupt) is
    /// called first. The interrupt flag is cleared on the way out, whichever
    /// way this returns, so the `Waiter` can be reused for the endpoint's
    /// next operation.
    pub fn wait_while<F: Fn() -> bool>(&self, pred: F, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut guard = guard;
        loop {
            if self.interrupted.swap(false, Ordering::AcqRel) {
                return Err(IpcError::Interrupted);
            }
            if !pred() {
                return Ok(());
            }
            guard = match deadline {
                None => self
                    .cond
                    .wait(guard)
                    .unwrap_or_else(|e| e.into_inner()),
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return Err(IpcError::Interrupted);
                    }
                    let (g, timed_out) = self
                        .cond
                        .wait_timeout(guard, dl - now)
                        .unwrap_or_else(|e| e.into_inner());
                    if timed_out.timed_out() && pred() {
                        return Err(IpcError::Interrupted);
                    }
                    g
                }
            };
        }
    }

    /// Wakes every thread blocked in [`wait_while`](Waiter::wait_while) on
    /// this `Waiter` so each can recheck its predicate.
    pub fn notify_all(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.cond.notify_all();
    }

    /// Requests that the next (or currently blocked) `wait_while` call return
    /// `Err(IpcError::Interrupted)`.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.notify_all();
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool as Flag;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_while_returns_immediately_when_predicate_false() {
        let w = Waiter::new();
        w.wait_while(|| false, None).expect("should not block");
    }

    #[test]
    fn notify_all_wakes_blocked_waiters() {
        let w = Arc::new(Waiter::new());
        let ready = Arc::new(Flag::new(false));

        let w2 = Arc::clone(&w);
        let r2 = Arc::clone(&ready);
        let t = thread::spawn(move || {
            w2.wait_while(|| !r2.load(Ordering::Acquire), None)
                .expect("wait_while")
        });

        thread::sleep(Duration::from_millis(50));
        ready.store(true, Ordering::Release);
        w.notify_all();
        t.join().unwrap();
    }

    #[test]
    fn interrupt_unblocks_with_interrupted_error() {
        let w = Arc::new(Waiter::new());
        let w2 = Arc::clone(&w);
        let t = thread::spawn(move || w2.wait_while(|| true, None));

        thread::sleep(Duration::from_millis(50));
        w.interrupt();
        let result = t.join().unwrap();
        assert_eq!(result, Err(IpcError::Interrupted));
    }

    #[test]
    fn timeout_elapses_when_predicate_stays_true() {
        let w = Waiter::new();
        let start = Instant::now();
        let result = w.wait_while(|| true, Some(Duration::from_millis(100)));
        assert_eq!(result, Err(IpcError::Interrupted));
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
