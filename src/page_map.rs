// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Page pinning and scatter/gather description. Shaped after the teacher's
// ScopedAccess: lock (pin) on construction, unlock (unpin) on Drop, exactly
// once on every exit path. A real device driver pins pages in a remote
// address space via get_user_pages(); this reimplementation pins the
// calling process's own pages via mlock(2), which is the closest safely
// testable analogue available outside kernel code.

use crate::error::{trace_err, IpcError, Result};

/// One contiguous span of host memory, byte-addressed.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub addr: usize,
    pub len: usize,
}

impl Span {
    fn split_off_front(&mut self, n: usize) -> Span {
        let taken = Span {
            addr: self.addr,
            len: n,
        };
        self.addr += n;
        self.len -= n;
        taken
    }
}

#[cfg(unix)]
fn page_size() -> usize {
    // SAFETY: sysconf with _SC_PAGESIZE has no preconditions and cannot fail
    // on a POSIX system; a negative return is treated as "unknown" and
    // falls back to the universal 4 KiB default.
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n > 0 {
        n as usize
    } else {
        4096
    }
}

#[cfg(windows)]
fn page_size() -> usize {
    use std::mem::MaybeUninit;
    use windows_sys::Win32::System::SystemInformation::GetSystemInfo;
    // SAFETY: GetSystemInfo writes a fully-initialized SYSTEM_INFO into any
    // valid out pointer and has no other preconditions.
    unsafe {
        let mut info = MaybeUninit::zeroed();
        GetSystemInfo(info.as_mut_ptr());
        info.assume_init().dwPageSize as usize
    }
}

#[cfg(not(any(unix, windows)))]
fn page_size() -> usize {
    4096
}

/// Pins `len` bytes starting at the page-aligned `addr` in the caller's own
/// address space. Mirrors `mlock(2)` on Unix and `VirtualLock` on Windows.
#[cfg(unix)]
fn lock_pages(addr: usize, len: usize) -> std::result::Result<(), ()> {
    // SAFETY: the caller has computed `addr..addr+len` as a page-aligned
    // range covering a buffer it asserts is mapped in its own address space.
    let rc = unsafe { libc::mlock(addr as *const libc::c_void, len) };
    if rc == 0 {
        Ok(())
    } else {
        Err(())
    }
}

#[cfg(windows)]
fn lock_pages(addr: usize, len: usize) -> std::result::Result<(), ()> {
    use windows_sys::Win32::System::Memory::VirtualLock;
    // SAFETY: see `lock_pages` (Unix) — same precondition, Win32 analogue.
    let ok = unsafe { VirtualLock(addr as *mut core::ffi::c_void, len) };
    if ok != 0 {
        Ok(())
    } else {
        Err(())
    }
}

#[cfg(not(any(unix, windows)))]
fn lock_pages(_addr: usize, _len: usize) -> std::result::Result<(), ()> {
    Ok(())
}

/// Unpins a range previously locked by [`lock_pages`]. Mirrors `munlock(2)`
/// on Unix and `VirtualUnlock` on Windows.
#[cfg(unix)]
fn unlock_pages(addr: usize, len: usize) {
    // SAFETY: `addr..addr+len` is exactly the range `lock_pages` locked.
    unsafe {
        libc::munlock(addr as *const libc::c_void, len);
    }
}

#[cfg(windows)]
fn unlock_pages(addr: usize, len: usize) {
    use windows_sys::Win32::System::Memory::VirtualUnlock;
    // SAFETY: see above.
    unsafe {
        VirtualUnlock(addr as *mut core::ffi::c_void, len);
    }
}

#[cfg(not(any(unix, windows)))]
fn unlock_pages(_addr: usize, _len: usize) {}

/// A pinned user-space buffer, described as an ordered list of spans.
///
/// Pins on construction via [`PageMap::pin`], unpins on [`Drop`]. `release`
/// may also be called explicitly; `Drop` is then a no-op, guarded by a flag
/// so the unpin only ever runs once.
pub struct PageMap {
    spans: Vec<Span>,
    pinned_addr: usize,
    pinned_len: usize,
    released: bool,
}

impl PageMap {
    /// Pins `len` bytes starting at `addr` in the calling process's address
    /// space and builds a scatter/gather description split at page
    /// boundaries, so a buffer straddling a page boundary yields more than
    /// one span (exercised by [`crate::buffer_copy`]).
    ///
    /// `addr == 0` with `len > 0`, or a `len` that overflows `addr + len`,
    /// is rejected as [`IpcError::InvalidArgument`] before any pin is
    /// attempted. `mlock` failure (insufficient locked-memory budget, etc.)
    /// is reported as [`IpcError::OutOfMemory`].
    pub fn pin(addr: usize, len: usize) -> Result<PageMap> {
        if len == 0 {
            return Ok(PageMap {
                spans: Vec::new(),
                pinned_addr: 0,
                pinned_len: 0,
                released: true,
            });
        }
        if addr == 0 || addr.checked_add(len).is_none() {
            return Err(trace_err!(
                IpcError::InvalidArgument,
                "page_map: invalid buffer addr={addr:#x} len={len}"
            ));
        }

        let page = page_size();
        let page_start = (addr / page) * page;
        let page_end = ((addr + len + page - 1) / page) * page;
        let pinned_len = page_end - page_start;

        if lock_pages(page_start, pinned_len).is_err() {
            return Err(trace_err!(
                IpcError::OutOfMemory,
                "page_map: failed to lock range {page_start:#x}..+{pinned_len}"
            ));
        }

        let mut spans = Vec::new();
        let mut remaining = Span { addr, len };
        let first_page_end = page_start + page;
        if remaining.addr < first_page_end && remaining.addr + remaining.len > first_page_end {
            let n = first_page_end - remaining.addr;
            spans.push(remaining.split_off_front(n));
        }
        while remaining.len > page {
            spans.push(remaining.split_off_front(page));
        }
        if remaining.len > 0 {
            spans.push(remaining);
        }

        log::trace!(
            "page_map: pinned addr={addr:#x} len={len} as {} span(s)",
            spans.len()
        );

        Ok(PageMap {
            spans,
            pinned_addr: page_start,
            pinned_len,
            released: false,
        })
    }

    /// The scatter/gather description, in order.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Logical length covered by this description.
    pub fn len(&self) -> usize {
        self.spans.iter().map(|s| s.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unpins the backing pages. Idempotent; `Drop` calls this too, so an
    /// explicit call followed by drop is safe.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        unlock_pages(self.pinned_addr, self.pinned_len);
        log::trace!(
            "page_map: released addr={:#x} len={}",
            self.pinned_addr,
            self.pinned_len
        );
    }
}

impl Drop for PageMap {
    fn drop(&mut self) {
        self.release();
    }
}
