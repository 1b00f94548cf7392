// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Lock-step scatter/gather copy. This is the direct, copy-once transfer the
// rest of the core exists to set up: no intermediate buffer, no kernel-side
// staging area, just a walk across two span lists copying the overlap.

use crate::page_map::{PageMap, Span};

/// Copies bytes from `src`'s spans into `dst`'s spans, in order, stopping
/// when either side is exhausted. Returns the total number of bytes
/// actually copied.
///
/// Safe to call with mismatched logical lengths: the shorter side bounds
/// the copy and the longer side's remainder is left untouched.
pub fn copy(dst: &PageMap, src: &PageMap) -> usize {
    copy_spans(dst.spans(), src.spans())
}

fn copy_spans(dst: &[Span], src: &[Span]) -> usize {
    let mut total = 0usize;
    let mut di = 0usize;
    let mut si = 0usize;
    let mut d_off = 0usize;
    let mut s_off = 0usize;

    while di < dst.len() && si < src.len() {
        let d = dst[di];
        let s = src[si];
        let d_remaining = d.len - d_off;
        let s_remaining = s.len - s_off;
        let n = d_remaining.min(s_remaining);

        if n > 0 {
            // SAFETY: `d` and `s` each describe a region the caller pinned
            // for the duration of this call (the sender/receiver remain
            // blocked, holding their PageMaps, until the copy returns), and
            // `n` is bounded by both spans' remaining lengths above.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    (s.addr + s_off) as *const u8,
                    (d.addr + d_off) as *mut u8,
                    n,
                );
            }
            total += n;
        }

        d_off += n;
        s_off += n;
        if d_off == d.len {
            di += 1;
            d_off = 0;
        }
        if s_off == s.len {
            si += 1;
            s_off = 0;
        }
    }

    total
}
