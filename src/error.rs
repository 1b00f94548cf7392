// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use std::fmt;

/// Errors returned by the rendezvous core.
///
/// Every fallible public method in this crate returns `Result<T, IpcError>`.
/// Variants map 1:1 onto the control-surface error table; see the crate's
/// module docs for which operations can return which variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum IpcError {
    /// Malformed request size, or an invalid/unaligned user buffer address.
    InvalidArgument,
    /// The handle does not correspond to the caller's current thread identity,
    /// or its nonce does not match the endpoint it claims to name.
    InvalidHandle,
    /// The destination process or thread does not exist, or is zombie.
    NotFound,
    /// Exclusive creation requested but an entry already exists.
    AlreadyExists,
    /// Allocation or page-pin failure.
    OutOfMemory,
    /// The calling thread's wait was interrupted by a cancellation signal.
    Interrupted,
    /// A precondition the core relies on did not hold. Never the caller's fault.
    Internal,
}

impl IpcError {
    /// `log` level this error should be reported at when it is first produced.
    ///
    /// `Interrupted` is routine (every cancelling caller sees one) so it logs
    /// at `debug` rather than `warn`.
    pub(crate) fn log_level(self) -> log::Level {
        match self {
            IpcError::Internal => log::Level::Error,
            IpcError::Interrupted => log::Level::Debug,
            _ => log::Level::Warn,
        }
    }
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IpcError::InvalidArgument => "invalid argument",
            IpcError::InvalidHandle => "invalid handle",
            IpcError::NotFound => "not found",
            IpcError::AlreadyExists => "already exists",
            IpcError::OutOfMemory => "out of memory",
            IpcError::Interrupted => "interrupted",
            IpcError::Internal => "internal error",
        };
        f.write_str(s)
    }
}

impl std::error::Error for IpcError {}

pub type Result<T> = std::result::Result<T, IpcError>;

/// Logs `err` at the level appropriate to its variant, then returns it.
/// Called at the point an error is first produced, never on propagation.
macro_rules! trace_err {
    ($err:expr, $($arg:tt)+) => {{
        let e = $err;
        match e.log_level() {
            log::Level::Error => log::error!($($arg)+),
            log::Level::Warn => log::warn!($($arg)+),
            log::Level::Debug => log::debug!($($arg)+),
            _ => log::trace!($($arg)+),
        }
        e
    }};
}

pub(crate) use trace_err;
