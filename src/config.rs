// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Environment-driven configuration: verbosity and device count.

const VERBOSITY_VAR: &str = "IPC_RENDEZVOUS_VERBOSITY";
const DEVICES_VAR: &str = "IPC_RENDEZVOUS_DEVICES";

const MIN_DEVICES: u32 = 1;
const MAX_DEVICES: u32 = 64;

/// Diagnostic verbosity, 0 (errors only) through 3 (trace).
///
/// Mirrors the `log` level `Rendezvous`/`Device`/`Handle` use when reporting
/// state transitions: 0 → error, 1 → warn, 2 → info, 3 → debug/trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Verbosity(u8);

impl Verbosity {
    pub const ERRORS_ONLY: Verbosity = Verbosity(0);
    pub const DEFAULT: Verbosity = Verbosity(1);

    pub fn new(level: u8) -> Verbosity {
        Verbosity(level.min(3))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn to_log_level_filter(self) -> log::LevelFilter {
        match self.0 {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            _ => log::LevelFilter::Trace,
        }
    }

    /// Reads `IPC_RENDEZVOUS_VERBOSITY`, defaulting to 1 when unset or unparsable.
    pub fn from_env() -> Verbosity {
        std::env::var(VERBOSITY_VAR)
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .map(Verbosity::new)
            .unwrap_or(Verbosity::DEFAULT)
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::DEFAULT
    }
}

/// How many independent [`Device`](crate::device::Device) instances
/// [`Registry`](crate::device::Registry) should create at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCount(u32);

impl DeviceCount {
    pub fn new(n: u32) -> DeviceCount {
        DeviceCount(n.clamp(MIN_DEVICES, MAX_DEVICES))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Reads `IPC_RENDEZVOUS_DEVICES`, defaulting to 1 when unset, unparsable,
    /// or out of the `1..=64` range (the value is clamped rather than
    /// rejected — a misconfigured count should not prevent startup).
    pub fn from_env() -> DeviceCount {
        std::env::var(DEVICES_VAR)
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .map(DeviceCount::new)
            .unwrap_or(DeviceCount::new(1))
    }
}

impl Default for DeviceCount {
    fn default() -> Self {
        DeviceCount::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_clamps_above_three() {
        assert_eq!(Verbosity::new(9).level(), 3);
    }

    #[test]
    fn device_count_clamps_to_range() {
        assert_eq!(DeviceCount::new(0).get(), MIN_DEVICES);
        assert_eq!(DeviceCount::new(1000).get(), MAX_DEVICES);
        assert_eq!(DeviceCount::new(4).get(), 4);
    }
}
