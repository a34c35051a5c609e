//! Host delay backed by `std::thread::sleep`

use std::time::Duration;

use embedded_hal::delay::DelayNs;

/// Blocking delay for hosts with an OS scheduler.
///
/// Zero-sized and `Copy`, so the dispatcher can clone it for every settle.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns.into()));
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us.into()));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms.into()));
    }
}
