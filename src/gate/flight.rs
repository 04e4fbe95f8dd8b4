//! Single-flight guard for suggestion fetches.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// At most one outstanding fetch per session.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    in_flight: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot. Returns `None` if a fetch is already running.
    ///
    /// The slot frees when the returned guard drops, whichever way the fetch
    /// settles.
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                in_flight: self.in_flight.clone(),
            })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Held for the duration of one fetch.
#[derive(Debug)]
pub struct FlightGuard {
    in_flight: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}
