use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Issues the arrival ordinals that totally order purchase intents.
///
/// Returns strictly increasing microsecond values across all concurrent
/// callers in one process. Never regresses, even if the wall clock does:
/// each call returns `max(wall_micros, previous + 1)`.
///
/// Owned by the composition root and handed to intake; not a process-global.
#[derive(Debug, Default)]
pub struct ArrivalClock {
    last: AtomicI64,
}

impl ArrivalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let wall = Utc::now().timestamp_micros();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = wall.max(last + 1);
            match self.last.compare_exchange_weak(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => last = observed,
            }
        }
    }
}
