//! Round-robin endpoint selection gated by per-endpoint rate windows.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time;

use crate::clock::Clock;
use crate::policy::{RateState, RateTracker};

/// Mutable dispatcher state: the cursor and every endpoint's counters.
#[derive(Debug)]
struct DispatchState {
    cursor: usize,
    rates: RateTracker,
}

/// Round-robin scheduler.
///
/// Every acquisition claims the endpoint under the cursor and advances the
/// cursor, whether or not that endpoint is admissible right now. A rejected
/// claim then waits on its own endpoint instead of moving on, so concurrent
/// callers keep distinct endpoints and the rotation stays fair.
pub struct Scheduler {
    state: Mutex<DispatchState>,
    pool_size: usize,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    /// `pool_size` must be non-zero; `initial_cursor` is taken modulo it.
    pub(crate) fn new(
        pool_size: usize,
        initial_cursor: usize,
        rates: RateTracker,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                cursor: initial_cursor % pool_size,
                rates,
            }),
            pool_size,
            clock,
        }
    }

    /// The endpoint index the next acquisition will claim.
    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Copy of every endpoint's counters.
    pub fn snapshot(&self) -> Vec<RateState> {
        self.lock().rates.states().to_vec()
    }

    /// Claim the next endpoint and wait until its window admits a request.
    ///
    /// While waiting, admission is re-tested every `poll_interval`. There is
    /// no attempt limit; drop the future to give up.
    pub async fn acquire(&self, poll_interval: Duration) -> usize {
        let (index, admitted) = self.claim();
        if admitted {
            return index;
        }

        tracing::debug!(
            endpoint = index,
            poll_ms = poll_interval.as_millis() as u64,
            "endpoint over quota, waiting for its window"
        );

        // tokio clamps far deadlines, even `Duration::MAX`.
        loop {
            time::sleep(poll_interval).await;
            if self.admit(index) {
                tracing::debug!(endpoint = index, "endpoint admitted after wait");
                return index;
            }
        }
    }

    /// Capture and advance the cursor, then test the captured endpoint, all
    /// under one lock.
    fn claim(&self) -> (usize, bool) {
        let now = self.clock.now_millis();
        let mut state = self.lock();
        let index = state.cursor;
        state.cursor = (index + 1) % self.pool_size;
        let admitted = state.rates.admit(index, now);
        (index, admitted)
    }

    fn admit(&self, index: usize) -> bool {
        let now = self.clock.now_millis();
        self.lock().rates.admit(index, now)
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("cursor", &self.cursor())
            .field("pool_size", &self.pool_size)
            .finish()
    }
}
