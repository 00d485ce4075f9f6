//! Fixed-window admission counter, one window per endpoint.
//!
//! Each endpoint may serve `cap` requests per window. Once the cap is reached,
//! the next attempt made after more than `window_minutes` have elapsed since
//! the window opened starts a fresh window and is admitted as its first
//! request. Windows never roll over on their own; only an admission attempt
//! resets them.

use serde::{Deserialize, Serialize};

/// Per-endpoint admission counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateState {
    /// When the current window opened, in epoch milliseconds.
    #[serde(alias = "firstRequestAtMillis")]
    pub window_start_millis: u64,
    /// Requests admitted in the current window.
    #[serde(alias = "numberOfAccesses")]
    pub access_count: u64,
}

impl RateState {
    pub fn fresh(now_millis: u64) -> Self {
        Self {
            window_start_millis: now_millis,
            access_count: 0,
        }
    }
}

/// Effective limits after applying the safety factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateWindow {
    /// Requests admitted per window. May be fractional.
    pub cap: f64,
    /// Window length in minutes. May be fractional.
    pub window_minutes: f64,
}

impl RateWindow {
    /// Divide both the raw cap and the raw window by `factor`.
    pub fn scaled(max_requests: u64, max_minutes: f64, factor: f64) -> Self {
        Self {
            cap: max_requests as f64 / factor,
            window_minutes: max_minutes / factor,
        }
    }
}

/// Admission decisions for every endpoint of a pool.
#[derive(Debug, Clone)]
pub struct RateTracker {
    window: RateWindow,
    states: Vec<RateState>,
}

impl RateTracker {
    /// Build a tracker for `pool_size` endpoints.
    ///
    /// A `seed` is reused only when it has exactly one entry per endpoint;
    /// otherwise every endpoint starts a fresh window at `now_millis`.
    pub fn new(
        window: RateWindow,
        pool_size: usize,
        seed: Option<&[RateState]>,
        now_millis: u64,
    ) -> Self {
        let states = match seed {
            Some(seed) if seed.len() == pool_size => seed.to_vec(),
            Some(seed) => {
                tracing::debug!(
                    seeded = seed.len(),
                    pool_size,
                    "discarding rate state seed with mismatched length"
                );
                vec![RateState::fresh(now_millis); pool_size]
            }
            None => vec![RateState::fresh(now_millis); pool_size],
        };
        Self { window, states }
    }

    /// Try to admit one request to endpoint `index`.
    ///
    /// Rejection leaves the endpoint's state untouched.
    pub fn admit(&mut self, index: usize, now_millis: u64) -> bool {
        let window = self.window;
        let Some(state) = self.states.get_mut(index) else {
            return false;
        };

        if (state.access_count as f64) < window.cap {
            state.access_count += 1;
            return true;
        }

        if minutes_between(state.window_start_millis, now_millis) > window.window_minutes {
            state.window_start_millis = now_millis;
            state.access_count = 1;
            tracing::debug!(endpoint = index, "rate window reset");
            return true;
        }

        false
    }

    pub fn window(&self) -> RateWindow {
        self.window
    }

    pub fn state(&self, index: usize) -> Option<&RateState> {
        self.states.get(index)
    }

    pub fn states(&self) -> &[RateState] {
        &self.states
    }
}

fn minutes_between(start_millis: u64, now_millis: u64) -> f64 {
    now_millis.saturating_sub(start_millis) as f64 / 1000.0 / 60.0
}
