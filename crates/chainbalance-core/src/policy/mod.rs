//! Admission and retry policies used by the dispatcher.
//!
//! ```text
//! Request → [RateTracker admission] → [Endpoint call] → [RetryPolicy on failure]
//! ```

pub mod rate_window;
pub mod retry;

pub use rate_window::{RateState, RateTracker, RateWindow};
pub use retry::RetryPolicy;
