//! Exponential backoff.

use std::time::Duration;

/// Base delay of the default backoff schedule.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Calculate `base * 2^(attempt - 1)`. Attempt 0 means no delay.
///
/// No jitter: callers cap the result themselves.
pub fn calculate_backoff(attempt: u32, base: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u32.saturating_pow(attempt - 1);
    base.saturating_mul(exponential_base)
}
