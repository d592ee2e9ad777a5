//! Pricing Calculator
//!
//! Pure function mapping a time interval to a billed amount.
//!
//! Policy: anything up to one hour is charged as one full hour; beyond that
//! the duration rounds up to the next whole hour. No discounts, no proration
//! below the floor. An interval with `end < start` is a caller error, never
//! silently clamped.

use chrono::{DateTime, Utc};

use crate::error::{ParkError, Result};

const SECS_PER_HOUR: i64 = 3600;

/// The outcome of pricing an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// Whole hours billed (≥ 1)
    pub charged_hours: u64,
    /// Total charge in cents
    pub cost_cents: u64,
}

/// Price an interval at an hourly rate.
///
/// Returns `InvalidInterval` when `end < start`. A zero-length interval is
/// valid and bills the one-hour floor.
pub fn quote(rate_cents: u64, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Quote> {
    if end < start {
        return Err(ParkError::InvalidInterval);
    }

    let duration_secs = (end - start).num_seconds();

    // ≤ 1 hour bills exactly one hour; otherwise round up to the next hour
    let charged_hours = if duration_secs <= SECS_PER_HOUR {
        1
    } else {
        (duration_secs as u64).div_ceil(SECS_PER_HOUR as u64)
    };

    Ok(Quote {
        charged_hours,
        cost_cents: charged_hours * rate_cents,
    })
}
