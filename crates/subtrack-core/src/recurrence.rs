//! Recurrence advancement of payment dates
//!
//! A stored next-payment date lags behind once its day has passed. These
//! functions roll it forward by whole billing cycles until it lies after
//! "today".
//!
//! Month-based cycles use calendar arithmetic, not fixed day counts. Each
//! step is added to the previous payment date, with chrono clamping to the
//! end of short months: Jan 31 advances to Feb 29 (2024) and then Mar 29.
//! Because every step only depends on the date before it, advancing in one
//! go and advancing through a persisted intermediate date agree.

use chrono::{Days, Months, NaiveDate};

use crate::error::{Error, Result};
use crate::models::BillingCycle;

/// Upper bound on cycles added in a single advancement
pub const MAX_ADVANCE_STEPS: u32 = 10_000;

/// Calendar distance between two payments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    Days(u32),
    Months(u32),
}

impl CycleStep {
    /// Step for a cycle with a defined interval
    pub fn for_cycle(cycle: BillingCycle) -> Option<Self> {
        match cycle {
            BillingCycle::Weekly => Some(Self::Days(7)),
            BillingCycle::Biweekly => Some(Self::Days(14)),
            BillingCycle::Monthly => Some(Self::Months(1)),
            BillingCycle::Quarterly => Some(Self::Months(3)),
            BillingCycle::Yearly => Some(Self::Months(12)),
            BillingCycle::Custom | BillingCycle::Unrecognized => None,
        }
    }

    fn is_zero(&self) -> bool {
        matches!(self, Self::Days(0) | Self::Months(0))
    }

    /// `anchor` advanced by `count` steps, or None on calendar overflow
    pub fn add_to(&self, anchor: NaiveDate, count: u32) -> Option<NaiveDate> {
        match *self {
            Self::Days(days) => anchor.checked_add_days(Days::new(u64::from(days) * u64::from(count))),
            Self::Months(months) => anchor.checked_add_months(Months::new(months.checked_mul(count)?)),
        }
    }
}

/// First payment date strictly after `today`, starting from `last_date`
///
/// Returns `last_date` itself when it is already in the future.
pub fn next_occurrence(last_date: NaiveDate, step: CycleStep, today: NaiveDate) -> Result<NaiveDate> {
    if last_date > today {
        return Ok(last_date);
    }
    if step.is_zero() {
        return Err(Error::InvalidData(format!(
            "zero-length billing step {:?}",
            step
        )));
    }

    let mut candidate = last_date;
    for _ in 0..MAX_ADVANCE_STEPS {
        candidate = step.add_to(candidate, 1).ok_or_else(|| {
            Error::InvalidData(format!("date overflow advancing {} by {:?}", last_date, step))
        })?;
        if candidate > today {
            return Ok(candidate);
        }
    }

    Err(Error::InvalidData(format!(
        "{} is more than {} cycles before {}",
        last_date, MAX_ADVANCE_STEPS, today
    )))
}

/// Next payment date as it should be shown and acted on today
///
/// A subscription that has not started yet pays first on its start date.
/// Otherwise the stored next payment is rolled forward. When the cycle has
/// no step (an excluded custom cycle) the stored date is returned as is.
pub fn resolve_next_payment(
    start_date: NaiveDate,
    stored_next: NaiveDate,
    step: Option<CycleStep>,
    today: NaiveDate,
) -> Result<NaiveDate> {
    if start_date > today {
        return Ok(start_date);
    }
    match step {
        Some(step) => next_occurrence(stored_next, step, today),
        None => Ok(stored_next),
    }
}

/// Whole days from `today` until `date` (negative when in the past)
pub fn days_until(date: NaiveDate, today: NaiveDate) -> i64 {
    (date - today).num_days()
}
