//! Billing-cycle normalization
//!
//! Converts a subscription price into a monthly-equivalent and an annual
//! equivalent so subscriptions on different cycles can be compared and
//! summed. Every caller (dispatcher, registry rebuild, dashboard, CLI)
//! goes through [`BillingNormalizer`]; nothing else should switch on the
//! billing cycle to compute amounts.
//!
//! Results are unrounded. Round with [`crate::models::round_cents`] only
//! when presenting a figure.

use serde::{Deserialize, Serialize};

use crate::models::BillingCycle;
use crate::recurrence::CycleStep;

/// Average number of weeks in a month
pub const WEEKS_PER_MONTH: f64 = 4.33;

/// Average number of two-week periods in a month
pub const BIWEEKS_PER_MONTH: f64 = 2.17;

/// What to do with subscriptions on the `Custom` cycle
///
/// The entry forms offer "Custom" without saying what interval it means.
/// `Monthly` keeps the long-standing behavior of treating the price as a
/// monthly charge; `Exclude` leaves those subscriptions out of totals and
/// never advances their payment date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomCyclePolicy {
    #[default]
    Monthly,
    Exclude,
}

impl std::str::FromStr for CustomCyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "exclude" => Ok(Self::Exclude),
            _ => Err(format!(
                "Unknown custom cycle policy: {} (valid: monthly, exclude)",
                s
            )),
        }
    }
}

/// Number of charges per year for a cycle
///
/// `Unrecognized` (and `Custom`, when counted) fall back to monthly.
pub fn annual_factor(cycle: BillingCycle) -> f64 {
    match cycle {
        BillingCycle::Weekly => 52.0,
        BillingCycle::Biweekly => 26.0,
        BillingCycle::Monthly => 12.0,
        BillingCycle::Quarterly => 4.0,
        BillingCycle::Yearly => 1.0,
        BillingCycle::Custom | BillingCycle::Unrecognized => 12.0,
    }
}

/// Normalizes prices across billing cycles
#[derive(Debug, Clone, Copy, Default)]
pub struct BillingNormalizer {
    custom_policy: CustomCyclePolicy,
}

impl BillingNormalizer {
    pub fn new(custom_policy: CustomCyclePolicy) -> Self {
        Self { custom_policy }
    }

    pub fn custom_policy(&self) -> CustomCyclePolicy {
        self.custom_policy
    }

    /// Whether subscriptions on this cycle count toward totals
    pub fn includes(&self, cycle: BillingCycle) -> bool {
        !(cycle == BillingCycle::Custom && self.custom_policy == CustomCyclePolicy::Exclude)
    }

    /// Price normalized to a monthly rate
    ///
    /// Unrecognized cycles return the price unchanged. Excluded custom
    /// subscriptions contribute nothing.
    pub fn monthly_equivalent(&self, price: f64, cycle: BillingCycle) -> f64 {
        if !self.includes(cycle) {
            return 0.0;
        }
        match cycle {
            BillingCycle::Weekly => price * WEEKS_PER_MONTH,
            BillingCycle::Biweekly => price * BIWEEKS_PER_MONTH,
            BillingCycle::Monthly => price,
            BillingCycle::Quarterly => price / 3.0,
            BillingCycle::Yearly => price / 12.0,
            BillingCycle::Custom | BillingCycle::Unrecognized => price,
        }
    }

    /// Price normalized to a yearly rate
    pub fn annual_equivalent(&self, price: f64, cycle: BillingCycle) -> f64 {
        if !self.includes(cycle) {
            return 0.0;
        }
        price * annual_factor(cycle)
    }

    /// Calendar step between two payments, if the cycle can be advanced
    pub fn step(&self, cycle: BillingCycle) -> Option<CycleStep> {
        match cycle {
            BillingCycle::Custom if self.custom_policy == CustomCyclePolicy::Exclude => None,
            BillingCycle::Custom | BillingCycle::Unrecognized => Some(CycleStep::Months(1)),
            other => CycleStep::for_cycle(other),
        }
    }
}
