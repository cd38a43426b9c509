//! Report aggregation
//!
//! Shapes a user's subscriptions into the figures shown on the dashboard
//! and sent in monthly report emails: spend per category, the most
//! expensive subscriptions, and renewals coming up soon.
//!
//! A subscription whose stored price or dates do not parse is skipped with
//! a warning and counted in [`Aggregate::skipped`]; it never fails the
//! aggregation as a whole.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::billing::BillingNormalizer;
use crate::error::Result;
use crate::models::{round_cents, ParsedSubscription, Subscription};
use crate::recurrence::{days_until, resolve_next_payment};

/// Sizes and windows for one aggregation caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorOptions {
    /// How many subscriptions to list as "top"
    pub top_n: usize,
    /// Renewals within this many days of today are "upcoming"
    pub upcoming_window_days: i64,
    /// How many upcoming renewals to list
    pub upcoming_limit: usize,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            top_n: 5,
            upcoming_window_days: 30,
            upcoming_limit: 5,
        }
    }
}

/// Monthly spend for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySpend {
    pub name: String,
    pub amount: f64,
    pub percentage: f64,
}

/// A subscription ranked by monthly-equivalent cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSubscription {
    #[serde(skip)]
    pub id: i64,
    pub name: String,
    pub amount: f64,
    pub category: String,
}

/// A payment due within the upcoming window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingRenewal {
    #[serde(skip)]
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    /// The charge itself (price), not its monthly equivalent
    pub amount: f64,
    pub days_until: i64,
}

/// Result of aggregating one user's subscriptions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub categories: Vec<CategorySpend>,
    pub top_subscriptions: Vec<TopSubscription>,
    pub upcoming_renewals: Vec<UpcomingRenewal>,
    pub total_monthly: f64,
    /// Records left out because they could not be parsed
    pub skipped: usize,
}

impl Aggregate {
    /// Copy with every amount and percentage rounded to cents for display
    pub fn rounded(&self) -> Aggregate {
        Aggregate {
            categories: self
                .categories
                .iter()
                .map(|c| CategorySpend {
                    name: c.name.clone(),
                    amount: round_cents(c.amount),
                    percentage: round_cents(c.percentage),
                })
                .collect(),
            top_subscriptions: self
                .top_subscriptions
                .iter()
                .map(|t| TopSubscription {
                    amount: round_cents(t.amount),
                    ..t.clone()
                })
                .collect(),
            upcoming_renewals: self
                .upcoming_renewals
                .iter()
                .map(|u| UpcomingRenewal {
                    amount: round_cents(u.amount),
                    ..u.clone()
                })
                .collect(),
            total_monthly: round_cents(self.total_monthly),
            skipped: self.skipped,
        }
    }
}

/// A parsed subscription with its derived figures for a given day
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedSubscription {
    pub subscription: ParsedSubscription,
    pub monthly_equivalent: f64,
    /// Resolved next payment (after start date and advancement)
    pub next_payment: NaiveDate,
}

impl EvaluatedSubscription {
    /// Whether the stored next payment has lapsed and should be replaced
    /// with the resolved date
    pub fn needs_advance(&self, today: NaiveDate) -> bool {
        self.subscription.next_payment <= today && self.next_payment != self.subscription.next_payment
    }
}

/// Groups, ranks, and filters subscriptions for reports
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAggregator {
    normalizer: BillingNormalizer,
    options: AggregatorOptions,
}

impl ReportAggregator {
    pub fn new(normalizer: BillingNormalizer, options: AggregatorOptions) -> Self {
        Self {
            normalizer,
            options,
        }
    }

    pub fn normalizer(&self) -> &BillingNormalizer {
        &self.normalizer
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    /// Parse and evaluate one stored subscription
    ///
    /// Returns `Ok(None)` for subscriptions excluded by the custom cycle
    /// policy, and an error for records that cannot be parsed or advanced.
    pub fn evaluate(
        &self,
        subscription: &Subscription,
        today: NaiveDate,
    ) -> Result<Option<EvaluatedSubscription>> {
        let parsed = subscription.parse()?;
        if !self.normalizer.includes(parsed.cycle) {
            debug!(id = parsed.id, cycle = %parsed.cycle, "Subscription excluded by cycle policy");
            return Ok(None);
        }

        let monthly_equivalent = self.normalizer.monthly_equivalent(parsed.price, parsed.cycle);
        let next_payment = resolve_next_payment(
            parsed.start_date,
            parsed.next_payment,
            self.normalizer.step(parsed.cycle),
            today,
        )?;

        Ok(Some(EvaluatedSubscription {
            subscription: parsed,
            monthly_equivalent,
            next_payment,
        }))
    }

    /// Evaluate every subscription, skipping and logging malformed ones
    ///
    /// Returns the evaluated subscriptions and the number skipped.
    pub fn evaluate_all(
        &self,
        subscriptions: &[Subscription],
        today: NaiveDate,
    ) -> (Vec<EvaluatedSubscription>, usize) {
        let mut evaluated = Vec::with_capacity(subscriptions.len());
        let mut skipped = 0;

        for sub in subscriptions {
            match self.evaluate(sub, today) {
                Ok(Some(entry)) => evaluated.push(entry),
                Ok(None) => {}
                Err(e) => {
                    warn!(id = sub.id, name = %sub.name, error = %e, "Skipping malformed subscription");
                    skipped += 1;
                }
            }
        }

        (evaluated, skipped)
    }

    /// Aggregate stored subscriptions as of `today`
    pub fn aggregate(&self, subscriptions: &[Subscription], today: NaiveDate) -> Aggregate {
        let (evaluated, skipped) = self.evaluate_all(subscriptions, today);
        let mut aggregate = self.aggregate_evaluated(&evaluated, today);
        aggregate.skipped = skipped;
        aggregate
    }

    /// Aggregate subscriptions that were already evaluated
    pub fn aggregate_evaluated(
        &self,
        evaluated: &[EvaluatedSubscription],
        today: NaiveDate,
    ) -> Aggregate {
        let total_monthly: f64 = evaluated.iter().map(|e| e.monthly_equivalent).sum();

        let mut by_category: BTreeMap<&str, f64> = BTreeMap::new();
        for entry in evaluated {
            *by_category
                .entry(entry.subscription.category.as_str())
                .or_insert(0.0) += entry.monthly_equivalent;
        }

        let mut categories: Vec<CategorySpend> = by_category
            .into_iter()
            .map(|(name, amount)| CategorySpend {
                name: name.to_string(),
                amount,
                percentage: if total_monthly > 0.0 {
                    amount / total_monthly * 100.0
                } else {
                    0.0
                },
            })
            .collect();
        categories.sort_by(|a, b| b.amount.total_cmp(&a.amount).then_with(|| a.name.cmp(&b.name)));

        let mut ranked: Vec<&EvaluatedSubscription> = evaluated.iter().collect();
        ranked.sort_by(|a, b| {
            b.monthly_equivalent
                .total_cmp(&a.monthly_equivalent)
                .then_with(|| a.subscription.name.cmp(&b.subscription.name))
        });
        let top_subscriptions = ranked
            .into_iter()
            .take(self.options.top_n)
            .map(|e| TopSubscription {
                id: e.subscription.id,
                name: e.subscription.name.clone(),
                amount: e.monthly_equivalent,
                category: e.subscription.category.clone(),
            })
            .collect();

        let mut upcoming: Vec<UpcomingRenewal> = evaluated
            .iter()
            .filter_map(|e| {
                let days = days_until(e.next_payment, today);
                (0..=self.options.upcoming_window_days)
                    .contains(&days)
                    .then(|| UpcomingRenewal {
                        id: e.subscription.id,
                        name: e.subscription.name.clone(),
                        date: e.next_payment,
                        amount: e.subscription.price,
                        days_until: days,
                    })
            })
            .collect();
        upcoming.sort_by(|a, b| a.days_until.cmp(&b.days_until).then_with(|| a.name.cmp(&b.name)));
        upcoming.truncate(self.options.upcoming_limit);

        Aggregate {
            categories,
            top_subscriptions,
            upcoming_renewals: upcoming,
            total_monthly,
            skipped: 0,
        }
    }
}

/// Calendar month a report covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReportPeriod {
    pub year: i32,
    pub month: u32,
}

impl ReportPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The month containing `date`
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month before the one containing `date`
    ///
    /// Monthly reports run at the start of a month and cover the month that
    /// just ended.
    pub fn preceding(date: NaiveDate) -> Self {
        Self::containing(date).previous()
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Storage key, e.g. "2024-03"
    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn month_name(&self) -> &'static str {
        const NAMES: [&str; 12] = [
            "January",
            "February",
            "March",
            "April",
            "May",
            "June",
            "July",
            "August",
            "September",
            "October",
            "November",
            "December",
        ];
        NAMES[(self.month as usize).saturating_sub(1).min(11)]
    }
}

impl std::fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.month_name(), self.year)
    }
}

/// Monthly report handed to the email layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub month_name: String,
    pub year: i32,
    pub total_spent: f64,
    pub previous_month_spent: f64,
    pub categories: Vec<CategorySpend>,
    pub top_subscriptions: Vec<TopSubscription>,
    pub upcoming_renewals: Vec<UpcomingRenewal>,
}

impl ReportPayload {
    /// Build the payload, rounding every amount to cents
    pub fn new(aggregate: &Aggregate, period: ReportPeriod, previous_month_spent: f64) -> Self {
        let rounded = aggregate.rounded();
        Self {
            month_name: period.month_name().to_string(),
            year: period.year,
            total_spent: rounded.total_monthly,
            previous_month_spent: round_cents(previous_month_spent),
            categories: rounded.categories,
            top_subscriptions: rounded.top_subscriptions,
            upcoming_renewals: rounded.upcoming_renewals,
        }
    }

    /// Change against the previous month (positive means more spent)
    pub fn change(&self) -> f64 {
        round_cents(self.total_spent - self.previous_month_spent)
    }
}

/// Payment reminder handed to the email layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPayload {
    pub name: String,
    pub price: f64,
    pub billing_cycle: String,
    pub next_payment: NaiveDate,
    pub days_until_payment: i64,
}

impl ReminderPayload {
    pub fn new(entry: &EvaluatedSubscription, today: NaiveDate) -> Self {
        Self {
            name: entry.subscription.name.clone(),
            price: round_cents(entry.subscription.price),
            billing_cycle: entry.subscription.cycle.to_string(),
            next_payment: entry.next_payment,
            days_until_payment: days_until(entry.next_payment, today),
        }
    }
}
