//! Domain models for Subtrack

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Category assigned to subscriptions without one
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Date format used for all stored calendar dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Recurrence interval of a subscription charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillingCycle {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
    /// Offered by the entry forms but has no defined normalization rule.
    /// Handled according to `CustomCyclePolicy`.
    Custom,
    /// Any stored value that is not one of the above
    #[serde(other)]
    Unrecognized,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "Weekly",
            Self::Biweekly => "Biweekly",
            Self::Monthly => "Monthly",
            Self::Quarterly => "Quarterly",
            Self::Yearly => "Yearly",
            Self::Custom => "Custom",
            Self::Unrecognized => "Unrecognized",
        }
    }

    /// All cycles a user can pick
    pub fn all() -> &'static [BillingCycle] {
        &[
            Self::Weekly,
            Self::Biweekly,
            Self::Monthly,
            Self::Quarterly,
            Self::Yearly,
            Self::Custom,
        ]
    }

    /// Parse a stored value, mapping anything unknown to `Unrecognized`
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Self::Unrecognized)
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "biweekly" | "bi-weekly" | "fortnightly" => Ok(Self::Biweekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" | "annual" | "annually" => Ok(Self::Yearly),
            "custom" => Ok(Self::Custom),
            _ => Err(format!(
                "Unknown billing cycle: {} (valid: weekly, biweekly, monthly, quarterly, yearly, custom)",
                s
            )),
        }
    }
}

/// How often a user wants payment reminders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReminderFrequency {
    /// Every day during the last week before a payment
    #[serde(rename = "daily")]
    Daily,
    /// Once, seven days before a payment
    #[serde(rename = "weekly")]
    Weekly,
    /// Once, three days before a payment
    #[default]
    #[serde(rename = "3days")]
    ThreeDays,
}

impl ReminderFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::ThreeDays => "3days",
        }
    }

    /// Whether a payment `days_until` away should trigger a reminder today
    pub fn is_due(&self, days_until: i64) -> bool {
        match self {
            Self::Daily => (1..=7).contains(&days_until),
            Self::Weekly => days_until == 7,
            Self::ThreeDays => days_until == 3,
        }
    }
}

impl std::str::FromStr for ReminderFrequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "3days" | "3-days" | "three_days" => Ok(Self::ThreeDays),
            _ => Err(format!(
                "Unknown reminder frequency: {} (valid: daily, weekly, 3days)",
                s
            )),
        }
    }
}

/// Email notification preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub payment_reminders: bool,
    pub reminder_frequency: ReminderFrequency,
    pub monthly_reports: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            payment_reminders: true,
            reminder_frequency: ReminderFrequency::ThreeDays,
            monthly_reports: true,
        }
    }
}

/// Account security preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPreferences {
    pub two_factor_enabled: bool,
    pub always_require_two_factor: bool,
    pub login_notifications: bool,
}

impl Default for SecurityPreferences {
    fn default() -> Self {
        Self {
            two_factor_enabled: false,
            always_require_two_factor: false,
            login_notifications: true,
        }
    }
}

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub display_name: Option<String>,
    pub notifications: NotificationPreferences,
    pub security: SecurityPreferences,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Name used in email greetings
    pub fn greeting_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

/// A tracked subscription as stored
///
/// Price, cycle, and dates are kept as the raw strings that were submitted,
/// so a record that fails to parse can be skipped by readers instead of
/// failing a whole batch. Use [`Subscription::parse`] to get typed values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub price: String,
    pub billing_cycle: String,
    pub start_date: String,
    pub next_payment: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Category label, falling back to "Uncategorized"
    pub fn category_or_default(&self) -> &str {
        category_or_default(self.category.as_deref())
    }

    /// Parse the stored strings into typed values
    pub fn parse(&self) -> Result<ParsedSubscription> {
        let price = parse_price(&self.price)
            .map_err(|e| Error::InvalidData(format!("subscription {}: {}", self.id, e)))?;
        let start_date = parse_date(&self.start_date)
            .map_err(|e| Error::InvalidData(format!("subscription {} start date: {}", self.id, e)))?;
        let next_payment = parse_date(&self.next_payment).map_err(|e| {
            Error::InvalidData(format!("subscription {} next payment: {}", self.id, e))
        })?;

        Ok(ParsedSubscription {
            id: self.id,
            name: self.name.clone(),
            price,
            cycle: BillingCycle::parse_lenient(&self.billing_cycle),
            start_date,
            next_payment,
            category: self.category_or_default().to_string(),
        })
    }
}

/// A subscription with its stored strings parsed
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSubscription {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub cycle: BillingCycle,
    pub start_date: NaiveDate,
    pub next_payment: NaiveDate,
    pub category: String,
}

/// Input for creating a subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubscription {
    pub name: String,
    pub price: String,
    pub billing_cycle: BillingCycle,
    pub start_date: NaiveDate,
    /// Defaults to the start date
    pub next_payment: Option<NaiveDate>,
    pub category: Option<String>,
}

impl NewSubscription {
    /// Reject input that readers would later have to skip
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidData("subscription name is required".into()));
        }
        parse_price(&self.price).map_err(Error::InvalidData)?;
        if self.billing_cycle == BillingCycle::Unrecognized {
            return Err(Error::InvalidData("billing cycle is required".into()));
        }
        Ok(())
    }
}

/// Partial update of a subscription; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
    pub name: Option<String>,
    pub price: Option<String>,
    pub billing_cycle: Option<BillingCycle>,
    pub start_date: Option<NaiveDate>,
    pub next_payment: Option<NaiveDate>,
    /// An empty string clears the category
    pub category: Option<String>,
}

impl SubscriptionUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(Error::InvalidData("subscription name is required".into()));
            }
        }
        if let Some(price) = &self.price {
            parse_price(price).map_err(Error::InvalidData)?;
        }
        if self.billing_cycle == Some(BillingCycle::Unrecognized) {
            return Err(Error::InvalidData("billing cycle is required".into()));
        }
        Ok(())
    }
}

/// One recorded email address change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailChange {
    pub old_email: String,
    pub new_email: String,
    pub changed_at: DateTime<Utc>,
}

/// Subscription summary held in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySubscription {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub billing_cycle: BillingCycle,
    pub monthly_equivalent: f64,
    pub category: String,
    #[serde(default)]
    pub start_date: NaiveDate,
    /// Stored next payment; resolved to a future date when served
    pub next_payment: NaiveDate,
}

/// Denormalized per-user projection, rebuilt from the subscriptions table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRegistry {
    pub user_id: i64,
    pub email: String,
    pub email_history: Vec<EmailChange>,
    pub subscriptions: Vec<RegistrySubscription>,
    pub total_monthly: f64,
    pub rebuilt_at: DateTime<Utc>,
}

/// Category label, falling back to "Uncategorized" for missing or blank values
pub fn category_or_default(category: Option<&str>) -> &str {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
}

/// Parse a decimal price string; must be a finite number greater than zero
pub fn parse_price(s: &str) -> std::result::Result<f64, String> {
    let trimmed = s.trim().trim_start_matches('$');
    let price: f64 = trimmed
        .parse()
        .map_err(|_| format!("invalid price: {:?}", s))?;
    if !price.is_finite() || price <= 0.0 {
        return Err(format!("price must be greater than zero: {:?}", s));
    }
    Ok(price)
}

/// Parse an ISO calendar date, accepting a trailing time component
pub fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    let trimmed = s.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).map_err(|_| format!("invalid date: {:?}", s))
}

/// Round to cents for presentation
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
