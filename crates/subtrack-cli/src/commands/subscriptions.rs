//! Subscription command implementations

use anyhow::{Context, Result};
use chrono::NaiveDate;
use subtrack_core::db::Database;
use subtrack_core::models::{round_cents, BillingCycle, NewSubscription, SubscriptionUpdate};
use subtrack_core::report::EvaluatedSubscription;
use subtrack_core::Settings;

use super::{parse_date_arg, resolve_user, truncate};

fn parse_cycle(s: &str) -> Result<BillingCycle> {
    s.parse::<BillingCycle>().map_err(anyhow::Error::msg)
}

fn parse_day(s: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid {} '{}' (use YYYY-MM-DD)", flag, s))
}

/// Arguments for `subs add`
#[derive(Debug)]
pub struct AddSubscriptionArgs<'a> {
    pub name: &'a str,
    pub price: &'a str,
    pub cycle: &'a str,
    pub start: &'a str,
    pub next: Option<&'a str>,
    pub category: Option<&'a str>,
}

pub fn cmd_subs_add(db: &Database, user: &str, args: &AddSubscriptionArgs) -> Result<i64> {
    let user = resolve_user(db, user)?;

    let new = NewSubscription {
        name: args.name.to_string(),
        price: args.price.to_string(),
        billing_cycle: parse_cycle(args.cycle)?,
        start_date: parse_day(args.start, "--start")?,
        next_payment: args.next.map(|s| parse_day(s, "--next")).transpose()?,
        category: args.category.map(String::from),
    };

    let id = db
        .create_subscription(user.id, &new)
        .context("Failed to add subscription")?;
    db.log_audit(
        "cli",
        "create",
        Some("subscription"),
        Some(id),
        Some(&format!("user_id={}, name={}", user.id, new.name.trim())),
    )?;

    println!("✅ Added {} (ID: {}) for {}", new.name.trim(), id, user.email);
    Ok(id)
}

/// List a user's subscriptions with next payments resolved against `date`
///
/// Returns the readable subscriptions as listed. Lapsed dates are shown
/// advanced but not saved.
pub fn cmd_subs_list(
    db: &Database,
    user: &str,
    settings: &Settings,
    date: Option<&str>,
) -> Result<Vec<EvaluatedSubscription>> {
    let user = resolve_user(db, user)?;
    let today = parse_date_arg(date)?;
    let subscriptions = db.list_subscriptions(user.id)?;

    if subscriptions.is_empty() {
        println!("No subscriptions for {}. Run:", user.email);
        println!("  subtrack subs add {} -n Netflix -p 15.99 -s 2024-01-15", user.email);
        return Ok(Vec::new());
    }

    let aggregator = settings.dashboard_aggregator();
    let mut listed = Vec::new();

    println!();
    println!("📋 Subscriptions for {}", user.email);
    println!("   ─────────────────────────────────────────────────────────────");

    for sub in subscriptions {
        match aggregator.evaluate(&sub, today) {
            Ok(Some(entry)) => {
                let parsed = &entry.subscription;
                println!(
                    "   {:>4} │ {:20} │ {:>9}/{:<9} │ ≈ ${:>8.2}/mo │ next {} │ {}",
                    sub.id,
                    truncate(&parsed.name, 20),
                    format!("${:.2}", parsed.price),
                    parsed.cycle.as_str(),
                    round_cents(entry.monthly_equivalent),
                    entry.next_payment,
                    parsed.category
                );
                listed.push(entry);
            }
            Ok(None) => {
                println!(
                    "   {:>4} │ {:20} │ excluded by custom cycle policy",
                    sub.id,
                    truncate(&sub.name, 20)
                );
            }
            Err(e) => {
                println!(
                    "   {:>4} │ {:20} │ ⚠️  unreadable: {}",
                    sub.id,
                    truncate(&sub.name, 20),
                    e
                );
            }
        }
    }

    Ok(listed)
}

/// Arguments for `subs edit`; `None` leaves a field unchanged
#[derive(Debug, Default)]
pub struct EditSubscriptionArgs<'a> {
    pub name: Option<&'a str>,
    pub price: Option<&'a str>,
    pub cycle: Option<&'a str>,
    pub start: Option<&'a str>,
    pub next: Option<&'a str>,
    pub category: Option<&'a str>,
}

pub fn cmd_subs_edit(db: &Database, id: i64, args: &EditSubscriptionArgs) -> Result<()> {
    let update = SubscriptionUpdate {
        name: args.name.map(String::from),
        price: args.price.map(String::from),
        billing_cycle: args.cycle.map(parse_cycle).transpose()?,
        start_date: args.start.map(|s| parse_day(s, "--start")).transpose()?,
        next_payment: args.next.map(|s| parse_day(s, "--next")).transpose()?,
        category: args.category.map(String::from),
    };

    db.update_subscription(id, &update)
        .with_context(|| format!("Failed to update subscription {}", id))?;
    db.log_audit(
        "cli",
        "update",
        Some("subscription"),
        Some(id),
        Some(&format!("{:?}", args)),
    )?;

    println!("✅ Subscription {} updated", id);
    Ok(())
}

pub fn cmd_subs_delete(db: &Database, id: i64) -> Result<()> {
    let sub = db
        .get_subscription(id)?
        .ok_or_else(|| anyhow::anyhow!("Subscription not found: {}", id))?;

    db.delete_subscription(id)?;
    db.log_audit(
        "cli",
        "delete",
        Some("subscription"),
        Some(id),
        Some(&format!("name={}", sub.name)),
    )?;

    println!("🗑️  Deleted {} (ID: {})", sub.name, id);
    Ok(())
}

/// Spending summary using the dashboard sizes from settings
///
/// Read-only: lapsed payment dates are resolved for display but not saved.
pub fn cmd_summary(
    db: &Database,
    user: &str,
    date: Option<&str>,
    json: bool,
    settings: &Settings,
) -> Result<()> {
    let user = resolve_user(db, user)?;
    let today = parse_date_arg(date)?;
    let subscriptions = db.list_subscriptions(user.id)?;
    let aggregate = settings
        .dashboard_aggregator()
        .aggregate(&subscriptions, today)
        .rounded();

    let normalizer = settings.normalizer();
    let yearly: f64 = subscriptions
        .iter()
        .filter_map(|s| s.parse().ok())
        .filter(|p| normalizer.includes(p.cycle))
        .map(|p| normalizer.annual_equivalent(p.price, p.cycle))
        .sum();

    if json {
        println!("{}", serde_json::to_string_pretty(&aggregate)?);
        return Ok(());
    }

    println!();
    println!("💳 Subscription summary for {} ({})", user.email, today);
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Monthly total: ${:.2}", aggregate.total_monthly);
    println!("   Yearly total:  ${:.2}", round_cents(yearly));

    if !aggregate.categories.is_empty() {
        println!();
        println!("   By category");
        for c in &aggregate.categories {
            println!(
                "     {:20} ${:>8.2}  {:>5.1}%",
                truncate(&c.name, 20),
                c.amount,
                c.percentage
            );
        }
    }

    if !aggregate.top_subscriptions.is_empty() {
        println!();
        println!("   Top subscriptions");
        for (i, t) in aggregate.top_subscriptions.iter().enumerate() {
            println!("     {}. {:20} ${:>8.2}/mo", i + 1, truncate(&t.name, 20), t.amount);
        }
    }

    println!();
    if aggregate.upcoming_renewals.is_empty() {
        println!("   No upcoming renewals.");
    } else {
        println!("   Upcoming renewals");
        for u in &aggregate.upcoming_renewals {
            println!(
                "     {} {:20} ${:>8.2}  (in {} days)",
                u.date,
                truncate(&u.name, 20),
                u.amount,
                u.days_until
            );
        }
    }

    if aggregate.skipped > 0 {
        println!();
        println!("   ⚠️  {} unreadable subscription(s) skipped", aggregate.skipped);
    }

    Ok(())
}
