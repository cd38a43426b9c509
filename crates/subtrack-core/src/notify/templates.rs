//! Email rendering
//!
//! Each template produces an HTML body and a plain-text alternative.
//! Everything user-provided (names, categories) is escaped in the HTML.

use std::fmt::Write as _;

use crate::models::User;
use crate::report::{ReminderPayload, ReportPayload};

use super::EmailMessage;

/// Escape text for inclusion in HTML
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn money(amount: f64) -> String {
    format!("${:.2}", amount)
}

fn days_phrase(days: i64) -> String {
    match days {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {} days", n),
    }
}

fn wrap_html(title: &str, body: &str, app_url: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body style=\"font-family: sans-serif; color: #1f2937;\">\n{body}\n\
         <p style=\"font-size: 12px; color: #6b7280;\">\
         Manage your notification settings at <a href=\"{url}\">{url}</a>.</p>\n\
         </body>\n</html>\n",
        title = escape_html(title),
        body = body,
        url = escape_html(app_url),
    )
}

/// Payment reminder for one subscription
pub fn reminder_email(user: &User, reminder: &ReminderPayload, app_url: &str) -> EmailMessage {
    let when = days_phrase(reminder.days_until_payment);
    let subject = format!("Payment reminder: {} renews {}", reminder.name, when);
    let date = reminder.next_payment.format("%B %-d, %Y");

    let text = format!(
        "Hi {name},\n\n\
         Your {sub} subscription ({cycle}) renews {when}, on {date}.\n\
         Amount: {price}\n\n\
         Manage your subscriptions at {url}\n",
        name = user.greeting_name(),
        sub = reminder.name,
        cycle = reminder.billing_cycle,
        when = when,
        date = date,
        price = money(reminder.price),
        url = app_url,
    );

    let body = format!(
        "<p>Hi {name},</p>\n\
         <p>Your <strong>{sub}</strong> subscription ({cycle}) renews {when}, on {date}.</p>\n\
         <p style=\"font-size: 20px;\">Amount: <strong>{price}</strong></p>",
        name = escape_html(user.greeting_name()),
        sub = escape_html(&reminder.name),
        cycle = escape_html(&reminder.billing_cycle),
        when = when,
        date = date,
        price = money(reminder.price),
    );

    EmailMessage {
        to: user.email.clone(),
        subject,
        html: wrap_html("Payment reminder", &body, app_url),
        text,
    }
}

/// Monthly spending report
pub fn report_email(user: &User, report: &ReportPayload, app_url: &str) -> EmailMessage {
    let subject = format!(
        "Your {} {} subscription report",
        report.month_name, report.year
    );
    let change = report.change();
    let change_phrase = if change > 0.0 {
        format!("up {} from last month", money(change))
    } else if change < 0.0 {
        format!("down {} from last month", money(-change))
    } else {
        "the same as last month".to_string()
    };

    let mut text = format!(
        "Hi {},\n\nYour monthly subscription spend for {} {} was {} ({}).\n",
        user.greeting_name(),
        report.month_name,
        report.year,
        money(report.total_spent),
        change_phrase
    );
    let mut body = format!(
        "<p>Hi {},</p>\n<p>Your monthly subscription spend for {} {} was \
         <strong>{}</strong> ({}).</p>\n",
        escape_html(user.greeting_name()),
        report.month_name,
        report.year,
        money(report.total_spent),
        change_phrase
    );

    if !report.categories.is_empty() {
        text.push_str("\nBy category:\n");
        body.push_str("<h3>By category</h3>\n<table>\n");
        for c in &report.categories {
            let _ = writeln!(text, "  {:<20} {:>10} {:>6.1}%", c.name, money(c.amount), c.percentage);
            let _ = writeln!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{:.1}%</td></tr>",
                escape_html(&c.name),
                money(c.amount),
                c.percentage
            );
        }
        body.push_str("</table>\n");
    }

    if !report.top_subscriptions.is_empty() {
        text.push_str("\nTop subscriptions:\n");
        body.push_str("<h3>Top subscriptions</h3>\n<ol>\n");
        for t in &report.top_subscriptions {
            let _ = writeln!(text, "  {} ({}): {}/mo", t.name, t.category, money(t.amount));
            let _ = writeln!(
                body,
                "<li>{} ({}): {}/mo</li>",
                escape_html(&t.name),
                escape_html(&t.category),
                money(t.amount)
            );
        }
        body.push_str("</ol>\n");
    }

    if report.upcoming_renewals.is_empty() {
        text.push_str("\nNo upcoming renewals.\n");
        body.push_str("<p>No upcoming renewals.</p>\n");
    } else {
        text.push_str("\nUpcoming renewals:\n");
        body.push_str("<h3>Upcoming renewals</h3>\n<ul>\n");
        for u in &report.upcoming_renewals {
            let _ = writeln!(
                text,
                "  {} on {} ({}): {}",
                u.name,
                u.date,
                days_phrase(u.days_until),
                money(u.amount)
            );
            let _ = writeln!(
                body,
                "<li>{} on {} ({}): {}</li>",
                escape_html(&u.name),
                u.date,
                days_phrase(u.days_until),
                money(u.amount)
            );
        }
        body.push_str("</ul>\n");
    }

    let _ = write!(text, "\nView your dashboard at {}\n", app_url);

    EmailMessage {
        to: user.email.clone(),
        subject,
        html: wrap_html("Monthly report", &body, app_url),
        text,
    }
}

/// One-time verification code
pub fn verification_code_email(user: &User, code: &str, ttl_minutes: i64, app_url: &str) -> EmailMessage {
    let text = format!(
        "Hi {},\n\nYour Subtrack verification code is {}. It expires in {} minutes.\n\n\
         If you did not request this code, you can ignore this email.\n",
        user.greeting_name(),
        code,
        ttl_minutes
    );
    let body = format!(
        "<p>Hi {},</p>\n<p>Your verification code is:</p>\n\
         <p style=\"font-size: 28px; letter-spacing: 6px;\"><strong>{}</strong></p>\n\
         <p>It expires in {} minutes. If you did not request this code, you can ignore this email.</p>",
        escape_html(user.greeting_name()),
        escape_html(code),
        ttl_minutes
    );

    EmailMessage {
        to: user.email.clone(),
        subject: "Your Subtrack verification code".to_string(),
        html: wrap_html("Verification code", &body, app_url),
        text,
    }
}
