//! Relative timestamps for conversation lists.

use std::fmt;

use chrono::{DateTime, TimeZone};

/// Format `then` relative to `now`.
///
/// Under a minute (or in the future): `just now`; under an hour:
/// `N min ago`; same calendar day: `HH:MM`; otherwise `Mon D`.
#[must_use]
pub fn format_relative<Tz>(then: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let elapsed = now.clone().signed_duration_since(then).num_seconds();

    if elapsed < 60 {
        "just now".to_string()
    } else if elapsed < 3600 {
        format!("{} min ago", elapsed / 60)
    } else if then.date_naive() == now.date_naive() {
        then.format("%H:%M").to_string()
    } else {
        then.format("%b %-d").to_string()
    }
}
