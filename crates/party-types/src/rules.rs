use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

/// How far back a party may have started and still be listed.
pub const LOOK_BACK_HOURS: i64 = 12;
/// How far ahead a party may start and still be listed.
pub const LOOK_AHEAD_HOURS: i64 = 48;

pub const DESCRIPTION_MAX_CHARS: usize = 256;

pub const ROLE_AUTHENTICATED: &str = "authenticated";
pub const ROLE_ADMIN: &str = "admin";

pub const PROVIDER_LOCAL: &str = "local";
pub const PROVIDER_FACEBOOK: &str = "facebook";

// Dot-atom local part, dotted hostname domain. Quoted local parts are not accepted.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?$",
    )
    .expect("email regex is valid")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Escape the characters that matter for HTML injection.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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

pub fn check_latitude(latitude: f64) -> Result<(), String> {
    if (-90.0..=90.0).contains(&latitude) {
        Ok(())
    } else {
        Err(format!("latitude {} is outside [-90, 90]", latitude))
    }
}

pub fn check_longitude(longitude: f64) -> Result<(), String> {
    if (-180.0..=180.0).contains(&longitude) {
        Ok(())
    } else {
        Err(format!("longitude {} is outside [-180, 180]", longitude))
    }
}

pub fn check_cost(field: &str, cost: i64) -> Result<u32, String> {
    u32::try_from(cost).map_err(|_| format!("{} must be between 0 and {}", field, u32::MAX))
}

pub fn check_description(description: &str) -> Result<(), String> {
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        Err(format!("description is longer than {} characters", DESCRIPTION_MAX_CHARS))
    } else {
        Ok(())
    }
}

pub fn check_time_window(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Result<(), String> {
    match end {
        Some(end) if end < start => Err("endTime is before startTime".into()),
        _ => Ok(()),
    }
}

/// The `[from, to]` band a party's time window must overlap to be listed as
/// current at `now`.
pub fn relevant_band(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        now - Duration::hours(LOOK_BACK_HOURS),
        now + Duration::hours(LOOK_AHEAD_HOURS),
    )
}

/// Whether a party running from `start` (until `end`, or just the instant
/// `start`) overlaps the listing band at `now`.
pub fn is_current(start: DateTime<Utc>, end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let (from, to) = relevant_band(now);
    start <= to && end.unwrap_or(start) >= from
}
