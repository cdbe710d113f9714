//! Rendering of store timestamps (`YYYY-MM-DD HH:MM:SS`, UTC).

use chrono::{NaiveDateTime, Utc};

const DB_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_and_format_time(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, DB_FORMAT)
        .map(|dt| format_relative_time(&dt))
        .unwrap_or_else(|_| db_time.to_string())
}

pub fn format_relative_time(dt: &NaiveDateTime) -> String {
    let now = Utc::now().naive_utc();
    let diff = now.signed_duration_since(*dt);

    let seconds = diff.num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    dt.format("%b %-d, %Y").to_string()
}

/// "January 05, 2025" style, used for profile join dates.
pub fn format_join_date(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, DB_FORMAT)
        .map(|dt| dt.format("%B %d, %Y").to_string())
        .unwrap_or_else(|_| db_time.to_string())
}
