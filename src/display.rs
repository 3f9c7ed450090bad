//! Text formatting for command output.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::api::types::{Role, SubjectStatus};

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
    return Some(dt.with_timezone(&Utc).naive_utc());
  }
  NaiveDate::parse_from_str(value, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// "January 5, 2025". Unparseable input is returned unchanged.
pub fn format_date(value: &str) -> String {
  match parse_timestamp(value) {
    Some(dt) => dt.format("%B %-d, %Y").to_string(),
    None => value.to_string(),
  }
}

/// "Jan 5, 2025, 02:30 PM" in UTC. Unparseable input is returned unchanged.
pub fn format_date_time(value: &str) -> String {
  match parse_timestamp(value) {
    Some(dt) => dt.format("%b %-d, %Y, %I:%M %p").to_string(),
    None => value.to_string(),
  }
}

/// Keep the first `max_chars` characters, adding "..." if anything was cut.
pub fn truncate_text(s: &str, max_chars: usize) -> String {
  match s.char_indices().nth(max_chars) {
    Some((idx, _)) => format!("{}...", &s[..idx]),
    None => s.to_string(),
  }
}

pub fn status_label(status: SubjectStatus) -> &'static str {
  match status {
    SubjectStatus::Present => "Present",
    SubjectStatus::Absent => "Absent",
    SubjectStatus::Late => "Late",
  }
}

pub fn role_label(role: Role) -> &'static str {
  match role {
    Role::User => "Student",
    Role::Teacher => "Teacher",
    Role::Superadmin => "Super Admin",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_date() {
    assert_eq!(format_date("2025-01-05T14:30:00.000Z"), "January 5, 2025");
    assert_eq!(format_date("2025-12-25"), "December 25, 2025");
    assert_eq!(format_date("yesterday"), "yesterday");
  }

  #[test]
  fn test_format_date_time() {
    assert_eq!(
      format_date_time("2025-01-05T14:30:00Z"),
      "Jan 5, 2025, 02:30 PM"
    );
    assert_eq!(
      format_date_time("2025-03-09T09:05:00+00:00"),
      "Mar 9, 2025, 09:05 AM"
    );
  }

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate_text("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate_text("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate_text("hello world", 5), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate_text("héllo wörld", 7), "héllo w...");
  }

  #[test]
  fn test_labels() {
    assert_eq!(status_label(SubjectStatus::Late), "Late");
    assert_eq!(role_label(Role::Superadmin), "Super Admin");
  }
}
