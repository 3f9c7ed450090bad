//! Dashboard summaries for students and staff.

use tracing::warn;

use crate::access::{is_pending, is_staff};
use crate::api::types::{Attendance, AttendancePage, Feedback, User};
use crate::api::SchoolClient;
use crate::error::ApiResult;

/// Attendance records shown on a student dashboard.
pub const RECENT_ATTENDANCE: u32 = 5;
const RECENT_STUDENT_FEEDBACK: usize = 3;
const RECENT_STAFF_FEEDBACK: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct StudentSummary {
  pub recent_attendance: Vec<Attendance>,
  pub recent_feedback: Vec<Feedback>,
  pub total_days: usize,
  /// Days with at least one subject marked present
  pub present_days: usize,
  /// Percentage of `total_days` that were present
  pub attendance_rate: f64,
  pub feedback_count: usize,
  pub unread: u32,
}

impl StudentSummary {
  pub fn new(page: &AttendancePage, feedback: &[Feedback], unread: u32) -> Self {
    let total_days = page.attendance.len();
    let present_days = page.attendance.iter().filter(|a| a.is_present()).count();
    let attendance_rate = if total_days > 0 {
      present_days as f64 / total_days as f64 * 100.0
    } else {
      0.0
    };

    Self {
      recent_attendance: page.attendance.clone(),
      recent_feedback: feedback.iter().take(RECENT_STUDENT_FEEDBACK).cloned().collect(),
      total_days,
      present_days,
      attendance_rate,
      feedback_count: feedback.len(),
      unread,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaffSummary {
  pub total_users: usize,
  pub approved_users: usize,
  /// Accounts waiting for approval
  pub pending: Vec<User>,
  pub recent_feedback: Vec<Feedback>,
  pub feedback_count: usize,
  pub unread: u32,
}

impl StaffSummary {
  pub fn new(users: &[User], feedback: &[Feedback], unread: u32) -> Self {
    Self {
      total_users: users.len(),
      approved_users: users.iter().filter(|u| u.is_approved).count(),
      pending: users.iter().filter(|u| !u.is_approved).cloned().collect(),
      recent_feedback: feedback.iter().take(RECENT_STAFF_FEEDBACK).cloned().collect(),
      feedback_count: feedback.len(),
      unread,
    }
  }
}

/// What the dashboard shows for the signed-in user
#[derive(Debug, Clone, PartialEq)]
pub enum Dashboard {
  /// Student account not approved yet
  Pending,
  Student(StudentSummary),
  Staff(StaffSummary),
}

impl Dashboard {
  /// Load the dashboard for `user`. Only the queries the role may run are issued.
  pub async fn load(client: &SchoolClient, user: &User) -> ApiResult<Self> {
    if is_pending(user) {
      return Ok(Dashboard::Pending);
    }

    if is_staff(user.role) {
      let (users, feedback, unread) = tokio::try_join!(
        client.users(),
        client.all_feedback(),
        unread_or_zero(client)
      )?;
      return Ok(Dashboard::Staff(StaffSummary::new(&users, &feedback, unread)));
    }

    let (page, feedback, unread) = tokio::try_join!(
      client.my_attendance(1, RECENT_ATTENDANCE),
      client.my_feedback(),
      unread_or_zero(client)
    )?;
    Ok(Dashboard::Student(StudentSummary::new(&page, &feedback, unread)))
  }
}

/// The unread count is decoration; only a lost session is worth failing for.
async fn unread_or_zero(client: &SchoolClient) -> ApiResult<u32> {
  match client.unread_count().await {
    Ok(count) => Ok(count.count),
    Err(e) if e.is_unauthorized() => Err(e),
    Err(e) => {
      warn!("failed to load unread count: {}", e);
      Ok(0)
    }
  }
}
