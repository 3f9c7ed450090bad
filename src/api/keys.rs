//! Cache keys for SchoolHub queries.

use crate::query::QueryKey;

// ============================================================================
// Resource namespaces
// ============================================================================

/// Top-level namespaces. Every query key starts with one, and a write to a
/// resource invalidates its whole namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
  Auth,
  Users,
  Attendance,
  Feedback,
  Notifications,
}

impl Resource {
  pub const ALL: [Resource; 5] = [
    Resource::Auth,
    Resource::Users,
    Resource::Attendance,
    Resource::Feedback,
    Resource::Notifications,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      Self::Auth => "auth",
      Self::Users => "users",
      Self::Attendance => "attendance",
      Self::Feedback => "feedback",
      Self::Notifications => "notifications",
    }
  }

  /// Key prefix matching every query of this resource.
  pub fn prefix(&self) -> QueryKey {
    QueryKey::new(self.name())
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Query key types for SchoolHub API calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchoolQuery {
  /// The signed-in account
  CurrentUser,
  /// Every account (staff only)
  Users,
  /// One page of the signed-in student's attendance
  MyAttendance { page: u32, limit: u32 },
  /// One page of a given student's attendance
  UserAttendance { user_id: String, page: u32, limit: u32 },
  /// Feedback sent by the signed-in student
  MyFeedback,
  /// Every feedback thread (staff only)
  AllFeedback,
  /// Notification list
  Notifications,
  /// Unread notification count
  UnreadCount,
}

impl SchoolQuery {
  pub fn resource(&self) -> Resource {
    match self {
      Self::CurrentUser => Resource::Auth,
      Self::Users => Resource::Users,
      Self::MyAttendance { .. } | Self::UserAttendance { .. } => Resource::Attendance,
      Self::MyFeedback | Self::AllFeedback => Resource::Feedback,
      Self::Notifications | Self::UnreadCount => Resource::Notifications,
    }
  }

  pub fn key(&self) -> QueryKey {
    let root = self.resource().prefix();
    match self {
      Self::CurrentUser => root.with("me"),
      Self::Users => root,
      Self::MyAttendance { page, limit } => root.with("mine").with(*page).with(*limit),
      Self::UserAttendance {
        user_id,
        page,
        limit,
      } => root.with("user").with(user_id).with(*page).with(*limit),
      Self::MyFeedback => root.with("mine"),
      Self::AllFeedback => root.with("all"),
      Self::Notifications => root.with("list"),
      Self::UnreadCount => root.with("unread-count"),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::CurrentUser => "current user".to_string(),
      Self::Users => "all users".to_string(),
      Self::MyAttendance { page, .. } => format!("my attendance, page {}", page),
      Self::UserAttendance { user_id, page, .. } => {
        format!("attendance for {}, page {}", user_id, page)
      }
      Self::MyFeedback => "my feedback".to_string(),
      Self::AllFeedback => "all feedback".to_string(),
      Self::Notifications => "notifications".to_string(),
      Self::UnreadCount => "unread notification count".to_string(),
    }
  }
}
