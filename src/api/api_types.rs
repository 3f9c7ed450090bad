//! Serde-deserializable types matching the backend's JSON responses.
//!
//! These types are separate from domain types to absorb the backend's
//! quirks (`_id` vs `id`, populated vs bare references, camelCase) while
//! keeping domain types focused on application needs.

use serde::Deserialize;

use super::types::{
  Attendance, AttendancePage, AttendanceSubject, AuthResponse, Feedback, FeedbackReply,
  Notification, NotificationKind, Role, Sender, User,
};

// ============================================================================
// References
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSender {
  #[serde(rename = "_id", default)]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub role: String,
}

/// A reference that is either a bare id or a populated document.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiRef {
  Populated(ApiSender),
  Id(String),
}

impl ApiRef {
  pub fn into_id(self) -> String {
    match self {
      ApiRef::Populated(sender) => sender.id,
      ApiRef::Id(id) => id,
    }
  }

  pub fn into_sender(self) -> Sender {
    match self {
      ApiRef::Populated(sender) => Sender {
        id: sender.id,
        name: sender.name,
        role: sender.role,
      },
      ApiRef::Id(id) => Sender {
        id,
        ..Sender::default()
      },
    }
  }
}

// ============================================================================
// Users and auth
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUser {
  /// List endpoints return `_id`, auth endpoints return `id`; some return both.
  #[serde(rename = "_id")]
  pub mongo_id: Option<String>,
  pub id: Option<String>,
  pub name: String,
  pub email: String,
  pub role: Role,
  #[serde(default)]
  pub is_approved: bool,
  #[serde(default)]
  pub subjects: Vec<String>,
  pub profile_image: Option<String>,
  #[serde(default)]
  pub created_at: String,
}

impl From<ApiUser> for User {
  fn from(api: ApiUser) -> Self {
    User {
      id: api.mongo_id.or(api.id).unwrap_or_default(),
      name: api.name,
      email: api.email,
      role: api.role,
      is_approved: api.is_approved,
      subjects: api.subjects,
      profile_image: api.profile_image,
      created_at: api.created_at,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiAuthResponse {
  pub token: String,
  pub user: ApiUser,
}

impl From<ApiAuthResponse> for AuthResponse {
  fn from(api: ApiAuthResponse) -> Self {
    AuthResponse {
      token: api.token,
      user: api.user.into(),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiMeResponse {
  pub user: ApiUser,
}

// ============================================================================
// Attendance
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAttendance {
  #[serde(rename = "_id")]
  pub id: String,
  pub user_id: ApiRef,
  pub date: String,
  #[serde(default)]
  pub subjects: Vec<AttendanceSubject>,
  pub created_by: Option<ApiRef>,
  #[serde(default)]
  pub created_at: String,
}

impl From<ApiAttendance> for Attendance {
  fn from(api: ApiAttendance) -> Self {
    Attendance {
      id: api.id,
      user_id: api.user_id.into_id(),
      date: api.date,
      subjects: api.subjects,
      created_by: api.created_by.map(ApiRef::into_sender),
      created_at: api.created_at,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAttendancePage {
  #[serde(default, alias = "data")]
  pub attendance: Vec<ApiAttendance>,
  #[serde(default = "one")]
  pub total_pages: u32,
  #[serde(default = "one")]
  pub current_page: u32,
  #[serde(default)]
  pub total: u32,
}

fn one() -> u32 {
  1
}

impl From<ApiAttendancePage> for AttendancePage {
  fn from(api: ApiAttendancePage) -> Self {
    AttendancePage {
      attendance: api.attendance.into_iter().map(Attendance::from).collect(),
      total_pages: api.total_pages.max(1),
      current_page: api.current_page,
      total: api.total,
    }
  }
}

// ============================================================================
// Feedback
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFeedbackReply {
  #[serde(rename = "_id")]
  pub id: String,
  pub message: String,
  pub image: Option<String>,
  pub sent_by: ApiRef,
  #[serde(default)]
  pub sent_by_role: String,
  #[serde(default)]
  pub created_at: String,
}

impl From<ApiFeedbackReply> for FeedbackReply {
  fn from(api: ApiFeedbackReply) -> Self {
    FeedbackReply {
      id: api.id,
      message: api.message,
      image: api.image,
      sent_by: api.sent_by.into_sender(),
      sent_by_role: api.sent_by_role,
      created_at: api.created_at,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFeedback {
  #[serde(rename = "_id")]
  pub id: String,
  pub user_id: ApiRef,
  pub attendance_id: Option<ApiRef>,
  #[serde(default)]
  pub subject: String,
  pub message: String,
  pub image: Option<String>,
  pub sent_by: ApiRef,
  #[serde(default)]
  pub sent_by_role: String,
  #[serde(default)]
  pub replies: Vec<ApiFeedbackReply>,
  #[serde(default)]
  pub created_at: String,
}

impl From<ApiFeedback> for Feedback {
  fn from(api: ApiFeedback) -> Self {
    Feedback {
      id: api.id,
      user_id: api.user_id.into_id(),
      attendance_id: api.attendance_id.map(ApiRef::into_id),
      subject: api.subject,
      message: api.message,
      image: api.image,
      sent_by: api.sent_by.into_sender(),
      sent_by_role: api.sent_by_role,
      replies: api.replies.into_iter().map(FeedbackReply::from).collect(),
      created_at: api.created_at,
    }
  }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNotification {
  #[serde(rename = "_id")]
  pub id: String,
  pub sender_id: Option<ApiRef>,
  #[serde(rename = "type")]
  pub kind: NotificationKind,
  pub message: String,
  #[serde(default)]
  pub data: serde_json::Value,
  #[serde(default)]
  pub is_read: bool,
  #[serde(default)]
  pub created_at: String,
}

impl From<ApiNotification> for Notification {
  fn from(api: ApiNotification) -> Self {
    Notification {
      id: api.id,
      sender: api.sender_id.map(ApiRef::into_sender),
      kind: api.kind,
      message: api.message,
      data: api.data,
      is_read: api.is_read,
      created_at: api.created_at,
    }
  }
}

/// Error body returned by the backend on failures.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub message: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  #[test]
  fn test_user_accepts_either_id_field() {
    let listed: ApiUser = serde_json::from_value(json!({
      "_id": "u1", "name": "Ada", "email": "ada@example.com",
      "role": "teacher", "isApproved": true, "createdAt": "2025-01-05T10:00:00Z"
    }))
    .unwrap();
    assert_eq!(User::from(listed).id, "u1");

    let me: ApiUser = serde_json::from_value(json!({
      "id": "u2", "name": "Bo", "email": "bo@example.com", "role": "user"
    }))
    .unwrap();
    let user = User::from(me);
    assert_eq!(user.id, "u2");
    assert!(!user.is_approved);
  }

  #[test]
  fn test_references_populated_or_bare() {
    let populated: ApiRef =
      serde_json::from_value(json!({"_id": "t1", "name": "Ms. Kay", "role": "teacher"})).unwrap();
    assert_eq!(
      populated.into_sender(),
      Sender {
        id: "t1".into(),
        name: "Ms. Kay".into(),
        role: "teacher".into()
      }
    );

    let bare: ApiRef = serde_json::from_value(json!("t2")).unwrap();
    assert_eq!(bare.into_id(), "t2");
  }

  #[test]
  fn test_attendance_page() {
    let page: ApiAttendancePage = serde_json::from_value(json!({
      "attendance": [{
        "_id": "a1",
        "userId": "u1",
        "date": "2025-01-05",
        "subjects": [{"subjectName": "Math", "status": "late", "marks": 8, "feedback": ""}],
        "createdBy": {"_id": "t1", "name": "Ms. Kay", "role": "teacher"},
        "createdAt": "2025-01-05T10:00:00Z"
      }],
      "totalPages": 3,
      "currentPage": 1,
      "total": 21
    }))
    .unwrap();

    let page = AttendancePage::from(page);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.attendance.len(), 1);
    assert_eq!(page.attendance[0].subjects[0].marks, 8.0);
    assert_eq!(
      page.attendance[0].created_by.as_ref().map(|s| s.name.as_str()),
      Some("Ms. Kay")
    );
  }

  #[test]
  fn test_unknown_notification_kind() {
    let n: ApiNotification = serde_json::from_value(json!({
      "_id": "n1",
      "senderId": {"_id": "u1", "name": "Ada", "role": "user"},
      "type": "system_broadcast",
      "message": "hello",
      "isRead": false
    }))
    .unwrap();
    let n = Notification::from(n);
    assert_eq!(n.kind, NotificationKind::Other);
    assert!(!n.is_read);
  }
}
