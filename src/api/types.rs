use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ApiError, ApiResult};

/// Account role. Closed set; capabilities are derived from it in `access`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Teacher,
  Superadmin,
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Role::User => "user",
      Role::Teacher => "teacher",
      Role::Superadmin => "superadmin",
    })
  }
}

impl std::str::FromStr for Role {
  type Err = ApiError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "user" | "student" => Ok(Role::User),
      "teacher" => Ok(Role::Teacher),
      "superadmin" | "admin" => Ok(Role::Superadmin),
      other => Err(ApiError::InvalidInput(format!("unknown role '{}'", other))),
    }
  }
}

/// Signed-in or listed account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub name: String,
  pub email: String,
  pub role: Role,
  pub is_approved: bool,
  pub subjects: Vec<String>,
  pub profile_image: Option<String>,
  pub created_at: String,
}

/// Token plus the account it belongs to
#[derive(Debug, Clone)]
pub struct AuthResponse {
  pub token: String,
  pub user: User,
}

/// Who sent or created something
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sender {
  pub id: String,
  pub name: String,
  pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectStatus {
  Present,
  Absent,
  Late,
}

impl fmt::Display for SubjectStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      SubjectStatus::Present => "present",
      SubjectStatus::Absent => "absent",
      SubjectStatus::Late => "late",
    })
  }
}

impl std::str::FromStr for SubjectStatus {
  type Err = ApiError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "present" | "p" => Ok(SubjectStatus::Present),
      "absent" | "a" => Ok(SubjectStatus::Absent),
      "late" | "l" => Ok(SubjectStatus::Late),
      other => Err(ApiError::InvalidInput(format!(
        "unknown attendance status '{}'",
        other
      ))),
    }
  }
}

/// One subject line of an attendance record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSubject {
  pub subject_name: String,
  pub status: SubjectStatus,
  #[serde(default)]
  pub marks: f64,
  #[serde(default)]
  pub feedback: String,
}

/// Attendance for one student on one date
#[derive(Debug, Clone, PartialEq)]
pub struct Attendance {
  pub id: String,
  pub user_id: String,
  pub date: String,
  pub subjects: Vec<AttendanceSubject>,
  pub created_by: Option<Sender>,
  pub created_at: String,
}

impl Attendance {
  /// A day counts as present when any subject was attended.
  pub fn is_present(&self) -> bool {
    self
      .subjects
      .iter()
      .any(|s| s.status == SubjectStatus::Present)
  }
}

/// One page of attendance records
#[derive(Debug, Clone, PartialEq)]
pub struct AttendancePage {
  pub attendance: Vec<Attendance>,
  pub total_pages: u32,
  pub current_page: u32,
  pub total: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackReply {
  pub id: String,
  pub message: String,
  pub image: Option<String>,
  pub sent_by: Sender,
  pub sent_by_role: String,
  pub created_at: String,
}

/// Feedback thread attached to an attendance record
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
  pub id: String,
  pub user_id: String,
  pub attendance_id: Option<String>,
  pub subject: String,
  pub message: String,
  pub image: Option<String>,
  pub sent_by: Sender,
  pub sent_by_role: String,
  pub replies: Vec<FeedbackReply>,
  pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
  UserRegistration,
  FeedbackReceived,
  FeedbackReply,
  AttendanceUpdate,
  #[serde(other)]
  Other,
}

/// Server-generated notification. Read state only ever moves unread → read.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
  pub id: String,
  pub sender: Option<Sender>,
  pub kind: NotificationKind,
  pub message: String,
  pub data: serde_json::Value,
  pub is_read: bool,
  pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct UnreadCount {
  pub count: u32,
}

// ============================================================================
// Request payloads
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
  pub name: &'a str,
  pub email: &'a str,
  pub password: &'a str,
  pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct GoogleAuthRequest<'a> {
  pub token: &'a str,
}

/// Body of `POST /attendance`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttendance {
  pub user_id: String,
  pub date: String,
  pub subjects: Vec<AttendanceSubject>,
}

impl NewAttendance {
  pub fn validate(&self) -> ApiResult<()> {
    if self.user_id.trim().is_empty() {
      return Err(ApiError::InvalidInput("a student must be selected".into()));
    }
    if self.date.trim().is_empty() {
      return Err(ApiError::InvalidInput("a date is required".into()));
    }
    validate_subjects(&self.subjects)
  }
}

/// Body of `PUT /attendance/:id`
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceUpdate {
  pub subjects: Vec<AttendanceSubject>,
}

impl AttendanceUpdate {
  pub fn validate(&self) -> ApiResult<()> {
    validate_subjects(&self.subjects)
  }
}

fn validate_subjects(subjects: &[AttendanceSubject]) -> ApiResult<()> {
  if subjects.is_empty() {
    return Err(ApiError::InvalidInput("at least one subject is required".into()));
  }
  if subjects.iter().any(|s| s.subject_name.trim().is_empty()) {
    return Err(ApiError::InvalidInput("subject names cannot be empty".into()));
  }
  Ok(())
}

/// Body of `PUT /users/:id`
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub subjects: Option<Vec<String>>,
}

/// Image uploaded alongside feedback or a reply
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
  pub file_name: String,
  pub content_type: &'static str,
  pub bytes: Vec<u8>,
}

impl ImageAttachment {
  pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> ApiResult<Self> {
    let file_name = file_name.into();
    let content_type = image_content_type(&file_name).ok_or_else(|| {
      ApiError::InvalidInput(format!("{} is not a supported image", file_name))
    })?;
    Ok(Self {
      file_name,
      content_type,
      bytes,
    })
  }

  /// Read an image from disk.
  pub async fn load(path: &std::path::Path) -> ApiResult<Self> {
    let bytes = tokio::fs::read(path)
      .await
      .map_err(|e| ApiError::InvalidInput(format!("failed to read {}: {}", path.display(), e)))?;
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "image".to_string());
    Self::new(file_name, bytes)
  }
}

fn image_content_type(file_name: &str) -> Option<&'static str> {
  let ext = file_name.rsplit_once('.')?.1.to_lowercase();
  match ext.as_str() {
    "png" => Some("image/png"),
    "jpg" | "jpeg" => Some("image/jpeg"),
    "gif" => Some("image/gif"),
    "webp" => Some("image/webp"),
    _ => None,
  }
}

/// Multipart body of `POST /feedback`
#[derive(Debug, Clone)]
pub struct FeedbackForm {
  pub attendance_id: String,
  pub subject: String,
  pub message: String,
  pub image: Option<ImageAttachment>,
}

impl FeedbackForm {
  pub fn validate(&self) -> ApiResult<()> {
    if self.attendance_id.trim().is_empty() {
      return Err(ApiError::InvalidInput("an attendance record is required".into()));
    }
    if self.subject.trim().is_empty() {
      return Err(ApiError::InvalidInput("a subject is required".into()));
    }
    if self.message.trim().is_empty() {
      return Err(ApiError::InvalidInput("a message is required".into()));
    }
    Ok(())
  }
}

/// Multipart body of `POST /feedback/:id/reply`
#[derive(Debug, Clone)]
pub struct ReplyForm {
  pub message: String,
  pub image: Option<ImageAttachment>,
}

impl ReplyForm {
  pub fn validate(&self) -> ApiResult<()> {
    if self.message.trim().is_empty() {
      return Err(ApiError::InvalidInput("please enter a reply message".into()));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn subject(name: &str, status: SubjectStatus) -> AttendanceSubject {
    AttendanceSubject {
      subject_name: name.to_string(),
      status,
      marks: 0.0,
      feedback: String::new(),
    }
  }

  #[test]
  fn test_status_parsing() {
    assert_eq!("Present".parse::<SubjectStatus>().unwrap(), SubjectStatus::Present);
    assert_eq!("l".parse::<SubjectStatus>().unwrap(), SubjectStatus::Late);
    assert!("excused".parse::<SubjectStatus>().is_err());
  }

  #[test]
  fn test_role_parsing() {
    assert_eq!("student".parse::<Role>().unwrap(), Role::User);
    assert_eq!("Teacher".parse::<Role>().unwrap(), Role::Teacher);
    assert!("principal".parse::<Role>().is_err());
  }

  #[test]
  fn test_new_attendance_serializes_camel_case() {
    let body = NewAttendance {
      user_id: "u1".into(),
      date: "2025-01-05".into(),
      subjects: vec![subject("Math", SubjectStatus::Present)],
    };
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["userId"], "u1");
    assert_eq!(json["subjects"][0]["subjectName"], "Math");
    assert_eq!(json["subjects"][0]["status"], "present");
  }

  #[test]
  fn test_attendance_validation() {
    let mut body = NewAttendance {
      user_id: "u1".into(),
      date: "2025-01-05".into(),
      subjects: vec![],
    };
    assert!(body.validate().is_err());

    body.subjects.push(subject(" ", SubjectStatus::Absent));
    assert!(body.validate().is_err());

    body.subjects[0].subject_name = "Science".into();
    assert!(body.validate().is_ok());
  }

  #[test]
  fn test_present_when_any_subject_present() {
    let record = Attendance {
      id: "a1".into(),
      user_id: "u1".into(),
      date: "2025-01-05".into(),
      subjects: vec![
        subject("Math", SubjectStatus::Absent),
        subject("Art", SubjectStatus::Present),
      ],
      created_by: None,
      created_at: String::new(),
    };
    assert!(record.is_present());
  }

  #[test]
  fn test_user_update_skips_missing_fields() {
    let update = UserUpdate {
      name: Some("Ada".into()),
      ..UserUpdate::default()
    };
    assert_eq!(serde_json::to_string(&update).unwrap(), r#"{"name":"Ada"}"#);
  }

  #[test]
  fn test_image_attachment_content_type() {
    let image = ImageAttachment::new("photo.JPG", vec![1, 2, 3]).unwrap();
    assert_eq!(image.content_type, "image/jpeg");
    assert!(ImageAttachment::new("notes.pdf", vec![]).is_err());
  }

  #[test]
  fn test_reply_requires_message() {
    let reply = ReplyForm {
      message: "   ".into(),
      image: None,
    };
    assert!(reply.validate().is_err());
  }
}
