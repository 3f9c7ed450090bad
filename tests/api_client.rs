mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use common::{attendance_json, feedback_json, harness, signed_out, user_json, TOKEN};
use schoolhub::api::types::{FeedbackForm, ImageAttachment, Role, SubjectStatus};
use schoolhub::session::CredentialStore;
use schoolhub::ApiError;

// ── Auth ────────────────────────────────────────────────────────

#[tokio::test]
async fn bearer_token_is_attached() {
  let h = harness().await;
  Mock::given(method("GET"))
    .and(path("/api/users"))
    .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([user_json("u1", "user", true)])))
    .expect(1)
    .mount(&h.server)
    .await;

  let users = h.client.users().await.unwrap();
  assert_eq!(users.len(), 1);
  assert_eq!(users[0].id, "u1");
  assert_eq!(users[0].role, Role::User);
}

#[tokio::test]
async fn login_stores_session() {
  let h = signed_out().await;
  Mock::given(method("POST"))
    .and(path("/api/auth/login"))
    .and(body_json(json!({"email": "ada@example.com", "password": "hunter2"})))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "token": "fresh",
      "user": {"id": "u1", "name": "Ada", "email": "ada@example.com", "role": "user", "isApproved": false}
    })))
    .mount(&h.server)
    .await;

  let auth = h.client.login("ada@example.com", "hunter2").await.unwrap();
  assert_eq!(auth.user.id, "u1");

  let stored = h.credentials.load().unwrap().unwrap();
  assert_eq!(stored.token, "fresh");
  assert_eq!(stored.user.map(|u| u.email), Some("ada@example.com".to_string()));
}

#[tokio::test]
async fn rejected_login_is_a_validation_error() {
  let h = signed_out().await;
  Mock::given(method("POST"))
    .and(path("/api/auth/login"))
    .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})))
    .mount(&h.server)
    .await;

  let err = h.client.login("ada@example.com", "wrong").await.unwrap_err();
  assert_eq!(
    err,
    ApiError::Validation {
      status: 401,
      message: "Invalid credentials".into()
    }
  );
  assert!(h.credentials.load().unwrap().is_none());
}

#[tokio::test]
async fn unauthorized_response_clears_session_and_cache() {
  let h = harness().await;
  Mock::given(method("GET"))
    .and(path("/api/users"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([user_json("u1", "user", true)])))
    .mount(&h.server)
    .await;
  Mock::given(method("GET"))
    .and(path("/api/notifications"))
    .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Token expired"})))
    .mount(&h.server)
    .await;

  h.client.users().await.unwrap();
  let err = h.client.notifications().await.unwrap_err();

  assert_eq!(err, ApiError::Unauthorized);
  assert!(h.credentials.load().unwrap().is_none());

  let users = h
    .client
    .queries()
    .snapshot::<Vec<schoolhub::api::types::User>>(&schoolhub::api::SchoolQuery::Users.key());
  assert!(users.requires_auth());
  assert!(users.data().is_none());
}

// ── Error taxonomy ──────────────────────────────────────────────

#[tokio::test]
async fn server_messages_are_surfaced() {
  let h = harness().await;
  Mock::given(method("DELETE"))
    .and(path("/api/users/u1"))
    .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "Cannot delete yourself"})))
    .mount(&h.server)
    .await;
  Mock::given(method("GET"))
    .and(path("/api/users"))
    .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "database unavailable"})))
    .mount(&h.server)
    .await;

  assert_eq!(
    h.client.delete_user("u1").await.unwrap_err(),
    ApiError::Validation {
      status: 400,
      message: "Cannot delete yourself".into()
    }
  );
  assert_eq!(
    h.client.users().await.unwrap_err(),
    ApiError::Server {
      status: 500,
      message: "database unavailable".into()
    }
  );
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
  let api = schoolhub::api::ApiClient::with_http(
    reqwest::Client::new(),
    "http://127.0.0.1:9/api",
    std::sync::Arc::new(schoolhub::session::MemoryCredentialStore::with_token(TOKEN)),
  )
  .unwrap();
  assert!(matches!(api.users().await, Err(ApiError::Network(_))));
}

// ── Attendance ──────────────────────────────────────────────────

#[tokio::test]
async fn attendance_pages_are_parsed() {
  let h = harness().await;
  Mock::given(method("GET"))
    .and(path("/api/attendance/my-attendance"))
    .and(query_param("page", "2"))
    .and(query_param("limit", "10"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "attendance": [attendance_json("a11", "present"), attendance_json("a12", "late")],
      "totalPages": 3,
      "currentPage": 2,
      "total": 22
    })))
    .expect(1)
    .mount(&h.server)
    .await;

  let page = h.client.my_attendance(2, 10).await.unwrap();
  assert_eq!(page.total_pages, 3);
  assert_eq!(page.current_page, 2);
  assert_eq!(page.total, 22);
  assert_eq!(page.attendance[1].subjects[0].status, SubjectStatus::Late);

  // Served from cache.
  h.client.my_attendance(2, 10).await.unwrap();
}

#[tokio::test]
async fn user_attendance_uses_user_path() {
  let h = harness().await;
  Mock::given(method("GET"))
    .and(path("/api/attendance/user/u7"))
    .and(query_param("page", "1"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "attendance": [attendance_json("a1", "absent")],
      "totalPages": 1,
      "currentPage": 1,
      "total": 1
    })))
    .mount(&h.server)
    .await;

  let page = h.client.user_attendance("u7", 1, 10).await.unwrap();
  assert_eq!(page.attendance.len(), 1);
  assert!(!page.attendance[0].is_present());
}

// ── Feedback ────────────────────────────────────────────────────

#[tokio::test]
async fn feedback_is_sent_as_multipart() {
  let h = harness().await;
  Mock::given(method("POST"))
    .and(path("/api/feedback"))
    .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
    .and(body_string_contains("name=\"attendanceId\""))
    .and(body_string_contains("name=\"image\"; filename=\"proof.png\""))
    .respond_with(ResponseTemplate::new(201).set_body_json(feedback_json("f1")))
    .expect(1)
    .mount(&h.server)
    .await;

  let form = FeedbackForm {
    attendance_id: "a1".into(),
    subject: "Math".into(),
    message: "Why was I marked late?".into(),
    image: Some(ImageAttachment::new("proof.png", b"PNGDATA".to_vec()).unwrap()),
  };
  let created = h.client.send_feedback(&form).await.unwrap();
  assert_eq!(created.id, "f1");
  assert_eq!(created.attendance_id.as_deref(), Some("a1"));
  assert_eq!(created.sent_by.name, "User u1");
}

#[tokio::test]
async fn invalid_feedback_is_not_sent() {
  let h = harness().await;
  Mock::given(method("POST"))
    .and(path("/api/feedback"))
    .respond_with(ResponseTemplate::new(201).set_body_json(feedback_json("f1")))
    .expect(0)
    .mount(&h.server)
    .await;

  let form = FeedbackForm {
    attendance_id: String::new(),
    subject: "Math".into(),
    message: "hello".into(),
    image: None,
  };
  assert!(matches!(
    h.client.send_feedback(&form).await,
    Err(ApiError::InvalidInput(_))
  ));
}
