#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::MockServer;

use schoolhub::api::{ApiClient, SchoolClient};
use schoolhub::query::QueryClient;
use schoolhub::session::MemoryCredentialStore;

pub const TOKEN: &str = "t0k3n";

pub struct Harness {
  pub server: MockServer,
  pub client: SchoolClient,
  pub credentials: Arc<MemoryCredentialStore>,
}

pub async fn harness() -> Harness {
  harness_with(MemoryCredentialStore::with_token(TOKEN)).await
}

pub async fn signed_out() -> Harness {
  harness_with(MemoryCredentialStore::new()).await
}

async fn harness_with(store: MemoryCredentialStore) -> Harness {
  let server = MockServer::start().await;
  let credentials = Arc::new(store);
  let api = ApiClient::with_http(
    reqwest::Client::new(),
    &format!("{}/api", server.uri()),
    credentials.clone(),
  )
  .unwrap();

  Harness {
    server,
    client: SchoolClient::new(api, QueryClient::new()),
    credentials,
  }
}

pub fn user_json(id: &str, role: &str, approved: bool) -> Value {
  json!({
    "_id": id,
    "name": format!("User {}", id),
    "email": format!("{}@example.com", id),
    "role": role,
    "isApproved": approved,
    "subjects": [],
    "createdAt": "2025-01-05T10:00:00.000Z"
  })
}

pub fn attendance_json(id: &str, status: &str) -> Value {
  json!({
    "_id": id,
    "userId": "u1",
    "date": "2025-01-05",
    "subjects": [{"subjectName": "Math", "status": status, "marks": 7, "feedback": ""}],
    "createdBy": {"_id": "t1", "name": "Ms. Kay", "role": "teacher"},
    "createdAt": "2025-01-05T10:00:00.000Z"
  })
}

pub fn feedback_json(id: &str) -> Value {
  json!({
    "_id": id,
    "userId": {"_id": "u1", "name": "User u1", "role": "user"},
    "attendanceId": "a1",
    "subject": "Math",
    "message": "Why was I marked late?",
    "sentBy": {"_id": "u1", "name": "User u1", "role": "user"},
    "sentByRole": "user",
    "replies": [],
    "createdAt": "2025-01-05T10:00:00.000Z"
  })
}

pub fn notification_json(id: &str, is_read: bool) -> Value {
  json!({
    "_id": id,
    "senderId": {"_id": "t1", "name": "Ms. Kay", "role": "teacher"},
    "type": "feedback_reply",
    "message": "Ms. Kay replied to your feedback",
    "data": {"feedbackId": "f1"},
    "isRead": is_read,
    "createdAt": "2025-01-05T14:30:00.000Z"
  })
}
