use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::api_types::{
  ApiAttendance, ApiAttendancePage, ApiAuthResponse, ApiErrorBody, ApiFeedback, ApiMeResponse,
  ApiNotification, ApiUser,
};
use super::types::{
  Attendance, AttendancePage, AttendanceUpdate, AuthResponse, Feedback, FeedbackForm,
  GoogleAuthRequest, ImageAttachment, LoginRequest, NewAttendance, Notification, RegisterRequest,
  ReplyForm, Role, UnreadCount, User, UserUpdate,
};
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::session::{CredentialStore, StoredSession};

/// HTTP client for the SchoolHub REST API.
///
/// Attaches the stored bearer token to every request. A `401` from any
/// authenticated endpoint clears the stored session before the error is
/// returned.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  credentials: Arc<dyn CredentialStore>,
}

impl ApiClient {
  pub fn new(config: &Config, credentials: Arc<dyn CredentialStore>) -> ApiResult<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .build()
      .map_err(|e| ApiError::Network(format!("failed to create HTTP client: {}", e)))?;

    Self::with_http(http, &config.api.base_url, credentials)
  }

  pub fn with_http(
    http: reqwest::Client,
    base_url: &str,
    credentials: Arc<dyn CredentialStore>,
  ) -> ApiResult<Self> {
    let parsed = Url::parse(base_url.trim_end_matches('/'))
      .map_err(|e| ApiError::InvalidInput(format!("invalid API URL {}: {}", base_url, e)))?;
    if parsed.cannot_be_a_base() {
      return Err(ApiError::InvalidInput(format!("invalid API URL {}", base_url)));
    }
    let base_url = parsed;

    Ok(Self {
      http,
      base_url,
      credentials,
    })
  }

  pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
    &self.credentials
  }

  /// Endpoint URL under the API base. Each segment is percent-encoded, so
  /// ids cannot escape into another path.
  fn url(&self, segments: &[&str]) -> Url {
    let mut url = self.base_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  fn paged_url(&self, segments: &[&str], page: u32, limit: u32) -> Url {
    let mut url = self.url(segments);
    url
      .query_pairs_mut()
      .append_pair("page", &page.to_string())
      .append_pair("limit", &limit.to_string());
    url
  }

  fn token(&self) -> Option<String> {
    match self.credentials.load() {
      Ok(session) => session.map(|s| s.token),
      Err(e) => {
        warn!("failed to load credentials: {}", e);
        None
      }
    }
  }

  fn request(&self, method: Method, url: Url, protected: bool) -> ApiResult<RequestBuilder> {
    let builder = self.http.request(method, url);
    match self.token() {
      Some(token) => Ok(builder.bearer_auth(token)),
      None if protected => Err(ApiError::Unauthorized),
      None => Ok(builder),
    }
  }

  async fn send(&self, builder: RequestBuilder, protected: bool) -> ApiResult<Response> {
    let response = builder.send().await?;
    let status = response.status();
    debug!("{} {}", status.as_u16(), response.url().path());

    if status.is_success() {
      return Ok(response);
    }

    if status.as_u16() == 401 && protected {
      warn!("request rejected with 401; clearing session");
      if let Err(e) = self.credentials.clear() {
        warn!("failed to clear credentials: {}", e);
      }
      return Err(ApiError::Unauthorized);
    }

    let message = response
      .json::<ApiErrorBody>()
      .await
      .ok()
      .and_then(|body| body.message);

    // Rejected credentials on the auth endpoints are a form error, not a lost session.
    if status.as_u16() == 401 {
      return Err(ApiError::Validation {
        status: 401,
        message: message.unwrap_or_else(|| "invalid credentials".to_string()),
      });
    }
    Err(ApiError::from_status(status.as_u16(), message))
  }

  async fn get<T: DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
    let builder = self.request(Method::GET, url, true)?;
    Ok(self.send(builder, true).await?.json::<T>().await?)
  }

  async fn send_json<B, T>(&self, method: Method, url: Url, body: Option<&B>, protected: bool) -> ApiResult<T>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let mut builder = self.request(method, url, protected)?;
    if let Some(body) = body {
      builder = builder.json(body);
    }
    Ok(self.send(builder, protected).await?.json::<T>().await?)
  }

  /// Send a request whose response body is not needed.
  async fn send_empty(&self, method: Method, url: Url) -> ApiResult<()> {
    let builder = self.request(method, url, true)?;
    self.send(builder, true).await?;
    Ok(())
  }

  async fn send_multipart<T: DeserializeOwned>(&self, url: Url, form: Form) -> ApiResult<T> {
    let builder = self.request(Method::POST, url, true)?.multipart(form);
    Ok(self.send(builder, true).await?.json::<T>().await?)
  }

  // ==========================================================================
  // Auth
  // ==========================================================================

  /// Log in and persist the returned session.
  pub async fn login(&self, email: &str, password: &str) -> ApiResult<AuthResponse> {
    let body = LoginRequest { email, password };
    let response: ApiAuthResponse = self
      .send_json(Method::POST, self.url(&["auth", "login"]), Some(&body), false)
      .await?;
    self.store_session(response.into())
  }

  /// Register a new account and persist the returned session.
  pub async fn register(
    &self,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
  ) -> ApiResult<AuthResponse> {
    let body = RegisterRequest {
      name,
      email,
      password,
      role,
    };
    let response: ApiAuthResponse = self
      .send_json(Method::POST, self.url(&["auth", "register"]), Some(&body), false)
      .await?;
    self.store_session(response.into())
  }

  /// Exchange a Google ID token for a session.
  pub async fn google_auth(&self, token: &str) -> ApiResult<AuthResponse> {
    let body = GoogleAuthRequest { token };
    let response: ApiAuthResponse = self
      .send_json(Method::POST, self.url(&["auth", "google"]), Some(&body), false)
      .await?;
    self.store_session(response.into())
  }

  fn store_session(&self, auth: AuthResponse) -> ApiResult<AuthResponse> {
    self
      .credentials
      .save(&StoredSession {
        token: auth.token.clone(),
        user: Some(auth.user.clone()),
      })
      .map_err(|e| ApiError::InvalidInput(format!("failed to store session: {}", e)))?;
    Ok(auth)
  }

  /// Forget the stored session.
  pub fn logout(&self) -> ApiResult<()> {
    self
      .credentials
      .clear()
      .map_err(|e| ApiError::InvalidInput(format!("failed to clear session: {}", e)))
  }

  pub async fn current_user(&self) -> ApiResult<User> {
    let response: ApiMeResponse = self.get(self.url(&["auth", "me"])).await?;
    Ok(response.user.into())
  }

  // ==========================================================================
  // Users
  // ==========================================================================

  pub async fn users(&self) -> ApiResult<Vec<User>> {
    let users: Vec<ApiUser> = self.get(self.url(&["users"])).await?;
    Ok(users.into_iter().map(User::from).collect())
  }

  pub async fn approve_user(&self, id: &str) -> ApiResult<User> {
    let user: ApiUser = self
      .send_json::<(), _>(Method::PUT, self.url(&["users", id, "approve"]), None, true)
      .await?;
    Ok(user.into())
  }

  pub async fn update_user(&self, id: &str, update: &UserUpdate) -> ApiResult<User> {
    let user: ApiUser = self
      .send_json(Method::PUT, self.url(&["users", id]), Some(update), true)
      .await?;
    Ok(user.into())
  }

  pub async fn delete_user(&self, id: &str) -> ApiResult<()> {
    self.send_empty(Method::DELETE, self.url(&["users", id])).await
  }

  // ==========================================================================
  // Attendance
  // ==========================================================================

  pub async fn create_attendance(&self, record: &NewAttendance) -> ApiResult<Attendance> {
    let created: ApiAttendance = self
      .send_json(Method::POST, self.url(&["attendance"]), Some(record), true)
      .await?;
    Ok(created.into())
  }

  pub async fn my_attendance(&self, page: u32, limit: u32) -> ApiResult<AttendancePage> {
    let response: ApiAttendancePage = self
      .get(self.paged_url(&["attendance", "my-attendance"], page, limit))
      .await?;
    Ok(response.into())
  }

  pub async fn user_attendance(&self, user_id: &str, page: u32, limit: u32) -> ApiResult<AttendancePage> {
    let response: ApiAttendancePage = self
      .get(self.paged_url(&["attendance", "user", user_id], page, limit))
      .await?;
    Ok(response.into())
  }

  pub async fn update_attendance(&self, id: &str, update: &AttendanceUpdate) -> ApiResult<Attendance> {
    let updated: ApiAttendance = self
      .send_json(Method::PUT, self.url(&["attendance", id]), Some(update), true)
      .await?;
    Ok(updated.into())
  }

  pub async fn delete_attendance(&self, id: &str) -> ApiResult<()> {
    self
      .send_empty(Method::DELETE, self.url(&["attendance", id]))
      .await
  }

  // ==========================================================================
  // Feedback
  // ==========================================================================

  pub async fn create_feedback(&self, feedback: &FeedbackForm) -> ApiResult<Feedback> {
    let mut form = Form::new()
      .text("attendanceId", feedback.attendance_id.clone())
      .text("subject", feedback.subject.clone())
      .text("message", feedback.message.clone());
    if let Some(image) = &feedback.image {
      form = form.part("image", image_part(image)?);
    }

    let created: ApiFeedback = self.send_multipart(self.url(&["feedback"]), form).await?;
    Ok(created.into())
  }

  pub async fn my_feedback(&self) -> ApiResult<Vec<Feedback>> {
    let feedback: Vec<ApiFeedback> = self.get(self.url(&["feedback", "my-feedback"])).await?;
    Ok(feedback.into_iter().map(Feedback::from).collect())
  }

  pub async fn all_feedback(&self) -> ApiResult<Vec<Feedback>> {
    let feedback: Vec<ApiFeedback> = self.get(self.url(&["feedback"])).await?;
    Ok(feedback.into_iter().map(Feedback::from).collect())
  }

  pub async fn reply_to_feedback(&self, id: &str, reply: &ReplyForm) -> ApiResult<Feedback> {
    let mut form = Form::new().text("message", reply.message.clone());
    if let Some(image) = &reply.image {
      form = form.part("image", image_part(image)?);
    }

    let updated: ApiFeedback = self
      .send_multipart(self.url(&["feedback", id, "reply"]), form)
      .await?;
    Ok(updated.into())
  }

  // ==========================================================================
  // Notifications
  // ==========================================================================

  pub async fn notifications(&self) -> ApiResult<Vec<Notification>> {
    let notifications: Vec<ApiNotification> = self.get(self.url(&["notifications"])).await?;
    Ok(notifications.into_iter().map(Notification::from).collect())
  }

  pub async fn mark_notification_read(&self, id: &str) -> ApiResult<()> {
    self
      .send_empty(Method::PUT, self.url(&["notifications", id, "read"]))
      .await
  }

  pub async fn mark_all_notifications_read(&self) -> ApiResult<()> {
    self
      .send_empty(Method::PUT, self.url(&["notifications", "mark-all-read"]))
      .await
  }

  pub async fn unread_count(&self) -> ApiResult<UnreadCount> {
    self.get(self.url(&["notifications", "unread-count"])).await
  }
}

fn image_part(image: &ImageAttachment) -> ApiResult<Part> {
  Part::bytes(image.bytes.clone())
    .file_name(image.file_name.clone())
    .mime_str(image.content_type)
    .map_err(|e| ApiError::InvalidInput(format!("invalid image type: {}", e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::MemoryCredentialStore;

  fn client(base: &str) -> ApiClient {
    ApiClient::with_http(
      reqwest::Client::new(),
      base,
      Arc::new(MemoryCredentialStore::new()),
    )
    .unwrap()
  }

  #[test]
  fn test_url_keeps_base_path() {
    let api = client("https://example.com/api");
    assert_eq!(
      api
        .paged_url(&["attendance", "my-attendance"], 2, 10)
        .as_str(),
      "https://example.com/api/attendance/my-attendance?page=2&limit=10"
    );

    let api = client("https://example.com/api/");
    assert_eq!(api.url(&["users"]).as_str(), "https://example.com/api/users");
  }

  #[test]
  fn test_ids_stay_in_one_segment() {
    let api = client("https://example.com/api");
    let url = api.url(&["users", "../../users", "approve"]);
    assert_eq!(url.as_str(), "https://example.com/api/users/..%2F..%2Fusers/approve");
    assert_eq!(url.path_segments().map(|s| s.count()), Some(4));

    let url = api.paged_url(&["attendance", "user", "u1?page=9"], 1, 10);
    assert_eq!(url.query(), Some("page=1&limit=10"));
  }

  #[tokio::test]
  async fn test_protected_request_without_token_is_unauthorized() {
    let api = client("http://127.0.0.1:9");
    assert_eq!(api.users().await.unwrap_err(), ApiError::Unauthorized);
  }
}
