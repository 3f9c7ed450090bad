//! Cached SchoolHub client that wraps [`ApiClient`] with the query cache.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::client::ApiClient;
use super::keys::{Resource, SchoolQuery};
use super::types::{
  Attendance, AttendancePage, AttendanceUpdate, AuthResponse, Feedback, FeedbackForm,
  NewAttendance, Notification, ReplyForm, Role, UnreadCount, User, UserUpdate,
};
use crate::error::ApiResult;
use crate::query::{MutationIntent, QueryClient, QueryOptions, Subscription, Verb};

/// Page size used when listing attendance records to attach feedback to.
pub const FEEDBACK_ATTENDANCE_LIMIT: u32 = 100;

/// SchoolHub client with transparent caching.
///
/// Reads go through the shared [`QueryClient`] so concurrent callers share
/// requests and subscribers see every update. Writes run as mutations that
/// invalidate the namespace of the resource they touch. A rejected session
/// on any call drops the cache into the authentication-required state.
#[derive(Clone)]
pub struct SchoolClient {
  api: ApiClient,
  queries: QueryClient,
}

impl SchoolClient {
  pub fn new(api: ApiClient, queries: QueryClient) -> Self {
    Self { api, queries }
  }

  pub fn api(&self) -> &ApiClient {
    &self.api
  }

  pub fn queries(&self) -> &QueryClient {
    &self.queries
  }

  /// Turn an endpoint call into a reusable fetcher.
  fn bind<T, F, Fut>(&self, call: F) -> impl Fn() -> Fut + Send + Sync + 'static
  where
    F: Fn(ApiClient) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let api = self.api.clone();
    move || call(api.clone())
  }

  // ==========================================================================
  // Session
  // ==========================================================================

  pub async fn login(&self, email: &str, password: &str) -> ApiResult<AuthResponse> {
    let auth = self.api.login(email, password).await?;
    self.session_changed();
    Ok(auth)
  }

  pub async fn register(
    &self,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
  ) -> ApiResult<AuthResponse> {
    let auth = self.api.register(name, email, password, role).await?;
    self.session_changed();
    Ok(auth)
  }

  pub async fn google_auth(&self, token: &str) -> ApiResult<AuthResponse> {
    let auth = self.api.google_auth(token).await?;
    self.session_changed();
    Ok(auth)
  }

  /// Forget the session and everything cached under it.
  pub fn logout(&self) -> ApiResult<()> {
    self.api.logout()?;
    self.queries.require_auth();
    info!("logged out");
    Ok(())
  }

  /// Everything cached so far belonged to another session.
  fn session_changed(&self) {
    for resource in Resource::ALL {
      self.queries.invalidate(&resource.prefix());
    }
  }

  // ==========================================================================
  // Queries
  // ==========================================================================

  pub async fn current_user(&self) -> ApiResult<Arc<User>> {
    let fetcher = self.bind(|api| async move { api.current_user().await });
    self
      .queries
      .fetch(&SchoolQuery::CurrentUser.key(), fetcher)
      .await
  }

  pub async fn users(&self) -> ApiResult<Arc<Vec<User>>> {
    let fetcher = self.bind(|api| async move { api.users().await });
    self.queries.fetch(&SchoolQuery::Users.key(), fetcher).await
  }

  pub async fn my_attendance(&self, page: u32, limit: u32) -> ApiResult<Arc<AttendancePage>> {
    let query = SchoolQuery::MyAttendance { page, limit };
    let fetcher = self.bind(move |api| async move { api.my_attendance(page, limit).await });
    self.queries.fetch(&query.key(), fetcher).await
  }

  pub async fn user_attendance(
    &self,
    user_id: &str,
    page: u32,
    limit: u32,
  ) -> ApiResult<Arc<AttendancePage>> {
    let query = SchoolQuery::UserAttendance {
      user_id: user_id.to_string(),
      page,
      limit,
    };
    let id = user_id.to_string();
    let fetcher = self.bind(move |api| {
      let id = id.clone();
      async move { api.user_attendance(&id, page, limit).await }
    });
    self.queries.fetch(&query.key(), fetcher).await
  }

  /// Recent attendance records a student can attach feedback to.
  pub async fn attendance_for_feedback(&self) -> ApiResult<Arc<AttendancePage>> {
    self.my_attendance(1, FEEDBACK_ATTENDANCE_LIMIT).await
  }

  pub async fn my_feedback(&self) -> ApiResult<Arc<Vec<Feedback>>> {
    let fetcher = self.bind(|api| async move { api.my_feedback().await });
    self
      .queries
      .fetch(&SchoolQuery::MyFeedback.key(), fetcher)
      .await
  }

  pub async fn all_feedback(&self) -> ApiResult<Arc<Vec<Feedback>>> {
    let fetcher = self.bind(|api| async move { api.all_feedback().await });
    self
      .queries
      .fetch(&SchoolQuery::AllFeedback.key(), fetcher)
      .await
  }

  pub async fn notifications(&self) -> ApiResult<Arc<Vec<Notification>>> {
    let fetcher = self.bind(|api| async move { api.notifications().await });
    self
      .queries
      .fetch(&SchoolQuery::Notifications.key(), fetcher)
      .await
  }

  /// Notification list read from the server, skipping the cache.
  pub async fn fresh_notifications(&self) -> ApiResult<Arc<Vec<Notification>>> {
    let fetcher = self.bind(|api| async move { api.notifications().await });
    self
      .queries
      .fetch_fresh(&SchoolQuery::Notifications.key(), fetcher)
      .await
  }

  pub async fn unread_count(&self) -> ApiResult<Arc<UnreadCount>> {
    let fetcher = self.bind(|api| async move { api.unread_count().await });
    self
      .queries
      .fetch(&SchoolQuery::UnreadCount.key(), fetcher)
      .await
  }

  // ==========================================================================
  // Subscriptions
  // ==========================================================================

  pub fn watch_notifications(&self, interval: Option<Duration>) -> Subscription<Vec<Notification>> {
    let fetcher = self.bind(|api| async move { api.notifications().await });
    self
      .queries
      .subscribe(SchoolQuery::Notifications.key(), fetcher, polling(interval))
  }

  pub fn watch_unread_count(&self, interval: Option<Duration>) -> Subscription<UnreadCount> {
    let fetcher = self.bind(|api| async move { api.unread_count().await });
    self
      .queries
      .subscribe(SchoolQuery::UnreadCount.key(), fetcher, polling(interval))
  }

  pub fn watch_my_attendance(
    &self,
    page: u32,
    limit: u32,
    options: QueryOptions,
  ) -> Subscription<AttendancePage> {
    let query = SchoolQuery::MyAttendance { page, limit };
    let fetcher = self.bind(move |api| async move { api.my_attendance(page, limit).await });
    self.queries.subscribe(query.key(), fetcher, options)
  }

  pub fn watch_users(&self, options: QueryOptions) -> Subscription<Vec<User>> {
    let fetcher = self.bind(|api| async move { api.users().await });
    self
      .queries
      .subscribe(SchoolQuery::Users.key(), fetcher, options)
  }

  pub fn watch_all_feedback(&self, options: QueryOptions) -> Subscription<Vec<Feedback>> {
    let fetcher = self.bind(|api| async move { api.all_feedback().await });
    self
      .queries
      .subscribe(SchoolQuery::AllFeedback.key(), fetcher, options)
  }

  pub fn watch_my_feedback(&self, options: QueryOptions) -> Subscription<Vec<Feedback>> {
    let fetcher = self.bind(|api| async move { api.my_feedback().await });
    self
      .queries
      .subscribe(SchoolQuery::MyFeedback.key(), fetcher, options)
  }

  // ==========================================================================
  // Mutations
  // ==========================================================================

  pub async fn approve_user(&self, id: &str) -> ApiResult<User> {
    let intent = MutationIntent::new(Verb::Put, format!("/users/{}/approve", id))
      .invalidating(Resource::Users.prefix());
    self.queries.mutate(&intent, self.api.approve_user(id)).await
  }

  pub async fn update_user(&self, id: &str, update: &UserUpdate) -> ApiResult<User> {
    let intent = MutationIntent::new(Verb::Put, format!("/users/{}", id))
      .invalidating(Resource::Users.prefix())
      .invalidating(Resource::Auth.prefix());
    self
      .queries
      .mutate(&intent, self.api.update_user(id, update))
      .await
  }

  pub async fn delete_user(&self, id: &str) -> ApiResult<()> {
    let intent = MutationIntent::new(Verb::Delete, format!("/users/{}", id))
      .invalidating(Resource::Users.prefix());
    self.queries.mutate(&intent, self.api.delete_user(id)).await
  }

  pub async fn create_attendance(&self, record: &NewAttendance) -> ApiResult<Attendance> {
    record.validate()?;
    let intent =
      MutationIntent::new(Verb::Post, "/attendance").invalidating(Resource::Attendance.prefix());
    self
      .queries
      .mutate(&intent, self.api.create_attendance(record))
      .await
  }

  pub async fn update_attendance(
    &self,
    id: &str,
    update: &AttendanceUpdate,
  ) -> ApiResult<Attendance> {
    update.validate()?;
    let intent = MutationIntent::new(Verb::Put, format!("/attendance/{}", id))
      .invalidating(Resource::Attendance.prefix());
    self
      .queries
      .mutate(&intent, self.api.update_attendance(id, update))
      .await
  }

  pub async fn delete_attendance(&self, id: &str) -> ApiResult<()> {
    let intent = MutationIntent::new(Verb::Delete, format!("/attendance/{}", id))
      .invalidating(Resource::Attendance.prefix());
    self
      .queries
      .mutate(&intent, self.api.delete_attendance(id))
      .await
  }

  pub async fn send_feedback(&self, form: &FeedbackForm) -> ApiResult<Feedback> {
    form.validate()?;
    let intent =
      MutationIntent::new(Verb::Post, "/feedback").invalidating(Resource::Feedback.prefix());
    self
      .queries
      .mutate(&intent, self.api.create_feedback(form))
      .await
  }

  pub async fn reply_to_feedback(&self, id: &str, reply: &ReplyForm) -> ApiResult<Feedback> {
    reply.validate()?;
    let intent = MutationIntent::new(Verb::Post, format!("/feedback/{}/reply", id))
      .invalidating(Resource::Feedback.prefix());
    self
      .queries
      .mutate(&intent, self.api.reply_to_feedback(id, reply))
      .await
  }

  pub async fn mark_notification_read(&self, id: &str) -> ApiResult<()> {
    let intent = MutationIntent::new(Verb::Put, format!("/notifications/{}/read", id))
      .invalidating(Resource::Notifications.prefix());
    self
      .queries
      .mutate(&intent, self.api.mark_notification_read(id))
      .await
  }

  pub async fn mark_all_notifications_read(&self) -> ApiResult<()> {
    let intent = MutationIntent::new(Verb::Put, "/notifications/mark-all-read")
      .invalidating(Resource::Notifications.prefix());
    self
      .queries
      .mutate(&intent, self.api.mark_all_notifications_read())
      .await
  }
}

fn polling(interval: Option<Duration>) -> QueryOptions {
  match interval {
    Some(interval) => QueryOptions::default().with_refetch_interval(interval),
    None => QueryOptions::default(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ApiError;
  use crate::session::MemoryCredentialStore;

  fn offline_client() -> SchoolClient {
    let api = ApiClient::with_http(
      reqwest::Client::new(),
      "http://127.0.0.1:9/api",
      Arc::new(MemoryCredentialStore::new()),
    )
    .unwrap();
    SchoolClient::new(api, QueryClient::new())
  }

  #[tokio::test]
  async fn test_invalid_form_is_rejected_before_sending() {
    let client = offline_client();
    let reply = ReplyForm {
      message: String::new(),
      image: None,
    };
    let err = client.reply_to_feedback("f1", &reply).await.unwrap_err();
    assert_eq!(
      err,
      ApiError::InvalidInput("please enter a reply message".into())
    );
  }

  #[tokio::test]
  async fn test_missing_session_puts_cache_in_auth_state() {
    let client = offline_client();
    assert_eq!(client.users().await.unwrap_err(), ApiError::Unauthorized);
    assert!(client
      .queries()
      .snapshot::<Vec<User>>(&SchoolQuery::Users.key())
      .requires_auth());
  }
}
