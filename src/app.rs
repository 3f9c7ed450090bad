use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use schoolhub::access::{self, Action};
use schoolhub::api::types::{
  Attendance, AttendancePage, AttendanceSubject, AttendanceUpdate, Feedback, FeedbackForm, ImageAttachment,
  NewAttendance, Notification, ReplyForm, Role, SubjectStatus, User, UserUpdate,
};
use schoolhub::api::{ApiClient, SchoolClient};
use schoolhub::config::Config;
use schoolhub::dashboard::Dashboard;
use schoolhub::display::{format_date, format_date_time, role_label, status_label, truncate_text};
use schoolhub::notifications::{self, NotificationCenter, DEFAULT_POLL_INTERVAL};
use schoolhub::query::QueryClient;
use schoolhub::session::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
use schoolhub::ApiError;

const MESSAGE_PREVIEW: usize = 60;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Sign in with email and password
  Login {
    email: String,
    /// Password (default: $SCHOOLHUB_PASSWORD)
    #[arg(long)]
    password: Option<String>,
  },
  /// Create an account
  Register {
    name: String,
    email: String,
    #[arg(long)]
    password: Option<String>,
    /// user, teacher or superadmin
    #[arg(long, default_value = "user")]
    role: Role,
  },
  /// Sign in with a Google ID token
  Google { token: String },
  /// Forget the stored session
  Logout,
  /// Show the signed-in account
  Whoami,
  /// Summary for the signed-in account
  Dashboard,
  /// Manage accounts (staff)
  #[command(subcommand)]
  Users(UsersCommand),
  /// View or record attendance
  #[command(subcommand)]
  Attendance(AttendanceCommand),
  /// Send, list and answer feedback
  #[command(subcommand)]
  Feedback(FeedbackCommand),
  /// Read notifications
  #[command(subcommand)]
  Notifications(NotificationsCommand),
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
  List,
  Approve { id: String },
  Update {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    /// Comma-separated subject list
    #[arg(long, value_delimiter = ',')]
    subjects: Option<Vec<String>>,
  },
  Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum AttendanceCommand {
  /// List attendance; staff must pass --user
  List {
    #[arg(long)]
    user: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
  },
  /// Record attendance. Subjects are NAME:STATUS[:MARKS[:FEEDBACK]]
  Create {
    user: String,
    date: String,
    #[arg(long = "subject", required = true)]
    subjects: Vec<String>,
  },
  Update {
    id: String,
    #[arg(long = "subject", required = true)]
    subjects: Vec<String>,
  },
  Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum FeedbackCommand {
  List,
  Send {
    /// Attendance record the feedback is about
    attendance: String,
    subject: String,
    message: String,
    #[arg(long)]
    image: Option<PathBuf>,
  },
  Reply {
    id: String,
    message: String,
    #[arg(long)]
    image: Option<PathBuf>,
  },
}

#[derive(Subcommand, Debug)]
pub enum NotificationsCommand {
  List,
  Read { id: String },
  ReadAll,
  /// Poll and print new notifications until interrupted
  Watch,
}

/// Command-line application state
pub struct App {
  config: Config,
  client: SchoolClient,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let credentials: Arc<dyn CredentialStore> = match Config::token_override() {
      Some(token) => Arc::new(MemoryCredentialStore::with_token(token)),
      None => {
        let path = match &config.session.path {
          Some(path) => path.clone(),
          None => SqliteCredentialStore::default_path()?,
        };
        Arc::new(SqliteCredentialStore::open_at(&path)?)
      }
    };

    let api = ApiClient::new(&config, credentials)?;
    let client = SchoolClient::new(api, QueryClient::new());

    Ok(Self { config, client })
  }

  pub async fn run(&mut self, command: Command) -> Result<()> {
    let result = self.execute(command).await;
    self.client.queries().shutdown();

    match result {
      Err(e) if is_unauthorized(&e) => Err(eyre!(
        "Not signed in or the session expired. Run `schoolhub login` first."
      )),
      other => other,
    }
  }

  async fn execute(&self, command: Command) -> Result<()> {
    match command {
      Command::Login { email, password } => {
        let password = password_or_env(password)?;
        let auth = self.client.login(&email, &password).await?;
        println!("Signed in as {} ({})", auth.user.name, role_label(auth.user.role));
        if access::is_pending(&auth.user) {
          println!("Your account is waiting for approval.");
        }
      }
      Command::Register {
        name,
        email,
        password,
        role,
      } => {
        let password = password_or_env(password)?;
        let auth = self
          .client
          .register(&name, &email, &password, role)
          .await?;
        println!("Registered {} ({})", auth.user.email, role_label(auth.user.role));
      }
      Command::Google { token } => {
        let auth = self.client.google_auth(&token).await?;
        println!("Signed in as {} ({})", auth.user.name, role_label(auth.user.role));
      }
      Command::Logout => {
        self.client.logout()?;
        println!("Signed out");
      }
      Command::Whoami => {
        let user = self.client.current_user().await?;
        print_user(&user);
      }
      Command::Dashboard => self.dashboard().await?,
      Command::Users(cmd) => self.users(cmd).await?,
      Command::Attendance(cmd) => self.attendance(cmd).await?,
      Command::Feedback(cmd) => self.feedback(cmd).await?,
      Command::Notifications(cmd) => self.notifications(cmd).await?,
    }
    Ok(())
  }

  /// Fetch the signed-in user and check they may perform `action`.
  async fn require(&self, action: Action) -> Result<Arc<User>> {
    let user = self.client.current_user().await?;
    if access::permits(&user, action) {
      return Ok(user);
    }
    if access::is_pending(&user) {
      return Err(eyre!("Your account is waiting for approval, so you cannot {} yet", action));
    }
    Err(eyre!("A {} account cannot {}", user.role, action))
  }

  async fn dashboard(&self) -> Result<()> {
    let user = self.require(Action::ViewDashboard).await?;
    println!("Welcome, {}", user.name);

    match Dashboard::load(&self.client, &user).await? {
      Dashboard::Pending => {
        println!("Your account is waiting for approval from a teacher or administrator.");
      }
      Dashboard::Student(summary) => {
        println!("{} new notifications", summary.unread);
        println!(
          "Attendance: {:.0}% ({} of {} days present)",
          summary.attendance_rate, summary.present_days, summary.total_days
        );
        println!("Feedback sent: {}", summary.feedback_count);
        println!();
        println!("Recent attendance:");
        print_attendance(&summary.recent_attendance);
        println!();
        println!("Recent feedback:");
        print_feedback(&summary.recent_feedback);
      }
      Dashboard::Staff(summary) => {
        println!("{} new notifications", summary.unread);
        println!(
          "Users: {} total, {} approved, {} pending",
          summary.total_users,
          summary.approved_users,
          summary.pending.len()
        );
        println!("Feedback threads: {}", summary.feedback_count);
        if !summary.pending.is_empty() {
          println!();
          println!("Pending approvals:");
          for user in summary.pending.iter().take(3) {
            println!("  {}  {} <{}>", user.id, user.name, user.email);
          }
          if summary.pending.len() > 3 {
            println!("  and {} more", summary.pending.len() - 3);
          }
        }
        println!();
        println!("Recent feedback:");
        print_feedback(&summary.recent_feedback);
      }
    }
    Ok(())
  }

  async fn users(&self, cmd: UsersCommand) -> Result<()> {
    self.require(Action::ManageUsers).await?;
    match cmd {
      UsersCommand::List => {
        let users = self.client.users().await?;
        for user in users.iter() {
          print_user(user);
        }
      }
      UsersCommand::Approve { id } => {
        let user = self.client.approve_user(&id).await?;
        println!("Approved {}", user.name);
      }
      UsersCommand::Update {
        id,
        name,
        email,
        subjects,
      } => {
        let update = UserUpdate {
          name,
          email,
          subjects,
        };
        let user = self.client.update_user(&id, &update).await?;
        println!("Updated {}", user.name);
      }
      UsersCommand::Delete { id } => {
        self.client.delete_user(&id).await?;
        println!("Deleted {}", id);
      }
    }
    Ok(())
  }

  async fn attendance(&self, cmd: AttendanceCommand) -> Result<()> {
    let limit = self.config.attendance.page_size;
    match cmd {
      AttendanceCommand::List { user, page } => {
        let me = self.client.current_user().await?;
        let page = match user {
          Some(id) => {
            self.require(Action::ManageAttendance).await?;
            self.client.user_attendance(&id, page, limit).await?
          }
          None if access::permits(&me, Action::ViewOwnAttendance) => {
            self.client.my_attendance(page, limit).await?
          }
          None if access::is_staff(me.role) => {
            return Err(eyre!("Pass --user <id> to list a student's attendance"));
          }
          None => return Err(eyre!("Your account is waiting for approval")),
        };
        print_attendance_page(&page);
      }
      AttendanceCommand::Create {
        user,
        date,
        subjects,
      } => {
        self.require(Action::ManageAttendance).await?;
        let record = NewAttendance {
          user_id: user,
          date,
          subjects: parse_subjects(&subjects)?,
        };
        let created = self.client.create_attendance(&record).await?;
        println!("Recorded attendance {} for {}", created.id, format_date(&created.date));
      }
      AttendanceCommand::Update { id, subjects } => {
        self.require(Action::ManageAttendance).await?;
        let update = AttendanceUpdate {
          subjects: parse_subjects(&subjects)?,
        };
        let updated = self.client.update_attendance(&id, &update).await?;
        println!("Updated attendance {}", updated.id);
      }
      AttendanceCommand::Delete { id } => {
        self.require(Action::ManageAttendance).await?;
        self.client.delete_attendance(&id).await?;
        println!("Deleted attendance {}", id);
      }
    }
    Ok(())
  }

  async fn feedback(&self, cmd: FeedbackCommand) -> Result<()> {
    match cmd {
      FeedbackCommand::List => {
        let me = self.client.current_user().await?;
        let feedback = if access::permits(&me, Action::ViewAllFeedback) {
          self.client.all_feedback().await?
        } else {
          self.require(Action::ViewOwnFeedback).await?;
          self.client.my_feedback().await?
        };
        print_feedback(&feedback);
      }
      FeedbackCommand::Send {
        attendance,
        subject,
        message,
        image,
      } => {
        self.require(Action::SendFeedback).await?;
        let form = FeedbackForm {
          attendance_id: attendance,
          subject,
          message,
          image: load_image(image.as_deref()).await?,
        };
        let created = self.client.send_feedback(&form).await?;
        println!("Feedback sent ({})", created.id);
      }
      FeedbackCommand::Reply { id, message, image } => {
        self.require(Action::ReplyFeedback).await?;
        let reply = ReplyForm {
          message,
          image: load_image(image.as_deref()).await?,
        };
        let updated = self.client.reply_to_feedback(&id, &reply).await?;
        println!("Reply sent ({} replies)", updated.replies.len());
      }
    }
    Ok(())
  }

  async fn notifications(&self, cmd: NotificationsCommand) -> Result<()> {
    self.require(Action::ViewNotifications).await?;
    let interval = self
      .config
      .polling
      .notifications_interval()
      .unwrap_or(DEFAULT_POLL_INTERVAL);
    let center = NotificationCenter::new(self.client.clone(), interval);

    match cmd {
      NotificationsCommand::List => {
        let items = center.list().await?;
        println!("{} unread", notifications::unread_count(&items));
        for item in items.iter() {
          print_notification(item);
        }
      }
      NotificationsCommand::Read { id } => {
        if center.mark_read(&id).await? {
          println!("Marked {} as read", id);
        } else {
          println!("{} was already read", id);
        }
      }
      NotificationsCommand::ReadAll => {
        let count = center.mark_all_read().await?;
        println!("Marked {} notifications as read", count);
      }
      NotificationsCommand::Watch => self.watch(&center).await?,
    }
    Ok(())
  }

  async fn watch(&self, center: &NotificationCenter) -> Result<()> {
    let mut feed = center.feed();
    let mut seen = HashSet::new();
    info!("watching notifications");

    loop {
      let list = feed.list();
      if let Some(err) = list.error() {
        if err.is_unauthorized() {
          return Err(ApiError::Unauthorized.into());
        }
        eprintln!("Failed to refresh notifications: {}", err);
      }
      if let Some(items) = list.data() {
        for item in newly_unread(items, &mut seen) {
          print_notification(item);
        }
      }
      let badge = feed.badge();
      if !badge.is_empty() {
        println!("[{} unread]", badge);
      }

      tokio::select! {
        _ = feed.changed() => {}
        _ = tokio::signal::ctrl_c() => break,
      }
    }
    Ok(())
  }
}

/// Unread items not in `seen`, oldest first. `seen` is replaced with the ids
/// of `items`, so ids that drop out of the list are forgotten.
fn newly_unread<'a>(items: &'a [Notification], seen: &mut HashSet<String>) -> Vec<&'a Notification> {
  let fresh = items
    .iter()
    .rev()
    .filter(|item| !item.is_read && !seen.contains(&item.id))
    .collect();
  *seen = items.iter().map(|item| item.id.clone()).collect();
  fresh
}

fn is_unauthorized(report: &color_eyre::Report) -> bool {
  report
    .downcast_ref::<ApiError>()
    .is_some_and(ApiError::is_unauthorized)
}

fn password_or_env(password: Option<String>) -> Result<String> {
  match password {
    Some(p) => Ok(p),
    None => Config::get_password(),
  }
}

async fn load_image(path: Option<&Path>) -> Result<Option<ImageAttachment>> {
  match path {
    Some(path) => Ok(Some(ImageAttachment::load(path).await?)),
    None => Ok(None),
  }
}

/// Parse `NAME:STATUS[:MARKS[:FEEDBACK]]`.
fn parse_subject(arg: &str) -> Result<AttendanceSubject> {
  let mut parts = arg.splitn(4, ':');
  let name = parts.next().unwrap_or_default().trim();
  let status = parts
    .next()
    .ok_or_else(|| eyre!("Subject '{}' is missing a status", arg))?
    .parse::<SubjectStatus>()?;
  let marks = match parts.next().map(str::trim).filter(|m| !m.is_empty()) {
    Some(m) => m
      .parse::<f64>()
      .map_err(|_| eyre!("Invalid marks '{}' for {}", m, name))?,
    None => 0.0,
  };
  let feedback = parts.next().unwrap_or_default().trim().to_string();

  Ok(AttendanceSubject {
    subject_name: name.to_string(),
    status,
    marks,
    feedback,
  })
}

fn parse_subjects(args: &[String]) -> Result<Vec<AttendanceSubject>> {
  args.iter().map(|s| parse_subject(s)).collect()
}

fn print_user(user: &User) {
  let state = if user.is_approved { "approved" } else { "pending" };
  println!(
    "{}  {} <{}>  {}  {}",
    user.id,
    user.name,
    user.email,
    role_label(user.role),
    state
  );
}

fn print_attendance_page(page: &AttendancePage) {
  print_attendance(&page.attendance);
  println!(
    "Page {} of {} ({} records)",
    page.current_page, page.total_pages, page.total
  );
}

fn print_attendance(records: &[Attendance]) {
  if records.is_empty() {
    println!("  No attendance records");
    return;
  }
  for record in records {
    let subjects: Vec<String> = record
      .subjects
      .iter()
      .map(|s| format!("{} {}", s.subject_name, status_label(s.status)))
      .collect();
    println!("  {}  {}  {}", record.id, format_date(&record.date), subjects.join(", "));
  }
}

fn print_feedback(feedback: &[Feedback]) {
  if feedback.is_empty() {
    println!("  No feedback");
    return;
  }
  for item in feedback {
    println!(
      "  {}  {}  {}: {}  ({} replies)",
      item.id,
      format_date(&item.created_at),
      item.subject,
      truncate_text(&item.message, MESSAGE_PREVIEW),
      item.replies.len()
    );
  }
}

fn print_notification(item: &Notification) {
  let marker = if item.is_read { " " } else { "*" };
  let sender = item
    .sender
    .as_ref()
    .map(|s| s.name.as_str())
    .unwrap_or("system");
  println!(
    "{} {}  {}  {}: {}",
    marker,
    item.id,
    format_date_time(&item.created_at),
    sender,
    item.message
  );
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_subject_full() {
    let subject = parse_subject("Math:present:8.5:good work").unwrap();
    assert_eq!(subject.subject_name, "Math");
    assert_eq!(subject.status, SubjectStatus::Present);
    assert_eq!(subject.marks, 8.5);
    assert_eq!(subject.feedback, "good work");
  }

  #[test]
  fn test_parse_subject_status_only() {
    let subject = parse_subject("Art:l").unwrap();
    assert_eq!(subject.status, SubjectStatus::Late);
    assert_eq!(subject.marks, 0.0);
    assert!(subject.feedback.is_empty());
  }

  #[test]
  fn test_parse_subject_errors() {
    assert!(parse_subject("Math").is_err());
    assert!(parse_subject("Math:excused").is_err());
    assert!(parse_subject("Math:present:lots").is_err());
  }

  fn notification(id: &str, is_read: bool) -> Notification {
    Notification {
      id: id.into(),
      sender: None,
      kind: schoolhub::api::types::NotificationKind::FeedbackReply,
      message: "New reply".into(),
      data: serde_json::Value::Null,
      is_read,
      created_at: String::new(),
    }
  }

  #[test]
  fn test_newly_unread_tracks_only_current_list() {
    let mut seen = HashSet::new();
    let first = vec![notification("n2", false), notification("n1", true)];
    let printed: Vec<&str> = newly_unread(&first, &mut seen).iter().map(|n| n.id.as_str()).collect();
    assert_eq!(printed, vec!["n2"]);

    let second = vec![notification("n3", false), notification("n2", false)];
    let printed: Vec<&str> = newly_unread(&second, &mut seen).iter().map(|n| n.id.as_str()).collect();
    assert_eq!(printed, vec!["n3"]);
    assert_eq!(seen.len(), 2);
    assert!(!seen.contains("n1"));
  }

  #[test]
  fn test_unauthorized_report_detection() {
    let report: color_eyre::Report = ApiError::Unauthorized.into();
    assert!(is_unauthorized(&report));
    assert!(!is_unauthorized(&eyre!("other")));
  }
}
