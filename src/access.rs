//! Role-based capabilities.
//!
//! Capabilities are a pure function of the closed [`Role`] set, plus one
//! extra rule: a student account that has not been approved yet may only
//! look at its pending status and its notifications.

use std::fmt;

pub use crate::api::types::Role;
use crate::api::types::User;

/// Something a signed-in user may try to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
  /// See the dashboard (or the pending-approval notice)
  ViewDashboard,
  ViewOwnAttendance,
  SendFeedback,
  ViewOwnFeedback,
  ReplyFeedback,
  ViewNotifications,
  ManageAttendance,
  ViewAllFeedback,
  ManageUsers,
}

impl Action {
  fn description(&self) -> &'static str {
    match self {
      Action::ViewDashboard => "view the dashboard",
      Action::ViewOwnAttendance => "view your attendance",
      Action::SendFeedback => "send feedback",
      Action::ViewOwnFeedback => "view your feedback",
      Action::ReplyFeedback => "reply to feedback",
      Action::ViewNotifications => "view notifications",
      Action::ManageAttendance => "manage attendance",
      Action::ViewAllFeedback => "view all feedback",
      Action::ManageUsers => "manage users",
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.description())
  }
}

/// Whether `role` may perform `action`, ignoring approval.
pub fn can(role: Role, action: Action) -> bool {
  match action {
    Action::ViewDashboard | Action::ReplyFeedback | Action::ViewNotifications => true,
    Action::ViewOwnAttendance | Action::SendFeedback | Action::ViewOwnFeedback => {
      role == Role::User
    }
    Action::ManageAttendance | Action::ViewAllFeedback | Action::ManageUsers => {
      is_staff(role)
    }
  }
}

pub fn is_staff(role: Role) -> bool {
  matches!(role, Role::Teacher | Role::Superadmin)
}

/// Whether `user` may perform `action` right now.
pub fn permits(user: &User, action: Action) -> bool {
  if user.role == Role::User && !user.is_approved {
    return matches!(action, Action::ViewDashboard | Action::ViewNotifications);
  }
  can(user.role, action)
}

/// True when the account is waiting for staff approval.
pub fn is_pending(user: &User) -> bool {
  user.role == Role::User && !user.is_approved
}
