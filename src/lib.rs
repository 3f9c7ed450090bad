//! SchoolHub client: a cached, polling sync layer over the SchoolHub REST API.

pub mod access;
pub mod api;
pub mod config;
pub mod dashboard;
pub mod display;
pub mod error;
pub mod notifications;
pub mod query;
pub mod session;

pub use error::{ApiError, ApiResult};
