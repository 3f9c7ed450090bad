//! SchoolHub REST API: wire types, the HTTP client, and the cached facade.

mod api_types;
pub mod client;
pub mod keys;
pub mod school;
pub mod types;

pub use client::ApiClient;
pub use keys::{Resource, SchoolQuery};
pub use school::SchoolClient;
