//! Client-side data synchronization.
//!
//! Inspired by TanStack Query: cached entries addressed by structural keys,
//! de-duplicated fetches, fixed-interval polling while subscribed, and
//! prefix invalidation after successful writes.

mod client;
mod key;
mod mutation;
mod state;

pub use client::{QueryClient, Subscription};
pub use key::{KeySegment, QueryKey};
pub use mutation::{MutationIntent, Verb};
pub use state::{QueryOptions, QueryStatus, Snapshot};
