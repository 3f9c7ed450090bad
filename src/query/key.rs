//! Structural query keys.

use std::fmt;

/// One component of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySegment {
  Str(String),
  Int(i64),
}

impl fmt::Display for KeySegment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeySegment::Str(s) => f.write_str(s),
      KeySegment::Int(n) => write!(f, "{}", n),
    }
  }
}

impl From<&str> for KeySegment {
  fn from(value: &str) -> Self {
    KeySegment::Str(value.to_string())
  }
}

impl From<String> for KeySegment {
  fn from(value: String) -> Self {
    KeySegment::Str(value)
  }
}

impl From<&String> for KeySegment {
  fn from(value: &String) -> Self {
    KeySegment::Str(value.clone())
  }
}

impl From<i64> for KeySegment {
  fn from(value: i64) -> Self {
    KeySegment::Int(value)
  }
}

impl From<u32> for KeySegment {
  fn from(value: u32) -> Self {
    KeySegment::Int(i64::from(value))
  }
}

/// Ordered tuple identifying a cached result set.
///
/// Keys form a hierarchy: `attendance/mine/1` lives under the
/// `attendance` namespace, and invalidating `attendance` reaches it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
  /// Start a key with its root namespace.
  pub fn new(root: impl Into<KeySegment>) -> Self {
    Self(vec![root.into()])
  }

  /// Append a segment.
  pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
    self.0.push(segment.into());
    self
  }

  pub fn segments(&self) -> &[KeySegment] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// True when `prefix` is a leading run of this key's segments.
  ///
  /// The empty key is a prefix of every key.
  pub fn starts_with(&self, prefix: &QueryKey) -> bool {
    self.0.starts_with(&prefix.0)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, segment) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str("/")?;
      }
      write!(f, "{}", segment)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_structural_equality() {
    let a = QueryKey::new("attendance").with("mine").with(1u32);
    let b = QueryKey::new("attendance").with("mine").with(1i64);
    assert_eq!(a, b);
    assert_ne!(a, QueryKey::new("attendance").with("mine").with(2u32));
  }

  #[test]
  fn test_prefix_matching() {
    let key = QueryKey::new("feedback").with("mine");
    assert!(key.starts_with(&QueryKey::new("feedback")));
    assert!(key.starts_with(&key));
    assert!(key.starts_with(&QueryKey::default()));
    assert!(!key.starts_with(&QueryKey::new("users")));
    assert!(!QueryKey::new("feedback").starts_with(&key));
  }

  #[test]
  fn test_segments_are_not_string_prefixes() {
    let key = QueryKey::new("notifications-archive");
    assert!(!key.starts_with(&QueryKey::new("notifications")));
  }

  #[test]
  fn test_display() {
    let key = QueryKey::new("attendance").with("user").with("u1").with(3u32);
    assert_eq!(key.to_string(), "attendance/user/u1/3");
  }
}
