//! Lease transport abstraction with HTTP and in-memory implementations.

pub mod http;
pub mod memory;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::TransportError;

pub use http::HttpTransport;
pub use memory::MemoryFileService;

/// Requested lease duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseDuration {
   Infinite,
   Fixed(u32),
}

impl LeaseDuration {
   /// Value of the `x-ms-lease-duration` header.
   pub fn header_value(self) -> String {
      match self {
         Self::Infinite => "-1".to_string(),
         Self::Fixed(secs) => secs.to_string(),
      }
   }
}

/// Headers returned by acquire, release and change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseResponse {
   /// The lease id the service reports, if it echoed one.
   pub lease_id:      Option<String>,
   pub etag:          String,
   pub last_modified: DateTime<Utc>,
}

/// Headers returned by break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakResponse {
   /// Seconds until the broken lease clears.
   pub lease_time: u32,
}

/// Path of a file within an account: `share/dir/.../file`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
   share: String,
   path:  String,
}

impl ResourcePath {
   pub fn new(share: impl Into<String>, path: impl Into<String>) -> Self {
      let path: String = path.into();
      Self { share: share.into(), path: path.trim_matches('/').to_string() }
   }

   pub fn share(&self) -> &str {
      &self.share
   }

   /// Path below the share, without leading or trailing slashes.
   pub fn path(&self) -> &str {
      &self.path
   }

   pub fn join(&self, segment: &str) -> Self {
      let segment = segment.trim_matches('/');
      let path = if self.path.is_empty() {
         segment.to_string()
      } else {
         format!("{}/{segment}", self.path)
      };
      Self { share: self.share.clone(), path }
   }

   /// Last path segment (the file or directory name).
   pub fn name(&self) -> &str {
      self.path.rsplit('/').next().unwrap_or_default()
   }
}

impl fmt::Display for ResourcePath {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      if self.path.is_empty() {
         write!(f, "{}", self.share)
      } else {
         write!(f, "{}/{}", self.share, self.path)
      }
   }
}

/// The four lease calls a file endpoint must support.
///
/// Timeouts are whole seconds and apply per call. Implementations report
/// service rejections as [`TransportError::Status`] and leave translation to
/// the caller.
#[async_trait::async_trait]
pub trait LeaseTransport: Send + Sync {
   async fn acquire_lease(
      &self,
      path: &ResourcePath,
      timeout: Option<u32>,
      duration: LeaseDuration,
      proposed_lease_id: &str,
   ) -> Result<LeaseResponse, TransportError>;

   async fn release_lease(
      &self,
      path: &ResourcePath,
      lease_id: &str,
      timeout: Option<u32>,
   ) -> Result<LeaseResponse, TransportError>;

   async fn change_lease(
      &self,
      path: &ResourcePath,
      lease_id: &str,
      proposed_lease_id: &str,
      timeout: Option<u32>,
   ) -> Result<LeaseResponse, TransportError>;

   async fn break_lease(
      &self,
      path: &ResourcePath,
      timeout: Option<u32>,
   ) -> Result<BreakResponse, TransportError>;
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn resource_path_trims_and_joins() {
      let root = ResourcePath::new("share", "/");
      assert_eq!(root.to_string(), "share");
      let file = root.join("docs/").join("/report.txt");
      assert_eq!(file.path(), "docs/report.txt");
      assert_eq!(file.name(), "report.txt");
      assert_eq!(file.to_string(), "share/docs/report.txt");
   }

   #[test]
   fn duration_header_values() {
      assert_eq!(LeaseDuration::Infinite.header_value(), "-1");
      assert_eq!(LeaseDuration::Fixed(30).header_value(), "30");
   }
}
