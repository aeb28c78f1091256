//! In-process file lease service for tests and offline tooling.
//!
//! Mirrors the service's lease state machine closely enough to exercise the
//! client: GUID checks on proposed ids, conflict and mismatch codes, infinite
//! leases that break immediately, and an ETag/Last-Modified pair that advances
//! on every successful mutation.

use std::{
   collections::HashMap,
   sync::atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use parking_lot::Mutex;

use super::{BreakResponse, LeaseDuration, LeaseResponse, LeaseTransport, ResourcePath};
use crate::{error::TransportError, identity::is_guid};

/// Server-side lease state of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseState {
   Available,
   Leased(String),
   Broken,
}

#[derive(Debug)]
struct FileState {
   lease:         LeaseState,
   revision:      u64,
   last_modified: DateTime<Utc>,
}

impl FileState {
   fn new() -> Self {
      Self {
         lease:         LeaseState::Available,
         revision:      1,
         last_modified: Utc::now().trunc_subsecs(0),
      }
   }

   fn etag(&self) -> String {
      format!("\"0x{:016X}\"", self.revision)
   }

   /// Records a mutation. HTTP dates have second resolution, so the clock is
   /// forced forward by at least one second.
   fn touch(&mut self) {
      self.revision += 1;
      let now = Utc::now().trunc_subsecs(0);
      self.last_modified = now.max(self.last_modified + Duration::seconds(1));
   }

   fn response(&self, lease_id: Option<String>) -> LeaseResponse {
      LeaseResponse { lease_id, etag: self.etag(), last_modified: self.last_modified }
   }
}

#[derive(Debug, Default)]
pub struct MemoryFileService {
   files:        Mutex<HashMap<ResourcePath, FileState>>,
   fail_timeout: AtomicBool,
}

impl MemoryFileService {
   pub fn new() -> Self {
      Self::default()
   }

   /// Creates an empty, unleased file. Existing files are left untouched.
   pub fn create_file(&self, path: &ResourcePath) {
      self.files.lock().entry(path.clone()).or_insert_with(FileState::new);
   }

   pub fn delete_file(&self, path: &ResourcePath) -> bool {
      self.files.lock().remove(path).is_some()
   }

   pub fn lease_state(&self, path: &ResourcePath) -> Option<LeaseState> {
      self.files.lock().get(path).map(|f| f.lease.clone())
   }

   pub fn etag(&self, path: &ResourcePath) -> Option<String> {
      self.files.lock().get(path).map(FileState::etag)
   }

   /// Makes the next call fail as if the caller's timeout elapsed.
   pub fn fail_next_with_timeout(&self) {
      self.fail_timeout.store(true, Ordering::SeqCst);
   }

   fn with_file<T>(
      &self,
      path: &ResourcePath,
      op: impl FnOnce(&mut FileState) -> Result<T, TransportError>,
   ) -> Result<T, TransportError> {
      if self.fail_timeout.swap(false, Ordering::SeqCst) {
         return Err(TransportError::Timeout);
      }
      let mut files = self.files.lock();
      let file = files.get_mut(path).ok_or_else(|| {
         rejected(404, "ResourceNotFound", "The specified resource does not exist.")
      })?;
      op(file)
   }
}

fn rejected(status: u16, code: &str, message: &str) -> TransportError {
   TransportError::Status { status, code: Some(code.to_string()), message: message.to_string() }
}

fn check_guid(id: &str, header: &str) -> Result<(), TransportError> {
   if is_guid(id) {
      Ok(())
   } else {
      Err(rejected(
         400,
         "InvalidHeaderValue",
         &format!("The value for header {header} is not in the correct format."),
      ))
   }
}

fn not_present() -> TransportError {
   rejected(
      409,
      "LeaseNotPresentWithLeaseOperation",
      "There is currently no lease on the file.",
   )
}

fn mismatch() -> TransportError {
   rejected(
      409,
      "LeaseIdMismatchWithLeaseOperation",
      "The lease ID specified did not match the lease ID for the file.",
   )
}

#[async_trait::async_trait]
impl LeaseTransport for MemoryFileService {
   async fn acquire_lease(
      &self,
      path: &ResourcePath,
      _timeout: Option<u32>,
      duration: LeaseDuration,
      proposed_lease_id: &str,
   ) -> Result<LeaseResponse, TransportError> {
      self.with_file(path, |file| {
         if duration != LeaseDuration::Infinite {
            return Err(rejected(
               400,
               "InvalidHeaderValue",
               "File leases only support an infinite duration.",
            ));
         }
         check_guid(proposed_lease_id, "x-ms-proposed-lease-id")?;
         if let LeaseState::Leased(current) = &file.lease {
            if current != proposed_lease_id {
               return Err(rejected(
                  409,
                  "LeaseAlreadyPresent",
                  "There is already a lease present.",
               ));
            }
         }
         file.lease = LeaseState::Leased(proposed_lease_id.to_string());
         file.touch();
         Ok(file.response(Some(proposed_lease_id.to_string())))
      })
   }

   async fn release_lease(
      &self,
      path: &ResourcePath,
      lease_id: &str,
      _timeout: Option<u32>,
   ) -> Result<LeaseResponse, TransportError> {
      self.with_file(path, |file| {
         check_guid(lease_id, "x-ms-lease-id")?;
         match &file.lease {
            LeaseState::Leased(current) if current == lease_id => {},
            LeaseState::Leased(_) => return Err(mismatch()),
            LeaseState::Available | LeaseState::Broken => return Err(not_present()),
         }
         file.lease = LeaseState::Available;
         file.touch();
         // the service does not echo the lease id on release
         Ok(file.response(None))
      })
   }

   async fn change_lease(
      &self,
      path: &ResourcePath,
      lease_id: &str,
      proposed_lease_id: &str,
      _timeout: Option<u32>,
   ) -> Result<LeaseResponse, TransportError> {
      self.with_file(path, |file| {
         check_guid(lease_id, "x-ms-lease-id")?;
         check_guid(proposed_lease_id, "x-ms-proposed-lease-id")?;
         match &file.lease {
            LeaseState::Leased(current)
               if current == lease_id || current == proposed_lease_id => {},
            LeaseState::Leased(_) => return Err(mismatch()),
            LeaseState::Available | LeaseState::Broken => return Err(not_present()),
         }
         file.lease = LeaseState::Leased(proposed_lease_id.to_string());
         file.touch();
         Ok(file.response(Some(proposed_lease_id.to_string())))
      })
   }

   async fn break_lease(
      &self,
      path: &ResourcePath,
      _timeout: Option<u32>,
   ) -> Result<BreakResponse, TransportError> {
      self.with_file(path, |file| {
         if matches!(file.lease, LeaseState::Leased(_)) {
            file.lease = LeaseState::Broken;
            file.touch();
         }
         // infinite leases break immediately
         Ok(BreakResponse { lease_time: 0 })
      })
   }
}
