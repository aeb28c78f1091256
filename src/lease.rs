//! Client-side handle for a lease on a single file.
//!
//! The handle stores the lease id plus the ETag and Last-Modified pair from
//! the last successful call. Every operation is one request; the service
//! decides who holds the lease.

use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::{
   Result,
   client::{FileEndpoint, StorageResource},
   error::{Error, process_storage_error},
   identity::{lease_id_from_entropy, new_lease_id},
   transport::{LeaseDuration, LeaseResponse, ResourcePath},
};

/// ETag and Last-Modified reported by one service response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRevision {
   pub etag:          String,
   pub last_modified: DateTime<Utc>,
}

/// Serializable view of a lease handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSnapshot {
   pub path:          String,
   pub lease_id:      String,
   pub etag:          Option<String>,
   pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct FileLeaseClient {
   id:       String,
   revision: Option<LeaseRevision>,
   endpoint: FileEndpoint,
}

impl FileLeaseClient {
   /// Binds a lease handle to `resource`.
   ///
   /// Fails with [`Error::UnsupportedResource`] unless the resource is a file.
   /// Without `lease_id` a random UUID is proposed on acquire.
   pub fn new<R>(resource: &R, lease_id: Option<String>) -> Result<Self>
   where
      R: StorageResource + ?Sized,
   {
      let Some(endpoint) = resource.file_endpoint() else {
         return Err(Error::UnsupportedResource { kind: resource.kind() });
      };
      let id = match lease_id {
         Some(id) if id.trim().is_empty() => return Err(Error::InvalidLeaseId(id)),
         Some(id) => id,
         None => new_lease_id(),
      };
      Ok(Self { id, revision: None, endpoint })
   }

   /// Like [`Self::new`], deriving the lease id from caller-supplied entropy.
   pub fn with_entropy<R>(resource: &R, entropy: [u8; 16]) -> Result<Self>
   where
      R: StorageResource + ?Sized,
   {
      Self::new(resource, Some(lease_id_from_entropy(entropy)))
   }

   pub fn id(&self) -> &str {
      &self.id
   }

   pub fn etag(&self) -> Option<&str> {
      self.revision.as_ref().map(|r| r.etag.as_str())
   }

   pub fn last_modified(&self) -> Option<DateTime<Utc>> {
      self.revision.as_ref().map(|r| r.last_modified)
   }

   pub fn revision(&self) -> Option<&LeaseRevision> {
      self.revision.as_ref()
   }

   pub fn path(&self) -> &ResourcePath {
      &self.endpoint.path
   }

   pub fn snapshot(&self) -> LeaseSnapshot {
      LeaseSnapshot {
         path:          self.endpoint.path.to_string(),
         lease_id:      self.id.clone(),
         etag:          self.etag().map(str::to_string),
         last_modified: self.last_modified(),
      }
   }

   fn apply(&mut self, response: LeaseResponse) {
      if let Some(id) = response.lease_id.filter(|id| !id.is_empty()) {
         self.id = id;
      }
      self.revision =
         Some(LeaseRevision { etag: response.etag, last_modified: response.last_modified });
   }

   /// Requests an infinite lease, proposing the current id.
   ///
   /// If the file is already leased under this id the lease is renewed; any
   /// other holder makes the service answer with a conflict.
   pub async fn acquire(&mut self, timeout: Option<u32>) -> Result<()> {
      let response = self
         .endpoint
         .transport
         .acquire_lease(&self.endpoint.path, timeout, LeaseDuration::Infinite, &self.id)
         .await
         .map_err(process_storage_error)?;
      self.apply(response);
      tracing::debug!(path = %self.endpoint.path, lease_id = %self.id, "acquired lease");
      Ok(())
   }

   /// Releases the lease so any client may acquire it immediately.
   pub async fn release(&mut self, timeout: Option<u32>) -> Result<()> {
      let response = self
         .endpoint
         .transport
         .release_lease(&self.endpoint.path, &self.id, timeout)
         .await
         .map_err(process_storage_error)?;
      self.apply(response);
      tracing::debug!(path = %self.endpoint.path, lease_id = %self.id, "released lease");
      Ok(())
   }

   /// Changes the id of the active lease to `proposed_lease_id`.
   ///
   /// The proposal must be a GUID; the service rejects anything else with
   /// `InvalidHeaderValue`. The stored id only changes on success.
   pub async fn change(&mut self, proposed_lease_id: &str, timeout: Option<u32>) -> Result<()> {
      let response = self
         .endpoint
         .transport
         .change_lease(&self.endpoint.path, &self.id, proposed_lease_id, timeout)
         .await
         .map_err(process_storage_error)?;
      let previous = std::mem::replace(&mut self.id, proposed_lease_id.to_string());
      self.apply(response);
      tracing::debug!(
         path = %self.endpoint.path,
         previous = %previous,
         lease_id = %self.id,
         "changed lease id"
      );
      Ok(())
   }

   /// Breaks any active lease on the file, whoever holds it.
   ///
   /// Returns the seconds left before the lease clears, which is 0 for the
   /// infinite leases this handle acquires. The handle's id and revision are
   /// left as they were.
   pub async fn break_lease(&self, timeout: Option<u32>) -> Result<u32> {
      let response = self
         .endpoint
         .transport
         .break_lease(&self.endpoint.path, timeout)
         .await
         .map_err(process_storage_error)?;
      tracing::debug!(
         path = %self.endpoint.path,
         lease_time = response.lease_time,
         "broke lease"
      );
      Ok(response.lease_time)
   }

   /// Runs `body` while holding the lease.
   ///
   /// Acquires first, then releases on every exit of `body`: success, error or
   /// panic. A panic is resumed after the release attempt. An error from
   /// `body` takes precedence over a failed release.
   ///
   /// If the returned future is dropped while the lease is held (a caller
   /// timeout or `select!`), the release is spawned onto the current tokio
   /// runtime instead. The handle's own revision is not updated in that case.
   pub async fn with_lease<F, Fut, T>(&mut self, timeout: Option<u32>, body: F) -> Result<T>
   where
      F: FnOnce(String) -> Fut,
      Fut: Future<Output = Result<T>>,
   {
      self.acquire(timeout).await?;
      let mut guard = ReleaseOnDrop {
         endpoint: Some(self.endpoint.clone()),
         lease_id: self.id.clone(),
         timeout,
      };
      let lease_id = self.id.clone();
      let outcome = AssertUnwindSafe(async move { body(lease_id).await })
         .catch_unwind()
         .await;
      let released = self.release(timeout).await;
      guard.disarm();

      match outcome {
         Ok(Ok(value)) => released.map(|()| value),
         Ok(Err(err)) => {
            if let Err(release_err) = released {
               tracing::warn!(path = %self.endpoint.path, "failed to release lease: {release_err}");
            }
            Err(err)
         },
         Err(panic) => {
            if let Err(release_err) = released {
               tracing::warn!(path = %self.endpoint.path, "failed to release lease: {release_err}");
            }
            std::panic::resume_unwind(panic)
         },
      }
   }
}

/// Releases a lease from `Drop` when a scoped body never reaches its own
/// release.
struct ReleaseOnDrop {
   endpoint: Option<FileEndpoint>,
   lease_id: String,
   timeout:  Option<u32>,
}

impl ReleaseOnDrop {
   fn disarm(&mut self) {
      self.endpoint = None;
   }
}

impl Drop for ReleaseOnDrop {
   fn drop(&mut self) {
      let Some(endpoint) = self.endpoint.take() else {
         return;
      };
      let lease_id = std::mem::take(&mut self.lease_id);
      let timeout = self.timeout;
      let Ok(runtime) = tokio::runtime::Handle::try_current() else {
         tracing::warn!(path = %endpoint.path, "scoped lease dropped outside a runtime; lease stays held");
         return;
      };
      runtime.spawn(async move {
         match endpoint.transport.release_lease(&endpoint.path, &lease_id, timeout).await {
            Ok(_) => tracing::debug!(path = %endpoint.path, "released lease after cancellation"),
            Err(e) => {
               tracing::warn!(path = %endpoint.path, "failed to release lease after cancellation: {e}");
            },
         }
      });
   }
}
