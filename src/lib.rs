//! Lease client for file-share storage REST APIs.
//!
//! A [`FileLeaseClient`] is bound to a [`FileClient`] and issues the four
//! lease calls (acquire, release, change, break) through a
//! [`transport::LeaseTransport`]. Locking itself is enforced by the service.

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod lease;
pub mod transport;
pub mod version;

pub use client::{DirectoryClient, FileClient, ResourceKind, ShareClient, StorageResource};
pub use error::{Error, LeaseError, LeaseErrorKind, Result, TransportError};
pub use lease::{FileLeaseClient, LeaseRevision, LeaseSnapshot};
