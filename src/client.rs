//! Share, directory and file clients.
//!
//! These are addressing handles: each one knows its place in the share and the
//! transport it talks through. Only [`FileClient`] exposes a lease endpoint.

use std::{fmt, sync::Arc};

use crate::{
   Result,
   lease::FileLeaseClient,
   transport::{LeaseTransport, ResourcePath},
};

/// What kind of resource a client addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
   Share,
   Directory,
   File,
}

impl fmt::Display for ResourceKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Self::Share => "share",
         Self::Directory => "directory",
         Self::File => "file",
      })
   }
}

/// The transport and path a lease client calls through.
#[derive(Clone)]
pub struct FileEndpoint {
   pub transport: Arc<dyn LeaseTransport>,
   pub path:      ResourcePath,
}

impl fmt::Debug for FileEndpoint {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("FileEndpoint").field("path", &self.path).finish()
   }
}

/// A client bound to one resource of a share.
pub trait StorageResource {
   fn kind(&self) -> ResourceKind;

   fn path(&self) -> &ResourcePath;

   /// The lease-capable endpoint, if this resource supports file leases.
   fn file_endpoint(&self) -> Option<FileEndpoint> {
      None
   }
}

#[derive(Clone)]
pub struct ShareClient {
   transport: Arc<dyn LeaseTransport>,
   path:      ResourcePath,
}

impl ShareClient {
   pub fn new(transport: Arc<dyn LeaseTransport>, share: impl Into<String>) -> Self {
      Self { transport, path: ResourcePath::new(share, "") }
   }

   pub fn share_name(&self) -> &str {
      self.path.share()
   }

   pub fn root_directory(&self) -> DirectoryClient {
      DirectoryClient { transport: self.transport.clone(), path: self.path.clone() }
   }

   pub fn directory(&self, name: &str) -> DirectoryClient {
      self.root_directory().subdirectory(name)
   }

   pub fn file(&self, path: &str) -> FileClient {
      self.root_directory().file(path)
   }
}

impl StorageResource for ShareClient {
   fn kind(&self) -> ResourceKind {
      ResourceKind::Share
   }

   fn path(&self) -> &ResourcePath {
      &self.path
   }
}

#[derive(Clone)]
pub struct DirectoryClient {
   transport: Arc<dyn LeaseTransport>,
   path:      ResourcePath,
}

impl DirectoryClient {
   pub fn subdirectory(&self, name: &str) -> Self {
      Self { transport: self.transport.clone(), path: self.path.join(name) }
   }

   pub fn file(&self, name: &str) -> FileClient {
      FileClient { transport: self.transport.clone(), path: self.path.join(name) }
   }
}

impl StorageResource for DirectoryClient {
   fn kind(&self) -> ResourceKind {
      ResourceKind::Directory
   }

   fn path(&self) -> &ResourcePath {
      &self.path
   }
}

#[derive(Clone)]
pub struct FileClient {
   transport: Arc<dyn LeaseTransport>,
   path:      ResourcePath,
}

impl FileClient {
   pub fn new(transport: Arc<dyn LeaseTransport>, path: ResourcePath) -> Self {
      Self { transport, path }
   }

   pub fn file_name(&self) -> &str {
      self.path.name()
   }

   /// Creates a lease client for this file. No request is sent.
   pub fn lease_client(&self, lease_id: Option<String>) -> Result<FileLeaseClient> {
      FileLeaseClient::new(self, lease_id)
   }
}

impl StorageResource for FileClient {
   fn kind(&self) -> ResourceKind {
      ResourceKind::File
   }

   fn path(&self) -> &ResourcePath {
      &self.path
   }

   fn file_endpoint(&self) -> Option<FileEndpoint> {
      Some(FileEndpoint { transport: self.transport.clone(), path: self.path.clone() })
   }
}

impl fmt::Debug for ShareClient {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ShareClient").field("path", &self.path).finish()
   }
}

impl fmt::Debug for DirectoryClient {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("DirectoryClient").field("path", &self.path).finish()
   }
}

impl fmt::Debug for FileClient {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("FileClient").field("path", &self.path).finish()
   }
}
