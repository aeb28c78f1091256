#![allow(dead_code, reason = "not every test binary uses every helper")]

use std::sync::Arc;

use fileshare::{
   FileClient, ShareClient,
   transport::{MemoryFileService, ResourcePath},
};

pub struct Fixture {
   pub service: Arc<MemoryFileService>,
   pub share:   ShareClient,
}

impl Fixture {
   pub fn new() -> Self {
      let service = Arc::new(MemoryFileService::new());
      let share = ShareClient::new(service.clone(), "share");
      Self { service, share }
   }

   /// Creates `path` on the service and returns a client for it.
   pub fn file(&self, path: &str) -> FileClient {
      let client = self.share.file(path);
      self.service.create_file(&ResourcePath::new("share", path));
      client
   }
}
