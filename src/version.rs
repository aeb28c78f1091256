//! Version strings for the CLI and the `User-Agent` header.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version_string() -> String {
   format!("{VERSION} ({} {})", std::env::consts::OS, std::env::consts::ARCH)
}

/// `fileshare/<version>`, followed by the caller's suffix when one is set.
pub fn user_agent(suffix: Option<&str>) -> String {
   match suffix.map(str::trim).filter(|s| !s.is_empty()) {
      Some(suffix) => format!("fileshare/{VERSION} {suffix}"),
      None => format!("fileshare/{VERSION}"),
   }
}
