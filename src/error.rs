use std::{fmt, io};

use thiserror::Error;

use crate::client::ResourceKind;

/// Main error type for the fileshare client.
///
/// Lease operations never surface raw transport failures for HTTP-level
/// rejections: those are translated into [`LeaseError`] by
/// [`process_storage_error`]. Network problems, timeouts and malformed
/// responses stay in [`Error::Transport`].
#[derive(Debug, Error)]
pub enum Error {
   /// The resource handed to a lease client does not support file leases.
   #[error("lease must use a file client, got a {kind} client")]
   UnsupportedResource { kind: ResourceKind },

   /// A caller-supplied lease id was empty.
   #[error("invalid lease id: {0:?}")]
   InvalidLeaseId(String),

   /// The request never produced a usable service answer.
   #[error("transport error: {0}")]
   Transport(#[source] TransportError),

   /// The service rejected a lease operation.
   #[error("lease error: {0}")]
   Lease(#[from] LeaseError),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// I/O error occurred.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// TOML serialization error occurred.
   #[error("toml error: {0}")]
   Toml(#[from] toml::ser::Error),
}

impl Error {
   /// Returns the classification of a service-side lease rejection.
   pub fn lease_kind(&self) -> Option<LeaseErrorKind> {
      match self {
         Self::Lease(err) => Some(err.kind()),
         _ => None,
      }
   }

   pub fn exit_code(&self) -> i32 {
      match self {
         Self::Lease(err) => match err.kind() {
            LeaseErrorKind::Conflict
            | LeaseErrorKind::IdMismatch
            | LeaseErrorKind::NoActiveLease => 10,
            LeaseErrorKind::NotFound => 4,
            LeaseErrorKind::BadFormat => 2,
            LeaseErrorKind::Other => 1,
         },
         Self::Transport(TransportError::Timeout) => 11,
         Self::UnsupportedResource { .. } | Self::InvalidLeaseId(_) | Self::Config(_) => 2,
         _ => 1,
      }
   }
}

/// Errors raised by a [`crate::transport::LeaseTransport`].
///
/// `Status` carries whatever the service answered with; all other variants
/// mean no service verdict was obtained.
#[derive(Debug, Error)]
pub enum TransportError {
   /// HTTP request failed (connection, TLS, body read).
   #[error("request failed: {0}")]
   Request(#[source] reqwest::Error),

   /// The caller-supplied timeout elapsed before the service answered.
   #[error("request timed out")]
   Timeout,

   /// The service answered with a non-success status.
   #[error("HTTP {status}: {message}")]
   Status { status: u16, code: Option<String>, message: String },

   /// A required response header was absent.
   #[error("missing response header: {0}")]
   MissingHeader(&'static str),

   /// A response header could not be parsed.
   #[error("invalid response header {name}: {value:?}")]
   InvalidHeader { name: &'static str, value: String },

   /// The request could not be built (bad URL, bad header value).
   #[error("invalid request: {0}")]
   InvalidRequest(String),
}

impl From<reqwest::Error> for TransportError {
   fn from(e: reqwest::Error) -> Self {
      if e.is_timeout() { Self::Timeout } else { Self::Request(e) }
   }
}

/// Error codes the file service reports in `x-ms-error-code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageErrorCode {
   LeaseAlreadyPresent,
   LeaseIdMismatchWithLeaseOperation,
   LeaseNotPresentWithLeaseOperation,
   LeaseIdMissing,
   ResourceNotFound,
   ShareNotFound,
   ParentNotFound,
   InvalidHeaderValue,
   InvalidQueryParameterValue,
   AuthenticationFailed,
   Other(String),
   Unknown,
}

impl StorageErrorCode {
   pub fn parse(code: &str) -> Self {
      match code {
         "LeaseAlreadyPresent" => Self::LeaseAlreadyPresent,
         "LeaseIdMismatchWithLeaseOperation" => Self::LeaseIdMismatchWithLeaseOperation,
         "LeaseNotPresentWithLeaseOperation" => Self::LeaseNotPresentWithLeaseOperation,
         "LeaseIdMissing" => Self::LeaseIdMissing,
         "ResourceNotFound" => Self::ResourceNotFound,
         "ShareNotFound" => Self::ShareNotFound,
         "ParentNotFound" => Self::ParentNotFound,
         "InvalidHeaderValue" => Self::InvalidHeaderValue,
         "InvalidQueryParameterValue" => Self::InvalidQueryParameterValue,
         "AuthenticationFailed" => Self::AuthenticationFailed,
         "" => Self::Unknown,
         other => Self::Other(other.to_string()),
      }
   }

   pub fn as_str(&self) -> &str {
      match self {
         Self::LeaseAlreadyPresent => "LeaseAlreadyPresent",
         Self::LeaseIdMismatchWithLeaseOperation => "LeaseIdMismatchWithLeaseOperation",
         Self::LeaseNotPresentWithLeaseOperation => "LeaseNotPresentWithLeaseOperation",
         Self::LeaseIdMissing => "LeaseIdMissing",
         Self::ResourceNotFound => "ResourceNotFound",
         Self::ShareNotFound => "ShareNotFound",
         Self::ParentNotFound => "ParentNotFound",
         Self::InvalidHeaderValue => "InvalidHeaderValue",
         Self::InvalidQueryParameterValue => "InvalidQueryParameterValue",
         Self::AuthenticationFailed => "AuthenticationFailed",
         Self::Other(code) => code,
         Self::Unknown => "Unknown",
      }
   }
}

impl fmt::Display for StorageErrorCode {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// Coarse classification of a lease rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseErrorKind {
   /// Another lease id holds the lease.
   Conflict,
   /// The file (or its share/parent) does not exist.
   NotFound,
   /// A header or parameter was malformed, e.g. a proposed id that is not a GUID.
   BadFormat,
   /// The supplied lease id does not match the active lease.
   IdMismatch,
   /// The operation needs an active lease and there is none.
   NoActiveLease,
   Other,
}

/// A lease operation rejected by the service.
#[derive(Debug, Clone, Error)]
#[error("{code} (HTTP {status}): {message}")]
pub struct LeaseError {
   pub status:  u16,
   pub code:    StorageErrorCode,
   pub message: String,
}

impl LeaseError {
   pub fn kind(&self) -> LeaseErrorKind {
      match self.code {
         StorageErrorCode::LeaseAlreadyPresent => LeaseErrorKind::Conflict,
         StorageErrorCode::LeaseIdMismatchWithLeaseOperation | StorageErrorCode::LeaseIdMissing => {
            LeaseErrorKind::IdMismatch
         },
         StorageErrorCode::LeaseNotPresentWithLeaseOperation => LeaseErrorKind::NoActiveLease,
         StorageErrorCode::ResourceNotFound
         | StorageErrorCode::ShareNotFound
         | StorageErrorCode::ParentNotFound => LeaseErrorKind::NotFound,
         StorageErrorCode::InvalidHeaderValue | StorageErrorCode::InvalidQueryParameterValue => {
            LeaseErrorKind::BadFormat
         },
         _ => match self.status {
            400 => LeaseErrorKind::BadFormat,
            404 => LeaseErrorKind::NotFound,
            409 => LeaseErrorKind::Conflict,
            _ => LeaseErrorKind::Other,
         },
      }
   }
}

/// Translates a transport failure into the error surfaced to callers.
///
/// Service rejections become [`Error::Lease`] with the original status and
/// code; everything else stays a transport error.
pub fn process_storage_error(err: TransportError) -> Error {
   match err {
      TransportError::Status { status, code, message } => {
         let code = code.as_deref().map_or(StorageErrorCode::Unknown, StorageErrorCode::parse);
         tracing::debug!(status, %code, "service rejected lease operation");
         Error::Lease(LeaseError { status, code, message })
      },
      other => Error::Transport(other),
   }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// Failed to retrieve user directories (e.g., home directory).
   #[error("failed to get user directories")]
   GetUserDirectories,

   /// No account URL was configured.
   #[error("account_url is not set; set it in config.toml or FILESHARE_ACCOUNT_URL")]
   MissingAccountUrl,

   /// The account URL could not be parsed or uses an unsupported scheme.
   #[error("invalid account url {url:?}: {reason}")]
   InvalidAccountUrl { url: String, reason: String },

   /// A setting is out of range.
   #[error("invalid config: {0}")]
   Invalid(String),
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
