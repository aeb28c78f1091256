//! `reqwest`-backed transport speaking the file service lease REST API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{
   Method, Url,
   header::{ETAG, HeaderMap, LAST_MODIFIED},
};
use uuid::Uuid;

use super::{BreakResponse, LeaseDuration, LeaseResponse, LeaseTransport, ResourcePath};
use crate::{
   Result,
   config::Config,
   error::{Error, TransportError},
   version,
};

/// Header names used by lease requests and responses.
pub mod header_names {
   pub const LEASE_ACTION: &str = "x-ms-lease-action";
   pub const LEASE_ID: &str = "x-ms-lease-id";
   pub const PROPOSED_LEASE_ID: &str = "x-ms-proposed-lease-id";
   pub const LEASE_DURATION: &str = "x-ms-lease-duration";
   pub const LEASE_TIME: &str = "x-ms-lease-time";
   pub const VERSION: &str = "x-ms-version";
   pub const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";
   pub const ERROR_CODE: &str = "x-ms-error-code";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaseAction {
   Acquire,
   Release,
   Change,
   Break,
}

impl LeaseAction {
   fn as_str(self) -> &'static str {
      match self {
         Self::Acquire => "acquire",
         Self::Release => "release",
         Self::Change => "change",
         Self::Break => "break",
      }
   }
}

/// Issues lease requests against `{account_url}/{share}/{path}?comp=lease`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
   client:      reqwest::Client,
   account_url: Url,
   sas_token:   Option<String>,
   api_version: String,
}

impl HttpTransport {
   pub fn new(cfg: &Config) -> Result<Self> {
      cfg.validate()?;
      let account_url = cfg.parsed_account_url()?;
      let client = reqwest::Client::builder()
         .user_agent(version::user_agent(cfg.user_agent_suffix.as_deref()))
         .timeout(Duration::from_secs(cfg.request_timeout_secs))
         .build()
         .map_err(|e| Error::Transport(TransportError::Request(e)))?;

      Ok(Self {
         client,
         account_url,
         sas_token: cfg
            .sas_token
            .as_deref()
            .map(|t| t.trim_start_matches('?').to_string())
            .filter(|t| !t.is_empty()),
         api_version: cfg.api_version.clone(),
      })
   }

   /// Builds the lease URL for a file, including the server-side timeout and
   /// SAS query. A zero timeout is treated as no timeout.
   pub fn lease_url(
      &self,
      path: &ResourcePath,
      timeout: Option<u32>,
   ) -> Result<Url, TransportError> {
      let mut url = self.account_url.clone();
      {
         let mut segments = url.path_segments_mut().map_err(|()| {
            TransportError::InvalidRequest(format!("account url {} cannot be a base", self.account_url))
         })?;
         segments.pop_if_empty().push(path.share());
         for segment in path.path().split('/').filter(|s| !s.is_empty()) {
            segments.push(segment);
         }
      }
      {
         let mut query = url.query_pairs_mut();
         query.append_pair("comp", "lease");
         if let Some(secs) = timeout.filter(|s| *s > 0) {
            query.append_pair("timeout", &secs.to_string());
         }
      }
      if let Some(sas) = &self.sas_token {
         let query = format!("{}&{sas}", url.query().unwrap_or_default());
         url.set_query(Some(&query));
      }
      Ok(url)
   }

   async fn send(
      &self,
      action: LeaseAction,
      path: &ResourcePath,
      timeout: Option<u32>,
      headers: &[(&'static str, String)],
   ) -> Result<HeaderMap, TransportError> {
      let url = self.lease_url(path, timeout)?;
      let request_id = Uuid::new_v4().to_string();
      tracing::debug!(action = action.as_str(), %path, %request_id, "sending lease request");

      let mut request = self
         .client
         .request(Method::PUT, url)
         .header(header_names::LEASE_ACTION, action.as_str())
         .header(header_names::VERSION, &self.api_version)
         .header(header_names::CLIENT_REQUEST_ID, &request_id)
         .header(reqwest::header::CONTENT_LENGTH, "0");
      for (name, value) in headers {
         request = request.header(*name, value);
      }
      if let Some(secs) = timeout.filter(|s| *s > 0) {
         request = request.timeout(Duration::from_secs(u64::from(secs)));
      }

      let response = request.send().await?;
      let status = response.status();
      if status.is_success() {
         return Ok(response.headers().clone());
      }

      let header_code = header_str(response.headers(), header_names::ERROR_CODE).map(str::to_string);
      let body = response.text().await.unwrap_or_default();
      let code = header_code
         .or_else(|| xml_element(&body, "Code").map(str::to_string))
         .filter(|c| !c.is_empty());
      tracing::debug!(
         action = action.as_str(),
         %path,
         %request_id,
         status = status.as_u16(),
         code = code.as_deref().unwrap_or("-"),
         "lease request rejected"
      );
      Err(TransportError::Status {
         status: status.as_u16(),
         code,
         message: error_message(&body, status.canonical_reason()),
      })
   }
}

#[async_trait::async_trait]
impl LeaseTransport for HttpTransport {
   async fn acquire_lease(
      &self,
      path: &ResourcePath,
      timeout: Option<u32>,
      duration: LeaseDuration,
      proposed_lease_id: &str,
   ) -> Result<LeaseResponse, TransportError> {
      let headers = [
         (header_names::LEASE_DURATION, duration.header_value()),
         (header_names::PROPOSED_LEASE_ID, proposed_lease_id.to_string()),
      ];
      let headers = self.send(LeaseAction::Acquire, path, timeout, &headers).await?;
      parse_lease_headers(&headers)
   }

   async fn release_lease(
      &self,
      path: &ResourcePath,
      lease_id: &str,
      timeout: Option<u32>,
   ) -> Result<LeaseResponse, TransportError> {
      let headers = [(header_names::LEASE_ID, lease_id.to_string())];
      let headers = self.send(LeaseAction::Release, path, timeout, &headers).await?;
      parse_lease_headers(&headers)
   }

   async fn change_lease(
      &self,
      path: &ResourcePath,
      lease_id: &str,
      proposed_lease_id: &str,
      timeout: Option<u32>,
   ) -> Result<LeaseResponse, TransportError> {
      let headers = [
         (header_names::LEASE_ID, lease_id.to_string()),
         (header_names::PROPOSED_LEASE_ID, proposed_lease_id.to_string()),
      ];
      let headers = self.send(LeaseAction::Change, path, timeout, &headers).await?;
      parse_lease_headers(&headers)
   }

   async fn break_lease(
      &self,
      path: &ResourcePath,
      timeout: Option<u32>,
   ) -> Result<BreakResponse, TransportError> {
      let headers = self.send(LeaseAction::Break, path, timeout, &[]).await?;
      parse_break_headers(&headers)
   }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
   headers.get(name).and_then(|v| v.to_str().ok())
}

/// Reads lease id, ETag and Last-Modified from a lease response.
pub fn parse_lease_headers(headers: &HeaderMap) -> Result<LeaseResponse, TransportError> {
   let etag = header_str(headers, ETAG.as_str())
      .ok_or(TransportError::MissingHeader("ETag"))?
      .to_string();
   let raw_modified =
      header_str(headers, LAST_MODIFIED.as_str()).ok_or(TransportError::MissingHeader("Last-Modified"))?;
   let last_modified = DateTime::parse_from_rfc2822(raw_modified)
      .map_err(|_| TransportError::InvalidHeader {
         name:  "Last-Modified",
         value: raw_modified.to_string(),
      })?
      .with_timezone(&Utc);
   let lease_id = header_str(headers, header_names::LEASE_ID)
      .filter(|id| !id.is_empty())
      .map(str::to_string);

   Ok(LeaseResponse { lease_id, etag, last_modified })
}

/// Reads the remaining lease time from a break response.
///
/// The break has already happened when this runs, so an absent header reads
/// as 0, the value for infinite leases.
pub fn parse_break_headers(headers: &HeaderMap) -> Result<BreakResponse, TransportError> {
   let Some(raw) = header_str(headers, header_names::LEASE_TIME) else {
      return Ok(BreakResponse { lease_time: 0 });
   };
   let lease_time = raw
      .trim()
      .parse::<u32>()
      .map_err(|_| TransportError::InvalidHeader {
         name:  header_names::LEASE_TIME,
         value: raw.to_string(),
      })?;
   Ok(BreakResponse { lease_time })
}

/// Pulls `<Message>` out of a storage error body, falling back to the raw body
/// or the status reason.
fn error_message(body: &str, reason: Option<&str>) -> String {
   if let Some(message) = xml_element(body, "Message") {
      return message.to_string();
   }
   let body = body.trim();
   if body.is_empty() {
      reason.unwrap_or("request rejected").to_string()
   } else {
      body.to_string()
   }
}

/// Text of the first `<name>...</name>` element in a storage error body.
fn xml_element<'a>(body: &'a str, name: &str) -> Option<&'a str> {
   let open = format!("<{name}>");
   let close = format!("</{name}>");
   let start = body.find(&open)? + open.len();
   let len = body[start..].find(&close)?;
   Some(body[start..start + len].trim())
}

#[cfg(test)]
mod tests {
   use reqwest::header::HeaderValue;

   use super::*;

   fn transport(account_url: &str, sas: Option<&str>) -> HttpTransport {
      let cfg = Config {
         account_url: account_url.to_string(),
         sas_token: sas.map(str::to_string),
         ..Config::default()
      };
      HttpTransport::new(&cfg).expect("valid config")
   }

   fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
      let mut map = HeaderMap::new();
      for (name, value) in pairs {
         map.insert(*name, HeaderValue::from_str(value).unwrap());
      }
      map
   }

   #[test]
   fn lease_url_includes_comp_timeout_and_sas() {
      let t = transport("https://acct.file.core.windows.net/", Some("?sv=2019-07-07&sig=abc%3D"));
      let path = ResourcePath::new("share", "dir/my file.txt");
      let url = t.lease_url(&path, Some(30)).unwrap();
      assert_eq!(
         url.as_str(),
         "https://acct.file.core.windows.net/share/dir/my%20file.txt?comp=lease&timeout=30&sv=2019-07-07&sig=abc%3D"
      );
   }

   #[test]
   fn lease_url_without_timeout_or_sas() {
      let t = transport("https://acct.file.core.windows.net", None);
      let url = t.lease_url(&ResourcePath::new("s", "f"), None).unwrap();
      assert_eq!(url.as_str(), "https://acct.file.core.windows.net/s/f?comp=lease");
   }

   #[test]
   fn parses_lease_response_headers() {
      let map = headers(&[
         ("etag", "\"0x8D7\""),
         ("last-modified", "Tue, 15 Oct 2019 22:10:21 GMT"),
         ("x-ms-lease-id", "67e55044-10b1-426f-9247-bb680e5fe0c8"),
      ]);
      let resp = parse_lease_headers(&map).unwrap();
      assert_eq!(resp.etag, "\"0x8D7\"");
      assert_eq!(resp.lease_id.as_deref(), Some("67e55044-10b1-426f-9247-bb680e5fe0c8"));
      assert_eq!(resp.last_modified.to_rfc3339(), "2019-10-15T22:10:21+00:00");
   }

   #[test]
   fn lease_id_header_is_optional() {
      let map = headers(&[("etag", "\"1\""), ("last-modified", "Tue, 15 Oct 2019 22:10:21 GMT")]);
      assert_eq!(parse_lease_headers(&map).unwrap().lease_id, None);
   }

   #[test]
   fn missing_or_bad_headers_are_transport_errors() {
      let map = headers(&[("last-modified", "Tue, 15 Oct 2019 22:10:21 GMT")]);
      assert!(matches!(parse_lease_headers(&map), Err(TransportError::MissingHeader("ETag"))));

      let map = headers(&[("etag", "\"1\""), ("last-modified", "yesterday")]);
      assert!(matches!(
         parse_lease_headers(&map),
         Err(TransportError::InvalidHeader { name: "Last-Modified", .. })
      ));

      let map = headers(&[("x-ms-lease-time", "soon")]);
      assert!(matches!(parse_break_headers(&map), Err(TransportError::InvalidHeader { .. })));
   }

   #[test]
   fn missing_break_lease_time_reads_as_zero() {
      let map = headers(&[("etag", "\"1\"")]);
      assert_eq!(parse_break_headers(&map).unwrap().lease_time, 0);
   }

   #[test]
   fn zero_timeout_is_not_sent() {
      let t = transport("https://acct.file.core.windows.net", None);
      let url = t.lease_url(&ResourcePath::new("s", "f"), Some(0)).unwrap();
      assert_eq!(url.as_str(), "https://acct.file.core.windows.net/s/f?comp=lease");
   }

   #[test]
   fn xml_element_extracts_code() {
      let body = "<Error><Code>LeaseIdMismatchWithLeaseOperation</Code><Message>m</Message></Error>";
      assert_eq!(xml_element(body, "Code"), Some("LeaseIdMismatchWithLeaseOperation"));
      assert_eq!(xml_element(body, "Detail"), None);
      assert_eq!(xml_element("<Code>unterminated", "Code"), None);
   }

   #[test]
   fn parses_break_lease_time() {
      let map = headers(&[("x-ms-lease-time", "0")]);
      assert_eq!(parse_break_headers(&map).unwrap().lease_time, 0);
   }

   #[test]
   fn error_message_prefers_xml_message() {
      let body = "<?xml version=\"1.0\"?><Error><Code>LeaseAlreadyPresent</Code>\
                  <Message>There is already a lease present.</Message></Error>";
      assert_eq!(error_message(body, Some("Conflict")), "There is already a lease present.");
      assert_eq!(error_message("", Some("Conflict")), "Conflict");
      assert_eq!(error_message("plain", None), "plain");
   }
}
