use std::{collections::HashMap, sync::Arc};

use fileshare::{
   Error, FileClient, LeaseErrorKind,
   config::Config,
   error::StorageErrorCode,
   transport::{HttpTransport, ResourcePath},
};
use tokio::{
   io::{AsyncReadExt, AsyncWriteExt},
   net::TcpListener,
   task::JoinHandle,
};

const LEASE_ID: &str = "2a4d2b3c-8f6e-4c1a-9b7d-0e5f6a7b8c9d";
const PROPOSED_ID: &str = "7c1e9f20-3b4a-4d5e-8f60-718293a4b5c6";
const LAST_MODIFIED: &str = "Tue, 15 Oct 2019 22:10:21 GMT";

/// Request line and lower-cased headers seen by the local server.
#[derive(Debug)]
struct SeenRequest {
   line:    String,
   headers: HashMap<String, String>,
}

impl SeenRequest {
   fn header(&self, name: &str) -> Option<&str> {
      self.headers.get(name).map(String::as_str)
   }
}

/// Serves one HTTP/1.1 connection with a canned response.
async fn serve_once(response: String) -> (String, JoinHandle<SeenRequest>) {
   let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
   let addr = listener.local_addr().unwrap();
   let handle = tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut buf = Vec::new();
      let mut chunk = [0u8; 1024];
      while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
         let n = socket.read(&mut chunk).await.unwrap();
         assert!(n > 0, "connection closed before request head");
         buf.extend_from_slice(&chunk[..n]);
      }
      socket.write_all(response.as_bytes()).await.unwrap();
      socket.shutdown().await.unwrap();

      let head = String::from_utf8_lossy(&buf).into_owned();
      let mut lines = head.split("\r\n");
      let line = lines.next().unwrap_or_default().to_string();
      let headers = lines
         .take_while(|l| !l.is_empty())
         .filter_map(|l| l.split_once(':'))
         .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
         .collect();
      SeenRequest { line, headers }
   });
   (format!("http://{addr}"), handle)
}

fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
   let mut out = format!("HTTP/1.1 {status}\r\n");
   for (name, value) in headers {
      out.push_str(&format!("{name}: {value}\r\n"));
   }
   out.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n{body}", body.len()));
   out
}

fn lease_ok(lease_id: Option<&str>) -> String {
   let mut headers = vec![("ETag", "\"0x8D751B7C2B4F1A0\""), ("Last-Modified", LAST_MODIFIED)];
   if let Some(id) = lease_id {
      headers.push(("x-ms-lease-id", id));
   }
   response("200 OK", &headers, "")
}

fn file_client(base_url: &str) -> FileClient {
   let cfg = Config { account_url: base_url.to_string(), ..Config::default() };
   let transport = HttpTransport::new(&cfg).unwrap();
   FileClient::new(Arc::new(transport), ResourcePath::new("share", "dir/f.txt"))
}

#[tokio::test]
async fn acquire_sends_lease_headers_and_timeout() {
   let (url, server) = serve_once(lease_ok(Some(LEASE_ID))).await;
   let mut lease = file_client(&url).lease_client(Some(LEASE_ID.to_string())).unwrap();

   lease.acquire(Some(5)).await.unwrap();
   let seen = server.await.unwrap();

   assert_eq!(seen.line, "PUT /share/dir/f.txt?comp=lease&timeout=5 HTTP/1.1");
   assert_eq!(seen.header("x-ms-lease-action"), Some("acquire"));
   assert_eq!(seen.header("x-ms-lease-duration"), Some("-1"));
   assert_eq!(seen.header("x-ms-proposed-lease-id"), Some(LEASE_ID));
   assert_eq!(seen.header("x-ms-lease-id"), None);
   assert_eq!(seen.header("x-ms-version"), Some("2019-07-07"));
   assert_eq!(seen.header("content-length"), Some("0"));
   assert!(seen.header("x-ms-client-request-id").is_some());
   assert!(seen.header("user-agent").is_some_and(|ua| ua.starts_with("fileshare/")));

   assert_eq!(lease.id(), LEASE_ID);
   assert_eq!(lease.etag(), Some("\"0x8D751B7C2B4F1A0\""));
   assert_eq!(lease.last_modified().unwrap().to_rfc2822(), "Tue, 15 Oct 2019 22:10:21 +0000");
}

#[tokio::test]
async fn release_sends_current_id_and_keeps_it() {
   let (url, server) = serve_once(lease_ok(None)).await;
   let mut lease = file_client(&url).lease_client(Some(LEASE_ID.to_string())).unwrap();

   lease.release(None).await.unwrap();
   let seen = server.await.unwrap();

   assert_eq!(seen.line, "PUT /share/dir/f.txt?comp=lease HTTP/1.1");
   assert_eq!(seen.header("x-ms-lease-action"), Some("release"));
   assert_eq!(seen.header("x-ms-lease-id"), Some(LEASE_ID));
   assert_eq!(seen.header("x-ms-proposed-lease-id"), None);
   assert_eq!(lease.id(), LEASE_ID);
   assert!(lease.etag().is_some());
}

#[tokio::test]
async fn change_sends_both_ids() {
   let (url, server) = serve_once(lease_ok(Some(PROPOSED_ID))).await;
   let mut lease = file_client(&url).lease_client(Some(LEASE_ID.to_string())).unwrap();

   lease.change(PROPOSED_ID, Some(30)).await.unwrap();
   let seen = server.await.unwrap();

   assert_eq!(seen.line, "PUT /share/dir/f.txt?comp=lease&timeout=30 HTTP/1.1");
   assert_eq!(seen.header("x-ms-lease-action"), Some("change"));
   assert_eq!(seen.header("x-ms-lease-id"), Some(LEASE_ID));
   assert_eq!(seen.header("x-ms-proposed-lease-id"), Some(PROPOSED_ID));
   assert_eq!(lease.id(), PROPOSED_ID);
}

#[tokio::test]
async fn break_sends_no_lease_id_and_reads_lease_time() {
   let headers = [("ETag", "\"0x1\""), ("Last-Modified", LAST_MODIFIED), ("x-ms-lease-time", "0")];
   let (url, server) = serve_once(response("202 Accepted", &headers, "")).await;
   let lease = file_client(&url).lease_client(Some(LEASE_ID.to_string())).unwrap();

   assert_eq!(lease.break_lease(None).await.unwrap(), 0);
   let seen = server.await.unwrap();

   assert_eq!(seen.header("x-ms-lease-action"), Some("break"));
   assert_eq!(seen.header("x-ms-lease-id"), None);
   assert_eq!(seen.header("x-ms-proposed-lease-id"), None);
}

#[tokio::test]
async fn break_without_lease_time_header_succeeds() {
   let headers = [("ETag", "\"0x1\""), ("Last-Modified", LAST_MODIFIED)];
   let (url, server) = serve_once(response("202 Accepted", &headers, "")).await;
   let lease = file_client(&url).lease_client(None).unwrap();

   assert_eq!(lease.break_lease(None).await.unwrap(), 0);
   server.await.unwrap();
}

#[tokio::test]
async fn zero_timeout_is_not_a_deadline() {
   let (url, server) = serve_once(lease_ok(Some(LEASE_ID))).await;
   let mut lease = file_client(&url).lease_client(Some(LEASE_ID.to_string())).unwrap();

   lease.acquire(Some(0)).await.unwrap();
   let seen = server.await.unwrap();

   assert_eq!(seen.line, "PUT /share/dir/f.txt?comp=lease HTTP/1.1");
}

#[tokio::test]
async fn conflict_status_maps_to_lease_error() {
   let body = "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>LeaseAlreadyPresent</Code>\
               <Message>There is already a lease present.</Message></Error>";
   let (url, server) = serve_once(response(
      "409 Conflict",
      &[("x-ms-error-code", "LeaseAlreadyPresent"), ("Content-Type", "application/xml")],
      body,
   ))
   .await;
   let mut lease = file_client(&url).lease_client(Some(LEASE_ID.to_string())).unwrap();

   let err = lease.acquire(None).await.unwrap_err();
   server.await.unwrap();

   assert_eq!(err.lease_kind(), Some(LeaseErrorKind::Conflict));
   let Error::Lease(lease_err) = err else { panic!("expected a lease error") };
   assert_eq!(lease_err.status, 409);
   assert_eq!(lease_err.code, StorageErrorCode::LeaseAlreadyPresent);
   assert_eq!(lease_err.message, "There is already a lease present.");
   assert!(lease.etag().is_none());
}

#[tokio::test]
async fn error_code_falls_back_to_body() {
   let body = "<Error><Code>LeaseIdMismatchWithLeaseOperation</Code>\
               <Message>The lease ID specified did not match.</Message></Error>";
   let (url, server) = serve_once(response("409 Conflict", &[], body)).await;
   let mut lease = file_client(&url).lease_client(Some(LEASE_ID.to_string())).unwrap();

   let err = lease.release(None).await.unwrap_err();
   server.await.unwrap();

   assert_eq!(err.lease_kind(), Some(LeaseErrorKind::IdMismatch));
}
