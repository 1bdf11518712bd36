//! Leads HTTP Client
//!
//! Direct reqwest client for the CRM lead endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::LeadRecord;
use crate::notice::Notice;

pub const FETCH_LEADS_PATH: &str = "/leads/fetch";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeadError {
    #[error("Not signed in: no session token available")]
    AuthRequired,
    #[error("{0}")]
    Remote(String),
    #[error("Leads HTTP error: {0}")]
    Http(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Lead fetch cancelled")]
    Cancelled,
}

impl Serialize for LeadError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<reqwest::Error> for LeadError {
    fn from(e: reqwest::Error) -> Self {
        LeadError::Http(e.to_string())
    }
}

impl LeadError {
    /// User-visible form. Cancellation is silent.
    pub fn into_notice(self) -> Option<Notice> {
        match self {
            LeadError::Cancelled => None,
            other => Some(Notice::RemoteError(other.to_string())),
        }
    }
}

/// Body of `POST /leads/fetch`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchLeadsRequest {
    pub page: u32,
    pub limit: u32,
    #[serde(rename = "unassigned")]
    pub unassigned_only: bool,
}

impl Default for FetchLeadsRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 50,
            unassigned_only: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LeadPage {
    #[serde(default)]
    leads: Vec<LeadRecord>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Remote lead list collaborator
#[async_trait]
pub trait LeadsApi: Send + Sync {
    async fn fetch_leads(
        &self,
        token: &str,
        request: &FetchLeadsRequest,
    ) -> Result<Vec<LeadRecord>, LeadError>;
}

#[derive(Clone)]
pub struct HttpLeadsApi {
    http: Client,
    base_url: String,
}

impl HttpLeadsApi {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Self {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(10));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().unwrap_or_else(|e| {
            warn!(error = %e, ?timeout, "HTTP client build failed; falling back to defaults without timeout");
            Client::new()
        });
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, FETCH_LEADS_PATH)
    }
}

#[async_trait]
impl LeadsApi for HttpLeadsApi {
    async fn fetch_leads(
        &self,
        token: &str,
        request: &FetchLeadsRequest,
    ) -> Result<Vec<LeadRecord>, LeadError> {
        debug!(page = request.page, limit = request.limit, "Fetching leads");
        let resp = self.http.post(self.endpoint())
            .bearer_auth(token)
            .json(request)
            .send().await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| format!("Lead fetch failed ({})", status));
            error!(status = %status, message = %message, "Lead fetch rejected");
            return Err(LeadError::Remote(message));
        }

        let leads = parse_lead_page(&text)?;
        info!(count = leads.len(), "Fetched leads");
        Ok(leads)
    }
}

/// Decode a success body. The raw body goes to the debug log only.
fn parse_lead_page(text: &str) -> Result<Vec<LeadRecord>, LeadError> {
    serde_json::from_str::<LeadPage>(text)
        .map(|page| page.leads)
        .map_err(|e| {
            debug!(body = %text, "Unparseable lead page");
            LeadError::Deserialize(e.to_string())
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve a single canned HTTP response and hand back the raw request.
    pub(crate) async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + content_length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_fetch_sends_bearer_and_body() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"leads":[{"_id":"1","name":"A","phoneNumber":"555","email":"a@x","status":"pending","priority":"high"}]}"#,
        )
        .await;
        let api = HttpLeadsApi::new(&base, Some(Duration::from_secs(5)));
        let leads = api
            .fetch_leads("tok123", &FetchLeadsRequest::default())
            .await
            .unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].id.as_deref(), Some("1"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /leads/fetch "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer tok123"));
        assert!(request.contains(r#""page":1"#));
        assert!(request.contains(r#""limit":50"#));
        assert!(request.contains(r#""unassigned":false"#));
    }

    #[tokio::test]
    async fn test_non_success_carries_server_message() {
        let (base, server) = serve_once("401 Unauthorized", r#"{"message":"Token expired"}"#).await;
        let api = HttpLeadsApi::new(&base, None);
        let err = api.fetch_leads("stale", &FetchLeadsRequest::default()).await.unwrap_err();
        assert_eq!(err, LeadError::Remote("Token expired".into()));
        server.await.unwrap();
    }

    #[test]
    fn test_malformed_page_notice_omits_body() {
        let body = r#"{"debug":"secret-internal-dump","leads":[{"phoneNumber":12345}]}"#;
        let err = parse_lead_page(body).unwrap_err();
        assert!(matches!(err, LeadError::Deserialize(_)));
        let notice = err.into_notice().unwrap().to_string();
        assert!(!notice.contains("secret-internal-dump"));
        assert!(notice.starts_with("Failed to fetch leads: Deserialization error:"));
    }

    #[test]
    fn test_cancelled_has_no_notice() {
        assert!(LeadError::Cancelled.into_notice().is_none());
        assert_eq!(
            LeadError::Remote("down".into()).into_notice(),
            Some(Notice::RemoteError("down".into()))
        );
    }
}
