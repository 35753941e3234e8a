mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use crate::payload::RawPayload;
use reqwest::header::{ACCEPT, HeaderValue, USER_AGENT};
use reqwest::{Method, Request, Url};
use thiserror::Error;

/// Entur's SIRI VM REST endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.entur.io/realtime/v1/rest/vm";

/// Default dataset (Ruter, Oslo).
pub const DEFAULT_DATASET_ID: &str = "RUT";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid feed endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("invalid User-Agent header value '{0}'")]
    InvalidUserAgent(String),
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed responded with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// A fully resolved SIRI VM poll request.
#[derive(Debug, Clone)]
pub struct FeedRequest {
    endpoint: Url,
    dataset_id: String,
    requestor_id: String,
    user_agent: Option<HeaderValue>,
}

impl FeedRequest {
    pub fn new(
        endpoint: &str,
        dataset_id: impl Into<String>,
        requestor_id: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let endpoint = Url::parse(endpoint).map_err(|e| FetchError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            endpoint,
            dataset_id: dataset_id.into(),
            requestor_id: requestor_id.into(),
            user_agent: None,
        })
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Result<Self, FetchError> {
        let value = HeaderValue::from_str(user_agent)
            .map_err(|_| FetchError::InvalidUserAgent(user_agent.to_string()))?;
        self.user_agent = Some(value);
        Ok(self)
    }

    pub fn requestor_id(&self) -> &str {
        &self.requestor_id
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    /// The endpoint with `datasetId` and `requestorId` appended.
    pub fn url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("datasetId", &self.dataset_id)
            .append_pair("requestorId", &self.requestor_id);
        url
    }

    pub fn to_request(&self) -> Request {
        let mut req = Request::new(Method::GET, self.url());
        let headers = req.headers_mut();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(user_agent) = &self.user_agent {
            headers.insert(USER_AGENT, user_agent.clone());
        }
        req
    }
}

/// Issues one poll against the feed and returns the body stamped with the
/// time it arrived.
///
/// # Errors
///
/// Network failures and any non-2xx status are returned as [`FetchError`].
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    request: &FeedRequest,
) -> Result<RawPayload, FetchError> {
    let resp = client.execute(request.to_request()).await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }

    let body = resp.bytes().await?;
    Ok(RawPayload::received_now(body))
}
