use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes one HTTP request. The poller only ever talks to the feed
/// through this seam.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
