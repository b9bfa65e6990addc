use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport seam for the upstream fetch, so the client can be swapped
/// (timeouts, proxies) without touching the pipeline.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
