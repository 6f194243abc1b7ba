use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use stackfleet_model::CfnResponse;
use tracing::info;

use crate::error::Result;
use crate::ports::ResponseSink;

/// PUTs the response body to the pre-signed URL.
///
/// The URL is signed without a content type, so the header is sent empty.
#[derive(Debug, Clone)]
pub struct HttpResponseSink {
    client: reqwest::Client,
}

impl HttpResponseSink {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponseSink for HttpResponseSink {
    async fn send(&self, response_url: &str, response: &CfnResponse) -> Result<()> {
        let body = serde_json::to_vec(response)?;
        let reply = self
            .client
            .put(response_url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        info!(
            status = ?response.status,
            http_status = reply.status().as_u16(),
            "custom resource response delivered"
        );
        Ok(())
    }
}
