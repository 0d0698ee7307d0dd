use std::future::Future;
use std::time::Duration;

use reqwest::{header, Client};
use tracing::{debug, trace};

use crate::error::FetchCause;

/// Source of raw quote documents.
pub trait DocumentFetcher: Send + Sync {
    fn fetch_document(&self, url: &str) -> impl Future<Output = Result<String, FetchCause>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl DocumentFetcher for HttpFetcher {
    async fn fetch_document(&self, url: &str) -> Result<String, FetchCause> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        trace!("{} returned {} bytes", url, body.len());
        Ok(body)
    }
}
