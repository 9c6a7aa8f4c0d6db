//! HTTP-based reachability test.

use std::future::Future;
use std::pin::Pin;

use tracing::info;

use crate::config::ProbeSettings;
use crate::Result;

use super::ReachabilityTest;

/// Requests a well-known URL; reachable iff a 2xx status comes back.
#[derive(Debug, Clone)]
pub struct HttpReachabilityTest {
    client: reqwest::Client,
    url: String,
}

impl HttpReachabilityTest {
    /// Build a test client from probe settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Probe` if the HTTP client cannot be built.
    pub fn new(settings: &ProbeSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            url: settings.url.clone(),
        })
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ReachabilityTest for HttpReachabilityTest {
    fn test(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move {
            info!(url = %self.url, "sending reachability request");
            let response = self.client.get(&self.url).send().await?;
            let reachable = response.status().is_success();
            info!(status = %response.status(), "received reachability response");
            Ok(reachable)
        })
    }
}
