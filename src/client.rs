// HTTP collaborator for the public CTF catalog.
use crate::model::{CtfDetail, CtfSummary};
use anyhow::{Context, Result};
use std::time::Duration;

/// Collaborator contract for the remote catalog.
///
/// The watch cycle is generic over this trait so tests can substitute a
/// scripted catalog. A list failure is a hard failure for the discovery pass;
/// a detail miss (`Ok(None)`) or failure is a per-item skip, never escalated.
#[allow(async_fn_in_trait)]
pub trait Catalog {
    async fn list(&self) -> Result<Vec<CtfSummary>>;
    async fn detail(&self, slug: &str) -> Result<Option<CtfDetail>>;
}

/// reqwest-backed catalog client with a fixed identification header and a
/// per-request timeout. One attempt per call; retries are the next run's job.
pub struct HttpCatalog {
    base: String,
    client: reqwest::Client,
}

impl HttpCatalog {
    pub fn new(base: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl Catalog for HttpCatalog {
    async fn list(&self) -> Result<Vec<CtfSummary>> {
        let response = self
            .client
            .get(&self.base)
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.base))?
            .error_for_status()
            .context("catalog listing returned an error status")?;

        response
            .json()
            .await
            .context("catalog listing is not valid JSON")
    }

    async fn detail(&self, slug: &str) -> Result<Option<CtfDetail>> {
        let url = format!("{}/details/{}", self.base, slug);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let detail = response
            .json()
            .await
            .with_context(|| format!("detail for '{}' is not valid JSON", slug))?;
        Ok(Some(detail))
    }
}
