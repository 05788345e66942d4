//! News portal fetcher and per-portal HTML adapters.
//!
//! This crate provides:
//! - [`NewsFetcher`]: the seam the pipeline fetches through
//! - [`PortalFetcher`]: HTTP fetch + one [`PortalAdapter`] chosen at construction
//! - [`adapters`]: layout-specific extractors (Câmara, Prefeitura, generic, RSS)

pub mod adapters;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use enquete_shared::{EnqueteError, FetchedItem, MAX_FEED_ITEMS, PortalConfig, Result};

pub use adapters::{
    CamaraAdapter, GenericAdapter, PortalAdapter, PrefeituraAdapter, RssAdapter, adapter_for,
};

/// User-Agent string for portal requests.
const USER_AGENT: &str = concat!("enquete/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Source of candidate news items.
#[async_trait]
pub trait NewsFetcher: Send + Sync {
    /// Newest-first items, at most [`MAX_FEED_ITEMS`].
    ///
    /// An unreachable source is an [`EnqueteError::Fetch`]; a reachable
    /// source with nothing parseable is `Ok(vec![])`.
    async fn fetch_latest(&self) -> Result<Vec<FetchedItem>>;
}

// ---------------------------------------------------------------------------
// PortalFetcher
// ---------------------------------------------------------------------------

/// Fetches one portal listing page and extracts items with its adapter.
pub struct PortalFetcher {
    client: Client,
    portal_url: Url,
    adapter: Box<dyn PortalAdapter>,
}

impl PortalFetcher {
    /// Build a fetcher for the configured portal and adapter.
    pub fn new(config: &PortalConfig) -> Result<Self> {
        let portal_url = Url::parse(&config.url).map_err(|e| {
            EnqueteError::config(format!("invalid portal url `{}`: {e}", config.url))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EnqueteError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            portal_url,
            adapter: adapter_for(config)?,
        })
    }

    /// Name of the adapter in use.
    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    /// Parse a listing body into bounded, ordered items.
    fn parse_listing(&self, body: &str) -> Vec<FetchedItem> {
        let mut items = self.adapter.extract_items(body, &self.portal_url);
        items.truncate(MAX_FEED_ITEMS);
        items
    }
}

#[async_trait]
impl NewsFetcher for PortalFetcher {
    #[instrument(skip_all, fields(url = %self.portal_url, adapter = self.adapter.name()))]
    async fn fetch_latest(&self) -> Result<Vec<FetchedItem>> {
        let url = &self.portal_url;

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| EnqueteError::Fetch(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnqueteError::Fetch(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EnqueteError::Fetch(format!("{url}: {e}")))?;
        debug!(bytes = body.len(), "portal page fetched");

        let items = self.parse_listing(&body);
        info!(count = items.len(), "news items extracted");
        Ok(items)
    }
}
