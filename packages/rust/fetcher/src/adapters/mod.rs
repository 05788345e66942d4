//! Portal adapter trait and built-in adapters for news list extraction.
//!
//! Each adapter knows one portal's layout: which repeated block holds an
//! article, where its title link is, and where (if anywhere) the author
//! label lives. HTML adapters parse the body with `scraper`; the RSS adapter
//! reads it as a feed. The adapter is picked once from [`PortalKind`] when
//! the fetcher is built.

mod camara;
mod generic;
mod prefeitura;
mod rss;

use enquete_shared::{FetchedItem, MAX_SOURCE_TITLE_CHARS, PortalConfig, PortalKind, Result};
use scraper::ElementRef;
use url::Url;

pub use camara::CamaraAdapter;
pub use generic::GenericAdapter;
pub use prefeitura::PrefeituraAdapter;
pub use rss::RssAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Trait for portal-specific news list extraction.
pub trait PortalAdapter: Send + Sync {
    /// Extract items from a response body in document order. Blocks without
    /// title text are skipped, never returned as empty items.
    fn extract_items(&self, body: &str, base: &Url) -> Vec<FetchedItem>;

    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;
}

/// Build the adapter configured for this portal.
pub fn adapter_for(config: &PortalConfig) -> Result<Box<dyn PortalAdapter>> {
    let adapter: Box<dyn PortalAdapter> = match config.adapter {
        PortalKind::Camara => Box::new(CamaraAdapter),
        PortalKind::Prefeitura => Box::new(PrefeituraAdapter),
        PortalKind::Generic => Box::new(GenericAdapter::new(&config.list_selector)?),
        PortalKind::Rss => Box::new(RssAdapter),
    };
    Ok(adapter)
}

// ---------------------------------------------------------------------------
// Helpers shared by adapters
// ---------------------------------------------------------------------------

/// Element text with runs of whitespace collapsed to single spaces.
pub(crate) fn clean_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Headline text capped at the storable length, or `None` when empty.
pub(crate) fn headline(el: ElementRef<'_>) -> Option<String> {
    headline_text(&clean_text(el))
}

/// [`headline`] for text that is not inside an HTML element.
pub(crate) fn headline_text(raw: &str) -> Option<String> {
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(MAX_SOURCE_TITLE_CHARS).collect())
}

/// Resolve an `href` against the portal page; empty or unparseable links yield `None`.
pub(crate) fn resolve_href(base: &Url, href: Option<&str>) -> Option<String> {
    let href = href?.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}
