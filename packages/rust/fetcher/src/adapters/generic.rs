//! Generic (configurable) list adapter.
//!
//! For portals without a dedicated adapter: every block matched by the
//! configured selector is one item, its whole text is the headline and its
//! first link is the article URL.

use enquete_shared::{EnqueteError, FetchedItem, Result};
use scraper::{Html, Selector};
use url::Url;

use super::{PortalAdapter, headline, resolve_href};

/// Adapter driven by a user-supplied block selector.
pub struct GenericAdapter {
    block_sel: Selector,
}

impl GenericAdapter {
    /// Build an adapter; fails if `list_selector` is not valid CSS.
    pub fn new(list_selector: &str) -> Result<Self> {
        let block_sel = Selector::parse(list_selector).map_err(|e| {
            EnqueteError::config(format!("invalid list selector `{list_selector}`: {e}"))
        })?;
        Ok(Self { block_sel })
    }
}

impl PortalAdapter for GenericAdapter {
    fn extract_items(&self, body: &str, base: &Url) -> Vec<FetchedItem> {
        let doc = Html::parse_document(body);
        let link_sel = Selector::parse("a[href]").unwrap();

        doc.select(&self.block_sel)
            .filter_map(|block| {
                let title = headline(block)?;
                let href = block
                    .select(&link_sel)
                    .next()
                    .and_then(|a| a.value().attr("href"));
                Some(FetchedItem {
                    title,
                    url: resolve_href(base, href),
                    author: None,
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        "generic"
    }
}
