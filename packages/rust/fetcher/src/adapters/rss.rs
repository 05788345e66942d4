//! RSS/Atom feed source.

use enquete_shared::FetchedItem;
use tracing::warn;
use url::Url;

use super::{PortalAdapter, headline_text, resolve_href};

/// Reads feed entries in feed order: entry title is the headline and the
/// first link is the article URL. Feeds carry no author label.
pub struct RssAdapter;

impl PortalAdapter for RssAdapter {
    fn extract_items(&self, body: &str, base: &Url) -> Vec<FetchedItem> {
        let feed = match feed_rs::parser::parse(body.as_bytes()) {
            Ok(feed) => feed,
            Err(e) => {
                warn!(error = %e, "body is not a readable feed");
                return Vec::new();
            }
        };

        feed.entries
            .into_iter()
            .filter_map(|entry| {
                let title = headline_text(&entry.title?.content)?;
                let href = entry.links.first().map(|l| l.href.as_str());
                Some(FetchedItem {
                    url: resolve_href(base, href),
                    title,
                    author: None,
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        "rss"
    }
}
