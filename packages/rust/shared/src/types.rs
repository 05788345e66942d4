//! Core domain types for enquete news records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a stored source headline, in characters.
pub const MAX_SOURCE_TITLE_CHARS: usize = 512;

/// Default character budget for the derived question.
pub const DEFAULT_QUESTION_CHARS: usize = 96;

/// Upper bound on the number of items a fetcher returns.
pub const MAX_FEED_ITEMS: usize = 20;

// ---------------------------------------------------------------------------
// FetchedItem
// ---------------------------------------------------------------------------

/// One candidate news item discovered on the portal, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedItem {
    /// Headline text (whitespace collapsed, never empty).
    pub title: String,
    /// Absolute article URL, if the block carried a link.
    pub url: Option<String>,
    /// Attribution label (department, chamber, ...).
    pub author: Option<String>,
}

// ---------------------------------------------------------------------------
// NewsRecord
// ---------------------------------------------------------------------------

/// The persisted unit of work: one discovered item and its derived artifacts.
///
/// `id` and `fetched_at` are assigned by storage and never change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
    /// Storage-assigned identity.
    pub id: i64,
    /// Original headline as scraped.
    pub source_title: String,
    /// Yes/no question derived from the headline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_title: Option<String>,
    /// Absolute article URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Attribution from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// When the item was first stored.
    pub fetched_at: DateTime<Utc>,
    /// Serialized dispatch outcome (consumer payload or `{"error": ...}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_response: Option<String>,
}

// ---------------------------------------------------------------------------
// NewsUpdate
// ---------------------------------------------------------------------------

/// A partial update: only `Some` fields are written, the rest keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_response: Option<String>,
}

impl NewsUpdate {
    /// Update that records the rewritten question.
    pub fn question(question: impl Into<String>) -> Self {
        Self {
            question_title: Some(question.into()),
            ..Default::default()
        }
    }

    /// Update that records the serialized dispatch outcome.
    pub fn external_response(response: impl Into<String>) -> Self {
        Self {
            external_response: Some(response.into()),
            ..Default::default()
        }
    }

    /// True when no field would be written.
    pub fn is_empty(&self) -> bool {
        self.source_title.is_none()
            && self.source_url.is_none()
            && self.author.is_none()
            && self.question_title.is_none()
            && self.external_response.is_none()
    }
}
