//! Shared types, error model, and configuration for enquete.
//!
//! This crate is the foundation depended on by all other enquete crates.
//! It provides:
//! - [`EnqueteError`]: the unified error type and failure taxonomy
//! - Domain types ([`NewsRecord`], [`NewsUpdate`], [`FetchedItem`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DispatchConfig, GeminiConfig, PortalConfig, PortalKind, RewriteConfig,
    ScheduleConfig, StorageConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{EnqueteError, Result};
pub use types::{
    DEFAULT_QUESTION_CHARS, FetchedItem, MAX_FEED_ITEMS, MAX_SOURCE_TITLE_CHARS, NewsRecord,
    NewsUpdate,
};
