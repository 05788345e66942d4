//! SQL migration definitions for the enquete database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: news",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per discovered news item
CREATE TABLE IF NOT EXISTS news (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    source_title      TEXT NOT NULL,
    question_title    TEXT,
    source_url        TEXT,
    fetched_at        TEXT NOT NULL,
    external_response TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Add news.author and fetched_at index",
            sql: r#"
ALTER TABLE news ADD COLUMN author TEXT;

CREATE INDEX IF NOT EXISTS idx_news_fetched_at ON news(fetched_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
        Migration {
            version: 3,
            description: "Job run leases",
            sql: r#"
-- At most one holder per job; expires_at is unix epoch millis
CREATE TABLE IF NOT EXISTS job_locks (
    job        TEXT PRIMARY KEY,
    owner      TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (3);
"#,
        },
    ]
}
