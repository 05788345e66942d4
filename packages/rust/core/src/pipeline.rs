//! The weekly run: fetch → store → rewrite → store → dispatch → store.
//!
//! Only fetching and repository writes can abort a run. Rewrite failures fall
//! back to the local question fitter and dispatch failures are persisted as
//! `{"error": ...}`; neither reaches the caller.
//!
//! Runs are single-flight within a process, and with a [`JobLock`] attached
//! also across every process sharing the same database.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use enquete_dispatcher::{DispatchPayload, Dispatcher, ExternalClient};
use enquete_fetcher::{NewsFetcher, PortalFetcher};
use enquete_rewriter::{GeminiClient, RewriteOrigin, Rewriter};
use enquete_shared::{AppConfig, EnqueteError, NewsUpdate, Result};
use enquete_storage::{JobLock, NewsRepository, Storage};

use crate::single_flight::SingleFlight;

/// Job identity shared by scheduled and manual runs.
pub const JOB_ID: &str = "weekly-news-question";

/// Lease length for the cross-process run lock. Outlives any run, so it only
/// matters when a holder dies without releasing.
const RUN_LEASE: Duration = Duration::from_secs(30 * 60);

// ---------------------------------------------------------------------------
// Run state and observation
// ---------------------------------------------------------------------------

/// Pipeline states, in the order a successful run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Fetching,
    Stored,
    Rewriting,
    Rewritten,
    Dispatching,
    Dispatched,
    Done,
}

impl RunState {
    /// Human-readable label for progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fetching => "Fetching latest news",
            Self::Stored => "News item stored",
            Self::Rewriting => "Rewriting headline as a question",
            Self::Rewritten => "Question ready",
            Self::Dispatching => "Dispatching to consumer",
            Self::Dispatched => "Dispatch recorded",
            Self::Done => "Done",
        }
    }
}

/// Receives state transitions as a run progresses.
pub trait RunObserver: Send + Sync {
    /// Called on entering each state.
    fn transition(&self, state: RunState);
    /// Called once after a successful run.
    fn finished(&self, summary: &RunSummary);
}

/// No-op observer for scheduled and test runs.
pub struct SilentObserver;

impl RunObserver for SilentObserver {
    fn transition(&self, _state: RunState) {}
    fn finished(&self, _summary: &RunSummary) {}
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub record_id: i64,
    pub question_title: String,
    pub question_origin: RewriteOrigin,
    pub external_outcome: Value,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Sequences one news item through rewriting and dispatch.
pub struct Pipeline {
    fetcher: Arc<dyn NewsFetcher>,
    repo: Arc<dyn NewsRepository>,
    rewriter: Rewriter,
    dispatcher: Arc<dyn Dispatcher>,
    max_chars: usize,
    flights: SingleFlight,
    run_lock: Option<Arc<dyn JobLock>>,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn NewsFetcher>,
        repo: Arc<dyn NewsRepository>,
        rewriter: Rewriter,
        dispatcher: Arc<dyn Dispatcher>,
        max_chars: usize,
    ) -> Self {
        Self {
            fetcher,
            repo,
            rewriter,
            dispatcher,
            max_chars: max_chars.max(1),
            flights: SingleFlight::new(),
            run_lock: None,
        }
    }

    /// Also hold `lock` for the duration of each run.
    pub fn with_run_lock(mut self, lock: Arc<dyn JobLock>) -> Self {
        self.run_lock = Some(lock);
        self
    }

    /// Wire the HTTP collaborators from configuration. `storage` serves as
    /// both repository and run lock. The Gemini key is resolved through
    /// `lookup`; without one the rewriter runs offline.
    pub fn from_config(
        config: &AppConfig,
        storage: Arc<Storage>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let fetcher = PortalFetcher::new(&config.portal)?;
        info!(
            adapter = fetcher.adapter_name(),
            portal = config.portal.url.as_str(),
            "portal fetcher ready"
        );
        let rewriter = match config.gemini.api_key(lookup) {
            Some(key) => Rewriter::new(Arc::new(GeminiClient::new(&config.gemini, Some(key))?)),
            None => {
                info!(
                    env = config.gemini.api_key_env.as_str(),
                    "no Gemini key, questions will use the local fallback"
                );
                Rewriter::offline()
            }
        };
        let dispatcher = ExternalClient::new(&config.dispatch)?;

        Ok(Self::new(
            Arc::new(fetcher),
            storage.clone(),
            rewriter,
            Arc::new(dispatcher),
            config.rewrite.max_chars,
        )
        .with_run_lock(storage))
    }

    /// Run once without progress output.
    pub async fn run(&self) -> Result<RunSummary> {
        self.run_with(&SilentObserver).await
    }

    /// Run once, reporting transitions to `observer`.
    ///
    /// Fails fast with [`EnqueteError::Busy`] while another run is in flight,
    /// here or in any process holding the run lock.
    pub async fn run_with(&self, observer: &dyn RunObserver) -> Result<RunSummary> {
        let _flight = self.flights.try_acquire(JOB_ID)?;
        let run_id = Uuid::now_v7();
        let owner = run_id.to_string();

        if let Some(lock) = &self.run_lock {
            if !lock.try_lock(JOB_ID, &owner, RUN_LEASE).await? {
                return Err(EnqueteError::Busy {
                    job: JOB_ID.to_string(),
                });
            }
        }

        let span = info_span!("pipeline_run", %run_id, job = JOB_ID);
        let result = self.execute(observer).instrument(span).await;

        if let Some(lock) = &self.run_lock {
            if let Err(e) = lock.unlock(JOB_ID, &owner).await {
                warn!(error = %e, %run_id, "failed to release run lock");
            }
        }

        let summary = result?;
        observer.finished(&summary);
        Ok(summary)
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.flights.is_running(JOB_ID)
    }

    async fn execute(&self, observer: &dyn RunObserver) -> Result<RunSummary> {
        info!("run started");

        // --- Fetch ---
        observer.transition(RunState::Fetching);
        let items = self.fetcher.fetch_latest().await?;
        let Some(item) = items.into_iter().next() else {
            return Err(EnqueteError::EmptyFeed);
        };

        let record = self
            .repo
            .create(&item.title, item.url.as_deref(), item.author.as_deref())
            .await?;
        observer.transition(RunState::Stored);
        info!(record_id = record.id, "news item stored");

        // --- Rewrite ---
        observer.transition(RunState::Rewriting);
        let rewrite = self
            .rewriter
            .rewrite(&record.source_title, self.max_chars)
            .await?;
        observer.transition(RunState::Rewritten);

        let record = self
            .repo
            .update(&record, &NewsUpdate::question(rewrite.question.as_str()))
            .await?;

        // --- Dispatch ---
        observer.transition(RunState::Dispatching);
        let payload = DispatchPayload::from_record(&record)?;
        let outcome = self.dispatcher.send(&payload).await;
        observer.transition(RunState::Dispatched);

        let external_outcome = outcome.to_json();
        let record = self
            .repo
            .update(
                &record,
                &NewsUpdate::external_response(external_outcome.to_string()),
            )
            .await?;

        observer.transition(RunState::Done);
        info!(
            record_id = record.id,
            delivered = outcome.is_delivered(),
            "run complete"
        );

        Ok(RunSummary {
            record_id: record.id,
            question_title: rewrite.question,
            question_origin: rewrite.origin,
            external_outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use enquete_dispatcher::DispatchOutcome;
    use enquete_rewriter::TextGenerator;
    use enquete_shared::{DispatchConfig, FetchedItem, NewsRecord};
    use enquete_storage::Storage;

    use super::*;

    const PROCON: &str = "Procon Recife promove Semana das Crianças com oficinas sobre consumo consciente na Rede Compaz";

    // --- Stubs ---

    struct StaticFetcher(Vec<FetchedItem>);

    #[async_trait]
    impl NewsFetcher for StaticFetcher {
        async fn fetch_latest(&self) -> Result<Vec<FetchedItem>> {
            Ok(self.0.clone())
        }
    }

    struct DownFetcher;

    #[async_trait]
    impl NewsFetcher for DownFetcher {
        async fn fetch_latest(&self) -> Result<Vec<FetchedItem>> {
            Err(EnqueteError::Fetch("connection refused".into()))
        }
    }

    /// Blocks inside `fetch_latest` until released.
    struct GatedFetcher {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl NewsFetcher for GatedFetcher {
        async fn fetch_latest(&self) -> Result<Vec<FetchedItem>> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Vec::new())
        }
    }

    struct Answer(&'static str);

    #[async_trait]
    impl TextGenerator for Answer {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct TimedOut;

    #[async_trait]
    impl TextGenerator for TimedOut {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(EnqueteError::Rewrite("operation timed out".into()))
        }
    }

    struct StubDispatcher(DispatchOutcome);

    #[async_trait]
    impl Dispatcher for StubDispatcher {
        async fn send(&self, _payload: &DispatchPayload) -> DispatchOutcome {
            self.0.clone()
        }
    }

    /// Delegates to real storage but fails every update.
    struct ReadOnlyUpdates(Arc<Storage>);

    #[async_trait]
    impl NewsRepository for ReadOnlyUpdates {
        async fn create(
            &self,
            source_title: &str,
            source_url: Option<&str>,
            author: Option<&str>,
        ) -> Result<NewsRecord> {
            self.0.create(source_title, source_url, author).await
        }
        async fn update(&self, _record: &NewsRecord, _fields: &NewsUpdate) -> Result<NewsRecord> {
            Err(EnqueteError::Storage("database is locked".into()))
        }
        async fn get(&self, id: i64) -> Result<Option<NewsRecord>> {
            self.0.get(id).await
        }
        async fn list(&self, limit: u32) -> Result<Vec<NewsRecord>> {
            self.0.list(limit).await
        }
        async fn delete(&self, record: &NewsRecord) -> Result<()> {
            self.0.delete(record).await
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<RunState>>);

    impl RunObserver for Recorder {
        fn transition(&self, state: RunState) {
            self.0.lock().unwrap().push(state);
        }
        fn finished(&self, _summary: &RunSummary) {}
    }

    // --- Helpers ---

    async fn test_storage() -> Arc<Storage> {
        let tmp = std::env::temp_dir().join(format!("enquete_test_{}.db", Uuid::now_v7()));
        Arc::new(Storage::open(&tmp).await.expect("open test db"))
    }

    fn procon_item() -> FetchedItem {
        FetchedItem {
            title: PROCON.into(),
            url: Some("https://www2.recife.pe.gov.br/noticias/x".into()),
            author: Some("Secretaria X".into()),
        }
    }

    fn delivered_ok() -> Arc<dyn Dispatcher> {
        Arc::new(StubDispatcher(DispatchOutcome::Delivered(json!({ "ok": true }))))
    }

    // --- Tests ---

    #[tokio::test]
    async fn successful_run_persists_question_and_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;
        let dispatcher = ExternalClient::new(&DispatchConfig {
            url: Some(server.uri()),
            ..DispatchConfig::default()
        })
        .unwrap();

        let storage = test_storage().await;
        let pipeline = Pipeline::new(
            Arc::new(StaticFetcher(vec![procon_item()])),
            storage.clone(),
            Rewriter::new(Arc::new(Answer("Você concorda com a iniciativa?"))),
            Arc::new(dispatcher),
            96,
        );

        let recorder = Recorder::default();
        let summary = pipeline.run_with(&recorder).await.expect("run");

        assert_eq!(summary.question_title, "Você concorda com a iniciativa?");
        assert_eq!(summary.question_origin, RewriteOrigin::Generated);
        assert_eq!(summary.external_outcome, json!({ "ok": true }));

        let stored = storage.get(summary.record_id).await.unwrap().expect("record");
        assert_eq!(stored.source_title, PROCON);
        assert_eq!(stored.author.as_deref(), Some("Secretaria X"));
        assert_eq!(
            stored.question_title.as_deref(),
            Some("Você concorda com a iniciativa?")
        );
        let response: Value =
            serde_json::from_str(stored.external_response.as_deref().unwrap()).unwrap();
        assert_eq!(response, json!({ "ok": true }));

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                RunState::Fetching,
                RunState::Stored,
                RunState::Rewriting,
                RunState::Rewritten,
                RunState::Dispatching,
                RunState::Dispatched,
                RunState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn only_the_first_item_is_processed() {
        let storage = test_storage().await;
        let second = FetchedItem {
            title: "Segunda notícia".into(),
            url: None,
            author: None,
        };
        let pipeline = Pipeline::new(
            Arc::new(StaticFetcher(vec![procon_item(), second])),
            storage.clone(),
            Rewriter::new(Arc::new(Answer("Você concorda?"))),
            delivered_ok(),
            96,
        );

        pipeline.run().await.unwrap();
        let records = storage.list(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_title, PROCON);
    }

    #[tokio::test]
    async fn empty_feed_aborts_without_records() {
        let storage = test_storage().await;
        let pipeline = Pipeline::new(
            Arc::new(StaticFetcher(Vec::new())),
            storage.clone(),
            Rewriter::offline(),
            delivered_ok(),
            96,
        );

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, EnqueteError::EmptyFeed));
        assert!(storage.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_error_aborts_without_records() {
        let storage = test_storage().await;
        let pipeline = Pipeline::new(
            Arc::new(DownFetcher),
            storage.clone(),
            Rewriter::offline(),
            delivered_ok(),
            96,
        );

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, EnqueteError::Fetch(_)));
        assert!(storage.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rewrite_timeout_uses_fallback_and_still_dispatches() {
        let storage = test_storage().await;
        let pipeline = Pipeline::new(
            Arc::new(StaticFetcher(vec![procon_item()])),
            storage.clone(),
            Rewriter::new(Arc::new(TimedOut)),
            delivered_ok(),
            96,
        );

        let summary = pipeline.run().await.expect("run survives rewrite failure");
        assert!(summary.question_title.chars().count() <= 96);
        assert!(summary.question_title.ends_with('?'));
        assert!(matches!(summary.question_origin, RewriteOrigin::Fallback { .. }));
        assert_eq!(summary.external_outcome, json!({ "ok": true }));

        let stored = storage.get(summary.record_id).await.unwrap().unwrap();
        assert_eq!(stored.question_title.as_deref(), Some(summary.question_title.as_str()));
        assert!(stored.external_response.is_some());
    }

    #[tokio::test]
    async fn dispatch_failure_is_persisted_as_error() {
        let storage = test_storage().await;
        let pipeline = Pipeline::new(
            Arc::new(StaticFetcher(vec![procon_item()])),
            storage.clone(),
            Rewriter::new(Arc::new(Answer("Você concorda com a iniciativa?"))),
            Arc::new(StubDispatcher(DispatchOutcome::Failed {
                error: "connection refused".into(),
            })),
            96,
        );

        let summary = pipeline.run().await.expect("run survives dispatch failure");
        assert_eq!(
            summary.external_outcome,
            json!({ "error": "connection refused" })
        );

        let stored = storage.get(summary.record_id).await.unwrap().unwrap();
        let response: Value =
            serde_json::from_str(stored.external_response.as_deref().unwrap()).unwrap();
        assert_eq!(response["error"], "connection refused");
        assert_eq!(
            stored.question_title.as_deref(),
            Some("Você concorda com a iniciativa?")
        );
    }

    #[tokio::test]
    async fn repository_failure_aborts_and_keeps_prior_writes() {
        let storage = test_storage().await;
        let pipeline = Pipeline::new(
            Arc::new(StaticFetcher(vec![procon_item()])),
            Arc::new(ReadOnlyUpdates(storage.clone())),
            Rewriter::new(Arc::new(Answer("Você concorda?"))),
            delivered_ok(),
            96,
        );

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, EnqueteError::Storage(_)));

        let records = storage.list(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].question_title.is_none());
        assert!(records[0].external_response.is_none());
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected() {
        let fetcher = Arc::new(GatedFetcher {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let pipeline = Arc::new(Pipeline::new(
            fetcher.clone(),
            test_storage().await,
            Rewriter::offline(),
            delivered_ok(),
            96,
        ));

        let first = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.run().await }
        });
        fetcher.entered.notified().await;
        assert!(pipeline.is_running());

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, EnqueteError::Busy { ref job } if job == JOB_ID));

        fetcher.release.notify_one();
        let first = first.await.unwrap();
        assert!(matches!(first, Err(EnqueteError::EmptyFeed)));
        assert!(!pipeline.is_running());

        fetcher.release.notify_one();
        assert!(matches!(pipeline.run().await, Err(EnqueteError::EmptyFeed)));
    }

    #[tokio::test]
    async fn run_lock_excludes_pipelines_sharing_a_database() {
        let path = std::env::temp_dir().join(format!("enquete_test_{}.db", Uuid::now_v7()));
        let first_storage = Arc::new(Storage::open(&path).await.unwrap());
        let second_storage = Arc::new(Storage::open(&path).await.unwrap());

        let fetcher = Arc::new(GatedFetcher {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let first = Arc::new(
            Pipeline::new(
                fetcher.clone(),
                first_storage.clone(),
                Rewriter::offline(),
                delivered_ok(),
                96,
            )
            .with_run_lock(first_storage),
        );
        let second = Pipeline::new(
            Arc::new(StaticFetcher(vec![procon_item()])),
            second_storage.clone(),
            Rewriter::offline(),
            delivered_ok(),
            96,
        )
        .with_run_lock(second_storage.clone());

        let running = tokio::spawn({
            let first = Arc::clone(&first);
            async move { first.run().await }
        });
        fetcher.entered.notified().await;

        let err = second.run().await.unwrap_err();
        assert!(matches!(err, EnqueteError::Busy { ref job } if job == JOB_ID));
        assert!(second_storage.list(10).await.unwrap().is_empty());

        fetcher.release.notify_one();
        assert!(matches!(running.await.unwrap(), Err(EnqueteError::EmptyFeed)));

        // Released on failure too.
        let summary = second.run().await.expect("lock free again");
        assert!(second_storage.get(summary.record_id).await.unwrap().is_some());
    }

    #[test]
    fn summary_serializes_to_json() {
        let summary = RunSummary {
            record_id: 3,
            question_title: "Você sabia?".into(),
            question_origin: RewriteOrigin::Generated,
            external_outcome: json!({ "ok": true }),
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["record_id"], 3);
        assert_eq!(value["question_origin"]["kind"], "generated");
        assert_eq!(value["external_outcome"]["ok"], true);
    }
}
