//! Integration tests for the movies ETL orchestrator.
//!
//! These tests use the real Orchestrator, loader and JSON state file, with mock
//! implementations of the source and the search index.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use futures::{stream, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use uuid::Uuid;

use movies_etl::errors::PipelineError;
use movies_etl::extractor::Extractor;
use movies_etl::loader::BulkLoader;
use movies_etl::orchestrator::{Orchestrator, OrchestratorConfig};
use movies_etl::retry::BackoffPolicy;
use movies_etl_repository::{
    BatchOperationResult, BatchOperationSummary, IndexDefinition, JsonFileStateStore,
    MovieBatchStream, MoviesSource, SearchIndexError, SearchIndexProvider, SourceError,
    StateStore, StateStoreError,
};
use movies_etl_shared::{format_resume_token, IndexAction, MovieDocument, MovieRecord};

const INDEX: &str = "movies";

// Mock source serving an in-memory table, ordered like the change query
struct MockMoviesSource {
    records: Mutex<Vec<MovieRecord>>,
    requests: Mutex<Vec<Option<DateTime<Utc>>>>,
    /// Fail the stream after this many batches, once.
    fail_after_batches: Mutex<Option<usize>>,
    /// Refuse every connection.
    unreachable: AtomicBool,
}

impl MockMoviesSource {
    fn new(records: Vec<MovieRecord>) -> Self {
        let source = Self {
            records: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            fail_after_batches: Mutex::new(None),
            unreachable: AtomicBool::new(false),
        };
        source.insert(records);
        source
    }

    fn insert(&self, records: Vec<MovieRecord>) {
        let mut table = self.records.lock().unwrap();
        table.extend(records);
        table.sort_by_key(|r| (r.modified, r.id));
    }

    fn fail_once_after(&self, batches: usize) {
        *self.fail_after_batches.lock().unwrap() = Some(batches);
    }

    fn unreachable() -> Self {
        let source = Self::new(Vec::new());
        source.unreachable.store(true, Ordering::SeqCst);
        source
    }

    fn last_request(&self) -> Option<DateTime<Utc>> {
        self.requests.lock().unwrap().last().copied().flatten()
    }
}

#[async_trait]
impl MoviesSource for MockMoviesSource {
    async fn extract(
        &self,
        since: Option<DateTime<Utc>>,
        chunk_size: usize,
    ) -> Result<MovieBatchStream, SourceError> {
        self.requests.lock().unwrap().push(since);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SourceError::connection("connection refused"));
        }

        let changed: Vec<MovieRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| since.map_or(true, |s| r.modified > s))
            .cloned()
            .collect();

        let mut batches: Vec<Result<Vec<MovieRecord>, SourceError>> = changed
            .chunks(chunk_size)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();

        if let Some(after) = self.fail_after_batches.lock().unwrap().take() {
            batches.truncate(after);
            batches.push(Err(SourceError::connection("server closed the connection")));
        }

        Ok(stream::iter(batches).boxed())
    }
}

// Mock search index keeping documents by id
#[derive(Default)]
struct InMemoryIndex {
    documents: Mutex<HashMap<Uuid, MovieDocument>>,
    batch_sizes: Mutex<Vec<usize>>,
    transient_failures: AtomicUsize,
    /// Reject every document of this bulk call (1-based), once.
    reject_call: Mutex<Option<usize>>,
    calls: AtomicUsize,
}

impl InMemoryIndex {
    fn with_transient_failures(failures: usize) -> Self {
        Self {
            transient_failures: AtomicUsize::new(failures),
            ..Default::default()
        }
    }

    fn rejecting_call(call: usize) -> Self {
        Self {
            reject_call: Mutex::new(Some(call)),
            ..Default::default()
        }
    }

    fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.documents.lock().unwrap().contains_key(id)
    }
}

#[async_trait]
impl SearchIndexProvider for InMemoryIndex {
    async fn ensure_index(
        &self,
        _index: &str,
        _definition: &IndexDefinition,
    ) -> Result<(), SearchIndexError> {
        Ok(())
    }

    async fn bulk_index(
        &self,
        actions: &[IndexAction],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if self.transient_failures.load(Ordering::SeqCst) > 0 {
            self.transient_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(SearchIndexError::connection("connection refused"));
        }

        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut reject_call = self.reject_call.lock().unwrap();
        if *reject_call == Some(call) {
            reject_call.take();
            let results = actions
                .iter()
                .map(|a| BatchOperationResult {
                    document_id: a.document_id(),
                    success: false,
                    error: Some("cluster_block_exception".to_string()),
                })
                .collect();
            return Ok(BatchOperationSummary::from_results(results));
        }

        self.batch_sizes.lock().unwrap().push(actions.len());
        let mut documents = self.documents.lock().unwrap();
        let results = actions
            .iter()
            .map(|a| {
                documents.insert(a.id, a.document.clone());
                BatchOperationResult {
                    document_id: a.document_id(),
                    success: true,
                    error: None,
                }
            })
            .collect();
        Ok(BatchOperationSummary::from_results(results))
    }
}

// State store whose writes always fail
struct ReadOnlyState;

#[async_trait]
impl StateStore for ReadOnlyState {
    async fn get_state(&self, _key: &str) -> Result<Option<String>, StateStoreError> {
        Ok(None)
    }

    async fn set_state(&self, _key: &str, _value: &str) -> Result<(), StateStoreError> {
        Err(StateStoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only file system",
        )))
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 16, 20, 14, 9).unwrap()
}

fn movie(title: &str, modified: DateTime<Utc>) -> MovieRecord {
    MovieRecord::new(Uuid::new_v4(), title, modified)
}

fn backlog(count: i64) -> Vec<MovieRecord> {
    (0..count)
        .map(|i| movie(&format!("Film {}", i), base_time() + ChronoDuration::seconds(i)))
        .collect()
}

fn fast_policy() -> BackoffPolicy {
    BackoffPolicy {
        base: 2,
        factor: 1,
        max_delay: Duration::from_millis(5),
        jitter: false,
    }
}

fn orchestrator(
    source: Arc<MockMoviesSource>,
    index: Arc<InMemoryIndex>,
    state: Arc<dyn StateStore>,
    chunk_size: usize,
) -> Orchestrator {
    Orchestrator::with_config(
        Extractor::new(source, chunk_size, fast_policy()),
        BulkLoader::new(index, fast_policy()),
        state,
        OrchestratorConfig {
            index_name: INDEX.to_string(),
            run_interval: Duration::from_millis(10),
            backoff: fast_policy(),
        },
    )
}

fn state_at(path: &Path) -> Arc<JsonFileStateStore> {
    Arc::new(JsonFileStateStore::open(path).unwrap())
}

fn saved_token(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).unwrap();
    let state: HashMap<String, String> = serde_json::from_str(&contents).unwrap();
    state.get(INDEX).cloned()
}

#[tokio::test]
async fn test_backlog_is_loaded_in_bounded_batches() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    let records = backlog(120);
    let last_modified = records[119].modified;
    let source = Arc::new(MockMoviesSource::new(records));
    let index = Arc::new(InMemoryIndex::default());
    let mut etl = orchestrator(source.clone(), index.clone(), state_at(&state_path), 50);

    let report = etl.run_once().await.unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(report.documents, 120);
    assert!(report.completed);
    assert_eq!(*index.batch_sizes.lock().unwrap(), vec![50, 50, 20]);
    assert_eq!(index.len(), 120);
    assert_eq!(
        saved_token(&state_path),
        Some(format_resume_token(last_modified))
    );
    assert_eq!(source.requests.lock().unwrap().as_slice(), &[None]);
}

#[tokio::test]
async fn test_pass_without_changes_keeps_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    let records = backlog(3);
    let last_modified = records[2].modified;
    let source = Arc::new(MockMoviesSource::new(records));
    let index = Arc::new(InMemoryIndex::default());
    let mut etl = orchestrator(source.clone(), index.clone(), state_at(&state_path), 10);

    etl.run_once().await.unwrap();
    let token_after_first = saved_token(&state_path);

    let report = etl.run_once().await.unwrap();

    assert_eq!(report.batches, 0);
    assert_eq!(report.documents, 0);
    assert_eq!(source.last_request(), Some(last_modified));
    assert_eq!(saved_token(&state_path), token_after_first);
    assert_eq!(index.batch_sizes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_new_changes_are_picked_up_and_cursor_only_grows() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    let source = Arc::new(MockMoviesSource::new(backlog(5)));
    let index = Arc::new(InMemoryIndex::default());
    let mut etl = orchestrator(source.clone(), index.clone(), state_at(&state_path), 2);

    etl.run_once().await.unwrap();
    let first = saved_token(&state_path).unwrap();

    let late = movie("Late Arrival", base_time() + ChronoDuration::hours(1));
    let late_id = late.id;
    source.insert(vec![late]);

    let report = etl.run_once().await.unwrap();
    let second = saved_token(&state_path).unwrap();

    assert_eq!(report.documents, 1);
    assert!(index.contains(&late_id));
    assert_eq!(index.len(), 6);
    assert!(second > first);
    assert_eq!(etl.total_runs(), 2);
    assert_eq!(etl.total_documents_loaded(), 6);
}

#[tokio::test]
async fn test_tied_records_survive_failure_at_batch_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    let tie = base_time() + ChronoDuration::seconds(10);
    let records = vec![
        movie("Before", base_time()),
        movie("Tied One", tie),
        movie("Tied Two", tie),
    ];
    let source = Arc::new(MockMoviesSource::new(records.clone()));
    // The second bulk call, holding the second tied record, is rejected
    let index = Arc::new(InMemoryIndex::rejecting_call(2));
    let mut etl = orchestrator(source.clone(), index.clone(), state_at(&state_path), 2);

    let result = etl.run_once().await;

    assert!(matches!(
        result,
        Err(PipelineError::SearchIndex(SearchIndexError::BulkIndexError(_)))
    ));
    let checkpoint = saved_token(&state_path).unwrap();
    assert!(checkpoint < format_resume_token(tie));
    assert_eq!(index.len(), 2);

    // Restart from the persisted state with a fresh orchestrator
    drop(etl);
    let mut restarted = orchestrator(source.clone(), index.clone(), state_at(&state_path), 2);
    let report = restarted.run_once().await.unwrap();

    assert!(report.completed);
    assert!(records.iter().all(|r| index.contains(&r.id)));
    assert_eq!(saved_token(&state_path), Some(format_resume_token(tie)));
}

#[tokio::test]
async fn test_source_failure_mid_stream_resumes_after_last_loaded_batch() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    let source = Arc::new(MockMoviesSource::new(backlog(6)));
    source.fail_once_after(1);
    let index = Arc::new(InMemoryIndex::default());
    let mut etl = orchestrator(source.clone(), index.clone(), state_at(&state_path), 2);

    let result = etl.run_once().await;

    assert!(matches!(result, Err(PipelineError::Source(_))));
    assert_eq!(index.len(), 2);

    etl.run_once().await.unwrap();

    assert_eq!(index.len(), 6);
    // The retry re-reads the last loaded batch's final record, then the rest
    assert_eq!(*index.batch_sizes.lock().unwrap(), vec![2, 2, 2, 1]);
}

#[tokio::test]
async fn test_transient_sink_failures_are_absorbed() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    let source = Arc::new(MockMoviesSource::new(backlog(4)));
    let index = Arc::new(InMemoryIndex::with_transient_failures(3));
    let mut etl = orchestrator(source, index.clone(), state_at(&state_path), 10);

    let report = etl.run_once().await.unwrap();

    assert_eq!(report.documents, 4);
    assert_eq!(index.len(), 4);
    assert_eq!(index.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.checkpoint, Some(base_time() + ChronoDuration::seconds(3)));
}

#[tokio::test]
async fn test_cursor_untouched_while_sink_is_down() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    let source = Arc::new(MockMoviesSource::new(backlog(2)));
    let index = Arc::new(InMemoryIndex::with_transient_failures(usize::MAX));
    let mut etl = orchestrator(source, index.clone(), state_at(&state_path), 10);

    let result = timeout(Duration::from_millis(100), etl.run_once()).await;

    assert!(result.is_err(), "pass should still be retrying the bulk call");
    assert_eq!(saved_token(&state_path), None);
    assert_eq!(index.len(), 0);
}

#[tokio::test]
async fn test_loading_same_action_twice_keeps_one_document() {
    let index = Arc::new(InMemoryIndex::default());
    let loader = BulkLoader::new(index.clone(), fast_policy());
    let (document, _) = movie("Solaris", base_time()).into_document();
    let action = IndexAction::new(INDEX, document.clone());

    let (_stop_tx, stop_rx) = watch::channel(false);

    assert_eq!(loader.load(&[action.clone()], &stop_rx).await.unwrap(), 1);
    assert_eq!(loader.load(&[action], &stop_rx).await.unwrap(), 1);

    let documents = index.documents.lock().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents.get(&document.id), Some(&document));
}

#[tokio::test]
async fn test_reloading_from_scratch_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockMoviesSource::new(backlog(7)));
    let index = Arc::new(InMemoryIndex::default());

    let mut first = orchestrator(
        source.clone(),
        index.clone(),
        state_at(&dir.path().join("first.json")),
        3,
    );
    first.run_once().await.unwrap();
    let snapshot = index.documents.lock().unwrap().clone();

    let mut second = orchestrator(
        source.clone(),
        index.clone(),
        state_at(&dir.path().join("second.json")),
        3,
    );
    second.run_once().await.unwrap();

    assert_eq!(*index.documents.lock().unwrap(), snapshot);
}

#[tokio::test]
async fn test_invalid_token_fails_pass() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    std::fs::write(&state_path, r#"{"movies": "not a timestamp"}"#).unwrap();
    let source = Arc::new(MockMoviesSource::new(backlog(2)));
    let index = Arc::new(InMemoryIndex::default());
    let mut etl = orchestrator(source.clone(), index.clone(), state_at(&state_path), 10);

    let result = etl.run_once().await;

    assert!(matches!(result, Err(PipelineError::InvalidToken { .. })));
    assert!(source.requests.lock().unwrap().is_empty());
    assert_eq!(index.len(), 0);
}

#[tokio::test]
async fn test_run_stops_gracefully_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    let source = Arc::new(MockMoviesSource::new(backlog(5)));
    let index = Arc::new(InMemoryIndex::default());
    let mut etl = orchestrator(source.clone(), index.clone(), state_at(&state_path), 2);
    let handle = etl.shutdown_handle();

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown();
    });

    let result = timeout(Duration::from_secs(5), etl.run()).await;

    assert!(matches!(result, Ok(Ok(()))));
    trigger.await.unwrap();
    assert_eq!(index.len(), 5);
    assert!(etl.total_runs() >= 1);
    assert!(etl.shutdown_handle().is_shutdown());
}

#[tokio::test]
async fn test_run_stops_while_source_is_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    let source = Arc::new(MockMoviesSource::unreachable());
    let index = Arc::new(InMemoryIndex::default());
    let mut etl = orchestrator(source.clone(), index.clone(), state_at(&state_path), 10);
    let handle = etl.shutdown_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown();
    });

    let result = timeout(Duration::from_secs(2), etl.run()).await;

    assert!(matches!(result, Ok(Ok(()))));
    assert!(source.requests.lock().unwrap().len() > 1);
    assert_eq!(etl.total_runs(), 0);
    assert_eq!(index.len(), 0);
}

#[tokio::test]
async fn test_run_stops_while_sink_is_down() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    let source = Arc::new(MockMoviesSource::new(backlog(2)));
    let index = Arc::new(InMemoryIndex::with_transient_failures(usize::MAX));
    let mut etl = orchestrator(source, index.clone(), state_at(&state_path), 10);
    let handle = etl.shutdown_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown();
    });

    let result = timeout(Duration::from_secs(2), etl.run()).await;

    assert!(matches!(result, Ok(Ok(()))));
    assert_eq!(saved_token(&state_path), None);
    assert_eq!(index.len(), 0);
}

#[tokio::test]
async fn test_state_failure_is_fatal() {
    let source = Arc::new(MockMoviesSource::new(backlog(2)));
    let index = Arc::new(InMemoryIndex::default());
    let mut etl = orchestrator(source, index, Arc::new(ReadOnlyState), 10);

    let result = timeout(Duration::from_secs(5), etl.run()).await;

    assert!(matches!(result, Ok(Err(PipelineError::State(_)))));
}

#[tokio::test]
async fn test_failed_pass_is_retried_by_run() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("storage.json");
    let source = Arc::new(MockMoviesSource::new(backlog(4)));
    source.fail_once_after(0);
    let index = Arc::new(InMemoryIndex::default());
    let mut etl = orchestrator(source.clone(), index.clone(), state_at(&state_path), 2);
    let handle = etl.shutdown_handle();

    let watcher_index = index.clone();
    let watcher = tokio::spawn(async move {
        while watcher_index.len() < 4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.shutdown();
    });

    let result = timeout(Duration::from_secs(5), etl.run()).await;

    assert!(matches!(result, Ok(Ok(()))));
    watcher.await.unwrap();
    assert_eq!(index.len(), 4);
    assert!(source.requests.lock().unwrap().len() >= 2);
}
