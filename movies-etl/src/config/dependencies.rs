//! Dependency initialization and wiring for the movies ETL.

use movies_etl_repository::{
    IndexDefinition, JsonFileStateStore, OpenSearchProvider, PostgresMoviesSource,
    SearchIndexError, SearchIndexProvider,
};
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::extractor::Extractor;
use crate::loader::BulkLoader;
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::retry::{retry_with_backoff, BackoffPolicy};
use crate::EtlError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
}

impl Dependencies {
    /// Initialize all dependencies from `config`.
    ///
    /// Opens the state file, loads the index definition and creates the index if it is
    /// missing, waiting with backoff while the search engine is unreachable. The source
    /// database is not contacted until the first pass.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(EtlError)` - If the state file or index definition is unusable, or the
    ///   engine rejects the index definition
    pub async fn new(config: &AppConfig) -> Result<Self, EtlError> {
        info!(
            postgres_host = %config.postgres.host,
            postgres_db = %config.postgres.dbname,
            search_url = %config.elastic.url(),
            index = %config.index_name,
            state_file = %config.state_file_path.display(),
            chunk_size = config.chunk_size,
            "Initializing dependencies"
        );

        let policy = BackoffPolicy::new(config.backoff_max_retry_interval);

        let state = JsonFileStateStore::open(&config.state_file_path)
            .map_err(|e| EtlError::config(format!("Failed to open state file: {}", e)))?;

        let definition =
            IndexDefinition::load(&config.index_definitions_dir, &config.index_name)
                .map_err(|e| EtlError::config(e.to_string()))?;

        let provider = OpenSearchProvider::new(&config.elastic.url()).map_err(|e| {
            EtlError::config(format!("Failed to create search provider: {}", e))
        })?;

        Self::ensure_index(&provider, &config.index_name, &definition, &policy)
            .await
            .map_err(|e| EtlError::config(format!("Failed to ensure index exists: {}", e)))?;

        let source = PostgresMoviesSource::new(config.postgres.connect_options()?);

        let extractor = Extractor::new(Arc::new(source), config.chunk_size, policy.clone());
        let loader = BulkLoader::new(Arc::new(provider), policy.clone());
        let orchestrator = Orchestrator::with_config(
            extractor,
            loader,
            Arc::new(state),
            OrchestratorConfig {
                index_name: config.index_name.clone(),
                run_interval: config.etl_interval,
                backoff: policy,
            },
        );

        Ok(Self { orchestrator })
    }

    /// Create the index, retrying while the engine is unavailable.
    pub async fn ensure_index(
        provider: &dyn SearchIndexProvider,
        index: &str,
        definition: &IndexDefinition,
        policy: &BackoffPolicy,
    ) -> Result<(), SearchIndexError> {
        retry_with_backoff(
            policy,
            "ensure index",
            || provider.ensure_index(index, definition),
            SearchIndexError::is_transient,
        )
        .await?;

        info!(index = %index, "Search index ready");
        Ok(())
    }
}
