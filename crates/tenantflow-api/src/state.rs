//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Engine services are generic over repository and evaluator traits; AppState
//! pins them to the SQLite implementations and the standard evaluator.

use std::path::PathBuf;
use std::sync::Arc;

use tenantflow_core::engine::StandardEvaluator;
use tenantflow_core::service::execution::ExecutionTracker;
use tenantflow_core::service::trigger::TriggerEvaluator;
use tenantflow_core::service::version::VersionManager;
use tenantflow_infra::config::{default_data_dir, load_engine_config};
use tenantflow_infra::sqlite::api_key::SqliteApiKeyStore;
use tenantflow_infra::sqlite::audit::SqliteAuditLogger;
use tenantflow_infra::sqlite::execution::SqliteExecutionRepository;
use tenantflow_infra::sqlite::pool::DatabasePool;
use tenantflow_infra::sqlite::trigger::SqliteTriggerRepository;
use tenantflow_infra::sqlite::version::SqliteVersionRepository;
use tenantflow_types::config::EngineConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteVersionManager = VersionManager<SqliteVersionRepository, SqliteAuditLogger>;

pub type ConcreteTriggerEvaluator = TriggerEvaluator<
    SqliteTriggerRepository,
    SqliteVersionRepository,
    SqliteExecutionRepository,
    SqliteAuditLogger,
    StandardEvaluator,
>;

pub type ConcreteExecutionTracker = ExecutionTracker<
    SqliteExecutionRepository,
    SqliteVersionRepository,
    SqliteAuditLogger,
    StandardEvaluator,
>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub version_manager: Arc<ConcreteVersionManager>,
    pub trigger_evaluator: Arc<ConcreteTriggerEvaluator>,
    pub execution_tracker: Arc<ConcreteExecutionTracker>,
    pub api_keys: SqliteApiKeyStore,
    pub config: Arc<EngineConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = default_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_engine_config(&data_dir).await;

        let db_url = format!(
            "sqlite://{}?mode=rwc",
            data_dir.join("tenantflow.db").display()
        );
        let db_pool = DatabasePool::new(&db_url).await?;

        Ok(Self::from_parts(db_pool, config, data_dir))
    }

    /// Wire services over an already-open pool.
    pub fn from_parts(db_pool: DatabasePool, config: EngineConfig, data_dir: PathBuf) -> Self {
        let versions = SqliteVersionRepository::new(db_pool.clone());
        let triggers = SqliteTriggerRepository::new(db_pool.clone());
        let executions = SqliteExecutionRepository::new(db_pool.clone());
        let audit = SqliteAuditLogger::new(db_pool.clone());

        let version_manager = VersionManager::new(
            versions.clone(),
            audit.clone(),
            config.publish_max_attempts,
        );
        let trigger_evaluator = TriggerEvaluator::new(
            triggers,
            versions.clone(),
            executions.clone(),
            audit.clone(),
            StandardEvaluator::new(),
            config.dedup_window_secs,
        );
        let execution_tracker = ExecutionTracker::new(
            executions,
            versions,
            audit,
            StandardEvaluator::new(),
            config.max_steps_per_run,
        );

        Self {
            version_manager: Arc::new(version_manager),
            trigger_evaluator: Arc::new(trigger_evaluator),
            execution_tracker: Arc::new(execution_tracker),
            api_keys: SqliteApiKeyStore::new(db_pool),
            config: Arc::new(config),
            data_dir,
        }
    }
}
