//! Directory Sync Core
//!
//! Offline-first data core for a personnel directory client. Keeps a local
//! SQLite directory in step with a remote document store, resolves layered
//! unit/district/station/rank configuration, ranks local search results and
//! reconciles PIN login state between the two stores.
//!
//! The remote store, identity provider and legacy endpoint are reached only
//! through the port traits in [`remote`].

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod remote;
pub mod resolver;
pub mod search;
pub mod sync;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::IdentityReconciler;
use config::{CoreConfig, CONFIG_SCHEMA_VERSION};
use db::{ConfigCache, DirectoryStore, SqliteDirectoryStore};
use errors::StoreError;
use remote::{IdentityProviderPort, LegacyConfigPort, RemoteConfigPort, RemoteDirectoryPort};
use resolver::ConfigResolver;
use search::SearchRanker;
use sync::SyncEngine;

/// Remote collaborators supplied by the embedding application.
#[derive(Clone)]
pub struct RemotePorts {
    pub directory: Arc<dyn RemoteDirectoryPort>,
    pub config: Arc<dyn RemoteConfigPort>,
    pub identity: Arc<dyn IdentityProviderPort>,
    /// Legacy spreadsheet endpoint, if the deployment still has one
    pub legacy: Option<Arc<dyn LegacyConfigPort>>,
}

/// All components, wired over one database.
#[derive(Clone)]
pub struct DirectoryCore {
    pub config: Arc<CoreConfig>,
    pub store: Arc<dyn DirectoryStore>,
    pub resolver: Arc<ConfigResolver>,
    pub sync: Arc<SyncEngine>,
    pub search: Arc<SearchRanker>,
    pub identity: Arc<IdentityReconciler>,
}

impl DirectoryCore {
    /// Open (or create) the database at `config.db_path` and wire everything.
    pub async fn open(config: CoreConfig, ports: RemotePorts) -> Result<Self, StoreError> {
        tracing::info!("Opening directory database at {:?}", config.db_path);
        let pool = db::init_database(&config.db_path).await?;
        Ok(Self::with_pool(config, pool, ports))
    }

    /// Wire components over an existing pool.
    pub fn with_pool(config: CoreConfig, pool: SqlitePool, ports: RemotePorts) -> Self {
        let store: Arc<dyn DirectoryStore> = Arc::new(SqliteDirectoryStore::new(pool.clone()));

        let resolver = ConfigResolver::new(
            ConfigCache::new(pool, CONFIG_SCHEMA_VERSION),
            ports.config,
            ports.legacy,
            config.config_ttl,
        );
        let sync = SyncEngine::new(store.clone(), ports.directory.clone(), config.page_size);
        let search = SearchRanker::new(store.clone(), config.search_limit);
        let identity = IdentityReconciler::new(store.clone(), ports.directory, ports.identity);

        Self {
            config: Arc::new(config),
            store,
            resolver: Arc::new(resolver),
            sync: Arc::new(sync),
            search: Arc::new(search),
            identity: Arc::new(identity),
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Returns false when another
/// subscriber is already installed.
pub fn init_tracing(config: &CoreConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (json, plain) = if config.log_json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(plain)
        .try_init()
        .is_ok()
}
