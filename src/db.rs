use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::assistant::prompts::TenantRules;
use crate::config::Config;
use crate::model::catalog::catalog;
use crate::services::context_files::load_context_files;
use crate::services::schema_discovery::{DiscoveryError, discover_schema};
use crate::services::sql_executor::{MySqlExecutor, SqlExecutor};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    Database,
    ContextFiles,
    Catalog,
}

/// Schema description the assistant works from.
#[derive(Debug, Clone)]
pub struct SchemaContext {
    pub text: String,
    pub source: SchemaSource,
    pub tables: Vec<String>,
}

/// Everything bound to one tenant database.
#[derive(Clone)]
pub struct TenantHandle {
    pub name: String,
    pub pool: MySqlPool,
    pub executor: Arc<dyn SqlExecutor>,
    pub schema: Arc<SchemaContext>,
}

impl TenantHandle {
    pub fn rules(&self, config: &Config) -> TenantRules {
        TenantRules {
            database: self.name.clone(),
            attendance_project: config
                .has_project_filter(&self.name)
                .then(|| config.attendance_project_filter.clone()),
        }
    }
}

fn pool_options(config: &Config) -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(CONNECT_TIMEOUT)
}

/// Pool for the configured database. Connections are opened on first use so
/// the service starts even when the server is unreachable.
pub fn init_db(config: &Config) -> Result<MySqlPool, sqlx::Error> {
    let url = config
        .build_database_url(&config.default_database)
        .unwrap_or_else(|| config.database_url.clone());
    let options = MySqlConnectOptions::from_str(url.as_str())?;
    Ok(pool_options(config).connect_lazy_with(options))
}

pub struct TenantRegistry {
    config: Config,
    current: RwLock<TenantHandle>,
    pools: Cache<String, MySqlPool>,
}

impl TenantRegistry {
    pub fn new(config: Config, initial: TenantHandle) -> Self {
        let pools = Cache::builder()
            .max_capacity(32)
            .time_to_idle(Duration::from_secs(30 * 60))
            .build();

        Self {
            config,
            current: RwLock::new(initial),
            pools,
        }
    }

    /// Bootstrap the default tenant. The schema falls back from the live
    /// database to the context files, then to the built-in catalog.
    pub async fn bootstrap(config: Config, pool: MySqlPool) -> Self {
        let name = config.default_database.clone();

        let schema = match discover_schema(&pool, &name).await {
            Ok(discovered) => {
                info!(database = %name, "Auto-discovered schema");
                SchemaContext {
                    text: discovered.text,
                    source: SchemaSource::Database,
                    tables: discovered.tables,
                }
            }
            Err(e) => {
                warn!(error = %e, "Schema auto-discovery failed, falling back to context files");
                fallback_schema(&config).await
            }
        };

        let handle = tenant_handle(&config, name.clone(), pool.clone(), schema);
        let registry = Self::new(config, handle);
        registry.pools.insert(name, pool).await;
        registry
    }

    pub async fn current(&self) -> TenantHandle {
        self.current.read().await.clone()
    }

    /// Pool for a tenant database, created lazily and cached.
    pub async fn pool_for(&self, database: &str) -> Result<MySqlPool, String> {
        let url = self
            .config
            .build_database_url(database)
            .ok_or_else(|| format!("Invalid database name '{database}'"))?;

        if let Some(pool) = self.pools.get(database).await {
            return Ok(pool);
        }

        let options = MySqlConnectOptions::from_str(url.as_str()).map_err(|e| e.to_string())?;
        let pool = pool_options(&self.config).connect_lazy_with(options);
        self.pools.insert(database.to_string(), pool.clone()).await;
        Ok(pool)
    }

    /// Connect to `database` and discover its schema without touching the
    /// current tenant.
    pub async fn open(&self, database: &str) -> Result<TenantHandle, String> {
        let pool = self.pool_for(database).await?;

        let discovered = match discover_schema(&pool, database).await {
            Ok(discovered) => discovered,
            Err(e) => {
                if matches!(e, DiscoveryError::Database(_)) {
                    // Do not keep a pool that never worked.
                    self.pools.invalidate(database).await;
                }
                return Err(e.to_string());
            }
        };

        let schema = SchemaContext {
            text: discovered.text,
            source: SchemaSource::Database,
            tables: discovered.tables,
        };

        Ok(tenant_handle(&self.config, database.to_string(), pool, schema))
    }

    pub async fn set_current(&self, handle: TenantHandle) {
        info!(database = %handle.name, "Switched current tenant");
        *self.current.write().await = handle;
    }
}

pub fn tenant_handle(
    config: &Config,
    name: String,
    pool: MySqlPool,
    schema: SchemaContext,
) -> TenantHandle {
    let executor = MySqlExecutor::new(
        pool.clone(),
        Duration::from_secs(config.db_command_timeout_secs),
        config.allow_write_queries,
    );

    TenantHandle {
        name,
        pool,
        executor: Arc::new(executor),
        schema: Arc::new(schema),
    }
}

async fn fallback_schema(config: &Config) -> SchemaContext {
    match load_context_files(Path::new(&config.context_folder)).await {
        Ok(bundle) if !bundle.file_names.is_empty() => {
            info!(files = bundle.file_names.len(), "Loaded database context files (fallback)");
            SchemaContext {
                text: bundle.text,
                source: SchemaSource::ContextFiles,
                tables: bundle.tables,
            }
        }
        Ok(_) => {
            info!("No context files found, using the built-in entity catalog");
            catalog_schema()
        }
        Err(e) => {
            warn!(error = %e, "Could not read context files, using the built-in entity catalog");
            catalog_schema()
        }
    }
}

pub fn catalog_schema() -> SchemaContext {
    let catalog = catalog();
    SchemaContext {
        text: catalog.render_context(),
        source: SchemaSource::Catalog,
        tables: catalog.table_names().into_iter().map(String::from).collect(),
    }
}
