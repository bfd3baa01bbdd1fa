/// Configuration management for the engine
///
/// Configuration is layered with the `config` crate: built-in defaults, then
/// `TASKDESK_*` environment variables. Nested keys use a double underscore.
/// A `.env` file is loaded first when present.
///
/// # Environment Variables
///
/// - `TASKDESK_DATABASE__URL`: PostgreSQL connection string (falls back to `DATABASE_URL`)
/// - `TASKDESK_DATABASE__MAX_CONNECTIONS`: Pool size (default: 10)
/// - `TASKDESK_BULK__PARALLELISM`: Batch count used by bulk task creation
///   (default: available parallelism)
/// - `RUST_LOG`: Log filter (default: taskdesk=info)
///
/// # Example
///
/// ```no_run
/// use taskdesk_engine::config::EngineConfig;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = EngineConfig::from_env()?;
/// println!("Bulk creation uses {} batches", config.bulk.parallelism());
/// # Ok(())
/// # }
/// ```

use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::num::NonZeroUsize;
use taskdesk_shared::db::pool::DatabaseConfig;

/// Complete engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Database pool configuration
    pub database: DatabaseConfig,

    /// Bulk task creation configuration
    pub bulk: BulkConfig,
}

/// Bulk task creation configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Number of batches to split a submission into
    ///
    /// None or 0 = number of available CPUs
    pub parallelism: Option<usize>,
}

impl BulkConfig {
    /// Effective batch count, never zero
    pub fn parallelism(&self) -> usize {
        match self.parallelism {
            Some(p) if p > 0 => p,
            _ => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a variable has a value of the wrong type
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_vars(env::vars().collect())
    }

    /// Loads configuration from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> anyhow::Result<Self> {
        let fallback_url = vars.get("DATABASE_URL").cloned();

        let mut config: EngineConfig = Config::builder()
            .add_source(
                Environment::with_prefix("TASKDESK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars)),
            )
            .build()?
            .try_deserialize()?;

        if config.database.url.is_empty() {
            if let Some(url) = fallback_url {
                config.database.url = url;
            }
        }

        Ok(config)
    }

    /// Returns the database URL, failing when none is configured
    pub fn database_url(&self) -> anyhow::Result<&str> {
        if self.database.url.is_empty() {
            anyhow::bail!("TASKDESK_DATABASE__URL or DATABASE_URL environment variable is required");
        }
        Ok(&self.database.url)
    }
}
