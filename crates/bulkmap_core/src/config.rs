//! Process-wide configuration and explicit DAO context.
//!
//! # Responsibility
//! - Hold the global connection provider and batch size.
//! - Offer `DaoContext` so callers can pin both per DAO instead.
//! - Load settings from a serde document and install them.
//!
//! # Invariants
//! - Batch size is always greater than zero.
//! - Global settings are meant to be written during startup, before DAOs
//!   run concurrently; operations read them on every call.

use crate::db::{ConnectionProvider, SqliteProvider};
use crate::logging::init_logging;
use log::info;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 500;

static BATCH_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_BATCH_SIZE);
static PROVIDER: Lazy<RwLock<Option<Arc<dyn ConnectionProvider>>>> =
    Lazy::new(|| RwLock::new(None));

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration-surface failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroBatchSize,
    MissingProvider,
    Logging(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroBatchSize => write!(f, "batch size must be greater than zero"),
            Self::MissingProvider => write!(f, "no connection provider configured"),
            Self::Logging(message) => write!(f, "logging setup failed: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Connection source and batch size used by one DAO.
#[derive(Clone)]
pub struct DaoContext {
    provider: Arc<dyn ConnectionProvider>,
    batch_size: usize,
}

impl DaoContext {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            provider,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> ConfigResult<Self> {
        if batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn provider(&self) -> &dyn ConnectionProvider {
        self.provider.as_ref()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl std::fmt::Debug for DaoContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaoContext")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Installs the provider used by DAOs built without an explicit context.
pub fn set_connection_provider(provider: Arc<dyn ConnectionProvider>) {
    *PROVIDER.write().unwrap_or_else(PoisonError::into_inner) = Some(provider);
}

pub fn set_batch_size(batch_size: usize) -> ConfigResult<()> {
    if batch_size == 0 {
        return Err(ConfigError::ZeroBatchSize);
    }
    BATCH_SIZE.store(batch_size, Ordering::SeqCst);
    Ok(())
}

pub fn batch_size() -> usize {
    BATCH_SIZE.load(Ordering::SeqCst)
}

/// Snapshot of the global settings.
pub fn current_context() -> ConfigResult<DaoContext> {
    let provider = PROVIDER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(ConfigError::MissingProvider)?;
    Ok(DaoContext {
        provider,
        batch_size: batch_size(),
    })
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_foreign_keys() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Startup settings, usually parsed from a host config document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DaoConfig {
    pub batch_size: usize,
    pub database_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for DaoConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            database_path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            foreign_keys: default_foreign_keys(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl DaoConfig {
    /// File provider described by this config, if a database path is set.
    pub fn provider(&self) -> Option<SqliteProvider> {
        self.database_path.as_ref().map(|path| {
            SqliteProvider::file(path)
                .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
                .foreign_keys(self.foreign_keys)
        })
    }

    /// Explicit context for this config, without touching global state.
    pub fn context(&self) -> ConfigResult<DaoContext> {
        let provider = self.provider().ok_or(ConfigError::MissingProvider)?;
        DaoContext::new(Arc::new(provider)).with_batch_size(self.batch_size)
    }

    /// Installs logging, batch size and provider process-wide.
    pub fn apply(&self) -> ConfigResult<()> {
        if let Some(log_dir) = &self.log_dir {
            init_logging(&self.log_level, &log_dir.to_string_lossy())
                .map_err(ConfigError::Logging)?;
        }
        set_batch_size(self.batch_size)?;
        if let Some(provider) = self.provider() {
            set_connection_provider(Arc::new(provider));
        }
        info!(
            "event=config_apply module=config status=ok batch_size={} database={}",
            self.batch_size,
            self.database_path
                .as_ref()
                .map_or_else(|| "<unchanged>".to_string(), |path| path.display().to_string())
        );
        Ok(())
    }
}
