//! StakePool App
//!
//! Unified initialization for StakePool services: logging + settings, then
//! wiring a validated [`DistributorConfig`] into an [`AggregatorService`].

pub mod config;

use std::path::Path;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use stakepool_aggregator::{
    AggregatorConfig, AggregatorService, PoolProcessor, RootPublisher, SqliteStore, StarknetLedger, StorageError,
};
use stakepool_core::numeric::felt_to_hex;
use stakepool_core::PoolKind;
use stakepool_logging::LogLevel;
use stakepool_settings::{Settings, SettingsError};
use thiserror::Error;
use tracing::info;

pub use config::{ConfigError, DistributorConfig, RawConfig, RawPoolConfig};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Settings error: {0}")]
    SettingsError(#[from] SettingsError),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

/// Settings types that can carry a log level of their own.
pub trait ServiceSettings {
    fn log_level(&self) -> Option<LogLevel> {
        None
    }
}

impl ServiceSettings for RawConfig {
    fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }
}

/// Initialized application context
pub struct App<T> {
    pub service: String,
    pub settings: Settings<T>,
}

/// Builder for constructing an App with configurable options.
pub struct AppBuilder<T> {
    service: String,
    log_level: Option<LogLevel>,
    skip_logging: bool,
    skip_banner: bool,
    config_path: Option<String>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned + Default + ServiceSettings> AppBuilder<T> {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            log_level: None,
            skip_logging: false,
            skip_banner: false,
            config_path: None,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Overrides whatever level the settings file names.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.log_level = Some(LogLevel::from_verbose(true));
        }
        self
    }

    pub fn skip_logging(mut self) -> Self {
        self.skip_logging = true;
        self
    }

    pub fn skip_banner(mut self) -> Self {
        self.skip_banner = true;
        self
    }

    /// An explicit settings file must exist; without one the default path is
    /// used and created on first run.
    pub fn config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    pub fn build(self) -> Result<App<T>, AppError> {
        let settings: Settings<T> = match self.config_path.as_deref() {
            Some(path) => Settings::load(Path::new(path))?,
            None => Settings::load_or_default(&self.service, None)?,
        };

        if !self.skip_logging {
            let level = self
                .log_level
                .or_else(|| settings.config.log_level())
                .unwrap_or_default();
            let _ = stakepool_logging::try_init(level);
        }

        if !self.skip_banner {
            info!(
                "{} {} starting, settings: {}",
                self.service,
                env!("CARGO_PKG_VERSION"),
                settings.path().display(),
            );
        }

        Ok(App {
            service: self.service,
            settings,
        })
    }
}

/// Connect storage and the ledger and assemble the batch driver.
pub async fn connect(config: &DistributorConfig) -> Result<AggregatorService, AppError> {
    let store = SqliteStore::new(&config.database_url).await?;
    let ledger = StarknetLedger::new(
        config.rpc_url.clone(),
        config.account_address,
        config.account_private_key,
        config.domain.chain_id,
    );
    let publisher = RootPublisher::new(Arc::new(ledger), config.confirmation_timeout);

    let mut processor = PoolProcessor::new(Arc::new(store), publisher);
    for kind in PoolKind::ALL {
        processor = processor.with_pool(kind, config.pool(kind).clone());
    }

    info!(
        account = %felt_to_hex(&config.account_address),
        database = %config.database_url,
        penalty = processor.is_configured(PoolKind::Penalty),
        session = processor.is_configured(PoolKind::Session),
        "distributor ready"
    );

    Ok(AggregatorService::new(
        AggregatorConfig {
            inter_pool_delay: config.inter_pool_delay,
            max_pool_age_secs: config.max_pool_age_secs,
        },
        processor,
    ))
}
