//! Distributor configuration.
//!
//! [`RawConfig`] is what the settings file and the command line provide;
//! every field is optional so layers can be merged. [`RawConfig::validate`]
//! turns the merged result into a [`DistributorConfig`] or fails before any
//! pool is touched.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stakepool_aggregator::{PoolKindConfig, PoolSetup};
use stakepool_core::numeric::parse_felt;
use stakepool_core::{Felt, PoolKind};
use stakepool_crypto::{Domain, OutcomeSigner, SigningKeypair};
use stakepool_logging::LogLevel;
use stakepool_settings::SettingsError;
use thiserror::Error;
use url::Url;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:stakepool.db";
pub const DEFAULT_INTER_POOL_DELAY_SECS: u64 = 3;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_POOL_AGE_SECS: u64 = 48 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required option `{0}`")]
    Missing(&'static str),
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("{0} pool needs both `contract_address` and `verifier_private_key`")]
    Incomplete(PoolKind),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPoolConfig {
    pub contract_address: Option<String>,
    pub verifier_private_key: Option<String>,
}

impl RawPoolConfig {
    fn merge(self, overlay: Self) -> Self {
        Self {
            contract_address: overlay.contract_address.or(self.contract_address),
            verifier_private_key: overlay.verifier_private_key.or(self.verifier_private_key),
        }
    }
}

/// Unvalidated options, as read from the settings file or the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub rpc_url: Option<String>,
    pub account_address: Option<String>,
    pub account_private_key: Option<String>,
    pub chain_id: Option<String>,
    pub database_url: Option<String>,
    pub penalty_pool: RawPoolConfig,
    pub session_pool: RawPoolConfig,
    pub log_level: Option<LogLevel>,
    pub inter_pool_delay_secs: Option<u64>,
    pub confirmation_timeout_secs: Option<u64>,
    pub max_pool_age_secs: Option<u64>,
}

/// Validated configuration. Private keys are never printed.
#[derive(Clone)]
pub struct DistributorConfig {
    pub rpc_url: Url,
    pub account_address: Felt,
    pub account_private_key: Felt,
    pub domain: Domain,
    pub database_url: String,
    pub penalty: PoolSetup,
    pub session: PoolSetup,
    pub log_level: LogLevel,
    pub inter_pool_delay: Duration,
    pub confirmation_timeout: Duration,
    pub max_pool_age_secs: u64,
}

impl DistributorConfig {
    pub fn pool(&self, kind: PoolKind) -> &PoolSetup {
        match kind {
            PoolKind::Penalty => &self.penalty,
            PoolKind::Session => &self.session,
        }
    }
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(field)),
    }
}

fn felt(value: &str, field: &'static str) -> Result<Felt, ConfigError> {
    parse_felt(value).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })
}

fn pool_setup(
    kind: PoolKind,
    raw: &RawPoolConfig,
    domain: Domain,
    fields: (&'static str, &'static str),
) -> Result<PoolSetup, ConfigError> {
    let (contract_field, key_field) = fields;
    match (&raw.contract_address, &raw.verifier_private_key) {
        (None, None) => Ok(PoolSetup::NotConfigured),
        (Some(contract), Some(key)) => {
            let keypair = SigningKeypair::from_secret_hex(key).map_err(|e| ConfigError::Invalid {
                field: key_field,
                reason: e.to_string(),
            })?;
            Ok(PoolSetup::Configured(PoolKindConfig {
                contract_address: felt(contract, contract_field)?,
                signer: OutcomeSigner::new(keypair, domain),
            }))
        }
        _ => Err(ConfigError::Incomplete(kind)),
    }
}

impl RawConfig {
    /// Fields set in `overlay` win.
    pub fn merge(self, overlay: RawConfig) -> RawConfig {
        RawConfig {
            rpc_url: overlay.rpc_url.or(self.rpc_url),
            account_address: overlay.account_address.or(self.account_address),
            account_private_key: overlay.account_private_key.or(self.account_private_key),
            chain_id: overlay.chain_id.or(self.chain_id),
            database_url: overlay.database_url.or(self.database_url),
            penalty_pool: self.penalty_pool.merge(overlay.penalty_pool),
            session_pool: self.session_pool.merge(overlay.session_pool),
            log_level: overlay.log_level.or(self.log_level),
            inter_pool_delay_secs: overlay.inter_pool_delay_secs.or(self.inter_pool_delay_secs),
            confirmation_timeout_secs: overlay.confirmation_timeout_secs.or(self.confirmation_timeout_secs),
            max_pool_age_secs: overlay.max_pool_age_secs.or(self.max_pool_age_secs),
        }
    }

    pub fn validate(&self) -> Result<DistributorConfig, ConfigError> {
        let rpc_url = required(&self.rpc_url, "rpc_url")?;
        let rpc_url = Url::parse(rpc_url).map_err(|e| ConfigError::Invalid {
            field: "rpc_url",
            reason: e.to_string(),
        })?;

        let account_address = felt(required(&self.account_address, "account_address")?, "account_address")?;
        let account_private_key = felt(
            required(&self.account_private_key, "account_private_key")?,
            "account_private_key",
        )?;
        if account_private_key == Felt::ZERO {
            return Err(ConfigError::Invalid {
                field: "account_private_key",
                reason: "must not be zero".into(),
            });
        }

        let chain_id = required(&self.chain_id, "chain_id")?;
        let domain = Domain::new(chain_id).map_err(|e| ConfigError::Invalid {
            field: "chain_id",
            reason: e.to_string(),
        })?;

        let penalty = pool_setup(
            PoolKind::Penalty,
            &self.penalty_pool,
            domain,
            ("penalty_pool.contract_address", "penalty_pool.verifier_private_key"),
        )?;
        let session = pool_setup(
            PoolKind::Session,
            &self.session_pool,
            domain,
            ("session_pool.contract_address", "session_pool.verifier_private_key"),
        )?;

        let confirmation_timeout_secs = self
            .confirmation_timeout_secs
            .unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS);
        if confirmation_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "confirmation_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }

        Ok(DistributorConfig {
            rpc_url,
            account_address,
            account_private_key,
            domain,
            database_url: self
                .database_url
                .clone()
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            penalty,
            session,
            log_level: self.log_level.unwrap_or_default(),
            inter_pool_delay: Duration::from_secs(self.inter_pool_delay_secs.unwrap_or(DEFAULT_INTER_POOL_DELAY_SECS)),
            confirmation_timeout: Duration::from_secs(confirmation_timeout_secs),
            max_pool_age_secs: self.max_pool_age_secs.unwrap_or(DEFAULT_MAX_POOL_AGE_SECS),
        })
    }
}
