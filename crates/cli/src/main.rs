use std::process::ExitCode;

use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use stakepool_aggregator::{unix_now, BatchResult, PoolOutcome};
use stakepool_app::{AppBuilder, RawConfig, RawPoolConfig};
use stakepool_core::{CoreError, PoolKey, PoolKind};
use stakepool_logging::LogLevel;
use tracing::{debug, error};

const EXIT_FATAL: u8 = 1;
const EXIT_TOO_EARLY: u8 = 2;

/// Finalizes staked-reward pools: computes rewards, publishes the commitment
/// root and stores signed claims.
#[derive(Parser, Debug)]
#[clap(name = "stakepool", author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON settings file. Defaults to the per-user config dir.
    #[clap(long = "config", global = true)]
    config_path: Option<String>,

    /// Debug logging.
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(flatten)]
    overrides: ConfigArgs,

    #[clap(subcommand)]
    command: Command,
}

/// Options that override the settings file.
#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Starknet JSON-RPC endpoint.
    #[clap(long, env, global = true)]
    rpc_url: Option<String>,
    /// Account that submits root updates.
    #[clap(long, env, global = true)]
    account_address: Option<String>,
    #[clap(long, env, global = true, hide_env_values = true)]
    account_private_key: Option<String>,
    /// Chain id as a short string, e.g. SN_SEPOLIA.
    #[clap(long, env, global = true)]
    chain_id: Option<String>,
    #[clap(long, env, global = true)]
    database_url: Option<String>,
    #[clap(long, env, global = true)]
    penalty_contract_address: Option<String>,
    #[clap(long, env, global = true, hide_env_values = true)]
    penalty_verifier_private_key: Option<String>,
    #[clap(long, env, global = true)]
    session_contract_address: Option<String>,
    #[clap(long, env, global = true, hide_env_values = true)]
    session_verifier_private_key: Option<String>,
    #[clap(long, env, global = true)]
    log_level: Option<LogLevel>,
    /// Seconds to wait between pools in `process-all`.
    #[clap(long, env, global = true)]
    inter_pool_delay_secs: Option<u64>,
    /// Give up waiting for a root update after this many seconds.
    #[clap(long, env, global = true)]
    confirmation_timeout_secs: Option<u64>,
    /// Unfinalized pools that ended longer ago than this are ignored.
    #[clap(long, env, global = true)]
    max_pool_age_secs: Option<u64>,
}

impl ConfigArgs {
    fn into_raw(self) -> RawConfig {
        RawConfig {
            rpc_url: self.rpc_url,
            account_address: self.account_address,
            account_private_key: self.account_private_key,
            chain_id: self.chain_id,
            database_url: self.database_url,
            penalty_pool: RawPoolConfig {
                contract_address: self.penalty_contract_address,
                verifier_private_key: self.penalty_verifier_private_key,
            },
            session_pool: RawPoolConfig {
                contract_address: self.session_contract_address,
                verifier_private_key: self.session_verifier_private_key,
            },
            log_level: self.log_level,
            inter_pool_delay_secs: self.inter_pool_delay_secs,
            confirmation_timeout_secs: self.confirmation_timeout_secs,
            max_pool_age_secs: self.max_pool_age_secs,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Finalize a single pool.
    Process {
        kind: PoolKind,
        /// `day:period`, or `auto` for the most recent ready pool.
        #[clap(default_value = "auto", value_parser = parse_pool_arg)]
        pool: PoolArg,
        /// Skip the ready-time check.
        #[clap(long)]
        force: bool,
    },
    /// Finalize every pending pool, oldest first.
    ProcessAll {
        /// Limit the run to one pool kind.
        #[clap(long)]
        kind: Option<PoolKind>,
        #[clap(long)]
        force: bool,
    },
    /// Print the most recent pool whose ready time has passed.
    FindLatest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolArg {
    Auto,
    Key(PoolKey),
}

fn parse_pool_arg(s: &str) -> Result<PoolArg, CoreError> {
    if s.eq_ignore_ascii_case("auto") {
        Ok(PoolArg::Auto)
    } else {
        s.parse().map(PoolArg::Key)
    }
}

fn outcome_exit_code(outcome: &PoolOutcome) -> u8 {
    match outcome {
        PoolOutcome::Done(_) => 0,
        _ if outcome.is_too_early() => EXIT_TOO_EARLY,
        PoolOutcome::Skipped(_) => 0,
        PoolOutcome::Failed(_) => EXIT_FATAL,
    }
}

fn batch_exit_code(result: &BatchResult) -> u8 {
    if result.failed > 0 {
        EXIT_FATAL
    } else {
        0
    }
}

fn batch_report(result: &BatchResult) -> serde_json::Value {
    let pools: Vec<_> = result
        .outcomes
        .iter()
        .map(|report| {
            json!({
                "kind": report.kind,
                "pool": report.pool_key.to_string(),
                "status": match &report.outcome {
                    PoolOutcome::Done(_) => "done",
                    PoolOutcome::Skipped(_) => "skipped",
                    PoolOutcome::Failed(_) => "failed",
                },
                "reason": report.outcome.reason(),
            })
        })
        .collect();

    json!({
        "total": result.total,
        "succeeded": result.succeeded,
        "failed": result.failed,
        "skipped": result.skipped,
        "pools": pools,
    })
}

fn latest_report(key: Option<PoolKey>) -> serde_json::Value {
    match key {
        Some(key) => json!({
            "pool": key.to_string(),
            "day": key.day,
            "period": key.period,
            "start": key.start(),
            "end": key.end(),
            "ready_time": key.ready_time(),
        }),
        None => json!({ "pool": null }),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before parsing so `env` fallbacks see it.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(cli, dotenv).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli, dotenv: dotenvy::Result<std::path::PathBuf>) -> Result<u8> {
    match &dotenv {
        Err(e) if !e.not_found() => bail!("failed to load .env file: {e}"),
        _ => {}
    }

    let mut builder = AppBuilder::<RawConfig>::new("stakepool").verbose(cli.verbose);
    if let Some(level) = cli.overrides.log_level {
        builder = builder.log_level(level);
    }
    if let Some(path) = cli.config_path.as_deref() {
        builder = builder.config_path(path);
    }
    let app = builder.build()?;

    match dotenv {
        Ok(path) => debug!("Loaded environment variables from {:?}", path),
        Err(_) => debug!("No .env file found"),
    }

    if let Command::FindLatest = cli.command {
        println!("{}", serde_json::to_string_pretty(&latest_report(PoolKey::latest_ready(unix_now())))?);
        return Ok(0);
    }

    let config = app.settings.config.merge(cli.overrides.into_raw()).validate()?;
    let service = stakepool_app::connect(&config).await?;

    match cli.command {
        Command::Process { kind, pool, force } => {
            let key = match pool {
                PoolArg::Key(key) => key,
                PoolArg::Auto => service
                    .find_latest()
                    .ok_or_else(|| anyhow!("no pool has reached its ready time yet"))?,
            };
            let outcome = service.process_pool(kind, key, force).await;
            let code = outcome_exit_code(&outcome);
            println!("{}", serde_json::to_string_pretty(&outcome.into_result())?);
            Ok(code)
        }
        Command::ProcessAll { kind, force } => {
            let kinds = kind.map_or_else(|| PoolKind::ALL.to_vec(), |kind| vec![kind]);
            let result = service.process_all_pools(&kinds, force).await?;
            println!("{}", serde_json::to_string_pretty(&batch_report(&result))?);
            Ok(batch_exit_code(&result))
        }
        Command::FindLatest => Ok(0),
    }
}
