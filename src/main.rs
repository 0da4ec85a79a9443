// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, U256};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vault_rescuer::app::config::GlobalSettings;
use vault_rescuer::app::logging::setup_logging;
use vault_rescuer::common::constants::{DEFAULT_RECONNECT_MIN_SECS, wei_to_gwei};
use vault_rescuer::domain::error::AppError;
use vault_rescuer::infrastructure::network::gas::FeeOracle;
use vault_rescuer::infrastructure::network::provider::ConnectionFactory;
use vault_rescuer::infrastructure::network::vault::{RpcVault, VaultService};
use vault_rescuer::services::rescue::attempt::{AttemptConfig, RedeemAttemptEngine};
use vault_rescuer::services::rescue::engine::{PatrolSettings, RescueService, WatcherSettings};
use vault_rescuer::services::rescue::orchestrator::RescueOrchestrator;

#[derive(Parser, Debug)]
#[command(author, version, about = "vault rescuer")]
struct Cli {
    /// Path to config file (default: ./config.toml if present)
    #[arg(long)]
    config: Option<String>,

    /// Prepare and log the redeem, never broadcast it
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Emit JSON logs
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

fn display_amount(raw: U256, decimals: Option<u8>) -> String {
    match decimals {
        Some(d) => format_units(raw, d).unwrap_or_else(|_| raw.to_string()),
        None => raw.to_string(),
    }
}

async fn log_position_summary(vault: &dyn VaultService, identity: Address) {
    let decimals = match vault.decimals().await {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!(target: "config", error = %e, "decimals() failed; logging raw units");
            None
        }
    };
    match vault.balance_of(identity).await {
        Ok(shares) => {
            let assets = vault.convert_to_assets(shares).await.ok();
            tracing::info!(
                target: "config",
                shares = %display_amount(shares, decimals),
                assets = %assets.map(|a| a.to_string()).unwrap_or_else(|| "?".into()),
                "Vault position"
            );
        }
        Err(e) => tracing::warn!(target: "config", error = %e, "balanceOf failed"),
    }
    match vault.max_redeem(identity).await {
        Ok(redeemable) => tracing::info!(
            target: "config",
            redeemable = %display_amount(redeemable, decimals),
            "Currently redeemable"
        ),
        Err(e) => tracing::warn!(target: "config", error = %e, "maxRedeem failed"),
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    setup_logging(
        if settings.debug { "debug" } else { "info" },
        cli.log_json || settings.log_json,
    );
    let dry_run = cli.dry_run || settings.dry_run;

    let signer = settings.signer()?;
    let identity = signer.address();
    let http_url = settings.http_provider_url()?;
    let ws_url = settings.websocket_provider_url()?;

    let http_provider = ConnectionFactory::http(&http_url)?;
    let (chain_id, head) = ConnectionFactory::probe(&http_provider).await?;

    let sizing = settings.sizing()?;
    let gas = settings.gas_policy();
    let backoff = settings.backoff_policy();
    tracing::info!(
        target: "config",
        chain_id,
        head,
        identity = %identity,
        vault = %settings.vault_address,
        asset_token = ?settings.asset_token_address,
        sizing = ?sizing,
        max_retries = settings.max_retries,
        start_fee_gwei = wei_to_gwei(gas.start_bid),
        max_fee_gwei = wei_to_gwei(gas.ceiling),
        fee_escalation = gas.growth_factor,
        backoff_base_ms = backoff.base.as_millis() as u64,
        backoff_growth = backoff.growth,
        patrol_enabled = settings.patrol_enabled,
        dry_run,
        "Rescuer configured"
    );

    let vault: Arc<dyn VaultService> = Arc::new(RpcVault::new(
        http_provider.clone(),
        settings.vault_address,
        signer,
        chain_id,
        settings.receipt_settings(),
    ));
    log_position_summary(vault.as_ref(), identity).await;

    let engine = RedeemAttemptEngine::new(
        vault.clone(),
        FeeOracle::rpc(http_provider),
        AttemptConfig {
            identity,
            sizing,
            max_retries: settings.max_retries,
            gas,
            backoff,
            gas_limit_fallback: settings.gas_limit_fallback,
            gas_limit_multiplier_bps: settings.gas_limit_multiplier_bps,
            dry_run,
        },
    );
    let orchestrator = RescueOrchestrator::new(engine);

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "config", "Ctrl-C received; stopping");
            ctrl_c.cancel();
        }
    });

    let service = RescueService::new(
        orchestrator,
        vault,
        identity,
        Some(WatcherSettings {
            ws_url,
            vault: settings.vault_address,
            asset_token: settings.asset_token_address,
            reconnect_min: Duration::from_secs(DEFAULT_RECONNECT_MIN_SECS),
            reconnect_max: settings.reconnect_max(),
        }),
        PatrolSettings {
            enabled: settings.patrol_enabled,
            interval: settings.patrol_interval(),
        },
        shutdown,
    );
    service.run().await
}
