// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_GROWTH, DEFAULT_BACKOFF_MAX_MS,
    DEFAULT_FEE_ESCALATION, DEFAULT_GAS_LIMIT_FALLBACK, DEFAULT_GAS_LIMIT_MULTIPLIER_BPS,
    DEFAULT_MAX_FEE_GWEI, DEFAULT_MAX_RETRIES, DEFAULT_PATROL_INTERVAL_SECS,
    DEFAULT_RECEIPT_CONFIRM_BLOCKS, DEFAULT_RECEIPT_POLL_MS, DEFAULT_RECEIPT_TIMEOUT_MS,
    DEFAULT_RECONNECT_MAX_SECS, DEFAULT_START_FEE_GWEI,
};
use crate::domain::error::AppError;
use crate::domain::rescue::{BackoffPolicy, GasPolicy, SizingPolicy};
use crate::network::vault::ReceiptSettings;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_false")]
    pub debug: bool,
    #[serde(default = "default_false")]
    pub log_json: bool,
    #[serde(default = "default_false")]
    pub dry_run: bool,

    // Endpoints
    pub http_provider: Option<String>,
    pub websocket_provider: Option<String>,

    // Identity
    pub wallet_key: String,
    pub wallet_address: Address,

    // Vault
    pub vault_address: Address,
    pub asset_token_address: Option<Address>,
    #[serde(default = "default_sizing_policy")]
    pub sizing_policy: String,

    // Retry & fees
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_start_fee_gwei")]
    pub start_fee_gwei: f64,
    #[serde(default = "default_max_fee_gwei")]
    pub max_fee_gwei: f64,
    #[serde(default = "default_fee_escalation")]
    pub fee_escalation: f64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_growth")]
    pub backoff_growth: f64,
    /// Zero disables the cap.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_gas_limit_fallback")]
    pub gas_limit_fallback: u64,
    #[serde(default = "default_gas_limit_multiplier_bps")]
    pub gas_limit_multiplier_bps: u64,

    // Patrol & watcher
    #[serde(default = "default_true")]
    pub patrol_enabled: bool,
    #[serde(default = "default_patrol_interval_secs")]
    pub patrol_interval_secs: u64,
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,

    // Receipts
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
    #[serde(default = "default_receipt_confirm_blocks")]
    pub receipt_confirm_blocks: u64,
}

// Defaults
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_sizing_policy() -> String {
    "available_liquidity".to_string()
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_start_fee_gwei() -> f64 {
    DEFAULT_START_FEE_GWEI
}
fn default_max_fee_gwei() -> f64 {
    DEFAULT_MAX_FEE_GWEI
}
fn default_fee_escalation() -> f64 {
    DEFAULT_FEE_ESCALATION
}
fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}
fn default_backoff_growth() -> f64 {
    DEFAULT_BACKOFF_GROWTH
}
fn default_backoff_max_ms() -> u64 {
    DEFAULT_BACKOFF_MAX_MS
}
fn default_gas_limit_fallback() -> u64 {
    DEFAULT_GAS_LIMIT_FALLBACK
}
fn default_gas_limit_multiplier_bps() -> u64 {
    DEFAULT_GAS_LIMIT_MULTIPLIER_BPS
}
fn default_patrol_interval_secs() -> u64 {
    DEFAULT_PATROL_INTERVAL_SECS
}
fn default_reconnect_max_secs() -> u64 {
    DEFAULT_RECONNECT_MAX_SECS
}
fn default_receipt_poll_ms() -> u64 {
    DEFAULT_RECEIPT_POLL_MS
}
fn default_receipt_timeout_ms() -> u64 {
    DEFAULT_RECEIPT_TIMEOUT_MS
}
fn default_receipt_confirm_blocks() -> u64 {
    DEFAULT_RECEIPT_CONFIRM_BLOCKS
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        builder = match path {
            Some(selected) => builder.add_source(File::from(Path::new(selected)).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };
        // Precedence: CLI flags (in main) > env/.env > config file.
        builder = builder.add_source(Environment::default());

        let settings: GlobalSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.wallet_key.trim().is_empty() {
            return Err(AppError::Config("WALLET_KEY is missing".to_string()));
        }
        self.http_provider_url()?;
        self.websocket_provider_url()?;
        self.sizing()?;
        if self.vault_address == Address::ZERO {
            return Err(AppError::Config("VAULT_ADDRESS is missing".to_string()));
        }
        if !(self.fee_escalation >= 1.0) {
            return Err(validation("fee_escalation", "must be >= 1.0"));
        }
        if !(self.backoff_growth >= 1.0) {
            return Err(validation("backoff_growth", "must be >= 1.0"));
        }
        if !(self.start_fee_gwei > 0.0) {
            return Err(validation("start_fee_gwei", "must be positive"));
        }
        if !(self.max_fee_gwei >= self.start_fee_gwei) {
            return Err(validation("max_fee_gwei", "must be >= start_fee_gwei"));
        }
        if self.max_retries == 0 {
            return Err(validation("max_retries", "must be at least 1"));
        }
        Ok(())
    }

    pub fn http_provider_url(&self) -> Result<String, AppError> {
        required_url("HTTP_PROVIDER", self.http_provider.as_deref(), &["http", "https"])
    }

    pub fn websocket_provider_url(&self) -> Result<String, AppError> {
        required_url(
            "WEBSOCKET_PROVIDER",
            self.websocket_provider.as_deref(),
            &["ws", "wss"],
        )
    }

    /// Parses the signing key and checks it controls `wallet_address`.
    pub fn signer(&self) -> Result<PrivateKeySigner, AppError> {
        let signer = PrivateKeySigner::from_str(self.wallet_key.trim())
            .map_err(|e| AppError::Config(format!("Invalid wallet key: {}", e)))?;
        if signer.address() != self.wallet_address {
            return Err(AppError::Config(format!(
                "wallet_address {} does not match wallet_key address {}",
                self.wallet_address,
                signer.address()
            )));
        }
        Ok(signer)
    }

    pub fn sizing(&self) -> Result<SizingPolicy, AppError> {
        SizingPolicy::from_str(&self.sizing_policy)
    }

    pub fn gas_policy(&self) -> GasPolicy {
        GasPolicy::from_gwei(self.start_fee_gwei, self.max_fee_gwei, self.fee_escalation)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.backoff_base_ms),
            growth: self.backoff_growth,
            max: (self.backoff_max_ms > 0).then(|| Duration::from_millis(self.backoff_max_ms)),
        }
    }

    pub fn receipt_settings(&self) -> ReceiptSettings {
        let poll_ms = self.receipt_poll_ms.max(100);
        ReceiptSettings {
            poll: Duration::from_millis(poll_ms),
            timeout: Duration::from_millis(self.receipt_timeout_ms.max(poll_ms)),
            confirm_blocks: self.receipt_confirm_blocks.max(1),
        }
    }

    pub fn patrol_interval(&self) -> Duration {
        Duration::from_secs(self.patrol_interval_secs.max(1))
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_secs.max(1))
    }
}

fn validation(field: &str, message: &str) -> AppError {
    AppError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn required_url(key: &str, raw: Option<&str>, schemes: &[&str]) -> Result<String, AppError> {
    let value = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Config(format!("{key} is missing")))?;
    let url = Url::parse(value).map_err(|e| AppError::Config(format!("{key} is invalid: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(AppError::Config(format!(
            "{key} must use one of {:?}, got `{}`",
            schemes,
            url.scheme()
        )));
    }
    Ok(value.to_string())
}
