// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::FALLBACK_PRIORITY_FEE_WEI;
use crate::common::error::AppError;
use crate::common::retry::retry_async;
use crate::network::provider::HttpProvider;
use alloy::providers::Provider;
use alloy::rpc::types::BlockNumberOrTag;
use alloy::rpc::types::eth::FeeHistory;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Network fee queries the oracle falls through, in order.
#[async_trait]
pub trait FeeSource: Send + Sync {
    /// EIP-1559 max fee per gas for the next block.
    async fn dynamic_fee(&self) -> Result<u128, AppError>;
    /// Legacy single `eth_gasPrice`.
    async fn legacy_fee(&self) -> Result<u128, AppError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicFees {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub next_base_fee_per_gas: u128,
}

impl DynamicFees {
    pub fn from_history(history: &FeeHistory) -> Result<Self, AppError> {
        let latest_base_fee = history
            .latest_block_base_fee()
            .or_else(|| history.base_fee_per_gas.iter().rev().nth(1).copied())
            .ok_or(AppError::Initialization("No base fee history".into()))?;

        let raw_next_base = history.next_block_base_fee().unwrap_or(latest_base_fee);
        // 12.5% is the max per-block base fee increase; used when nodes return zero.
        let next_base_fee = if raw_next_base == 0 {
            latest_base_fee.saturating_mul(1125) / 1000
        } else {
            raw_next_base
        };

        let tips: Vec<u128> = history
            .reward
            .as_ref()
            .map(|rewards| rewards.iter().filter_map(|r| r.first().copied()).collect())
            .unwrap_or_default();
        let tip = median(tips).unwrap_or(FALLBACK_PRIORITY_FEE_WEI);

        Ok(Self {
            max_fee_per_gas: next_base_fee.saturating_add(tip),
            max_priority_fee_per_gas: tip,
            next_base_fee_per_gas: next_base_fee,
        })
    }
}

/// Middle value; the two middle values are averaged for even lengths.
fn median(mut values: Vec<u128>) -> Option<u128> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some(values[mid - 1] / 2 + values[mid] / 2 + (values[mid - 1] % 2 + values[mid] % 2) / 2)
    }
}

#[derive(Clone)]
pub struct RpcFeeSource {
    provider: HttpProvider,
}

impl RpcFeeSource {
    pub fn new(provider: HttpProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl FeeSource for RpcFeeSource {
    async fn dynamic_fee(&self) -> Result<u128, AppError> {
        let provider = self.provider.clone();
        let history = retry_async(
            "eth_feeHistory",
            move |_| {
                let provider = provider.clone();
                async move {
                    provider
                        .get_fee_history(5, BlockNumberOrTag::Latest, &[50.0f64])
                        .await
                }
            },
            2,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Fee History failed: {}", e)))?;
        Ok(DynamicFees::from_history(&history)?.max_fee_per_gas)
    }

    async fn legacy_fee(&self) -> Result<u128, AppError> {
        let provider = self.provider.clone();
        retry_async(
            "eth_gasPrice",
            move |_| {
                let provider = provider.clone();
                async move { provider.get_gas_price().await }
            },
            2,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Gas price failed: {}", e)))
    }
}

/// Resolves a competitive fee: dynamic estimate, then legacy price, then the caller's bid.
#[derive(Clone)]
pub struct FeeOracle {
    source: Arc<dyn FeeSource>,
}

impl FeeOracle {
    pub fn new(source: Arc<dyn FeeSource>) -> Self {
        Self { source }
    }

    pub fn rpc(provider: HttpProvider) -> Self {
        Self::new(Arc::new(RpcFeeSource::new(provider)))
    }

    /// Never fails. Does not apply the ceiling; callers clamp.
    pub async fn quote(&self, preferred_bid: u128) -> u128 {
        match self.source.dynamic_fee().await {
            Ok(fee) if fee > 0 => return fee,
            Ok(_) => tracing::debug!(target: "gas", "Dynamic fee estimate was zero"),
            Err(e) => tracing::debug!(target: "gas", error = %e, "Dynamic fee unavailable"),
        }
        match self.source.legacy_fee().await {
            Ok(fee) if fee > 0 => return fee,
            Ok(_) => tracing::debug!(target: "gas", "Legacy gas price was zero"),
            Err(e) => tracing::debug!(target: "gas", error = %e, "Legacy gas price unavailable"),
        }
        tracing::warn!(
            target: "gas",
            preferred_bid,
            "Fee queries failed; falling back to configured bid"
        );
        preferred_bid
    }
}
