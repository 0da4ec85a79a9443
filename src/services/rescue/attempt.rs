// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::{BPS_DENOMINATOR, wei_to_gwei};
use crate::common::error::AppError;
use crate::domain::rescue::{
    AttemptOutcome, BackoffPolicy, GasPolicy, RedeemRequest, RescueSession, RescueTrigger,
    SessionState, SizingPolicy,
};
use crate::network::gas::FeeOracle;
use crate::network::vault::{ReceiptStatus, Submission, VaultService};
use alloy::primitives::{Address, U256};
use std::sync::Arc;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct AttemptConfig {
    pub identity: Address,
    pub sizing: SizingPolicy,
    pub max_retries: u32,
    pub gas: GasPolicy,
    pub backoff: BackoffPolicy,
    pub gas_limit_fallback: u64,
    pub gas_limit_multiplier_bps: u64,
    pub dry_run: bool,
}

/// Sequential redeem retry loop: size, simulate, estimate, price, submit, confirm, back off.
pub struct RedeemAttemptEngine {
    vault: Arc<dyn VaultService>,
    fees: FeeOracle,
    config: AttemptConfig,
}

impl RedeemAttemptEngine {
    pub fn new(vault: Arc<dyn VaultService>, fees: FeeOracle, config: AttemptConfig) -> Self {
        let mut config = config;
        config.max_retries = config.max_retries.max(1);
        Self {
            vault,
            fees,
            config,
        }
    }

    pub fn open_session(&self, trigger: RescueTrigger) -> RescueSession {
        RescueSession::new(trigger, &self.config.gas)
    }

    /// Drives `session` to a terminal state. An `Err` means sizing could not be determined;
    /// the session still ends `Succeeded` with nothing sent, as there is nothing to rescue.
    pub async fn run(&self, session: &mut RescueSession) -> Result<(), AppError> {
        session.state = SessionState::Sizing;
        let shares = match self.size(&session.trigger).await {
            Ok(shares) => shares,
            Err(e) => {
                session.state = SessionState::Succeeded;
                return Err(e);
            }
        };
        session.shares = shares;
        if shares.is_zero() {
            tracing::info!(
                target: "rescue",
                reason = %session.trigger.reason,
                "Nothing to rescue; redeemable shares are zero"
            );
            session.state = SessionState::Succeeded;
            return Ok(());
        }

        session.state = SessionState::Attempting;
        let request = RedeemRequest::for_identity(shares, self.config.identity);
        loop {
            let attempt = session.attempt_count + 1;
            self.simulate(&request, attempt).await;
            let gas_limit = self.gas_limit(&request).await;
            let quote = self.fees.quote(session.current_fee_bid).await;
            // The network quote acts as a floor so escalation never bids under the market.
            let fee_bid = self.config.gas.clamp(quote.max(session.current_fee_bid));

            if self.config.dry_run {
                tracing::info!(
                    target: "rescue",
                    shares = %request.shares,
                    receiver = %request.receiver,
                    owner = %request.owner,
                    gas_limit,
                    fee_bid_gwei = wei_to_gwei(fee_bid),
                    "DRY RUN: prepared redeem, not sent"
                );
                session.sent = false;
                session.state = SessionState::Exhausted;
                return Ok(());
            }

            session.sent = true;
            let outcome = match self.vault.submit_redeem(&request, gas_limit, fee_bid).await {
                Ok(Submission {
                    status: ReceiptStatus::ConfirmedSuccess,
                    tx_hash,
                    nonce,
                }) => {
                    tracing::info!(
                        target: "rescue",
                        attempt,
                        nonce,
                        shares = %request.shares,
                        tx_hash = %format!("{:#x}", tx_hash),
                        "Redeem confirmed; funds rescued"
                    );
                    AttemptOutcome::ConfirmedSuccess
                }
                Ok(Submission {
                    status: ReceiptStatus::ConfirmedRevert,
                    tx_hash,
                    nonce,
                }) => {
                    tracing::warn!(
                        target: "rescue",
                        attempt,
                        nonce,
                        tx_hash = %format!("{:#x}", tx_hash),
                        "Redeem mined but reverted"
                    );
                    AttemptOutcome::ConfirmedFailure
                }
                Ok(Submission {
                    status: ReceiptStatus::UnknownTimeout,
                    tx_hash,
                    nonce,
                }) => {
                    tracing::warn!(
                        target: "rescue",
                        attempt,
                        nonce,
                        tx_hash = %format!("{:#x}", tx_hash),
                        "Redeem receipt not seen before timeout"
                    );
                    AttemptOutcome::TransportError
                }
                Err(AppError::Reverted(reason)) => {
                    tracing::warn!(target: "rescue", attempt, %reason, "Redeem rejected by node");
                    AttemptOutcome::Reverted
                }
                Err(e) => {
                    tracing::warn!(target: "rescue", attempt, error = %e, "Redeem submission failed");
                    AttemptOutcome::TransportError
                }
            };

            session.record_attempt(fee_bid, outcome);
            session.attempt_count += 1;
            if outcome == AttemptOutcome::ConfirmedSuccess {
                session.state = SessionState::Succeeded;
                return Ok(());
            }

            if session.attempt_count >= self.config.max_retries {
                tracing::warn!(
                    target: "rescue",
                    attempts = session.attempt_count,
                    "Retry budget exhausted"
                );
                session.state = SessionState::Exhausted;
                return Ok(());
            }

            let delay = self.config.backoff.delay_after(session.attempt_count);
            tracing::info!(
                target: "rescue",
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Backing off before next redeem attempt"
            );
            sleep(delay).await;
            session.current_fee_bid = self.config.gas.escalate(session.current_fee_bid);
        }
    }

    async fn size(&self, trigger: &RescueTrigger) -> Result<U256, AppError> {
        let identity = self.config.identity;
        match self.config.sizing {
            SizingPolicy::FullBalance => self.vault.balance_of(identity).await,
            SizingPolicy::AvailableLiquidity => self.vault.max_redeem(identity).await,
            SizingPolicy::EventDelta => {
                let redeemable = self.vault.max_redeem(identity).await?;
                match trigger.assets {
                    Some(assets) => {
                        let shares = self.vault.convert_to_shares(assets).await?;
                        Ok(shares.min(redeemable))
                    }
                    None => Ok(redeemable),
                }
            }
        }
    }

    async fn simulate(&self, request: &RedeemRequest, attempt: u32) {
        match self.vault.simulate_redeem(request).await {
            Ok(assets) => {
                tracing::debug!(target: "rescue", attempt, %assets, "Redeem simulation passed");
            }
            Err(e) => {
                // Liquidity reads go stale quickly; the live submission decides.
                tracing::info!(
                    target: "rescue",
                    attempt,
                    error = %e,
                    "Redeem simulation failed; submitting anyway"
                );
            }
        }
    }

    async fn gas_limit(&self, request: &RedeemRequest) -> u64 {
        match self.vault.estimate_redeem_gas(request).await {
            Ok(estimate) => {
                let scaled = u128::from(estimate)
                    .saturating_mul(u128::from(self.config.gas_limit_multiplier_bps))
                    / u128::from(BPS_DENOMINATOR);
                u64::try_from(scaled).unwrap_or(u64::MAX)
            }
            Err(e) => {
                tracing::debug!(
                    target: "rescue",
                    error = %e,
                    fallback = self.config.gas_limit_fallback,
                    "Gas estimation failed; using fallback limit"
                );
                self.config.gas_limit_fallback
            }
        }
    }
}
