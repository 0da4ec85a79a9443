// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_GROWTH, DEFAULT_BACKOFF_MAX_MS,
    DEFAULT_FEE_ESCALATION, DEFAULT_MAX_FEE_GWEI, DEFAULT_START_FEE_GWEI, gwei_to_wei,
};
use crate::domain::error::AppError;
use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Startup,
    DepositEvent,
    WithdrawEvent,
    TransferEvent,
    Patrol,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerReason::Startup => "startup",
            TriggerReason::DepositEvent => "deposit",
            TriggerReason::WithdrawEvent => "withdraw",
            TriggerReason::TransferEvent => "transfer",
            TriggerReason::Patrol => "patrol",
        };
        f.write_str(s)
    }
}

/// Something happened that suggests vault liquidity may have returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescueTrigger {
    pub reason: TriggerReason,
    pub observed_at: DateTime<Utc>,
    /// Underlying asset amount carried by the triggering event, when it has one.
    pub assets: Option<U256>,
    pub tx_hash: Option<B256>,
}

impl RescueTrigger {
    pub fn new(reason: TriggerReason) -> Self {
        Self {
            reason,
            observed_at: Utc::now(),
            assets: None,
            tx_hash: None,
        }
    }

    pub fn with_assets(mut self, assets: U256) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: Option<B256>) -> Self {
        self.tx_hash = tx_hash;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Sizing,
    Attempting,
    Succeeded,
    Exhausted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Exhausted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Reverted,
    ConfirmedFailure,
    ConfirmedSuccess,
    TransportError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub index: u32,
    pub fee_bid: u128,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemRequest {
    pub shares: U256,
    pub receiver: Address,
    pub owner: Address,
}

impl RedeemRequest {
    /// Funds always return to the controller.
    pub fn for_identity(shares: U256, identity: Address) -> Self {
        Self {
            shares,
            receiver: identity,
            owner: identity,
        }
    }
}

/// One admitted trigger's run through the attempt engine.
#[derive(Debug, Clone)]
pub struct RescueSession {
    pub trigger: RescueTrigger,
    pub state: SessionState,
    pub attempt_count: u32,
    pub current_fee_bid: u128,
    pub shares: U256,
    pub attempts: Vec<AttemptRecord>,
    /// False when the session ended without broadcasting (dry-run).
    pub sent: bool,
}

impl RescueSession {
    pub fn new(trigger: RescueTrigger, gas: &GasPolicy) -> Self {
        Self {
            trigger,
            state: SessionState::Sizing,
            attempt_count: 0,
            current_fee_bid: gas.start_bid.min(gas.ceiling),
            shares: U256::ZERO,
            attempts: Vec::new(),
            sent: false,
        }
    }

    pub fn record_attempt(&mut self, fee_bid: u128, outcome: AttemptOutcome) {
        self.attempts.push(AttemptRecord {
            index: self.attempts.len() as u32 + 1,
            fee_bid,
            outcome,
        });
    }
}

/// Static fee bidding limits, all amounts in wei per gas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasPolicy {
    pub start_bid: u128,
    pub ceiling: u128,
    /// Multiplier applied to the session bid after each failed attempt.
    pub growth_factor: f64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self::from_gwei(
            DEFAULT_START_FEE_GWEI,
            DEFAULT_MAX_FEE_GWEI,
            DEFAULT_FEE_ESCALATION,
        )
    }
}

impl GasPolicy {
    pub fn from_gwei(start_gwei: f64, ceiling_gwei: f64, growth_factor: f64) -> Self {
        Self {
            start_bid: gwei_to_wei(start_gwei),
            ceiling: gwei_to_wei(ceiling_gwei),
            growth_factor,
        }
    }

    pub fn clamp(&self, bid: u128) -> u128 {
        bid.min(self.ceiling)
    }

    pub fn escalate(&self, bid: u128) -> u128 {
        self.clamp(scale_u128(bid, self.growth_factor))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub growth: f64,
    pub max: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            growth: DEFAULT_BACKOFF_GROWTH,
            max: Some(Duration::from_millis(DEFAULT_BACKOFF_MAX_MS)),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after `failed_attempts` failures: `base * growth^failed_attempts`, capped.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exp = i32::try_from(failed_attempts).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * self.growth.powi(exp);
        let uncapped = if secs.is_finite() && secs < u64::MAX as f64 {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            Duration::MAX
        };
        match self.max {
            Some(max) => uncapped.min(max),
            None => uncapped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizingPolicy {
    FullBalance,
    #[default]
    AvailableLiquidity,
    EventDelta,
}

impl FromStr for SizingPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "full_balance" | "balance" => Ok(SizingPolicy::FullBalance),
            "available_liquidity" | "max_redeem" => Ok(SizingPolicy::AvailableLiquidity),
            "event_delta" => Ok(SizingPolicy::EventDelta),
            other => Err(AppError::Validation {
                field: "sizing_policy".into(),
                message: format!("unknown policy `{other}`"),
            }),
        }
    }
}

pub(crate) fn scale_u128(value: u128, factor: f64) -> u128 {
    let scaled = value as f64 * factor;
    if !scaled.is_finite() || scaled <= 0.0 {
        return 0;
    }
    scaled.round().min(u128::MAX as f64) as u128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_escalation_is_monotonic_and_capped() {
        let policy = GasPolicy::from_gwei(10.0, 30.0, 1.5);
        let mut bid = policy.start_bid;
        let mut seen = vec![bid];
        for _ in 0..5 {
            let next = policy.escalate(bid);
            assert!(next >= bid);
            bid = next;
            seen.push(bid);
        }
        assert_eq!(seen[1], 15_000_000_000);
        assert_eq!(seen[2], 22_500_000_000);
        assert!(seen[3..].iter().all(|b| *b == 30_000_000_000));
    }

    #[test]
    fn backoff_grows_geometrically_until_cap() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(1_000),
            growth: 1.5,
            max: Some(Duration::from_millis(3_000)),
        };
        assert_eq!(policy.delay_after(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_after(1), Duration::from_millis(1_500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2_250));
        assert_eq!(policy.delay_after(3), Duration::from_millis(3_000));
        assert_eq!(policy.delay_after(400), Duration::from_millis(3_000));
    }

    #[test]
    fn uncapped_backoff_saturates_instead_of_panicking() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(1),
            growth: 10.0,
            max: None,
        };
        assert_eq!(policy.delay_after(u32::MAX), Duration::MAX);
    }

    #[test]
    fn session_starts_at_clamped_bid() {
        let policy = GasPolicy::from_gwei(50.0, 20.0, 1.5);
        let session = RescueSession::new(RescueTrigger::new(TriggerReason::Startup), &policy);
        assert_eq!(session.current_fee_bid, 20_000_000_000);
        assert_eq!(session.state, SessionState::Sizing);
    }

    #[test]
    fn sizing_policy_parses_aliases() {
        assert_eq!(
            "event-delta".parse::<SizingPolicy>().ok(),
            Some(SizingPolicy::EventDelta)
        );
        assert_eq!(
            "MAX_REDEEM".parse::<SizingPolicy>().ok(),
            Some(SizingPolicy::AvailableLiquidity)
        );
        assert!("everything".parse::<SizingPolicy>().is_err());
    }
}
