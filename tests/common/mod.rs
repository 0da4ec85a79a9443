// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

#![allow(dead_code)]

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use vault_rescuer::domain::error::AppError;
use vault_rescuer::domain::rescue::{BackoffPolicy, GasPolicy, RedeemRequest, SizingPolicy};
use vault_rescuer::network::gas::{FeeOracle, FeeSource};
use vault_rescuer::network::vault::{ReceiptStatus, Submission, VaultService};
use vault_rescuer::services::rescue::attempt::{AttemptConfig, RedeemAttemptEngine};

pub const IDENTITY: Address = Address::repeat_byte(0x0c);

#[derive(Debug, Clone)]
pub struct SubmissionLog {
    pub shares: U256,
    pub gas_limit: u64,
    pub fee_bid: u128,
    pub at: tokio::time::Instant,
}

pub enum Scripted {
    Status(ReceiptStatus),
    Reverted,
    Transport,
}

pub struct MockVault {
    pub balance: U256,
    pub redeemable: U256,
    /// convertToShares divides by this.
    pub assets_per_share: u64,
    pub queries_fail: bool,
    pub simulate_fails: bool,
    pub gas_estimate: Option<u64>,
    script: Mutex<VecDeque<Scripted>>,
    pub submissions: Mutex<Vec<SubmissionLog>>,
    pub max_redeem_calls: AtomicUsize,
    hold: Option<Arc<Semaphore>>,
    pub entered: Notify,
}

impl MockVault {
    pub fn new(redeemable: u64) -> Self {
        Self {
            balance: U256::from(redeemable),
            redeemable: U256::from(redeemable),
            assets_per_share: 1,
            queries_fail: false,
            simulate_fails: false,
            gas_estimate: Some(100_000),
            script: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            max_redeem_calls: AtomicUsize::new(0),
            hold: None,
            entered: Notify::new(),
        }
    }

    /// Submissions return these in order; once exhausted every submission reverts on-chain.
    pub fn script(self, outcomes: Vec<Scripted>) -> Self {
        *self.script.lock().unwrap() = outcomes.into();
        self
    }

    /// Submissions block until a permit is added to `gate`.
    pub fn held_by(mut self, gate: Arc<Semaphore>) -> Self {
        self.hold = Some(gate);
        self
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn submitted(&self) -> Vec<SubmissionLog> {
        self.submissions.lock().unwrap().clone()
    }

    fn query<T>(&self, value: T) -> Result<T, AppError> {
        if self.queries_fail {
            Err(AppError::Connection("rpc down".into()))
        } else {
            Ok(value)
        }
    }
}

#[async_trait]
impl VaultService for MockVault {
    async fn balance_of(&self, _owner: Address) -> Result<U256, AppError> {
        self.query(self.balance)
    }

    async fn max_redeem(&self, _owner: Address) -> Result<U256, AppError> {
        self.max_redeem_calls.fetch_add(1, Ordering::SeqCst);
        self.query(self.redeemable)
    }

    async fn convert_to_shares(&self, assets: U256) -> Result<U256, AppError> {
        self.query(assets / U256::from(self.assets_per_share))
    }

    async fn convert_to_assets(&self, shares: U256) -> Result<U256, AppError> {
        self.query(shares * U256::from(self.assets_per_share))
    }

    async fn decimals(&self) -> Result<u8, AppError> {
        self.query(18)
    }

    async fn simulate_redeem(&self, request: &RedeemRequest) -> Result<U256, AppError> {
        if self.simulate_fails {
            Err(AppError::Reverted("ERC4626: redeem more than max".into()))
        } else {
            Ok(request.shares)
        }
    }

    async fn estimate_redeem_gas(&self, _request: &RedeemRequest) -> Result<u64, AppError> {
        self.gas_estimate
            .ok_or_else(|| AppError::Reverted("estimateGas reverted".into()))
    }

    async fn submit_redeem(
        &self,
        request: &RedeemRequest,
        gas_limit: u64,
        fee_bid: u128,
    ) -> Result<Submission, AppError> {
        self.submissions.lock().unwrap().push(SubmissionLog {
            shares: request.shares,
            gas_limit,
            fee_bid,
            at: tokio::time::Instant::now(),
        });
        self.entered.notify_one();
        if let Some(gate) = &self.hold {
            gate.acquire().await.expect("gate open").forget();
        }

        let next = self.script.lock().unwrap().pop_front();
        let tx_hash = B256::repeat_byte(self.submission_count() as u8);
        match next.unwrap_or(Scripted::Status(ReceiptStatus::ConfirmedRevert)) {
            Scripted::Status(status) => Ok(Submission {
                tx_hash,
                nonce: 0,
                status,
            }),
            Scripted::Reverted => Err(AppError::Reverted("execution reverted".into())),
            Scripted::Transport => Err(AppError::Connection("broken pipe".into())),
        }
    }
}

/// Network fee queries that always fail, so bids come from the session.
pub struct DeadFees;

#[async_trait]
impl FeeSource for DeadFees {
    async fn dynamic_fee(&self) -> Result<u128, AppError> {
        Err(AppError::Connection("eth_feeHistory unsupported".into()))
    }

    async fn legacy_fee(&self) -> Result<u128, AppError> {
        Err(AppError::Connection("eth_gasPrice unsupported".into()))
    }
}

/// Fixed network quote.
pub struct FixedFees(pub u128);

#[async_trait]
impl FeeSource for FixedFees {
    async fn dynamic_fee(&self) -> Result<u128, AppError> {
        Ok(self.0)
    }

    async fn legacy_fee(&self) -> Result<u128, AppError> {
        Ok(self.0)
    }
}

pub fn attempt_config(max_retries: u32) -> AttemptConfig {
    AttemptConfig {
        identity: IDENTITY,
        sizing: SizingPolicy::AvailableLiquidity,
        max_retries,
        gas: GasPolicy::from_gwei(10.0, 40.0, 1.5),
        backoff: BackoffPolicy {
            base: Duration::from_millis(1_000),
            growth: 1.5,
            max: None,
        },
        gas_limit_fallback: 500_000,
        gas_limit_multiplier_bps: 12_000,
        dry_run: false,
    }
}

pub fn engine_with(
    vault: Arc<MockVault>,
    fees: Arc<dyn FeeSource>,
    config: AttemptConfig,
) -> RedeemAttemptEngine {
    RedeemAttemptEngine::new(vault, FeeOracle::new(fees), config)
}

pub fn engine(vault: Arc<MockVault>, config: AttemptConfig) -> RedeemAttemptEngine {
    engine_with(vault, Arc::new(DeadFees), config)
}
