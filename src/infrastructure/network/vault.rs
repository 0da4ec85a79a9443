// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::common::retry::retry_async;
use crate::domain::rescue::RedeemRequest;
use crate::network::provider::HttpProvider;
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{TransactionBuilder, TxSignerSync};
use alloy::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy::providers::Provider;
use alloy::rpc::types::eth::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};

sol! {
    interface IErc4626Vault {
        event Deposit(address indexed sender, address indexed owner, uint256 assets, uint256 shares);
        event Withdraw(
            address indexed sender,
            address indexed receiver,
            address indexed owner,
            uint256 assets,
            uint256 shares
        );
        event Transfer(address indexed from, address indexed to, uint256 value);

        function balanceOf(address account) external view returns (uint256);
        function maxRedeem(address owner) external view returns (uint256);
        function convertToShares(uint256 assets) external view returns (uint256);
        function convertToAssets(uint256 shares) external view returns (uint256);
        function decimals() external view returns (uint8);
        function redeem(uint256 shares, address receiver, address owner) external returns (uint256);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    ConfirmedSuccess,
    ConfirmedRevert,
    UnknownTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub tx_hash: B256,
    pub nonce: u64,
    pub status: ReceiptStatus,
}

/// Read/write surface of the vault the rescue engine consumes.
#[async_trait]
pub trait VaultService: Send + Sync {
    async fn balance_of(&self, owner: Address) -> Result<U256, AppError>;
    async fn max_redeem(&self, owner: Address) -> Result<U256, AppError>;
    async fn convert_to_shares(&self, assets: U256) -> Result<U256, AppError>;
    async fn convert_to_assets(&self, shares: U256) -> Result<U256, AppError>;
    async fn decimals(&self) -> Result<u8, AppError>;

    /// `eth_call` of `redeem` against current state; returns the asset amount it would pay.
    async fn simulate_redeem(&self, request: &RedeemRequest) -> Result<U256, AppError>;
    async fn estimate_redeem_gas(&self, request: &RedeemRequest) -> Result<u64, AppError>;
    /// Signs, broadcasts and waits for the receipt of a `redeem` transaction.
    async fn submit_redeem(
        &self,
        request: &RedeemRequest,
        gas_limit: u64,
        fee_bid: u128,
    ) -> Result<Submission, AppError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiptSettings {
    pub poll: Duration,
    pub timeout: Duration,
    pub confirm_blocks: u64,
}

pub struct RpcVault {
    provider: HttpProvider,
    vault: Address,
    signer: PrivateKeySigner,
    chain_id: u64,
    receipts: ReceiptSettings,
    /// Nonce of a broadcast redeem whose receipt never arrived. Retries reuse it so a
    /// higher bid replaces the stuck transaction instead of queueing behind it.
    inflight_nonce: Mutex<Option<u64>>,
}

impl RpcVault {
    pub fn new(
        provider: HttpProvider,
        vault: Address,
        signer: PrivateKeySigner,
        chain_id: u64,
        receipts: ReceiptSettings,
    ) -> Self {
        Self {
            provider,
            vault,
            signer,
            chain_id,
            receipts,
            inflight_nonce: Mutex::new(None),
        }
    }

    async fn next_nonce(&self) -> Result<u64, AppError> {
        let mined = self
            .provider
            .get_transaction_count(self.signer.address())
            .latest()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to fetch nonce: {}", e)))?;
        let inflight = self.inflight_nonce.lock().ok().and_then(|n| *n);
        Ok(pick_nonce(inflight, mined))
    }

    fn settle_nonce(&self, nonce: u64, status: ReceiptStatus) {
        if let Ok(mut inflight) = self.inflight_nonce.lock() {
            *inflight = match status {
                ReceiptStatus::UnknownTimeout => Some(nonce),
                ReceiptStatus::ConfirmedSuccess | ReceiptStatus::ConfirmedRevert => None,
            };
        }
    }

    async fn view<C: SolCall>(&self, call: C) -> Result<C::Return, AppError> {
        let input: Bytes = call.abi_encode().into();
        let provider = self.provider.clone();
        let to = self.vault;
        let out = retry_async(
            C::SIGNATURE,
            move |_| {
                let provider = provider.clone();
                let req = TransactionRequest::default()
                    .with_to(to)
                    .with_input(input.clone());
                async move { provider.call(req).await }
            },
            2,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::from_rpc(C::SIGNATURE, e))?;
        C::abi_decode_returns(&out)
            .map_err(|e| AppError::Initialization(format!("{} decode failed: {e}", C::SIGNATURE)))
    }

    fn redeem_tx(&self, request: &RedeemRequest) -> TransactionRequest {
        let call = IErc4626Vault::redeemCall {
            shares: request.shares,
            receiver: request.receiver,
            owner: request.owner,
        };
        TransactionRequest::default()
            .with_from(self.signer.address())
            .with_to(self.vault)
            .with_input(call.abi_encode())
    }

    fn sign_redeem(
        &self,
        request: &RedeemRequest,
        nonce: u64,
        gas_limit: u64,
        fee_bid: u128,
    ) -> Result<(Vec<u8>, B256), AppError> {
        let call = IErc4626Vault::redeemCall {
            shares: request.shares,
            receiver: request.receiver,
            owner: request.owner,
        };
        let mut tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            // The whole bid may go to the tip; inclusion speed matters more than cost here.
            max_priority_fee_per_gas: fee_bid,
            max_fee_per_gas: fee_bid,
            gas_limit,
            to: TxKind::Call(self.vault),
            value: U256::ZERO,
            access_list: Default::default(),
            input: call.abi_encode().into(),
        };
        let sig = TxSignerSync::sign_transaction_sync(&self.signer, &mut tx)
            .map_err(|e| AppError::Initialization(format!("Sign tx failed: {}", e)))?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        Ok((signed.encoded_2718(), *signed.tx_hash()))
    }

    async fn await_receipt(&self, hash: B256) -> Result<ReceiptStatus, AppError> {
        let timeout = self.receipts.timeout.max(Duration::from_millis(1));
        let poll = self.receipts.poll.max(Duration::from_millis(1));
        let started = Instant::now();

        while started.elapsed() < timeout {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(rcpt)) => {
                    if !rcpt.status() {
                        return Ok(ReceiptStatus::ConfirmedRevert);
                    }
                    let Some(receipt_block) = rcpt.block_number else {
                        return Ok(ReceiptStatus::ConfirmedSuccess);
                    };
                    let head = self
                        .provider
                        .get_block_number()
                        .await
                        .unwrap_or(receipt_block);
                    if receipt_is_confirmed(
                        head.max(receipt_block),
                        receipt_block,
                        self.receipts.confirm_blocks,
                    ) {
                        return Ok(ReceiptStatus::ConfirmedSuccess);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        target: "vault",
                        error = %e,
                        hash = %format!("{:#x}", hash),
                        "Receipt lookup error; retrying"
                    );
                }
            }
            tokio::time::sleep(poll).await;
        }

        Ok(ReceiptStatus::UnknownTimeout)
    }
}

/// Reuses the stuck nonce while it is still unmined; once the chain moved past it, the
/// mined count is the next free slot.
fn pick_nonce(inflight: Option<u64>, mined: u64) -> u64 {
    match inflight {
        Some(nonce) if nonce >= mined => nonce,
        _ => mined,
    }
}

fn receipt_is_confirmed(current_head: u64, receipt_block: u64, confirm_blocks: u64) -> bool {
    let needed_head = receipt_block.saturating_add(confirm_blocks.max(1).saturating_sub(1));
    current_head >= needed_head
}

#[async_trait]
impl VaultService for RpcVault {
    async fn balance_of(&self, owner: Address) -> Result<U256, AppError> {
        self.view(IErc4626Vault::balanceOfCall { account: owner })
            .await
    }

    async fn max_redeem(&self, owner: Address) -> Result<U256, AppError> {
        self.view(IErc4626Vault::maxRedeemCall { owner }).await
    }

    async fn convert_to_shares(&self, assets: U256) -> Result<U256, AppError> {
        self.view(IErc4626Vault::convertToSharesCall { assets })
            .await
    }

    async fn convert_to_assets(&self, shares: U256) -> Result<U256, AppError> {
        self.view(IErc4626Vault::convertToAssetsCall { shares })
            .await
    }

    async fn decimals(&self) -> Result<u8, AppError> {
        self.view(IErc4626Vault::decimalsCall {}).await
    }

    async fn simulate_redeem(&self, request: &RedeemRequest) -> Result<U256, AppError> {
        let out = self
            .provider
            .call(self.redeem_tx(request))
            .await
            .map_err(|e| AppError::from_rpc("redeem simulation", e))?;
        IErc4626Vault::redeemCall::abi_decode_returns(&out)
            .map_err(|e| AppError::Initialization(format!("redeem decode failed: {e}")))
    }

    async fn estimate_redeem_gas(&self, request: &RedeemRequest) -> Result<u64, AppError> {
        self.provider
            .estimate_gas(self.redeem_tx(request))
            .await
            .map_err(|e| AppError::from_rpc("redeem gas estimate", e))
    }

    async fn submit_redeem(
        &self,
        request: &RedeemRequest,
        gas_limit: u64,
        fee_bid: u128,
    ) -> Result<Submission, AppError> {
        let nonce = self.next_nonce().await?;
        let (raw, tx_hash) = self.sign_redeem(request, nonce, gas_limit, fee_bid)?;

        self.provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| AppError::from_rpc("redeem broadcast", e))?;
        tracing::info!(
            target: "vault",
            tx_hash = %format!("{:#x}", tx_hash),
            nonce,
            gas_limit,
            fee_bid,
            "Redeem broadcast; awaiting receipt"
        );

        let status = self.await_receipt(tx_hash).await?;
        self.settle_nonce(nonce, status);
        Ok(Submission {
            tx_hash,
            nonce,
            status,
        })
    }
}
