// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::common::retry::CappedBackoff;
use crate::domain::rescue::{RescueTrigger, TriggerReason};
use crate::network::provider::{ConnectionFactory, WsProvider};
use crate::network::vault::IErc4626Vault;
use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{BoxStream, select_all};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// A live log stream and the connection feeding it. Dropping it tears both down.
pub struct LogFeed {
    logs: BoxStream<'static, Log>,
    _connection: Option<WsProvider>,
}

impl LogFeed {
    pub fn new(logs: BoxStream<'static, Log>) -> Self {
        Self {
            logs,
            _connection: None,
        }
    }
}

/// Opens one fresh feed per subscription cycle.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn connect(&self) -> Result<LogFeed, AppError>;
}

/// `eth_subscribe("logs")` over a new websocket for every cycle.
pub struct WsLogSource {
    ws_url: String,
    filters: Vec<Filter>,
}

impl WsLogSource {
    pub fn new(ws_url: String, vault: Address, asset_token: Option<Address>) -> Self {
        Self {
            ws_url,
            filters: vault_log_filters(vault, asset_token),
        }
    }
}

#[async_trait]
impl LogSource for WsLogSource {
    async fn connect(&self) -> Result<LogFeed, AppError> {
        let provider = ConnectionFactory::ws(&self.ws_url).await?;
        let mut streams = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            let sub = provider
                .subscribe_logs(filter)
                .await
                .map_err(|e| AppError::Connection(format!("eth_subscribe logs failed: {e}")))?;
            streams.push(sub.into_stream());
        }
        tracing::info!(target: "watcher", filters = self.filters.len(), "Subscribed to vault logs");
        Ok(LogFeed {
            logs: select_all(streams).boxed(),
            _connection: Some(provider),
        })
    }
}

/// Why a subscription cycle ended.
enum StreamEnd {
    Shutdown,
    Closed,
}

/// Streams vault activity into rescue triggers, reconnecting on its own when the feed drops.
pub struct VaultEventWatcher {
    source: Arc<dyn LogSource>,
    vault: Address,
    triggers: Sender<RescueTrigger>,
    backoff: CappedBackoff,
    shutdown: CancellationToken,
}

impl VaultEventWatcher {
    pub fn new(
        ws_url: String,
        vault: Address,
        asset_token: Option<Address>,
        triggers: Sender<RescueTrigger>,
        reconnect_min: Duration,
        reconnect_max: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self::with_source(
            Arc::new(WsLogSource::new(ws_url, vault, asset_token)),
            vault,
            triggers,
            reconnect_min,
            reconnect_max,
            shutdown,
        )
    }

    pub fn with_source(
        source: Arc<dyn LogSource>,
        vault: Address,
        triggers: Sender<RescueTrigger>,
        reconnect_min: Duration,
        reconnect_max: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            vault,
            triggers,
            backoff: CappedBackoff::new(reconnect_min, reconnect_max),
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<(), AppError> {
        tracing::info!(target: "watcher", vault = %self.vault, "Vault event watcher started");
        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!(target: "watcher", "Shutdown requested; stopping watcher");
                return Ok(());
            }

            match self.stream_once().await {
                Ok(StreamEnd::Shutdown) => return Ok(()),
                Ok(StreamEnd::Closed) => {
                    tracing::warn!(target: "watcher", "Log subscription ended; reconnecting");
                }
                Err(e) => {
                    tracing::warn!(target: "watcher", error = %e, "Log subscription failed; reconnecting");
                }
            }

            let delay = self.backoff.next_delay();
            tracing::info!(target: "watcher", delay_ms = delay.as_millis() as u64, "Watcher backoff");
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(target: "watcher", "Shutdown requested during watcher backoff");
                    return Ok(());
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// One connect-subscribe-drain cycle. The feed is dropped on return, so nothing from a
    /// previous connection keeps dispatching.
    async fn stream_once(&mut self) -> Result<StreamEnd, AppError> {
        let mut feed = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(StreamEnd::Shutdown),
            feed = self.source.connect() => feed?,
        };
        self.backoff.reset();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(StreamEnd::Shutdown),
                maybe_log = feed.logs.next() => {
                    let Some(log) = maybe_log else {
                        return Ok(StreamEnd::Closed);
                    };
                    let Some(trigger) = trigger_for_log(&log, self.vault) else {
                        continue;
                    };
                    tracing::debug!(
                        target: "watcher",
                        reason = %trigger.reason,
                        assets = ?trigger.assets,
                        tx_hash = ?trigger.tx_hash,
                        "Vault activity observed"
                    );
                    if self.triggers.send(trigger).await.is_err() {
                        tracing::info!(target: "watcher", "Trigger channel closed; stopping watcher");
                        return Ok(StreamEnd::Shutdown);
                    }
                }
            }
        }
    }
}

/// Vault lifecycle logs, plus inbound transfers of the underlying asset when it is known.
pub fn vault_log_filters(vault: Address, asset_token: Option<Address>) -> Vec<Filter> {
    let mut filters = vec![Filter::new().address(vault).events([
        IErc4626Vault::Deposit::SIGNATURE,
        IErc4626Vault::Withdraw::SIGNATURE,
        IErc4626Vault::Transfer::SIGNATURE,
    ])];
    if let Some(asset) = asset_token {
        filters.push(
            Filter::new()
                .address(asset)
                .event(IErc4626Vault::Transfer::SIGNATURE)
                .topic2(vault.into_word()),
        );
    }
    filters
}

/// Maps a raw log to a trigger. Anything that is not vault-relevant inbound activity is `None`.
pub fn trigger_for_log(log: &Log, vault: Address) -> Option<RescueTrigger> {
    if log.removed {
        return None;
    }
    let topic0 = *log.topic0()?;
    let tx_hash = log.transaction_hash;

    if topic0 == IErc4626Vault::Deposit::SIGNATURE_HASH && log.address() == vault {
        let event = log.log_decode::<IErc4626Vault::Deposit>().ok()?;
        return Some(
            RescueTrigger::new(TriggerReason::DepositEvent)
                .with_assets(event.inner.data.assets)
                .with_tx_hash(tx_hash),
        );
    }
    if topic0 == IErc4626Vault::Withdraw::SIGNATURE_HASH && log.address() == vault {
        let event = log.log_decode::<IErc4626Vault::Withdraw>().ok()?;
        return Some(
            RescueTrigger::new(TriggerReason::WithdrawEvent)
                .with_assets(event.inner.data.assets)
                .with_tx_hash(tx_hash),
        );
    }
    if topic0 == IErc4626Vault::Transfer::SIGNATURE_HASH {
        let event = log.log_decode::<IErc4626Vault::Transfer>().ok()?;
        if event.inner.data.to != vault {
            return None;
        }
        let trigger = RescueTrigger::new(TriggerReason::TransferEvent).with_tx_hash(tx_hash);
        // Share transfers carry shares, not assets; only underlying-token transfers size a delta.
        return Some(if log.address() == vault {
            trigger
        } else {
            trigger.with_assets(event.inner.data.value)
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, U256};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    const VAULT: Address = Address::repeat_byte(0xaa);
    const ASSET: Address = Address::repeat_byte(0xbb);
    const ALICE: Address = Address::repeat_byte(0x01);

    fn rpc_log<E: SolEvent>(emitter: Address, event: &E) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: emitter,
                data: event.encode_log_data(),
            },
            transaction_hash: Some(B256::repeat_byte(0x42)),
            ..Default::default()
        }
    }

    #[test]
    fn deposit_maps_to_trigger_with_assets() {
        let log = rpc_log(
            VAULT,
            &IErc4626Vault::Deposit {
                sender: ALICE,
                owner: ALICE,
                assets: U256::from(750u64),
                shares: U256::from(700u64),
            },
        );
        let trigger = trigger_for_log(&log, VAULT).expect("trigger");
        assert_eq!(trigger.reason, TriggerReason::DepositEvent);
        assert_eq!(trigger.assets, Some(U256::from(750u64)));
        assert_eq!(trigger.tx_hash, Some(B256::repeat_byte(0x42)));
    }

    #[test]
    fn withdraw_maps_to_withdraw_trigger() {
        let log = rpc_log(
            VAULT,
            &IErc4626Vault::Withdraw {
                sender: ALICE,
                receiver: ALICE,
                owner: ALICE,
                assets: U256::from(3u64),
                shares: U256::from(3u64),
            },
        );
        let trigger = trigger_for_log(&log, VAULT).expect("trigger");
        assert_eq!(trigger.reason, TriggerReason::WithdrawEvent);
    }

    #[test]
    fn only_transfers_into_the_vault_trigger() {
        let inbound = rpc_log(
            ASSET,
            &IErc4626Vault::Transfer {
                from: ALICE,
                to: VAULT,
                value: U256::from(9u64),
            },
        );
        let trigger = trigger_for_log(&inbound, VAULT).expect("trigger");
        assert_eq!(trigger.reason, TriggerReason::TransferEvent);
        assert_eq!(trigger.assets, Some(U256::from(9u64)));

        let share_inbound = rpc_log(
            VAULT,
            &IErc4626Vault::Transfer {
                from: ALICE,
                to: VAULT,
                value: U256::from(9u64),
            },
        );
        let trigger = trigger_for_log(&share_inbound, VAULT).expect("trigger");
        assert_eq!(trigger.assets, None);

        let outbound = rpc_log(
            VAULT,
            &IErc4626Vault::Transfer {
                from: VAULT,
                to: ALICE,
                value: U256::from(9u64),
            },
        );
        assert!(trigger_for_log(&outbound, VAULT).is_none());
    }

    #[test]
    fn deposits_on_other_contracts_and_removed_logs_are_ignored() {
        let deposit = IErc4626Vault::Deposit {
            sender: ALICE,
            owner: ALICE,
            assets: U256::from(1u64),
            shares: U256::from(1u64),
        };
        assert!(trigger_for_log(&rpc_log(ASSET, &deposit), VAULT).is_none());

        let mut removed = rpc_log(VAULT, &deposit);
        removed.removed = true;
        assert!(trigger_for_log(&removed, VAULT).is_none());
    }

    #[test]
    fn asset_filter_is_added_only_when_configured() {
        assert_eq!(vault_log_filters(VAULT, None).len(), 1);
        assert_eq!(vault_log_filters(VAULT, Some(ASSET)).len(), 2);
    }

    enum Connect {
        Fail,
        Logs { logs: Vec<Log>, hold_open: bool },
    }

    struct ScriptedSource {
        script: Mutex<VecDeque<Connect>>,
        connects: Mutex<Vec<Instant>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Connect>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                connects: Mutex::new(Vec::new()),
            }
        }

        fn connects(&self) -> Vec<Instant> {
            self.connects.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LogSource for ScriptedSource {
        async fn connect(&self) -> Result<LogFeed, AppError> {
            self.connects.lock().unwrap().push(Instant::now());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Connect::Logs { logs, hold_open }) => {
                    let logs = futures::stream::iter(logs);
                    Ok(LogFeed::new(if hold_open {
                        logs.chain(futures::stream::pending()).boxed()
                    } else {
                        logs.boxed()
                    }))
                }
                Some(Connect::Fail) | None => Err(AppError::Connection("refused".into())),
            }
        }
    }

    fn deposit_log() -> Log {
        rpc_log(
            VAULT,
            &IErc4626Vault::Deposit {
                sender: ALICE,
                owner: ALICE,
                assets: U256::from(5u64),
                shares: U256::from(5u64),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_with_capped_backoff_and_resets_after_subscribe() {
        let source = Arc::new(ScriptedSource::new(vec![
            Connect::Fail,
            Connect::Fail,
            Connect::Logs {
                logs: vec![deposit_log()],
                hold_open: false,
            },
            Connect::Fail,
            Connect::Logs {
                logs: vec![deposit_log()],
                hold_open: true,
            },
        ]));
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let started = Instant::now();
        let watcher = VaultEventWatcher::with_source(
            source.clone(),
            VAULT,
            tx,
            Duration::from_secs(1),
            Duration::from_secs(4),
            shutdown.clone(),
        );
        let handle = tokio::spawn(watcher.run());

        for _ in 0..2 {
            let trigger = rx.recv().await.expect("trigger");
            assert_eq!(trigger.reason, TriggerReason::DepositEvent);
        }
        assert!(rx.try_recv().is_err());

        shutdown.cancel();
        handle.await.expect("join").expect("watcher");

        // fail +1s, fail +2s, subscribe resets, close +1s, fail +2s
        let offsets: Vec<u64> = source
            .connects()
            .iter()
            .map(|at| (*at - started).as_secs())
            .collect();
        assert_eq!(offsets, vec![0, 1, 3, 4, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_capped_and_shutdown_interrupts_it() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let (tx, _rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let started = Instant::now();
        let watcher = VaultEventWatcher::with_source(
            source.clone(),
            VAULT,
            tx,
            Duration::from_secs(1),
            Duration::from_secs(4),
            shutdown.clone(),
        );
        let handle = tokio::spawn(watcher.run());

        sleep(Duration::from_secs(20)).await;
        shutdown.cancel();
        handle.await.expect("join").expect("watcher");

        let offsets: Vec<u64> = source
            .connects()
            .iter()
            .map(|at| (*at - started).as_secs())
            .collect();
        assert_eq!(offsets, vec![0, 1, 3, 7, 11, 15, 19]);
    }
}
