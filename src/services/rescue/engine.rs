// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::TRIGGER_CHANNEL_CAPACITY;
use crate::common::error::AppError;
use crate::domain::rescue::{RescueTrigger, TriggerReason};
use crate::network::ingest::vault_events::VaultEventWatcher;
use crate::network::vault::VaultService;
use crate::services::rescue::orchestrator::RescueOrchestrator;
use crate::services::rescue::patrol::PatrolLoop;
use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub ws_url: String,
    pub vault: Address,
    pub asset_token: Option<Address>,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct PatrolSettings {
    pub enabled: bool,
    pub interval: Duration,
}

/// Owns the trigger producers and feeds the orchestrator until shutdown.
pub struct RescueService {
    orchestrator: RescueOrchestrator,
    vault: Arc<dyn VaultService>,
    identity: Address,
    watcher: Option<WatcherSettings>,
    patrol: PatrolSettings,
    shutdown: CancellationToken,
}

impl RescueService {
    pub fn new(
        orchestrator: RescueOrchestrator,
        vault: Arc<dyn VaultService>,
        identity: Address,
        watcher: Option<WatcherSettings>,
        patrol: PatrolSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            vault,
            identity,
            watcher,
            patrol,
            shutdown,
        }
    }

    pub async fn run(self) -> Result<(), AppError> {
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);

        self.orchestrator
            .submit_trigger(RescueTrigger::new(TriggerReason::Startup));

        let watcher = self.watcher.map(|w| {
            VaultEventWatcher::new(
                w.ws_url,
                w.vault,
                w.asset_token,
                trigger_tx.clone(),
                w.reconnect_min,
                w.reconnect_max,
                self.shutdown.clone(),
            )
        });
        let patrol = self.patrol.enabled.then(|| {
            PatrolLoop::new(
                self.vault.clone(),
                self.identity,
                self.patrol.interval,
                trigger_tx.clone(),
                self.shutdown.clone(),
            )
        });
        drop(trigger_tx);

        let dispatcher = dispatch_triggers(
            trigger_rx,
            self.orchestrator.clone(),
            self.shutdown.clone(),
        );
        let watcher_task = async {
            match watcher {
                Some(w) => w.run().await,
                None => Ok(()),
            }
        };
        let patrol_task = async {
            match patrol {
                Some(p) => p.run().await,
                None => Ok(()),
            }
        };

        tokio::try_join!(dispatcher, watcher_task, patrol_task).map(|_| ())
    }
}

/// Drains producer triggers into the orchestrator. Ends when every producer is gone.
pub async fn dispatch_triggers(
    mut triggers: mpsc::Receiver<RescueTrigger>,
    orchestrator: RescueOrchestrator,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!(target: "rescue", "Shutdown requested; stopping trigger dispatch");
                return Ok(());
            }
            maybe_trigger = triggers.recv() => {
                let Some(trigger) = maybe_trigger else {
                    tracing::info!(target: "rescue", "All trigger producers stopped");
                    return Ok(());
                };
                orchestrator.submit_trigger(trigger);
            }
        }
    }
}
