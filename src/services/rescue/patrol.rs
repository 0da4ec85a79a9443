// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::domain::rescue::{RescueTrigger, TriggerReason};
use crate::network::vault::VaultService;
use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Polls redeemable liquidity directly, independent of the log stream.
pub struct PatrolLoop {
    vault: Arc<dyn VaultService>,
    identity: Address,
    interval: Duration,
    triggers: Sender<RescueTrigger>,
    shutdown: CancellationToken,
}

impl PatrolLoop {
    pub fn new(
        vault: Arc<dyn VaultService>,
        identity: Address,
        interval: Duration,
        triggers: Sender<RescueTrigger>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            vault,
            identity,
            interval: interval.max(Duration::from_millis(100)),
            triggers,
            shutdown,
        }
    }

    pub async fn run(self) -> Result<(), AppError> {
        tracing::info!(
            target: "patrol",
            interval_secs = self.interval.as_secs(),
            "Patrol loop started"
        );
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(target: "patrol", "Shutdown requested; stopping patrol");
                    return Ok(());
                }
                _ = sleep(self.interval) => {}
            }

            match self.vault.max_redeem(self.identity).await {
                Ok(redeemable) if !redeemable.is_zero() => {
                    tracing::info!(target: "patrol", %redeemable, "Redeemable liquidity found");
                    if self
                        .triggers
                        .send(RescueTrigger::new(TriggerReason::Patrol))
                        .await
                        .is_err()
                    {
                        tracing::info!(target: "patrol", "Trigger channel closed; stopping patrol");
                        return Ok(());
                    }
                }
                Ok(_) => tracing::debug!(target: "patrol", "No redeemable liquidity"),
                Err(e) => tracing::warn!(target: "patrol", error = %e, "maxRedeem poll failed"),
            }
        }
    }
}
