// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::rescue::{
    AttemptRecord, RescueSession, RescueTrigger, SessionState, TriggerReason,
};
use crate::services::rescue::attempt::RedeemAttemptEngine;
use alloy::primitives::U256;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

/// What a finished session looked like, kept for reporting.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub reason: TriggerReason,
    pub state: SessionState,
    pub shares: U256,
    pub attempts: Vec<AttemptRecord>,
    pub final_fee_bid: u128,
    pub sent: bool,
    pub error: Option<String>,
}

impl SessionSummary {
    fn from_session(session: &RescueSession, error: Option<String>) -> Self {
        Self {
            reason: session.trigger.reason,
            state: session.state,
            shares: session.shares,
            attempts: session.attempts.clone(),
            final_fee_bid: session.current_fee_bid,
            sent: session.sent,
            error,
        }
    }
}

struct Inner {
    engine: RedeemAttemptEngine,
    gate: Arc<tokio::sync::Mutex<()>>,
    pending_reason: Mutex<Option<TriggerReason>>,
    sessions_started: AtomicU64,
    last_session: Mutex<Option<SessionSummary>>,
}

/// Single-flight gate in front of the attempt engine. Cheap to clone; clones share the gate.
#[derive(Clone)]
pub struct RescueOrchestrator {
    inner: Arc<Inner>,
}

impl RescueOrchestrator {
    pub fn new(engine: RedeemAttemptEngine) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                gate: Arc::new(tokio::sync::Mutex::new(())),
                pending_reason: Mutex::new(None),
                sessions_started: AtomicU64::new(0),
                last_session: Mutex::new(None),
            }),
        }
    }

    /// Starts a session if idle, otherwise remembers only the latest reason. Never blocks.
    /// Must be called from within a tokio runtime.
    pub fn submit_trigger(&self, trigger: RescueTrigger) {
        // The gate is tried under the pending lock so a finishing session cannot release
        // between our failed try and the write below.
        let mut pending = self.inner.pending();
        let guard = match self.inner.gate.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                let reason = trigger.reason;
                *pending = Some(reason);
                drop(pending);
                tracing::debug!(
                    target: "rescue",
                    %reason,
                    "Session already active; trigger coalesced"
                );
                return;
            }
        };
        drop(pending);

        let session_no = self.inner.sessions_started.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run_session(session_no, trigger).await;
            inner.release(session_no, guard);
        });
    }

    pub fn is_active(&self) -> bool {
        self.inner.gate.try_lock().is_err()
    }

    pub fn pending_reason(&self) -> Option<TriggerReason> {
        *self.inner.pending()
    }

    pub fn sessions_started(&self) -> u64 {
        self.inner.sessions_started.load(Ordering::SeqCst)
    }

    pub fn last_session(&self) -> Option<SessionSummary> {
        self.inner.last_session.lock().ok().and_then(|s| s.clone())
    }

    /// Resolves once no session is running.
    pub async fn wait_idle(&self) {
        let _idle = self.inner.gate.lock().await;
    }
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, Option<TriggerReason>> {
        self.pending_reason
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Discards the coalesced reason and opens the gate in one step, so every reason
    /// set while this session ran is accounted to it.
    fn release(&self, session_no: u64, guard: OwnedMutexGuard<()>) {
        let mut pending = self.pending();
        let discarded = pending.take();
        drop(guard);
        drop(pending);

        if let Some(reason) = discarded {
            tracing::info!(
                target: "rescue",
                session = session_no,
                %reason,
                "Dropping trigger that arrived while busy; next trigger starts a fresh session"
            );
        }
    }

    async fn run_session(&self, session_no: u64, trigger: RescueTrigger) {
        let reason = trigger.reason;
        tracing::info!(
            target: "rescue",
            session = session_no,
            %reason,
            observed_at = %trigger.observed_at,
            tx_hash = ?trigger.tx_hash,
            "Rescue session started"
        );

        let mut session = self.engine.open_session(trigger);
        let result = AssertUnwindSafe(self.engine.run(&mut session))
            .catch_unwind()
            .await;

        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                tracing::warn!(
                    target: "rescue",
                    session = session_no,
                    error = %e,
                    "Sizing query failed; treating as nothing to rescue"
                );
                Some(e.to_string())
            }
            Err(_) => {
                tracing::error!(target: "rescue", session = session_no, "Rescue session panicked");
                Some("session panicked".to_string())
            }
        };
        if !session.state.is_terminal() {
            session.state = SessionState::Exhausted;
        }

        let summary = SessionSummary::from_session(&session, error);
        tracing::info!(
            target: "rescue",
            session = session_no,
            state = ?summary.state,
            attempts = summary.attempts.len(),
            shares = %summary.shares,
            sent = summary.sent,
            "Rescue session finished"
        );
        if let Ok(mut last) = self.last_session.lock() {
            *last = Some(summary);
        }
    }
}
