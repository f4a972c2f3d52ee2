//! Checkpoint persistence: the store seam the projector writes through and the
//! writer that keeps at most one conditional write in flight.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::ids::UserId;
use crate::models::WalletSnapshot;

/// New `accrued_profit`/`last_update_at` pair, conditional on the store still
/// holding `expected_version` as its `last_earnings_update`.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub accrued_profit: f64,
    pub last_update_at: DateTime<Utc>,
    pub expected_version: Option<DateTime<Utc>>,
}

/// Read/write contract the projector needs from the remote store.
pub trait SnapshotStore: Send + Sync + 'static {
    /// `Error::NotFound` when the user has no wallet yet.
    fn fetch_snapshot(&self, user: UserId) -> impl Future<Output = Result<WalletSnapshot>> + Send;

    /// Returns the version the store holds after the write.
    /// `Error::Conflict` when `expected_version` no longer matches.
    fn write_checkpoint(
        &self,
        user: UserId,
        checkpoint: Checkpoint,
    ) -> impl Future<Output = Result<DateTime<Utc>>> + Send;

    /// Renew expired credentials after a write came back `NotAuthenticated`.
    fn renew_session(&self) -> impl Future<Output = Result<()>> + Send {
        async { Err(Error::NotAuthenticated) }
    }
}

/// One conditional write; an expired session is renewed once and the write repeated.
async fn write_renewing<S: SnapshotStore>(store: &S, user: UserId, checkpoint: Checkpoint) -> Result<DateTime<Utc>> {
    match store.write_checkpoint(user, checkpoint.clone()).await {
        Err(Error::NotAuthenticated) => {
            log::info!("checkpoint: session expired, renewing user_id={}", user);
            if let Err(e) = store.renew_session().await {
                log::warn!("checkpoint: session renewal failed user_id={}: {}", user, e);
                return Err(if e.is_transient() { e } else { Error::NotAuthenticated });
            }
            store.write_checkpoint(user, checkpoint).await
        }
        other => other,
    }
}

#[derive(Debug)]
pub(crate) enum WriteOutcome {
    Persisted {
        value: f64,
        at: DateTime<Utc>,
        version: DateTime<Utc>,
    },
    /// Our write lost; carries the snapshot that won.
    Refreshed(WalletSnapshot),
    Failed(Error),
}

pub(crate) struct CheckpointWriter<S> {
    store: Arc<S>,
    user: UserId,
    version: Option<DateTime<Utc>>,
    busy: bool,
    outcome_tx: mpsc::UnboundedSender<WriteOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<WriteOutcome>,
    in_flight: Option<JoinHandle<()>>,
}

impl<S: SnapshotStore> CheckpointWriter<S> {
    pub(crate) fn new(store: Arc<S>, user: UserId, version: Option<DateTime<Utc>>) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            store,
            user,
            version,
            busy: false,
            outcome_tx,
            outcome_rx,
            in_flight: None,
        }
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy
    }

    /// Dispatch a write without waiting for it. Returns false (and sends
    /// nothing) while an earlier write is still in flight.
    pub(crate) fn submit(&mut self, value: f64, at: DateTime<Utc>) -> bool {
        if self.busy {
            log::debug!("checkpoint: boundary skipped, previous write still in flight (user_id={})", self.user);
            return false;
        }
        self.busy = true;
        let store = Arc::clone(&self.store);
        let user = self.user;
        let tx = self.outcome_tx.clone();
        let checkpoint = Checkpoint {
            accrued_profit: value,
            last_update_at: at,
            expected_version: self.version,
        };
        self.in_flight = Some(tokio::spawn(async move {
            let outcome = match write_renewing(store.as_ref(), user, checkpoint).await {
                Ok(version) => WriteOutcome::Persisted { value, at, version },
                Err(Error::Conflict(reason)) => {
                    log::info!("checkpoint: conflict ({}), re-reading wallet user_id={}", reason, user);
                    match store.fetch_snapshot(user).await {
                        Ok(snapshot) => WriteOutcome::Refreshed(snapshot),
                        Err(e) => WriteOutcome::Failed(e),
                    }
                }
                Err(e) => WriteOutcome::Failed(e),
            };
            let _ = tx.send(outcome);
        }));
        true
    }

    /// Next finished write. Pending forever while nothing is in flight.
    pub(crate) async fn next_outcome(&mut self) -> Option<WriteOutcome> {
        self.outcome_rx.recv().await
    }

    /// Record a finished write so the next one is conditioned on the right version.
    pub(crate) fn complete(&mut self, outcome: &WriteOutcome) {
        self.busy = false;
        self.in_flight = None;
        match outcome {
            WriteOutcome::Persisted { version, .. } => self.version = Some(*version),
            WriteOutcome::Refreshed(snapshot) => self.version = snapshot.version,
            WriteOutcome::Failed(_) => {}
        }
    }

    /// Write and wait. Used for the one-off clamp at maturity.
    pub(crate) async fn write_now(&mut self, value: f64, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let checkpoint = Checkpoint {
            accrued_profit: value,
            last_update_at: at,
            expected_version: self.version,
        };
        let version = write_renewing(self.store.as_ref(), self.user, checkpoint).await?;
        self.version = Some(version);
        Ok(version)
    }

    /// Re-read the wallet after a lost `write_now`; later writes use its version.
    pub(crate) async fn refresh(&mut self) -> Result<WalletSnapshot> {
        let snapshot = self.store.fetch_snapshot(self.user).await?;
        self.version = snapshot.version;
        Ok(snapshot)
    }
}

impl<S> Drop for CheckpointWriter<S> {
    fn drop(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }
}
