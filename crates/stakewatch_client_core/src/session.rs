//! Live projector session: one task per mounted view that ticks the running
//! total, checkpoints it every N ticks and publishes the visible value.
//!
//! The session is owned by its [`ProjectorHandle`]; dropping the handle stops
//! the cadence immediately.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::backoff::Backoff;
use crate::checkpoint::{CheckpointWriter, SnapshotStore, WriteOutcome};
use crate::config::ProjectorConfig;
use crate::error::{Error, Result};
use crate::ids::UserId;
use crate::projector::{Countdown, Projection, ProjectorState, StopReason};

const MATURITY_WRITE_ATTEMPTS: usize = 5;

/// What the render path shows.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectorView {
    pub value: f64,
    pub state: ProjectorState,
    pub stop_reason: Option<StopReason>,
    pub rate_per_second: f64,
    /// Point in time `value` corresponds to.
    pub position: DateTime<Utc>,
    pub maturity_at: Option<DateTime<Utc>>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    /// Highest value confirmed durable.
    pub persisted: f64,
}

impl ProjectorView {
    fn of(projection: &Projection, last_checkpoint_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: projection.value(),
            state: projection.state(),
            stop_reason: projection.stop_reason(),
            rate_per_second: projection.rate(),
            position: projection.position(),
            maturity_at: projection.maturity_at(),
            last_checkpoint_at,
            persisted: projection.persisted(),
        }
    }

    pub fn countdown(&self, now: DateTime<Utc>) -> Option<Countdown> {
        self.maturity_at.map(|m| Countdown::between(now, m))
    }
}

/// Owner of a running (or already stopped) projector session.
pub struct ProjectorHandle {
    view: watch::Receiver<ProjectorView>,
    task: Option<JoinHandle<()>>,
}

impl ProjectorHandle {
    pub fn current(&self) -> ProjectorView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProjectorView> {
        self.view.clone()
    }

    pub fn is_running(&self) -> bool {
        self.view.borrow().state == ProjectorState::Running
            && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Wait for the session to stop on its own (maturity or deactivation).
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.as_mut() {
            let _ = task.await;
            self.task = None;
        }
    }

    /// Cancel the cadence. In-flight checkpoint writes are not awaited.
    pub fn stop(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("projector: torn down");
        }
    }
}

impl Drop for ProjectorHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Read the user's wallet and start projecting from the current wall clock.
pub async fn start<S: SnapshotStore>(
    store: Arc<S>,
    user: UserId,
    config: &ProjectorConfig,
) -> Result<ProjectorHandle> {
    start_at(store, user, config, Utc::now()).await
}

/// As [`start`], with an explicit "now" for the resume calculation.
///
/// Fails without starting anything when the snapshot cannot be read; the view
/// then stays in its zero/loading state.
pub async fn start_at<S: SnapshotStore>(
    store: Arc<S>,
    user: UserId,
    config: &ProjectorConfig,
    now: DateTime<Utc>,
) -> Result<ProjectorHandle> {
    let snapshot = store.fetch_snapshot(user).await?;
    let projection = Projection::resume(&snapshot, config.daily_rate, now);
    log::info!(
        "projector: resumed user_id={} principal={} stored={} seed={} state={:?}",
        user,
        snapshot.principal,
        snapshot.accrued_profit,
        projection.value(),
        projection.state()
    );
    let (tx, rx) = watch::channel(ProjectorView::of(&projection, None));
    let writer = CheckpointWriter::new(store, user, snapshot.version);

    let task = match projection.stop_reason() {
        None => Some(tokio::spawn(run(projection, writer, tx, config.clone()))),
        Some(StopReason::Matured) if snapshot.last_update_at < projection.position() => {
            Some(tokio::spawn(clamp_at_maturity(projection, writer, tx, config.daily_rate)))
        }
        Some(_) => None,
    };
    Ok(ProjectorHandle { view: rx, task })
}

async fn run<S: SnapshotStore>(
    mut projection: Projection,
    mut writer: CheckpointWriter<S>,
    tx: watch::Sender<ProjectorView>,
    config: ProjectorConfig,
) {
    let period = config.tick;
    let every = u64::from(config.checkpoint_every.max(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut ticks: u64 = 0;
    let mut last_checkpoint_at = None;

    loop {
        tokio::select! {
            biased;
            Some(outcome) = writer.next_outcome() => {
                writer.complete(&outcome);
                match outcome {
                    WriteOutcome::Persisted { value, at, .. } => {
                        projection.mark_persisted(value);
                        last_checkpoint_at = Some(at);
                    }
                    WriteOutcome::Refreshed(snapshot) => {
                        projection.reconcile(&snapshot, config.daily_rate);
                        if projection.stop_reason() == Some(StopReason::Matured)
                            && snapshot.last_update_at < projection.position()
                        {
                            tx.send_replace(ProjectorView::of(&projection, last_checkpoint_at));
                            clamp_at_maturity(projection, writer, tx, config.daily_rate).await;
                            break;
                        }
                    }
                    WriteOutcome::Failed(e) if e.is_transient() => {
                        log::warn!("checkpoint: write failed, retrying at next boundary: {}", e);
                    }
                    WriteOutcome::Failed(e @ (Error::NotAuthenticated | Error::Forbidden(_))) => {
                        log::warn!("checkpoint: not signed in, stopping: {}", e);
                        projection.stop(StopReason::SignedOut);
                    }
                    WriteOutcome::Failed(e) => {
                        log::warn!("checkpoint: write rejected, stopping: {}", e);
                        projection.stop(StopReason::Rejected);
                    }
                }
                tx.send_replace(ProjectorView::of(&projection, last_checkpoint_at));
                if !projection.is_running() {
                    break;
                }
            }
            _ = ticker.tick() => {
                projection.advance(period);
                ticks += 1;
                tx.send_replace(ProjectorView::of(&projection, last_checkpoint_at));
                if !projection.is_running() {
                    if projection.stop_reason() == Some(StopReason::Matured) {
                        clamp_at_maturity(projection, writer, tx, config.daily_rate).await;
                    }
                    break;
                }
                if ticks % every == 0 {
                    writer.submit(projection.value(), projection.position());
                }
            }
        }
    }
    log::debug!("projector: session ended after {} ticks", ticks);
}

/// Persist the frozen maturity value once, then end the session.
///
/// Transient failures are retried on the reconnect schedule a bounded number
/// of times; a lost conditional write re-reads the wallet first.
async fn clamp_at_maturity<S: SnapshotStore>(
    mut projection: Projection,
    mut writer: CheckpointWriter<S>,
    tx: watch::Sender<ProjectorView>,
    daily_rate: f64,
) {
    if writer.is_busy() {
        if let Some(outcome) = writer.next_outcome().await {
            writer.complete(&outcome);
            if let WriteOutcome::Refreshed(snapshot) = &outcome {
                projection.reconcile(snapshot, daily_rate);
            }
        }
    }
    let mut backoff = Backoff::realtime();
    for attempt in 1..=MATURITY_WRITE_ATTEMPTS {
        match writer.write_now(projection.value(), projection.position()).await {
            Ok(_) => {
                projection.mark_persisted(projection.value());
                log::info!("projector: matured at {} with {}", projection.position(), projection.value());
                tx.send_replace(ProjectorView::of(&projection, Some(projection.position())));
                return;
            }
            Err(Error::Conflict(reason)) => {
                log::info!("projector: maturity write lost ({}), re-reading wallet", reason);
                match writer.refresh().await {
                    Ok(snapshot) => {
                        projection.reconcile(&snapshot, daily_rate);
                        tx.send_replace(ProjectorView::of(&projection, None));
                        if snapshot.last_update_at >= projection.position() {
                            return;
                        }
                    }
                    Err(e) if !e.is_transient() => {
                        log::warn!("projector: could not re-read wallet at maturity: {}", e);
                        return;
                    }
                    Err(e) => log::warn!("projector: could not re-read wallet at maturity: {}", e),
                }
            }
            Err(e) if !e.is_transient() => {
                log::warn!("projector: maturity value rejected: {}", e);
                return;
            }
            Err(e) => {
                log::warn!(
                    "projector: could not persist maturity value (attempt {}/{}): {}",
                    attempt,
                    MATURITY_WRITE_ATTEMPTS,
                    e
                );
            }
        }
        if attempt < MATURITY_WRITE_ATTEMPTS {
            tokio::time::sleep(backoff.on_failure()).await;
        }
    }
    log::warn!("projector: giving up on the maturity write; it is retried on the next start");
}
