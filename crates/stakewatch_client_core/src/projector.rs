//! Local profit projection: what the server would show "right now", extrapolated
//! linearly from the last persisted checkpoint.
//!
//! Everything here is pure and clock-free; the caller passes `now`. The timer
//! driven session that owns a [`Projection`] lives in [`crate::session`].

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use crate::models::WalletSnapshot;

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Profit credited per second for `principal` at `daily_rate` (0.022 = 2.2%/day).
pub fn rate_per_second(principal: f64, daily_rate: f64) -> f64 {
    principal.max(0.0) * daily_rate / SECONDS_PER_DAY
}

/// One tick of the visible counter.
pub fn tick(running_total: f64, increment: f64) -> f64 {
    running_total + increment
}

/// Profit accrued at `rate` between `from` and `to`; zero when `to` is not after `from`.
pub fn accrued_between(rate: f64, from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds().max(0);
    rate * millis as f64 / 1000.0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectorState {
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Wallet was inactive when the projection was resumed.
    Inactive,
    /// `maturity_at` reached; the value is frozen at the maturity value.
    Matured,
    /// The store reported the wallet inactive while running.
    Deactivated,
    /// Credentials expired and could not be renewed.
    SignedOut,
    /// The store refused a checkpoint for a reason retrying will not fix.
    Rejected,
    /// Owner tore the session down.
    TornDown,
}

/// Running total plus the point in time it corresponds to.
#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    rate: f64,
    value: f64,
    position: DateTime<Utc>,
    maturity_at: Option<DateTime<Utc>>,
    persisted: f64,
    stop_reason: Option<StopReason>,
}

impl Projection {
    /// Seed from the last checkpoint. Covers any time the user was away.
    ///
    /// A client clock behind `last_update_at` counts as zero elapsed time.
    pub fn resume(snapshot: &WalletSnapshot, daily_rate: f64, now: DateTime<Utc>) -> Self {
        let rate = rate_per_second(snapshot.principal, daily_rate);
        let base = snapshot.accrued_profit;
        let last = snapshot.last_update_at;
        let mut projection = Self {
            rate,
            value: base,
            position: now.max(last),
            maturity_at: snapshot.maturity_at,
            persisted: base,
            stop_reason: None,
        };
        if !snapshot.is_active {
            projection.stop_reason = Some(StopReason::Inactive);
            return projection;
        }
        match snapshot.maturity_at {
            Some(maturity) if now >= maturity => {
                projection.value = base + accrued_between(rate, last, maturity);
                projection.position = maturity.max(last);
                projection.stop_reason = Some(StopReason::Matured);
            }
            _ => {
                projection.value = base + accrued_between(rate, last, now);
            }
        }
        projection
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn position(&self) -> DateTime<Utc> {
        self.position
    }

    pub fn maturity_at(&self) -> Option<DateTime<Utc>> {
        self.maturity_at
    }

    /// Highest value known to be durable in the store.
    pub fn persisted(&self) -> f64 {
        self.persisted
    }

    pub fn state(&self) -> ProjectorState {
        if self.stop_reason.is_some() {
            ProjectorState::Stopped
        } else {
            ProjectorState::Running
        }
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn is_running(&self) -> bool {
        self.stop_reason.is_none()
    }

    /// Advance by one tick of length `step`. Clamps at maturity and stops there.
    /// No-op once stopped.
    pub fn advance(&mut self, step: Duration) -> f64 {
        if !self.is_running() {
            return self.value;
        }
        let step = chrono::Duration::from_std(step).unwrap_or_else(|_| chrono::Duration::zero());
        let next = self.position + step;
        match self.maturity_at {
            Some(maturity) if next >= maturity => {
                self.value += accrued_between(self.rate, self.position, maturity);
                self.position = maturity;
                self.stop_reason = Some(StopReason::Matured);
            }
            _ => {
                let increment = self.rate * step.num_milliseconds() as f64 / 1000.0;
                self.value = tick(self.value, increment);
                self.position = next;
            }
        }
        self.value
    }

    pub fn mark_persisted(&mut self, value: f64) {
        if value > self.persisted {
            self.persisted = value;
        }
        if self.persisted > self.value {
            self.value = self.persisted;
        }
    }

    /// Re-seed from the snapshot that won a conditional write.
    ///
    /// The server row is authoritative: an admin debit lowers the visible value.
    /// The position never moves behind the server's `last_update_at`, so the
    /// next checkpoint cannot rewind the stored timestamp.
    pub fn reconcile(&mut self, server: &WalletSnapshot, daily_rate: f64) {
        let resumed = Projection::resume(server, daily_rate, self.position);
        self.rate = resumed.rate;
        self.maturity_at = resumed.maturity_at;
        self.value = resumed.value;
        self.position = resumed.position;
        self.persisted = server.accrued_profit;
        match resumed.stop_reason {
            Some(StopReason::Inactive) => self.stop(StopReason::Deactivated),
            Some(StopReason::Matured) => self.stop(StopReason::Matured),
            _ => {}
        }
    }

    pub fn stop(&mut self, reason: StopReason) {
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason);
        }
    }

    /// Time left until maturity as seen from `now`, for the countdown display.
    pub fn countdown(&self, now: DateTime<Utc>) -> Option<Countdown> {
        self.maturity_at.map(|m| Countdown::between(now, m))
    }
}

/// Remaining time split for display; all zero once matured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    pub fn between(now: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        let total = (until - now).num_seconds().max(0);
        Self {
            days: total / 86_400,
            hours: (total % 86_400) / 3_600,
            minutes: (total % 3_600) / 60,
            seconds: total % 60,
        }
    }

    pub fn is_elapsed(&self) -> bool {
        self.days == 0 && self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}d {:02}h {:02}m {:02}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}
