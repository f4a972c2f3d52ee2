//! In-memory wallet store for projector session tests.
//! Honors the conditional-write contract and can inject failures, conflicts,
//! slow writes and expired sessions.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

use stakewatch_client_core::{Checkpoint, Error, Result, SnapshotStore, UserId, WalletSnapshot};

struct Inner {
    wallet: Option<WalletSnapshot>,
    writes: Vec<Checkpoint>,
    conflicts: usize,
    fail_next: usize,
    fail_status: u16,
    write_delay: Duration,
    session_expired: bool,
    renewal_refused: bool,
    renewals: usize,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(wallet: Option<WalletSnapshot>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                wallet,
                writes: Vec::new(),
                conflicts: 0,
                fail_next: 0,
                fail_status: 503,
                write_delay: Duration::ZERO,
                session_expired: false,
                renewal_refused: false,
                renewals: 0,
            }),
        }
    }

    /// Next `n` writes answer 503.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_next_writes_with(n, 503);
    }

    pub fn fail_next_writes_with(&self, n: usize, status: u16) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next = n;
        inner.fail_status = status;
    }

    /// Writes answer 401 until the session is renewed.
    pub fn expire_session(&self) {
        self.inner.lock().unwrap().session_expired = true;
    }

    pub fn refuse_renewal(&self) {
        self.inner.lock().unwrap().renewal_refused = true;
    }

    pub fn renewals(&self) -> usize {
        self.inner.lock().unwrap().renewals
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().write_delay = delay;
    }

    /// Successful writes, oldest first.
    pub fn writes(&self) -> Vec<Checkpoint> {
        self.inner.lock().unwrap().writes.clone()
    }

    pub fn conflicts(&self) -> usize {
        self.inner.lock().unwrap().conflicts
    }

    pub fn wallet(&self) -> Option<WalletSnapshot> {
        self.inner.lock().unwrap().wallet.clone()
    }

    /// Simulate another writer (admin approval, another device) touching the wallet.
    pub fn server_update(&self, at: DateTime<Utc>, f: impl FnOnce(&mut WalletSnapshot)) {
        let mut inner = self.inner.lock().unwrap();
        let wallet = inner.wallet.as_mut().expect("wallet seeded");
        f(wallet);
        wallet.last_update_at = at;
        wallet.version = Some(at);
    }
}

impl SnapshotStore for MemoryStore {
    async fn fetch_snapshot(&self, user: UserId) -> Result<WalletSnapshot> {
        self.inner
            .lock()
            .unwrap()
            .wallet
            .clone()
            .filter(|w| w.user_id == user)
            .ok_or_else(|| Error::NotFound(format!("wallet for user {}", user)))
    }

    async fn write_checkpoint(&self, user: UserId, checkpoint: Checkpoint) -> Result<DateTime<Utc>> {
        let delay = self.inner.lock().unwrap().write_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.session_expired {
            return Err(Error::NotAuthenticated);
        }
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(Error::Status { status: inner.fail_status, body: "injected".into() });
        }
        let current_version = match inner.wallet.as_ref() {
            Some(w) if w.user_id == user => w.version,
            _ => return Err(Error::NotFound(format!("wallet for user {}", user))),
        };
        if current_version != checkpoint.expected_version {
            inner.conflicts += 1;
            return Err(Error::Conflict("version moved".into()));
        }
        if let Some(wallet) = inner.wallet.as_mut() {
            wallet.accrued_profit = checkpoint.accrued_profit;
            wallet.last_update_at = checkpoint.last_update_at;
            wallet.version = Some(checkpoint.last_update_at);
        }
        inner.writes.push(checkpoint.clone());
        Ok(checkpoint.last_update_at)
    }

    async fn renew_session(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.renewal_refused {
            return Err(Error::Status { status: 400, body: "invalid refresh token".into() });
        }
        inner.session_expired = false;
        inner.renewals += 1;
        Ok(())
    }
}
