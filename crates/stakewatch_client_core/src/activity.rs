//! Admin "recent activity" feed over deposits and withdrawals.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::api::SupabaseClient;
use crate::error::Result;
use crate::ids::{RecordId, UserId};
use crate::models::{Deposit, RequestStatus, Withdrawal};

pub const FEED_CAPACITY: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityKind {
    Deposit,
    Withdrawal,
}

impl ActivityKind {
    pub fn table(&self) -> &'static str {
        match self {
            ActivityKind::Deposit => "deposits",
            ActivityKind::Withdrawal => "withdrawals",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        match table {
            "deposits" => Some(ActivityKind::Deposit),
            "withdrawals" => Some(ActivityKind::Withdrawal),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActivityItem {
    pub id: RecordId,
    pub kind: ActivityKind,
    pub user_id: UserId,
    pub amount: f64,
    pub status: RequestStatus,
    pub at: DateTime<Utc>,
}

impl ActivityItem {
    pub fn from_deposit(d: &Deposit) -> Self {
        Self {
            id: d.id,
            kind: ActivityKind::Deposit,
            user_id: d.user_id,
            amount: d.amount,
            status: d.status,
            at: d.updated_at,
        }
    }

    pub fn from_withdrawal(w: &Withdrawal) -> Self {
        Self {
            id: w.id,
            kind: ActivityKind::Withdrawal,
            user_id: w.user_id,
            amount: w.amount,
            status: w.status,
            at: w.updated_at,
        }
    }

    /// Decode a changed row of `deposits` or `withdrawals`.
    pub fn from_change(kind: ActivityKind, record: serde_json::Value) -> Result<Self> {
        Ok(match kind {
            ActivityKind::Deposit => Self::from_deposit(&serde_json::from_value(record)?),
            ActivityKind::Withdrawal => Self::from_withdrawal(&serde_json::from_value(record)?),
        })
    }

    /// e.g. `Deposit approved: $1,234.5`
    pub fn message(&self) -> String {
        let kind = match self.kind {
            ActivityKind::Deposit => "Deposit",
            ActivityKind::Withdrawal => "Withdrawal",
        };
        let status = match self.status {
            RequestStatus::Pending => "requested",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        };
        format!("{} {}: {}", kind, status, format_usd(self.amount))
    }
}

impl fmt::Display for ActivityItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {}  ({}...)", self.at.format("%Y-%m-%d %H:%M"), self.message(), self.user_id.short())
    }
}

/// Dollar amount with thousands separators and at most two decimals, trailing zeros dropped.
pub fn format_usd(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let (whole, frac) = (cents / 100, cents % 100);
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    match frac {
        0 => format!("{}${}", sign, grouped),
        f if f % 10 == 0 => format!("{}${}.{}", sign, grouped, f / 10),
        f => format!("{}${}.{:02}", sign, grouped, f),
    }
}

/// Newest-first list of at most [`FEED_CAPACITY`] items, one per record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivityFeed {
    items: Vec<ActivityItem>,
}

impl ActivityFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace (same record id) and keep the newest entries.
    pub fn push(&mut self, item: ActivityItem) {
        self.items.retain(|i| i.id != item.id);
        self.items.push(item);
        self.items.sort_by(|a, b| b.at.cmp(&a.at));
        self.items.truncate(FEED_CAPACITY);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = ActivityItem>) {
        for item in items {
            self.push(item);
        }
    }

    pub fn items(&self) -> &[ActivityItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Seed a feed from the latest rows of both tables.
pub async fn load_recent(client: &SupabaseClient) -> Result<ActivityFeed> {
    let filters = [
        ("order", "updated_at.desc".to_string()),
        ("limit", FEED_CAPACITY.to_string()),
    ];
    let deposits: Vec<Deposit> = client.select("deposits", &filters).await?;
    let withdrawals: Vec<Withdrawal> = client.select("withdrawals", &filters).await?;
    let mut feed = ActivityFeed::new();
    feed.extend(deposits.iter().map(ActivityItem::from_deposit));
    feed.extend(withdrawals.iter().map(ActivityItem::from_withdrawal));
    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn item(n: i64, kind: ActivityKind) -> ActivityItem {
        ActivityItem {
            id: RecordId::new(uuid::Uuid::from_u128(n as u128)),
            kind,
            user_id: UserId::parse("f27978af-e56a-4b45-aede-fb450557699a").unwrap(),
            amount: 100.0 * n as f64,
            status: RequestStatus::Pending,
            at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(n),
        }
    }

    #[test]
    fn usd_formatting() {
        assert_eq!(format_usd(1234.5), "$1,234.5");
        assert_eq!(format_usd(1000.0), "$1,000");
        assert_eq!(format_usd(1234567.891), "$1,234,567.89");
        assert_eq!(format_usd(0.05), "$0.05");
        assert_eq!(format_usd(999.0), "$999");
    }

    #[test]
    fn message_names_kind_status_and_amount() {
        let mut i = item(1, ActivityKind::Deposit);
        i.amount = 1234.5;
        i.status = RequestStatus::Approved;
        assert_eq!(i.message(), "Deposit approved: $1,234.5");
        i.kind = ActivityKind::Withdrawal;
        i.status = RequestStatus::Pending;
        assert_eq!(i.message(), "Withdrawal requested: $1,234.5");
    }

    #[test]
    fn feed_keeps_five_newest() {
        let mut feed = ActivityFeed::new();
        for n in 1..=8 {
            feed.push(item(n, ActivityKind::Deposit));
        }
        let ids: Vec<u128> = feed.items().iter().map(|i| i.id.as_uuid().as_u128()).collect();
        assert_eq!(ids, vec![8, 7, 6, 5, 4]);
    }

    #[test]
    fn updates_replace_the_same_record() {
        let mut feed = ActivityFeed::new();
        feed.push(item(1, ActivityKind::Deposit));
        let mut approved = item(1, ActivityKind::Deposit);
        approved.status = RequestStatus::Approved;
        approved.at += Duration::minutes(30);
        feed.push(approved.clone());
        assert_eq!(feed.items(), &[approved]);
    }

    #[test]
    fn change_record_decodes_into_item() {
        let record = serde_json::json!({
            "id": "cb203efe-c27c-470e-bbc6-588172c3b1ae",
            "user_id": "f27978af-e56a-4b45-aede-fb450557699a",
            "amount": "75.25",
            "blockchain": "TRC20",
            "wallet_address": "T...",
            "status": "rejected",
            "created_at": "2026-02-04T12:00:00Z",
            "updated_at": "2026-02-04T13:00:00Z"
        });
        let i = ActivityItem::from_change(ActivityKind::Withdrawal, record).unwrap();
        assert_eq!(i.amount, 75.25);
        assert_eq!(i.status, RequestStatus::Rejected);
        assert_eq!(ActivityKind::from_table("withdrawals"), Some(ActivityKind::Withdrawal));
    }
}
