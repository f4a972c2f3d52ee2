//! HTTP client for the remote store (PostgREST tables and RPCs, auth, object storage).
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::auth::Session;
use crate::checkpoint::{Checkpoint, SnapshotStore};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::ids::UserId;
use crate::models::{WalletRow, WalletSnapshot};

pub type Filters<'a> = [(&'a str, String)];

/// PostgREST `eq.` filter value.
pub fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

/// Timestamp as PostgREST filter operand, microsecond precision like the column.
pub fn timestamp_operand(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Concurrency-token filter for `last_earnings_update`.
pub fn version_filter(version: Option<DateTime<Utc>>) -> String {
    match version {
        Some(v) => eq(timestamp_operand(v)),
        None => "is.null".to_string(),
    }
}

pub struct SupabaseClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: RwLock<Option<Session>>,
}

impl SupabaseClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self {
            http,
            config,
            session: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn set_session(&self, session: Option<Session>) {
        if let Ok(mut guard) = self.session.write() {
            *guard = session;
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    pub fn user_id(&self) -> Result<UserId> {
        self.session().map(|s| s.user_id).ok_or(Error::NotAuthenticated)
    }

    pub fn access_token(&self) -> Option<String> {
        self.session().map(|s| s.access_token)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// `apikey` plus bearer token (the anon key when signed out).
    pub(crate) fn headers(&self) -> Result<HeaderMap> {
        let bearer = self.access_token().unwrap_or_else(|| self.config.anon_key.clone());
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("apikey"), header_value(&self.config.anon_key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", bearer))?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn headers_returning(&self) -> Result<HeaderMap> {
        let mut headers = self.headers()?;
        headers.insert(HeaderName::from_static("prefer"), HeaderValue::from_static("return=representation"));
        Ok(headers)
    }

    /// GET /rest/v1/{table}?select=*&...
    pub async fn select<T: DeserializeOwned>(&self, table: &str, filters: &Filters<'_>) -> Result<Vec<T>> {
        let mut query: Vec<(&str, String)> = vec![("select", "*".to_string())];
        query.extend(filters.iter().cloned());
        let resp = self
            .http
            .get(self.config.rest_url(table))
            .headers(self.headers()?)
            .query(&query)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn select_one<T: DeserializeOwned>(&self, table: &str, filters: &Filters<'_>) -> Result<Option<T>> {
        let mut query: Vec<(&str, String)> = filters.to_vec();
        query.push(("limit", "1".to_string()));
        let rows: Vec<T> = self.select(table, &query).await?;
        Ok(rows.into_iter().next())
    }

    /// POST /rest/v1/{table}, returns the inserted row.
    pub async fn insert<B: Serialize, T: DeserializeOwned>(&self, table: &str, body: &B) -> Result<T> {
        let resp = self
            .http
            .post(self.config.rest_url(table))
            .headers(self.headers_returning()?)
            .json(body)
            .send()
            .await?;
        let rows: Vec<T> = decode(resp).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::Decode(format!("insert into {} returned no row", table)))
    }

    /// PATCH /rest/v1/{table}?filters, returns the rows that matched.
    pub async fn update<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &Filters<'_>,
        body: &B,
    ) -> Result<Vec<T>> {
        let resp = self
            .http
            .patch(self.config.rest_url(table))
            .headers(self.headers_returning()?)
            .query(filters)
            .json(body)
            .send()
            .await?;
        decode(resp).await
    }

    /// DELETE /rest/v1/{table}?filters
    pub async fn delete(&self, table: &str, filters: &Filters<'_>) -> Result<()> {
        let resp = self
            .http
            .delete(self.config.rest_url(table))
            .headers(self.headers()?)
            .query(filters)
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    /// POST /rest/v1/rpc/{function}
    pub async fn rpc<A: Serialize, T: DeserializeOwned>(&self, function: &str, args: &A) -> Result<T> {
        let resp = self
            .http
            .post(self.config.rpc_url(function))
            .headers(self.headers()?)
            .json(args)
            .send()
            .await?;
        decode(resp).await
    }

    /// POST /storage/v1/object/{bucket}/{path}; returns the object path.
    pub async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let url = self
            .config
            .storage_url(&format!("object/{}/{}", bucket, encode_path(path)));
        let mut headers = self.headers()?;
        headers.insert(CONTENT_TYPE, header_value(content_type)?);
        let resp = self.http.post(url).headers(headers).body(bytes).send().await?;
        check(resp).await?;
        Ok(path.to_string())
    }

    pub fn public_object_url(&self, bucket: &str, path: &str) -> String {
        self.config
            .storage_url(&format!("object/public/{}/{}", bucket, encode_path(path)))
    }

    pub async fn wallet_row(&self, user: UserId) -> Result<Option<WalletRow>> {
        self.select_one("user_wallets", &[("user_id", eq(user))]).await
    }
}

#[derive(Serialize)]
struct CheckpointPatch {
    total_profit: f64,
    last_earnings_update: String,
    updated_at: String,
}

impl SnapshotStore for SupabaseClient {
    async fn fetch_snapshot(&self, user: UserId) -> Result<WalletSnapshot> {
        self.wallet_row(user)
            .await?
            .map(|row| row.snapshot())
            .ok_or_else(|| Error::NotFound(format!("wallet for user {}", user)))
    }

    async fn write_checkpoint(&self, user: UserId, checkpoint: Checkpoint) -> Result<DateTime<Utc>> {
        let body = CheckpointPatch {
            total_profit: checkpoint.accrued_profit,
            last_earnings_update: timestamp_operand(checkpoint.last_update_at),
            updated_at: timestamp_operand(Utc::now()),
        };
        let filters = [
            ("user_id", eq(user)),
            ("last_earnings_update", version_filter(checkpoint.expected_version)),
        ];
        let rows: Vec<WalletRow> = self.update("user_wallets", &filters, &body).await?;
        let row = rows.into_iter().next().ok_or_else(|| {
            Error::Conflict(format!(
                "wallet of {} changed since {:?}",
                user, checkpoint.expected_version
            ))
        })?;
        log::debug!("checkpoint: persisted user_id={} total_profit={}", user, checkpoint.accrued_profit);
        Ok(row.last_earnings_update.unwrap_or(checkpoint.last_update_at))
    }

    async fn renew_session(&self) -> Result<()> {
        let refresh_token = self.session().map(|s| s.refresh_token).ok_or(Error::NotAuthenticated)?;
        crate::auth::refresh(self, &refresh_token).await?;
        Ok(())
    }
}

fn header_value(s: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(s).map_err(|e| Error::Config(format!("invalid header value: {}", e)))
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub(crate) async fn check(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let text = resp.text().await?;
    if status.is_success() {
        return Ok(text);
    }
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.message.or(b.error_description).or(b.msg))
        .unwrap_or_else(|| text.clone());
    match status.as_u16() {
        401 => Err(Error::NotAuthenticated),
        403 => Err(Error::Forbidden(message)),
        code => Err(Error::Status { status: code, body: message }),
    }
}

pub(crate) async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let text = check(resp).await?;
    serde_json::from_str(&text).map_err(|e| Error::Decode(format!("{}: {}", e, text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn version_filter_uses_micros_and_is_null() {
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 8, 0, 0).unwrap() + chrono::Duration::microseconds(123_456);
        assert_eq!(version_filter(Some(at)), "eq.2026-01-15T08:00:00.123456Z");
        assert_eq!(version_filter(None), "is.null");
    }

    #[test]
    fn object_paths_are_encoded_per_segment() {
        assert_eq!(encode_path("abc/my proof.png"), "abc/my%20proof.png");
    }

    #[test]
    fn headers_fall_back_to_anon_key() {
        let client = SupabaseClient::new(ClientConfig::new("http://localhost:54321", "anon-key")).unwrap();
        let headers = client.headers().unwrap();
        assert_eq!(headers.get("apikey").unwrap(), "anon-key");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer anon-key");
        assert!(client.user_id().is_err());
    }
}
