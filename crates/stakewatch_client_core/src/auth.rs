//! Password sign-in against `/auth/v1` and the session it yields.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{check, decode, SupabaseClient};
use crate::error::{Error, Result};
use crate::ids::UserId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: UserId,
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// True when the access token expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - margin <= now
    }
}

#[derive(Deserialize)]
struct TokenUser {
    id: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<TokenUser>,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Result<Session> {
        let (id, email) = match self.user {
            Some(u) => (u.id, u.email),
            None => (None, None),
        };
        let user_id = match id {
            Some(id) => UserId::parse(id)?,
            None => subject_from_jwt(&self.access_token)?,
        };
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(ts), _) => DateTime::from_timestamp(ts, 0).unwrap_or(now),
            (None, Some(secs)) => now + Duration::seconds(secs),
            (None, None) => now + Duration::hours(1),
        };
        Ok(Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user_id,
            email,
            expires_at,
        })
    }
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
}

/// User id from the `sub` claim of an access token. The signature is not checked.
pub fn subject_from_jwt(token: &str) -> Result<UserId> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::Decode("access token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::Decode(format!("JWT payload: {}", e)))?;
    let claims: Claims = serde_json::from_slice(&bytes)?;
    UserId::parse(claims.sub)
}

async fn token_request(client: &SupabaseClient, grant: &str, body: serde_json::Value) -> Result<Session> {
    let url = client.config().auth_url(&format!("token?grant_type={}", grant));
    let resp = client
        .http()
        .post(url)
        .header("apikey", &client.config().anon_key)
        .json(&body)
        .send()
        .await?;
    let token: TokenResponse = decode(resp).await?;
    let session = token.into_session(Utc::now())?;
    client.set_session(Some(session.clone()));
    Ok(session)
}

/// Exchange email/password for a session and install it on the client.
pub async fn sign_in(client: &SupabaseClient, email: &str, password: &str) -> Result<Session> {
    let session = token_request(
        client,
        "password",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await?;
    log::info!("auth: signed in user_id={}", session.user_id);
    Ok(session)
}

pub async fn refresh(client: &SupabaseClient, refresh_token: &str) -> Result<Session> {
    let session = token_request(
        client,
        "refresh_token",
        serde_json::json!({ "refresh_token": refresh_token }),
    )
    .await?;
    log::debug!("auth: refreshed session user_id={}", session.user_id);
    Ok(session)
}

/// Revoke the current session remotely and forget it locally. A remote
/// failure still clears the local session.
pub async fn sign_out(client: &SupabaseClient) -> Result<()> {
    if client.session().is_none() {
        return Ok(());
    }
    let result = revoke(client).await;
    client.set_session(None);
    if let Err(e) = &result {
        log::warn!("auth: remote sign-out failed: {}", e);
    }
    result
}

async fn revoke(client: &SupabaseClient) -> Result<()> {
    let resp = client
        .http()
        .post(client.config().auth_url("logout"))
        .headers(client.headers()?)
        .send()
        .await?;
    check(resp).await.map(|_| ())
}

pub async fn is_admin(client: &SupabaseClient) -> Result<bool> {
    client.user_id()?;
    client.rpc("is_current_user_admin", &serde_json::json!({})).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with(payload: &str) -> String {
        format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn subject_is_read_from_payload() {
        let token = jwt_with(r#"{"sub":"f27978af-e56a-4b45-aede-fb450557699a","role":"authenticated"}"#);
        let id = subject_from_jwt(&token).unwrap();
        assert_eq!(id.to_string(), "f27978af-e56a-4b45-aede-fb450557699a");
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(subject_from_jwt("opaque").is_err());
        assert!(subject_from_jwt(&jwt_with(r#"{"sub":"nope"}"#)).is_err());
    }

    #[test]
    fn token_without_user_falls_back_to_jwt_subject() {
        let now = Utc::now();
        let resp = TokenResponse {
            access_token: jwt_with(r#"{"sub":"f27978af-e56a-4b45-aede-fb450557699a"}"#),
            refresh_token: "r".into(),
            expires_in: Some(3600),
            expires_at: None,
            user: None,
        };
        let session = resp.into_session(now).unwrap();
        assert_eq!(session.user_id.short(), "f27978af");
        assert_eq!(session.expires_at, now + Duration::seconds(3600));
        assert!(!session.expires_within(now, Duration::seconds(60)));
        assert!(session.expires_within(now + Duration::seconds(3590), Duration::seconds(60)));
    }
}
