//! Realtime `postgres_changes` subscription on deposits and withdrawals over
//! the Phoenix websocket protocol, feeding the admin activity feed.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::activity::{self, ActivityFeed, ActivityItem, ActivityKind};
use crate::api::SupabaseClient;
use crate::backoff::Backoff;
use crate::error::{Error, Result};

pub const CHANNEL_TOPIC: &str = "realtime:admin-activity";
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

pub fn join_message(access_token: Option<&str>, msg_ref: u64) -> String {
    let changes: Vec<Value> = [ActivityKind::Deposit, ActivityKind::Withdrawal]
        .iter()
        .map(|k| json!({ "event": "*", "schema": "public", "table": k.table() }))
        .collect();
    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": changes,
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = json!(token);
    }
    json!({
        "topic": CHANNEL_TOPIC,
        "event": "phx_join",
        "payload": payload,
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

pub fn heartbeat_message(msg_ref: u64) -> String {
    json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": msg_ref.to_string() }).to_string()
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, PartialEq)]
pub enum Incoming {
    Change(ActivityItem),
    Joined,
    Error(String),
    Closed,
    Other,
}

/// Classify one text frame from the socket.
pub fn parse_message(text: &str) -> Result<Incoming> {
    let env: Envelope = serde_json::from_str(text)?;
    match env.event.as_str() {
        "postgres_changes" => {
            let data = &env.payload["data"];
            let table = data["table"].as_str().unwrap_or_default();
            let Some(kind) = ActivityKind::from_table(table) else {
                return Ok(Incoming::Other);
            };
            let record = match &data["record"] {
                Value::Object(map) if !map.is_empty() => data["record"].clone(),
                _ => data["old_record"].clone(),
            };
            Ok(Incoming::Change(ActivityItem::from_change(kind, record)?))
        }
        "phx_reply" => match env.payload["status"].as_str() {
            Some("ok") => Ok(Incoming::Joined),
            _ => Ok(Incoming::Error(env.payload["response"].to_string())),
        },
        "phx_error" => Ok(Incoming::Error(env.payload.to_string())),
        "phx_close" => Ok(Incoming::Closed),
        _ => Ok(Incoming::Other),
    }
}

/// Live activity feed. Dropping it closes the socket.
pub struct ActivitySubscription {
    feed: watch::Receiver<ActivityFeed>,
    task: Option<JoinHandle<()>>,
}

impl ActivitySubscription {
    pub fn current(&self) -> ActivityFeed {
        self.feed.borrow().clone()
    }

    /// Wait for the next change to the feed.
    pub async fn changed(&mut self) -> Result<ActivityFeed> {
        self.feed
            .changed()
            .await
            .map_err(|_| Error::Realtime("subscription ended".to_string()))?;
        Ok(self.feed.borrow_and_update().clone())
    }
}

impl Drop for ActivitySubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Seed the feed from the tables, then follow changes until dropped.
pub async fn subscribe(client: &SupabaseClient) -> Result<ActivitySubscription> {
    let seed = activity::load_recent(client).await?;
    let (tx, rx) = watch::channel(seed);
    let url = client.config().realtime_url();
    let token = client.access_token();
    let task = tokio::spawn(follow(url, token, tx));
    Ok(ActivitySubscription { feed: rx, task: Some(task) })
}

async fn follow(url: String, token: Option<String>, tx: watch::Sender<ActivityFeed>) {
    let mut backoff = Backoff::realtime();
    loop {
        match stream_changes(&url, token.as_deref(), &tx, &mut backoff).await {
            Ok(()) => log::info!("realtime: channel closed by server"),
            Err(e) => log::warn!("realtime: connection lost: {}", e),
        }
        if tx.is_closed() {
            return;
        }
        let delay = backoff.on_failure();
        log::debug!("realtime: reconnecting in {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}

async fn stream_changes(
    url: &str,
    token: Option<&str>,
    tx: &watch::Sender<ActivityFeed>,
    backoff: &mut Backoff,
) -> Result<()> {
    let (socket, _) = connect_async(url).await?;
    let (mut sink, mut stream) = socket.split();
    let mut msg_ref: u64 = 1;
    sink.send(Message::Text(join_message(token, msg_ref))).await?;
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                msg_ref += 1;
                sink.send(Message::Text(heartbeat_message(msg_ref))).await?;
            }
            frame = stream.next() => {
                let text = match frame {
                    None => return Ok(()),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) => return Ok(()),
                    Some(Ok(_)) => continue,
                };
                match parse_message(&text) {
                    Ok(Incoming::Change(item)) => {
                        log::debug!("realtime: {}", item.message());
                        tx.send_modify(|feed| feed.push(item));
                    }
                    Ok(Incoming::Joined) => backoff.reset(),
                    Ok(Incoming::Error(reason)) => return Err(Error::Realtime(reason)),
                    Ok(Incoming::Closed) => return Ok(()),
                    Ok(Incoming::Other) => {}
                    Err(e) => log::warn!("realtime: ignoring undecodable frame: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_subscribes_to_both_tables() {
        let msg: Value = serde_json::from_str(&join_message(Some("jwt"), 1)).unwrap();
        assert_eq!(msg["event"], "phx_join");
        assert_eq!(msg["topic"], CHANNEL_TOPIC);
        assert_eq!(msg["payload"]["access_token"], "jwt");
        let tables: Vec<&str> = msg["payload"]["config"]["postgres_changes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["table"].as_str().unwrap())
            .collect();
        assert_eq!(tables, vec!["deposits", "withdrawals"]);
    }

    #[test]
    fn heartbeat_targets_phoenix_topic() {
        let msg: Value = serde_json::from_str(&heartbeat_message(7)).unwrap();
        assert_eq!(msg["topic"], "phoenix");
        assert_eq!(msg["ref"], "7");
    }

    #[test]
    fn parses_change_frames() {
        let frame = r#"{
            "topic": "realtime:admin-activity",
            "event": "postgres_changes",
            "ref": null,
            "payload": {
                "ids": [1],
                "data": {
                    "schema": "public",
                    "table": "deposits",
                    "type": "UPDATE",
                    "record": {
                        "id": "cb203efe-c27c-470e-bbc6-588172c3b1ae",
                        "user_id": "f27978af-e56a-4b45-aede-fb450557699a",
                        "amount": 1234.5,
                        "blockchain": "TRC20",
                        "deposit_address": "T...",
                        "status": "approved",
                        "created_at": "2026-02-04T12:00:00Z",
                        "updated_at": "2026-02-04T12:05:00Z"
                    }
                }
            }
        }"#;
        match parse_message(frame).unwrap() {
            Incoming::Change(item) => assert_eq!(item.message(), "Deposit approved: $1,234.5"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn control_frames() {
        let ok = r#"{"topic":"realtime:admin-activity","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"1"}"#;
        assert_eq!(parse_message(ok).unwrap(), Incoming::Joined);
        let err = r#"{"topic":"realtime:admin-activity","event":"phx_reply","payload":{"status":"error","response":{"reason":"unauthorized"}},"ref":"1"}"#;
        assert!(matches!(parse_message(err).unwrap(), Incoming::Error(r) if r.contains("unauthorized")));
        let other = r#"{"topic":"realtime:admin-activity","event":"presence_state","payload":{},"ref":null}"#;
        assert_eq!(parse_message(other).unwrap(), Incoming::Other);
    }
}
