//! Minimal PostgREST/GoTrue/Storage look-alike on a local port.
//!
//! Tables are JSON rows; filters understand `eq.`, `is.null` and `in.(...)`,
//! which is everything the client sends. Every request is recorded so tests can
//! assert that nothing went out.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use stakewatch_client_core::{ClientConfig, SupabaseClient, UserId};

#[derive(Default)]
pub struct MockState {
    pub tables: HashMap<String, Vec<Value>>,
    pub requests: Vec<String>,
    pub uploads: Vec<String>,
    pub admin: bool,
    pub user_id: String,
    /// Runs before every PATCH with the table name; lets a test play a concurrent writer.
    pub before_patch: Option<PatchHook>,
}

pub type PatchHook = Box<dyn FnMut(&str, &mut HashMap<String, Vec<Value>>) + Send>;

type Shared = Arc<Mutex<MockState>>;

pub struct MockSupabase {
    pub url: String,
    pub state: Shared,
    _server: JoinHandle<()>,
}

pub fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl MockSupabase {
    pub async fn start(user: UserId, admin: bool) -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            admin,
            user_id: user.to_string(),
            ..Default::default()
        }));
        let app = Router::new()
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/logout", post(logout))
            .route("/rest/v1/rpc/:function", post(rpc))
            .route(
                "/rest/v1/:table",
                axum::routing::get(select).post(insert).patch(update).delete(remove),
            )
            .route("/storage/v1/object/*path", post(upload))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("http://{}", addr),
            state,
            _server: server,
        }
    }

    pub fn client(&self) -> SupabaseClient {
        SupabaseClient::new(ClientConfig::new(&self.url, "anon-test-key")).unwrap()
    }

    pub fn seed(&self, table: &str, row: Value) {
        self.state.lock().unwrap().tables.entry(table.to_string()).or_default().push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state.lock().unwrap().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn before_patch(&self, hook: impl FnMut(&str, &mut HashMap<String, Vec<Value>>) + Send + 'static) {
        self.state.lock().unwrap().before_patch = Some(Box::new(hook));
    }

    pub fn uploads(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.clone()
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn matches(row: &Value, query: &[(String, String)]) -> bool {
    query.iter().all(|(key, cond)| {
        if matches!(key.as_str(), "select" | "order" | "limit") {
            return true;
        }
        let field = as_text(&row[key.as_str()]);
        if let Some(v) = cond.strip_prefix("eq.") {
            field.as_deref() == Some(v)
        } else if cond == "is.null" {
            field.is_none()
        } else if let Some(list) = cond.strip_prefix("in.(").and_then(|s| s.strip_suffix(')')) {
            field.map_or(false, |f| list.split(',').any(|item| item == f))
        } else {
            false
        }
    })
}

async fn token(State(s): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut st = s.lock().unwrap();
    st.requests.push("POST token".into());
    if body["password"] == "wrong" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" })),
        );
    }
    let claims = json!({ "sub": st.user_id, "role": "authenticated" }).to_string();
    let jwt = format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(claims));
    (
        StatusCode::OK,
        Json(json!({
            "access_token": jwt,
            "refresh_token": "refresh-1",
            "token_type": "bearer",
            "expires_in": 3600,
            "user": { "id": st.user_id, "email": body["email"] }
        })),
    )
}

async fn logout(State(s): State<Shared>) -> StatusCode {
    s.lock().unwrap().requests.push("POST logout".into());
    StatusCode::NO_CONTENT
}

async fn rpc(State(s): State<Shared>, Path(function): Path<String>, Json(args): Json<Value>) -> Json<Value> {
    let mut st = s.lock().unwrap();
    st.requests.push(format!("RPC {}", function));
    Json(match function.as_str() {
        "is_current_user_admin" => json!(st.admin),
        "get_admin_dashboard_stats" => json!({
            "total_deposits": 1500,
            "active_users": 2,
            "total_nft_locked": "1500.00",
            "today_profit": 33
        }),
        "process_mining_claim" => json!({
            "success": args["user_id_param"] == st.user_id,
            "points_earned": 10,
            "next_available_time": "2026-02-04T13:00:00Z"
        }),
        _ => Value::Null,
    })
}

async fn select(
    State(s): State<Shared>,
    Path(table): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Json<Vec<Value>> {
    let mut st = s.lock().unwrap();
    st.requests.push(format!("GET {}", table));
    let limit = query
        .iter()
        .find(|(k, _)| k == "limit")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    let rows = st
        .tables
        .get(&table)
        .map(|rows| rows.iter().filter(|r| matches(r, &query)).take(limit).cloned().collect())
        .unwrap_or_default();
    Json(rows)
}

async fn insert(
    State(s): State<Shared>,
    Path(table): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Vec<Value>>) {
    let mut st = s.lock().unwrap();
    st.requests.push(format!("POST {}", table));
    let rows = match body {
        Value::Array(rows) => rows,
        row => vec![row],
    };
    let mut inserted = Vec::new();
    for mut row in rows {
        let now = now_string();
        if row.get("id").is_none() {
            row["id"] = json!(uuid::Uuid::new_v4().to_string());
        }
        row["created_at"] = json!(now);
        row["updated_at"] = json!(now);
        st.tables.entry(table.clone()).or_default().push(row.clone());
        inserted.push(row);
    }
    (StatusCode::CREATED, Json(inserted))
}

async fn update(
    State(s): State<Shared>,
    Path(table): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    Json(body): Json<Value>,
) -> Json<Vec<Value>> {
    let mut guard = s.lock().unwrap();
    let st = &mut *guard;
    st.requests.push(format!("PATCH {}", table));
    if let Some(hook) = st.before_patch.as_mut() {
        hook(&table, &mut st.tables);
    }
    let mut changed = Vec::new();
    if let (Some(rows), Value::Object(patch)) = (st.tables.get_mut(&table), body) {
        for row in rows.iter_mut().filter(|r| matches(r, &query)) {
            for (k, v) in &patch {
                row[k.as_str()] = v.clone();
            }
            changed.push(row.clone());
        }
    }
    Json(changed)
}

async fn remove(
    State(s): State<Shared>,
    Path(table): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> StatusCode {
    let mut st = s.lock().unwrap();
    st.requests.push(format!("DELETE {}", table));
    if let Some(rows) = st.tables.get_mut(&table) {
        rows.retain(|r| !matches(r, &query));
    }
    StatusCode::NO_CONTENT
}

async fn upload(State(s): State<Shared>, Path(path): Path<String>, body: Bytes) -> Json<Value> {
    let mut st = s.lock().unwrap();
    st.requests.push(format!("UPLOAD {}", path));
    assert!(!body.is_empty(), "empty upload");
    st.uploads.push(path.clone());
    Json(json!({ "Key": path }))
}
