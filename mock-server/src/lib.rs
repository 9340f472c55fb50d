//! In-memory stand-in for the RedForester REST API.
//!
//! Implements the subset of endpoints the client consumes, with Basic auth
//! over the MD5 password digest and an `/api/batch` endpoint that replays its
//! steps, in order, against the same routes.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use http_body_util::BodyExt;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tower::ServiceExt;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub avatar: String,
    pub registration_date: String,
    pub birthday: String,
    pub kv_session: String,
    pub is_extension_user: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub id: String,
    pub root_node_id: String,
    pub owner: String,
    pub owner_name: String,
    pub owner_avatar: String,
    pub layout: String,
    pub public: bool,
    pub node_count: i64,
    pub user_count: i64,
    pub name: String,
}

/// Properties live in `body.properties`, as the real service returns them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub map_id: String,
    pub parent: Option<String>,
    pub position: Value,
    pub access: String,
    #[serde(rename = "originalParent")]
    pub original_parent: Option<String>,
    pub body: Value,
    pub hidden: bool,
    pub readers: Vec<Value>,
    pub nodelevel: i64,
    pub meta: Value,
}

#[derive(Deserialize)]
pub struct CreateMap {
    pub name: Option<String>,
    pub layout: Option<String>,
    pub public: Option<bool>,
}

/// `properties` and `position` arrive JSON-encoded.
#[derive(Deserialize)]
pub struct CreateNode {
    pub map_id: String,
    pub parent: String,
    pub properties: String,
    pub position: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BatchStep {
    pub url: String,
    pub method: String,
    pub body: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchResult {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            code: code.to_string(),
            message: message.into(),
        }),
    )
}

fn not_found(what: &str, id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "0404", format!("{what} {id} not found"))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "0400", message)
}

/// The account requests must authenticate as.
#[derive(Clone, Debug)]
pub struct Account {
    pub username: String,
    pub password_digest: String,
}

impl Account {
    pub fn new(username: impl Into<String>, password: &str) -> Self {
        Self {
            username: username.into(),
            password_digest: hex::encode(Md5::digest(password.as_bytes())),
        }
    }
}

/// Everything the server knows about.
#[derive(Debug, Default)]
pub struct Store {
    pub current_user_id: String,
    pub users: HashMap<String, User>,
    pub maps: HashMap<String, Map>,
    pub nodes: HashMap<String, Node>,
}

impl Store {
    /// A store whose current user is `account`.
    pub fn for_account(account: &Account) -> Self {
        let user = User {
            user_id: Uuid::new_v4().to_string(),
            username: account.username.clone(),
            name: "Demo".to_string(),
            surname: "User".to_string(),
            registration_date: "2019-01-01T00:00:00Z".to_string(),
            ..User::default()
        };
        let mut store = Store {
            current_user_id: user.user_id.clone(),
            ..Store::default()
        };
        store.users.insert(user.user_id.clone(), user);
        store
    }

    pub fn insert_user(&mut self, user: User) {
        self.users.insert(user.user_id.clone(), user);
    }

    /// Add a map owned by the current user, with its root node. Returns the
    /// map.
    pub fn create_map(&mut self, name: &str) -> Map {
        let owner = self.users.get(&self.current_user_id).cloned().unwrap_or_default();
        let map_id = Uuid::new_v4().to_string();
        let root = Node {
            id: Uuid::new_v4().to_string(),
            map_id: map_id.clone(),
            parent: None,
            position: serde_json::json!(["R", 0]),
            access: "user_all".to_string(),
            original_parent: None,
            body: node_body(serde_json::json!({"global": {"title": name}})),
            hidden: false,
            readers: Vec::new(),
            nodelevel: 0,
            meta: serde_json::json!({}),
        };
        let map = Map {
            id: map_id.clone(),
            root_node_id: root.id.clone(),
            owner: owner.user_id,
            owner_name: owner.name,
            owner_avatar: owner.avatar,
            layout: "LR".to_string(),
            public: false,
            node_count: 1,
            user_count: 1,
            name: name.to_string(),
        };
        self.nodes.insert(root.id.clone(), root);
        self.maps.insert(map_id, map.clone());
        map
    }
}

fn node_body(properties: Value) -> Value {
    serde_json::json!({ "properties": properties })
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub account: Arc<Account>,
}

impl AppState {
    pub fn new(account: Account, store: Store) -> Self {
        Self {
            db: Arc::new(RwLock::new(store)),
            account: Arc::new(account),
        }
    }

    /// State with a fresh store for `account`.
    pub fn for_account(account: Account) -> Self {
        let store = Store::for_account(&account);
        Self::new(account, store)
    }
}

/// Unauthenticated routes; `/api/batch` dispatches into these.
fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/user", get(current_user).patch(update_current_user))
        .route("/api/user/{id}", get(get_user))
        .route("/api/maps", post(create_map))
        .route("/api/maps/{id}", get(get_map).patch(update_map))
        .route("/api/nodes", post(create_node))
        .route("/api/nodes/{id}", get(get_node).patch(update_node))
        .with_state(state)
}

pub fn app(state: AppState) -> Router {
    api_routes(state.clone())
        .route("/api/batch", post(batch).with_state(state.clone()))
        .layer(middleware::from_fn_with_state(state, require_auth))
}

pub async fn run(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

fn credentials(request: &Request) -> Option<(String, String)> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, digest) = decoded.split_once(':')?;
    Some((username.to_string(), digest.to_string()))
}

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match credentials(&request) {
        Some((username, digest))
            if username == state.account.username && digest == state.account.password_digest =>
        {
            next.run(request).await
        }
        _ => {
            warn!(uri = %request.uri(), "rejected unauthenticated request");
            api_error(StatusCode::UNAUTHORIZED, "0201", "authentication required").into_response()
        }
    }
}

/// Overwrite fields of `target` with `patch`, going through JSON so any field
/// can be patched. Keys in `locked` are ignored.
fn apply_patch<T>(target: &T, patch: JsonMap<String, Value>, locked: &[&str]) -> Result<T, ApiError>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let mut value = serde_json::to_value(target).map_err(|e| bad_request(e.to_string()))?;
    if let Value::Object(fields) = &mut value {
        for (key, new_value) in patch {
            if locked.contains(&key.as_str()) {
                continue;
            }
            if !fields.contains_key(&key) {
                return Err(bad_request(format!("unknown field {key}")));
            }
            fields.insert(key, new_value);
        }
    }
    serde_json::from_value(value).map_err(|e| bad_request(e.to_string()))
}

async fn current_user(State(state): State<AppState>) -> Result<Json<User>, ApiError> {
    let store = state.db.read().await;
    store
        .users
        .get(&store.current_user_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("user", &store.current_user_id))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<User>, ApiError> {
    let store = state.db.read().await;
    store.users.get(&id).cloned().map(Json).ok_or_else(|| not_found("user", &id))
}

async fn update_current_user(
    State(state): State<AppState>,
    Json(patch): Json<JsonMap<String, Value>>,
) -> Result<Json<User>, ApiError> {
    let mut store = state.db.write().await;
    let id = store.current_user_id.clone();
    let user = store.users.get(&id).ok_or_else(|| not_found("user", &id))?;
    let updated = apply_patch(user, patch, &["user_id", "username", "registration_date"])?;
    store.users.insert(id, updated.clone());
    Ok(Json(updated))
}

async fn create_map(State(state): State<AppState>, Json(input): Json<CreateMap>) -> Json<Map> {
    let mut store = state.db.write().await;
    let mut map = store.create_map(input.name.as_deref().unwrap_or("noname"));
    if let Some(layout) = input.layout {
        map.layout = layout;
    }
    if let Some(public) = input.public {
        map.public = public;
    }
    store.maps.insert(map.id.clone(), map.clone());
    Json(map)
}

async fn get_map(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Map>, ApiError> {
    let store = state.db.read().await;
    store.maps.get(&id).cloned().map(Json).ok_or_else(|| not_found("map", &id))
}

async fn update_map(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<JsonMap<String, Value>>,
) -> Result<Json<Map>, ApiError> {
    let mut store = state.db.write().await;
    let map = store.maps.get(&id).ok_or_else(|| not_found("map", &id))?;
    let updated = apply_patch(map, patch, &["id", "root_node_id", "owner", "node_count", "user_count"])?;
    store.maps.insert(id, updated.clone());
    Ok(Json(updated))
}

async fn create_node(State(state): State<AppState>, Json(input): Json<CreateNode>) -> Result<Json<Node>, ApiError> {
    let properties: Value = serde_json::from_str(&input.properties)
        .map_err(|e| bad_request(format!("properties: {e}")))?;
    let position: Value =
        serde_json::from_str(&input.position).map_err(|e| bad_request(format!("position: {e}")))?;

    let mut store = state.db.write().await;
    if !store.maps.contains_key(&input.map_id) {
        return Err(not_found("map", &input.map_id));
    }
    let parent = store
        .nodes
        .get(&input.parent)
        .filter(|parent| parent.map_id == input.map_id)
        .ok_or_else(|| not_found("node", &input.parent))?;

    let node = Node {
        id: Uuid::new_v4().to_string(),
        map_id: input.map_id.clone(),
        parent: Some(parent.id.clone()),
        position,
        access: parent.access.clone(),
        original_parent: Some(parent.id.clone()),
        body: node_body(properties),
        hidden: false,
        readers: Vec::new(),
        nodelevel: parent.nodelevel + 1,
        meta: serde_json::json!({}),
    };
    store.nodes.insert(node.id.clone(), node.clone());
    if let Some(map) = store.maps.get_mut(&input.map_id) {
        map.node_count += 1;
    }
    Ok(Json(node))
}

async fn get_node(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Node>, ApiError> {
    let store = state.db.read().await;
    store.nodes.get(&id).cloned().map(Json).ok_or_else(|| not_found("node", &id))
}

#[derive(Deserialize)]
struct PropertyUpdate {
    group: String,
    key: String,
    value: Value,
}

#[derive(Deserialize)]
struct PropertyChanges {
    #[serde(default)]
    update: Vec<PropertyUpdate>,
}

async fn update_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut patch): Json<JsonMap<String, Value>>,
) -> Result<Json<Node>, ApiError> {
    let mut store = state.db.write().await;
    let node = store.nodes.get(&id).ok_or_else(|| not_found("node", &id))?;

    // A string `properties` is a property-change document, anything else a
    // plain field replacement.
    let property_changes = match patch.get("properties") {
        Some(Value::String(encoded)) => {
            let changes: PropertyChanges =
                serde_json::from_str(encoded).map_err(|e| bad_request(format!("properties: {e}")))?;
            patch.remove("properties");
            Some(changes)
        }
        _ => None,
    };

    let mut updated = apply_patch(node, patch, &["id", "map_id", "nodelevel"])?;
    if let Some(changes) = property_changes {
        for change in changes.update {
            let group = updated
                .body
                .get_mut("properties")
                .and_then(|properties| properties.get_mut(&change.group))
                .and_then(Value::as_object_mut)
                .ok_or_else(|| bad_request(format!("unknown property group {}", change.group)))?;
            group.insert(change.key, change.value);
        }
    }
    store.nodes.insert(id, updated.clone());
    Ok(Json(updated))
}

/// Run each step through the API routes, in order, and report every result.
/// A step without a body is sent `{}`.
async fn batch(State(state): State<AppState>, Json(steps): Json<Vec<BatchStep>>) -> Result<Json<Vec<BatchResult>>, ApiError> {
    let mut results = Vec::with_capacity(steps.len());
    for step in steps {
        debug!(method = %step.method, url = %step.url, "batch step");
        let request = axum::http::Request::builder()
            .method(step.method.as_str())
            .uri(step.url.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(step.body.unwrap_or_else(|| "{}".to_string())))
            .map_err(|e| bad_request(e.to_string()))?;

        let response = match api_routes(state.clone()).oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let status = response.status().as_u16();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "0500", e.to_string()))?
            .to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        results.push(BatchResult { status, body });
    }
    Ok(Json(results))
}
