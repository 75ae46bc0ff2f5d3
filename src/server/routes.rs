//! HTTP and WebSocket routes.
//!
//! - `GET /health` (no auth)
//! - `GET /me`
//! - `GET|POST /users/{uid}/entries`
//! - `DELETE /users/{uid}/entries/{id}`
//! - `GET /users/{uid}/entries/subscribe` (WebSocket)
//! - `GET|PUT|PATCH /users/{uid}/profile`
//!
//! Authenticated routes take `Authorization: Bearer <key>` or `?key=<key>`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Extension, Json, Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use nutrisnap_core::{LogEntry, ProfileUpdate, UserProfile};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;

use super::hub::EntryHub;
use super::storage::{StorageError, UserStorage};
use super::users::{Action, ApiKeyStore, AuthUser};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    /// Guards every read-modify-write of the user files.
    pub storage: Arc<Mutex<UserStorage>>,
    pub hub: Arc<EntryHub>,
}

impl AppState {
    pub fn new(api_keys: ApiKeyStore, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
            storage: Arc::new(Mutex::new(UserStorage::new(data_dir))),
            hub: Arc::new(EntryHub::new()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/me", get(me))
        .route("/users/{uid}/entries", get(list_entries).post(add_entry))
        .route("/users/{uid}/entries/subscribe", get(subscribe))
        .route("/users/{uid}/entries/{id}", delete(remove_entry))
        .route(
            "/users/{uid}/profile",
            get(get_profile).put(set_profile).patch(update_profile),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Error response with a machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    fn forbidden(uid: &str) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "forbidden",
            format!("No access to user {}", uid),
        )
    }

    fn not_found(what: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", what)
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidUserId(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_user_id", e.to_string())
            }
            other => {
                tracing::error!("Storage failure: {}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Failed to access stored data",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.error,
                message: self.message,
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Reads the `key` query parameter. WebSocket clients cannot set headers.
fn query_key(request: &Request) -> Option<String> {
    request.uri().query()?.split('&').find_map(|pair| {
        let value = pair.strip_prefix("key=")?;
        urlencoding::decode(value).ok().map(|v| v.into_owned())
    })
}

async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key.to_string(),
            None => {
                return ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
                .into_response();
            }
        },
        None => match query_key(&request) {
            Some(key) => key,
            None => {
                return ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "missing_auth",
                    "Authorization header or key parameter required",
                )
                .into_response();
            }
        },
    };

    match state.api_keys.validate(&api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => {
            ApiError::new(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key")
                .into_response()
        }
    }
}

fn authorize(state: &AppState, user: &AuthUser, uid: &str, action: Action) -> Result<(), ApiError> {
    if state.api_keys.authorize(user, uid, action) {
        Ok(())
    } else {
        tracing::info!("Denied {:?} on {} for {}", action, uid, user.user_id);
        Err(ApiError::forbidden(uid))
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn me(Extension(user): Extension<AuthUser>) -> Json<AuthUser> {
    Json(user)
}

async fn list_entries(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    authorize(&state, &user, &uid, Action::ListEntries)?;
    let storage = state.storage.lock().await;
    Ok(Json(storage.list_entries(&uid)?))
}

async fn add_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
    Json(entry): Json<LogEntry>,
) -> Result<(StatusCode, Json<LogEntry>), ApiError> {
    authorize(&state, &user, &uid, Action::WriteEntries)?;

    let storage = state.storage.lock().await;
    let (saved, entries) =
        storage.add_entry(&uid, entry, chrono::Utc::now().timestamp_millis())?;
    // Published under the storage lock so subscribers see snapshots in order.
    state.hub.publish(&uid, entries).await;

    Ok((StatusCode::CREATED, Json(saved)))
}

async fn remove_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((uid, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &user, &uid, Action::WriteEntries)?;

    let storage = state.storage.lock().await;
    match storage.remove_entry(&uid, &id)? {
        Some(entries) => {
            state.hub.publish(&uid, entries).await;
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::not_found(format!("Entry {} not found", id))),
    }
}

async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    authorize(&state, &user, &uid, Action::ReadProfile)?;
    let storage = state.storage.lock().await;
    storage
        .get_profile(&uid)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No profile for {}", uid)))
}

async fn set_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
    Json(fields): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
    authorize(&state, &user, &uid, Action::WriteProfile)?;
    let storage = state.storage.lock().await;
    Ok(Json(storage.set_profile(&uid, &fields)?))
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
    Json(fields): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
    authorize(&state, &user, &uid, Action::WriteProfile)?;
    let storage = state.storage.lock().await;
    storage
        .update_profile(&uid, &fields)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No profile for {}", uid)))
}

async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
) -> Result<Response, ApiError> {
    authorize(&state, &user, &uid, Action::Subscribe)?;
    UserStorage::validate_user_id(&uid)?;
    Ok(ws.on_upgrade(move |socket| stream_entries(socket, state, uid)))
}

// ============================================================================
// WebSocket
// ============================================================================

/// Sends the current entries, then the full list again after every change,
/// until the client goes away.
async fn stream_entries(socket: WebSocket, state: AppState, uid: String) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribing under the storage lock means no change can slip between
    // the first frame and the broadcast stream.
    let (mut updates, initial) = {
        let storage = state.storage.lock().await;
        let updates = state.hub.subscribe(&uid).await;
        (updates, storage.list_entries(&uid))
    };

    let initial = match initial {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("Failed to load entries of {}: {}", uid, e);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    if !send_entries(&mut sender, &initial).await {
        return;
    }
    tracing::info!("Subscriber connected to {}", uid);

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    if !send_entries(&mut sender, &snapshot).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Subscriber of {} skipped {} update(s)", uid, skipped);
                    let current = state.storage.lock().await.list_entries(&uid);
                    let sent = match current {
                        Ok(entries) => send_entries(&mut sender, &entries).await,
                        Err(e) => {
                            tracing::error!("Failed to reload entries of {}: {}", uid, e);
                            false
                        }
                    };
                    if !sent {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!("Subscriber disconnected from {}", uid);
}

async fn send_entries(sender: &mut SplitSink<WebSocket, Message>, entries: &[LogEntry]) -> bool {
    match serde_json::to_string(entries) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode entries: {}", e);
            false
        }
    }
}
