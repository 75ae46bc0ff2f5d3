//! HTTP/WebSocket client for `nutrisnap-server`.
//!
//! CRUD goes over plain HTTP with a bearer key. Subscriptions open a
//! WebSocket per uid; every text frame carries the full JSON entry list.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{RemoteError, RemoteStore, Subscription};
use crate::identity::Identity;
use crate::models::{LogEntry, ProfileUpdate, UserProfile};

/// Account information returned by the `/me` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
}

impl Account {
    pub fn into_identity(self) -> Identity {
        if self.anonymous {
            Identity::anonymous(self.user_id)
        } else {
            Identity::authenticated(self.user_id, self.email)
        }
    }
}

/// Remote store backed by a `nutrisnap-server` instance.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    server_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    pub fn new(server_url: String, api_key: String) -> Self {
        Self {
            server_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Fetches the account the API key belongs to.
    pub async fn fetch_account(&self) -> Result<Account, RemoteError> {
        let response = self
            .client
            .get(self.build_http_url("/me"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(network)?;
        decode(check(response, "me").await?).await
    }

    fn entries_path(uid: &str) -> String {
        format!("/users/{}/entries", urlencoding::encode(uid))
    }

    fn profile_path(uid: &str) -> String {
        format!("/users/{}/profile", urlencoding::encode(uid))
    }

    /// Builds the WebSocket URL for a path, converting http(s) to ws(s).
    fn build_ws_url(&self, path: &str) -> String {
        let base_url = if self.server_url.starts_with("http://") {
            self.server_url.replace("http://", "ws://")
        } else if self.server_url.starts_with("https://") {
            self.server_url.replace("https://", "wss://")
        } else if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            format!("ws://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!(
            "{}{}?key={}",
            base_url.trim_end_matches('/'),
            path,
            urlencoding::encode(&self.api_key)
        )
    }

    /// Builds an HTTP URL for a path, converting ws(s) to http(s).
    fn build_http_url(&self, path: &str) -> String {
        let base_url = if self.server_url.starts_with("ws://") {
            self.server_url.replace("ws://", "http://")
        } else if self.server_url.starts_with("wss://") {
            self.server_url.replace("wss://", "https://")
        } else if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!("{}{}", base_url.trim_end_matches('/'), path)
    }
}

fn network(e: reqwest::Error) -> RemoteError {
    RemoteError::Network(e.to_string())
}

/// Maps non-success statuses to errors. `what` names the resource for
/// permission and not-found messages.
async fn check(response: Response, what: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(RemoteError::PermissionDenied(what.to_string()))
        }
        StatusCode::NOT_FOUND => Err(RemoteError::NotFound(what.to_string())),
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    response
        .json()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list(&self, uid: &str) -> Result<Vec<LogEntry>, RemoteError> {
        let response = self
            .client
            .get(self.build_http_url(&Self::entries_path(uid)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(network)?;
        decode(check(response, uid).await?).await
    }

    async fn add(&self, uid: &str, entry: LogEntry) -> Result<LogEntry, RemoteError> {
        let body = LogEntry { id: None, ..entry };
        let response = self
            .client
            .post(self.build_http_url(&Self::entries_path(uid)))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(network)?;
        decode(check(response, uid).await?).await
    }

    async fn remove(&self, uid: &str, id: &str) -> Result<(), RemoteError> {
        let path = format!("{}/{}", Self::entries_path(uid), urlencoding::encode(id));
        let response = self
            .client
            .delete(self.build_http_url(&path))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(network)?;
        check(response, &format!("entry {}", id)).await?;
        Ok(())
    }

    async fn subscribe(&self, uid: &str) -> Result<Subscription, RemoteError> {
        let url = self.build_ws_url(&format!("{}/subscribe", Self::entries_path(uid)));
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        let (_sink, mut stream) = ws_stream.split();

        let (tx, rx) = mpsc::unbounded_channel();
        let owner = uid.to_string();
        let task = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<Vec<LogEntry>>(text.as_str()) {
                            Ok(entries) => {
                                if tx.send(entries).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("Ignoring malformed push for {}: {}", owner, e)
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Subscription for {} failed: {}", owner, e);
                        break;
                    }
                }
            }
            tracing::debug!("Subscription stream for {} ended", owner);
        });

        tracing::debug!("Subscribed to entries of {}", uid);
        Ok(Subscription::new(uid, rx, move || task.abort()))
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, RemoteError> {
        let response = self
            .client
            .get(self.build_http_url(&Self::profile_path(uid)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(network)?;
        match check(response, uid).await {
            Ok(response) => decode(response).await.map(Some),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_profile(&self, uid: &str, fields: ProfileUpdate) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.build_http_url(&Self::profile_path(uid)))
            .bearer_auth(&self.api_key)
            .json(&fields)
            .send()
            .await
            .map_err(network)?;
        check(response, uid).await?;
        Ok(())
    }

    async fn update_profile(&self, uid: &str, fields: ProfileUpdate) -> Result<(), RemoteError> {
        let response = self
            .client
            .patch(self.build_http_url(&Self::profile_path(uid)))
            .bearer_auth(&self.api_key)
            .json(&fields)
            .send()
            .await
            .map_err(network)?;
        check(response, &format!("profile {}", uid)).await?;
        Ok(())
    }
}
