//! Food recognition client.
//!
//! The classifier is an opaque service that turns a meal photo or a
//! text query into nutrition estimates. Failures are surfaced to the
//! caller as-is; nothing is retried.

use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::models::FoodItem;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Failed to read image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported image type: {0}")]
    UnsupportedImage(String),

    #[error("Classifier request failed: {0}")]
    Request(String),

    #[error("Classifier returned status {0}")]
    Status(u16),

    #[error("Failed to decode classifier response: {0}")]
    Decode(String),
}

/// An image to analyze, with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoodImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl FoodImage {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Reads an image file, taking the MIME type from its extension.
    pub fn from_path(path: &Path) -> Result<Self, ClassifierError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mime_type = match extension.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "heic" => "image/heic",
            _ => return Err(ClassifierError::UnsupportedImage(path.display().to_string())),
        };

        let data = std::fs::read(path).map_err(|source| ClassifierError::Image {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(data, mime_type))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }
}

#[async_trait]
pub trait FoodClassifier: Send + Sync {
    /// Recognizes the foods in a meal photo.
    async fn analyze(&self, image: &FoodImage) -> Result<Vec<FoodItem>, ClassifierError>;

    /// Looks up one food by name. `None` when nothing matches.
    async fn search(&self, query: &str) -> Result<Option<FoodItem>, ClassifierError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    image: String,
    mime_type: &'a str,
}

/// Classifier reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn search_url(&self, query: &str) -> String {
        self.url(&format!("/search?q={}", urlencoding::encode(query)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl FoodClassifier for HttpClassifier {
    async fn analyze(&self, image: &FoodImage) -> Result<Vec<FoodItem>, ClassifierError> {
        let body = AnalyzeRequest {
            image: image.to_base64(),
            mime_type: &image.mime_type,
        };
        let response = self
            .authorize(self.client.post(self.url("/analyze")).json(&body))
            .send()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClassifierError::Status(response.status().as_u16()));
        }
        let items: Vec<FoodItem> = response
            .json()
            .await
            .map_err(|e| ClassifierError::Decode(e.to_string()))?;
        tracing::debug!("Classifier recognized {} items", items.len());
        Ok(items)
    }

    async fn search(&self, query: &str) -> Result<Option<FoodItem>, ClassifierError> {
        let response = self
            .authorize(self.client.get(self.search_url(query)))
            .send()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ClassifierError::Status(response.status().as_u16()));
        }
        response
            .json::<Option<FoodItem>>()
            .await
            .map_err(|e| ClassifierError::Decode(e.to_string()))
    }
}
