//! Toolkit backend client utilities.
//!
//! This crate provides a lightweight client for the tool catalog backend and
//! the arbitrary action endpoints a tool definition names. It focuses on:
//!
//! - Constructing an HTTP client with sensible defaults
//! - Validating the configured base URL for safety
//! - Building requests with a consistent User-Agent and Accept headers
//! - Decoding JSON responses and classifying failures into [`ApiError`]
//!
//! # Example
//!
//! ```ignore
//! use toolkit_api::ToolkitClient;
//!
//! async fn fetch() -> Result<(), toolkit_api::ApiError> {
//!     let client = ToolkitClient::new("http://localhost:8080/api")?;
//!     let tool = client.send_json(reqwest::Method::GET, "/tools/sheet-builder", None).await?;
//!     println!("{tool}");
//!     Ok(())
//! }
//! ```

use std::env;

use reqwest::{Client, Method, RequestBuilder, Url, header};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Hostnames allowed for local development regardless of scheme.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Failures surfaced by [`ToolkitClient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The server answered with a non-2xx status.
    #[error("{}", status_message(*status, message.as_deref()))]
    Status { status: u16, message: Option<String> },

    /// The body was not valid JSON.
    #[error("Invalid response body: {message}")]
    Decode { message: String },

    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into() }
    }
}

fn status_message(status: u16, message: Option<&str>) -> String {
    match message {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => format!("Request failed with status {status}"),
    }
}

/// Thin wrapper around a configured `reqwest::Client` for backend access.
///
/// Relative paths are resolved against a validated base URL; absolute
/// `http(s)://` endpoints named by a tool definition are used as-is.
#[derive(Debug, Clone)]
pub struct ToolkitClient {
    pub base_url: String,
    pub http: Client,
    pub user_agent: String,
}

impl ToolkitClient {
    /// Construct a client for `base_url`.
    ///
    /// Non-localhost hosts must use HTTPS.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(|error| ApiError::transport(format!("build http client: {error}")))?;

        Ok(Self {
            base_url,
            http,
            user_agent: format!("toolkit/0.1; {}", env::consts::OS),
        })
    }

    /// Build a `reqwest::RequestBuilder` for a method and API-relative path.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.resolve_url(path);
        debug!(%url, %method, "building request");

        self.http
            .request(method, url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT, "application/json")
    }

    /// Send a request with an optional JSON body and decode the JSON response.
    ///
    /// An empty success body decodes to `Value::Null`. A non-2xx status becomes
    /// [`ApiError::Status`] carrying the server's `message` (or `error`) text
    /// when the body provides one.
    pub async fn send_json(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| ApiError::transport(error.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|error| ApiError::transport(error.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: server_message(&text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|error| ApiError::decode(error.to_string()))
    }

    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

/// Extract a human readable message from an error body.
fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => ["message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        Ok(Value::String(text)) => Some(text),
        Ok(_) => None,
        Err(_) if trimmed.len() <= 200 => Some(trimmed.to_string()),
        Err(_) => None,
    }
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any scheme is allowed
/// - otherwise: scheme must be HTTPS
pub fn validate_base_url(base: &str) -> Result<(), ApiError> {
    let invalid = |reason: String| ApiError::InvalidBaseUrl { url: base.to_string(), reason };
    let parsed_base_url = Url::parse(base).map_err(|error| invalid(error.to_string()))?;

    let host_name = parsed_base_url
        .host_str()
        .ok_or_else(|| invalid("base URL must include a host".to_string()))?;

    if LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
    {
        return Ok(());
    }

    if parsed_base_url.scheme() != "https" {
        return Err(invalid(format!(
            "must use https for non-localhost hosts; got '{}://'",
            parsed_base_url.scheme()
        )));
    }

    Ok(())
}
