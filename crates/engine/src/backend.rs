use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use toolkit_api::{ApiError, ToolkitClient};
use toolkit_types::{DispatchActionRequest, RunRecord, RunStateUpdate, StartRunRequest, StartRunResponse, ToolDefinition};
use tracing::debug;

/// A request built from one `callApi` or `getSheetInfo` action.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: String,
    pub body: Option<Value>,
}

/// Everything the engine needs from the outside world.
///
/// The HTTP implementation talks to the catalog and run endpoints; tests
/// substitute a scripted in-memory backend.
#[async_trait]
pub trait ActionBackend: Send + Sync {
    /// Fetch the definition for `tool_id` from the catalog.
    async fn fetch_tool(&self, tool_id: &str) -> Result<ToolDefinition, ApiError>;

    /// Execute an action request and return its JSON response.
    async fn call(&self, request: &ApiRequest) -> Result<Value, ApiError>;

    /// Create a backend run for the session.
    async fn start_run(&self, request: &StartRunRequest<'_>) -> Result<StartRunResponse, ApiError>;

    /// Dispatch a worker action on an existing run.
    async fn dispatch_action(&self, run_id: &str, request: &DispatchActionRequest) -> Result<(), ApiError>;

    /// Persist the current step and answers on the run.
    async fn save_run_state(&self, run_id: &str, update: &RunStateUpdate) -> Result<(), ApiError>;

    /// Read the run record, including its job history.
    async fn fetch_run(&self, run_id: &str) -> Result<RunRecord, ApiError>;
}

/// [`ActionBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpActionBackend {
    client: ToolkitClient,
}

impl HttpActionBackend {
    pub fn new(client: ToolkitClient) -> Self {
        Self { client }
    }

    async fn send<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<&impl Serialize>) -> Result<T, ApiError> {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|error| ApiError::decode(error.to_string()))?;
        let value = self.client.send_json(method, path, body.as_ref()).await?;
        serde_json::from_value(value).map_err(|error| ApiError::decode(error.to_string()))
    }
}

#[async_trait]
impl ActionBackend for HttpActionBackend {
    async fn fetch_tool(&self, tool_id: &str) -> Result<ToolDefinition, ApiError> {
        debug!(tool_id, "fetching tool definition");
        self.send(Method::GET, &format!("/tools/{}", path_segment(tool_id)), None::<&Value>).await
    }

    async fn call(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        self.client
            .send_json(request.method.clone(), &request.endpoint, request.body.as_ref())
            .await
    }

    async fn start_run(&self, request: &StartRunRequest<'_>) -> Result<StartRunResponse, ApiError> {
        self.send(Method::POST, "/runs", Some(request)).await
    }

    async fn dispatch_action(&self, run_id: &str, request: &DispatchActionRequest) -> Result<(), ApiError> {
        self.client
            .send_json(Method::POST, &format!("/runs/{}/actions", path_segment(run_id)), Some(&to_json(request)?))
            .await
            .map(|_| ())
    }

    async fn save_run_state(&self, run_id: &str, update: &RunStateUpdate) -> Result<(), ApiError> {
        self.client
            .send_json(Method::PUT, &format!("/runs/{}/state", path_segment(run_id)), Some(&to_json(update)?))
            .await
            .map(|_| ())
    }

    async fn fetch_run(&self, run_id: &str) -> Result<RunRecord, ApiError> {
        self.send(Method::GET, &format!("/runs/{}", path_segment(run_id)), None::<&Value>).await
    }
}

/// Percent-encodes a value interpolated into a URL path.
pub(crate) fn path_segment(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

fn to_json(value: &impl Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|error| ApiError::decode(error.to_string()))
}
