//! Single calls (`Request`, `Action`) and batched calls (`Sequence`).
//!
//! # Design
//! Each type is split the same way: `build` turns it into an `HttpRequest`
//! bound to a session, `send` executes it through a client and runs the
//! response through `check_status`. A `Sequence` is itself sent as an
//! `Action` on `/api/batch` whose payload is the list of its actions'
//! batch steps, in the order they were added.
//!
//! Every call carries an operation name (`"maps.update"`, ...) that failure
//! logs are tagged with.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::blocking;
use crate::client::Client;
use crate::entity::Entity;
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::session::Session;
use crate::transport::Transport;

/// Path of the batch endpoint.
pub const BATCH_PATH: &str = "/api/batch";

/// `{base}/{id}` with `id` percent-encoded as one path segment.
pub fn resource_path(base: &str, id: &str) -> String {
    format!("{base}/{}", urlencoding::encode(id))
}

/// A read-only call whose response body is JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    operation: &'static str,
    method: HttpMethod,
    path: String,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            operation: "request",
            method: HttpMethod::Get,
            path: path.into(),
        }
    }

    /// Tag the call with an operation name for logging.
    pub fn named(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn build(&self, session: &Session) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url: session.url(&self.path),
            headers: vec![("authorization".to_string(), session.authorization())],
            body: None,
        }
    }

    /// Perform the call and decode the JSON body.
    pub async fn send<T: Transport>(&self, client: &Client<T>) -> ApiResult<Value> {
        let response = client.execute(self.build(client.session())).await?;
        check_status(response, self.operation, self.method, &self.path)?
            .json()
            .inspect_err(|e| error!(operation = self.operation, path = %self.path, error = %e, "undecodable response"))
    }

    /// Blocking form of [`Request::send`].
    pub fn send_blocking<T: Transport>(&self, client: &blocking::Client<T>) -> ApiResult<Value> {
        client.block_on(self.send(client.as_async()))
    }
}

/// A mutating call with a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    operation: &'static str,
    method: HttpMethod,
    path: String,
    payload: Value,
}

impl Action {
    pub fn new(method: HttpMethod, path: impl Into<String>, payload: Value) -> Self {
        Self {
            operation: "action",
            method,
            path: path.into(),
            payload,
        }
    }

    pub fn named(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn post(path: impl Into<String>, payload: Value) -> Self {
        Self::new(HttpMethod::Post, path, payload)
    }

    pub fn patch(path: impl Into<String>, payload: Value) -> Self {
        Self::new(HttpMethod::Patch, path, payload)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path, Value::Null)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    fn encoded_payload(&self) -> ApiResult<String> {
        serde_json::to_string(&self.payload).map_err(|e| ApiError::SerializationError(e.to_string()))
    }

    pub fn build(&self, session: &Session) -> ApiResult<HttpRequest> {
        Ok(HttpRequest {
            method: self.method,
            url: session.url(&self.path),
            headers: vec![
                ("authorization".to_string(), session.authorization()),
                ("content-type".to_string(), "application/json".to_string()),
            ],
            body: Some(self.encoded_payload()?),
        })
    }

    /// Describe this action as one step of a batch. The body is omitted when
    /// the payload is empty.
    pub fn prepare_for_batch(&self) -> ApiResult<BatchStep> {
        let body = if is_empty_payload(&self.payload) {
            None
        } else {
            Some(self.encoded_payload()?)
        };
        Ok(BatchStep {
            url: self.path.clone(),
            method: self.method,
            body,
        })
    }

    /// Perform the call. The response is returned as-is once its status is
    /// known to be a success.
    pub async fn send<T: Transport>(&self, client: &Client<T>) -> ApiResult<HttpResponse> {
        let response = client.execute(self.build(client.session())?).await?;
        check_status(response, self.operation, self.method, &self.path)
    }

    /// Blocking form of [`Action::send`].
    pub fn send_blocking<T: Transport>(&self, client: &blocking::Client<T>) -> ApiResult<HttpResponse> {
        client.block_on(self.send(client.as_async()))
    }
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// One entry of a batch payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStep {
    /// Path relative to the server root, e.g. `/api/maps/1`.
    pub url: String,
    pub method: HttpMethod,
    /// JSON-encoded payload.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body: Option<String>,
}

/// Several actions executed server-side, in order, by one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    operation: &'static str,
    actions: Vec<Action>,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Sequence {
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            operation: "batch",
            actions: actions.into_iter().collect(),
        }
    }

    pub fn named(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn steps(&self) -> ApiResult<Vec<BatchStep>> {
        self.actions.iter().map(Action::prepare_for_batch).collect()
    }

    /// The `POST /api/batch` action carrying every step.
    pub fn to_action(&self) -> ApiResult<Action> {
        let steps = serde_json::to_value(self.steps()?)
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(Action::post(BATCH_PATH, steps).named(self.operation))
    }

    /// Submit the batch. The aggregate response is not split per step.
    pub async fn send<T: Transport>(&self, client: &Client<T>) -> ApiResult<HttpResponse> {
        self.to_action()?.send(client).await
    }

    /// Blocking form of [`Sequence::send`].
    pub fn send_blocking<T: Transport>(&self, client: &blocking::Client<T>) -> ApiResult<HttpResponse> {
        client.block_on(self.send(client.as_async()))
    }
}

/// Pass 2xx responses through; log and convert everything else.
pub(crate) fn check_status(
    response: HttpResponse,
    operation: &str,
    method: HttpMethod,
    path: &str,
) -> ApiResult<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }
    let err = ApiError::from_status(response.status, &response.body);
    match &err {
        ApiError::HttpError { status, code, message } => {
            error!(operation, %method, path, status, code = code.as_str(), message = message.as_str(), "request failed");
        }
        other => {
            error!(operation, %method, path, error = %other, "request failed");
        }
    }
    Err(err)
}

/// Success of each step of a batch response, in step order.
///
/// `None` when the body is not a list of `{"status": ..}` results.
pub fn batch_outcomes(response: &HttpResponse) -> Option<Vec<bool>> {
    let results: Vec<Value> = serde_json::from_str(&response.body).ok()?;
    results
        .iter()
        .map(|result| {
            let status = result.get("status")?.as_u64()?;
            Some((200..300).contains(&status))
        })
        .collect()
}

/// Clear the changes of every entity whose batch steps all succeeded.
///
/// `step_counts[i]` is the number of consecutive steps `entities[i]`
/// contributed. Entities are left untouched when the outcome of any of their
/// steps is unknown.
pub(crate) fn clear_confirmed<E: Entity>(
    operation: &str,
    entities: &mut [&mut E],
    step_counts: &[usize],
    response: &HttpResponse,
) {
    let Some(outcomes) = batch_outcomes(response) else {
        warn!(operation, kind = E::KIND, "batch response has no step results; keeping pending changes");
        return;
    };
    let mut next = 0;
    for (entity, &count) in entities.iter_mut().zip(step_counts) {
        let steps = outcomes.get(next..next + count);
        next += count;
        match steps {
            Some(steps) if steps.iter().all(|ok| *ok) => entity.clear_changes(),
            _ => warn!(operation, kind = E::KIND, "batch step failed; keeping pending changes"),
        }
    }
}
