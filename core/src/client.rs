//! Entry point of the asynchronous API.
//!
//! # Design
//! `Client` pairs a `Session` with a `Transport`. It holds no other state:
//! requests, actions and sequences are built fresh for every call and each
//! repository call results in exactly one HTTP exchange. The blocking API in
//! [`crate::blocking`] wraps this type instead of duplicating it.

use tracing::{debug, error};

use crate::error::ApiResult;
use crate::http::{HttpRequest, HttpResponse};
use crate::maps::Maps;
use crate::nodes::Nodes;
use crate::session::Session;
use crate::transport::{ReqwestTransport, Transport};
use crate::users::Users;

/// Asynchronous RedForester client.
#[derive(Debug, Clone)]
pub struct Client<T = ReqwestTransport> {
    session: Session,
    transport: T,
}

impl Client<ReqwestTransport> {
    /// Client using the default `reqwest` transport.
    pub fn new(session: Session) -> ApiResult<Self> {
        Ok(Self::with_transport(session, ReqwestTransport::new()?))
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(session: Session, transport: T) -> Self {
        Self { session, transport }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn users(&self) -> Users<'_, T> {
        Users::new(self)
    }

    pub fn maps(&self) -> Maps<'_, T> {
        Maps::new(self)
    }

    pub fn nodes(&self) -> Nodes<'_, T> {
        Nodes::new(self)
    }

    /// Hand a built request to the transport.
    pub async fn execute(&self, request: HttpRequest) -> ApiResult<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "sending request");
        let url = request.url.clone();
        let response = self
            .transport
            .execute(request)
            .await
            .inspect_err(|e| error!(%url, error = %e, "transport failed"))?;
        debug!(status = response.status, "received response");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::error::ApiError;
    use crate::http::HttpMethod;
    use crate::transport::testing::{RecordingTransport, UnreachableTransport};

    fn session() -> Session {
        Session::new("ann@example.com", "secret").with_config(ServerConfig::new("http", "localhost:3000"))
    }

    #[tokio::test]
    async fn execute_forwards_request_unchanged() {
        let client = Client::with_transport(session(), RecordingTransport::new().respond(201, "{}"));
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost:3000/api/user".to_string(),
            headers: Vec::new(),
            body: None,
        };
        let response = client.execute(request.clone()).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(client.transport().requests(), vec![request]);
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let client = Client::with_transport(session(), UnreachableTransport);
        let err = client.users().get().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[test]
    fn default_client_targets_session_server() {
        let client = Client::new(session()).unwrap();
        assert_eq!(client.session().config().base_url(), "http://localhost:3000");
    }
}
