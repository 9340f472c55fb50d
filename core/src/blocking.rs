//! Blocking API for callers that are not running an async runtime.
//!
//! # Design
//! `Client` owns a current-thread tokio runtime and drives the asynchronous
//! operations of [`crate::Client`] to completion on it, one exchange at a
//! time. Nothing is re-implemented here: every method is the async operation
//! plus `block_on`.
//!
//! Like any `block_on`, these methods panic when called from inside an async
//! runtime.

use std::future::Future;

use tokio::runtime::{Builder, Runtime};

use crate::error::{ApiError, ApiResult};
use crate::http::HttpResponse;
use crate::session::Session;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{Map, Node, NodeDraft, User};

/// Blocking RedForester client.
pub struct Client<T: Transport = ReqwestTransport> {
    inner: crate::Client<T>,
    runtime: Runtime,
}

impl Client<ReqwestTransport> {
    pub fn new(session: Session) -> ApiResult<Self> {
        Self::from_async(crate::Client::new(session)?)
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(session: Session, transport: T) -> ApiResult<Self> {
        Self::from_async(crate::Client::with_transport(session, transport))
    }

    /// Wrap an async client.
    pub fn from_async(inner: crate::Client<T>) -> ApiResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::Runtime(e.to_string()))?;
        Ok(Self { inner, runtime })
    }

    pub fn as_async(&self) -> &crate::Client<T> {
        &self.inner
    }

    pub fn session(&self) -> &Session {
        self.inner.session()
    }

    pub fn users(&self) -> Users<'_, T> {
        Users { client: self }
    }

    pub fn maps(&self) -> Maps<'_, T> {
        Maps { client: self }
    }

    pub fn nodes(&self) -> Nodes<'_, T> {
        Nodes { client: self }
    }

    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Blocking form of [`crate::users::Users`].
pub struct Users<'a, T: Transport> {
    client: &'a Client<T>,
}

impl<T: Transport> Users<'_, T> {
    pub fn get(&self) -> ApiResult<User> {
        self.client.block_on(self.client.inner.users().get())
    }

    pub fn get_by_id(&self, user_id: &str) -> ApiResult<User> {
        self.client.block_on(self.client.inner.users().get_by_id(user_id))
    }

    pub fn update(&self, user: &mut User) -> ApiResult<Option<HttpResponse>> {
        self.client.block_on(self.client.inner.users().update(user))
    }
}

/// Blocking form of [`crate::maps::Maps`].
pub struct Maps<'a, T: Transport> {
    client: &'a Client<T>,
}

impl<T: Transport> Maps<'_, T> {
    pub fn get_by_id(&self, map_id: &str) -> ApiResult<Map> {
        self.client.block_on(self.client.inner.maps().get_by_id(map_id))
    }

    pub fn create<'m>(&self, maps: impl IntoIterator<Item = &'m mut Map>) -> ApiResult<Option<HttpResponse>> {
        self.client.block_on(self.client.inner.maps().create(maps))
    }

    pub fn update<'m>(&self, maps: impl IntoIterator<Item = &'m mut Map>) -> ApiResult<Option<HttpResponse>> {
        self.client.block_on(self.client.inner.maps().update(maps))
    }
}

/// Blocking form of [`crate::nodes::Nodes`].
pub struct Nodes<'a, T: Transport> {
    client: &'a Client<T>,
}

impl<T: Transport> Nodes<'_, T> {
    pub fn get_by_id(&self, node_id: &str) -> ApiResult<Node> {
        self.client.block_on(self.client.inner.nodes().get_by_id(node_id))
    }

    pub fn create(&self, draft: &NodeDraft) -> ApiResult<Node> {
        self.client.block_on(self.client.inner.nodes().create(draft))
    }

    pub fn create_many<'d>(&self, drafts: impl IntoIterator<Item = &'d NodeDraft>) -> ApiResult<Option<HttpResponse>> {
        self.client.block_on(self.client.inner.nodes().create_many(drafts))
    }

    pub fn update<'n>(&self, nodes: impl IntoIterator<Item = &'n mut Node>) -> ApiResult<Option<HttpResponse>> {
        self.client.block_on(self.client.inner.nodes().update(nodes))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::action::{Action, Request, Sequence};
    use crate::config::ServerConfig;
    use crate::entity::Entity;
    use crate::transport::testing::RecordingTransport;

    fn client(transport: RecordingTransport) -> Client<RecordingTransport> {
        let session = Session::new("ann@example.com", "secret").with_config(ServerConfig::new("http", "rf.test"));
        Client::with_transport(session, transport).unwrap()
    }

    #[test]
    fn blocking_get_and_update() {
        let client = client(
            RecordingTransport::new()
                .respond(200, r#"{"user_id":"u-1","username":"ann@example.com","name":"Ann"}"#)
                .respond(200, "{}"),
        );
        let mut me = client.users().get().unwrap();
        assert!(me.is_current());
        me.set_name("Anna");
        assert!(client.users().update(&mut me).unwrap().is_some());
        assert!(!me.has_pending_changes());
        assert_eq!(client.as_async().transport().call_count(), 2);
    }

    #[test]
    fn blocking_update_without_changes_is_free() {
        let client = client(RecordingTransport::new());
        let mut map = Map::from_value(json!({"id": "m1"})).unwrap();
        assert!(client.maps().update([&mut map]).unwrap().is_none());
        assert_eq!(client.as_async().transport().call_count(), 0);
    }

    #[test]
    fn requests_and_actions_have_blocking_forms() {
        let client = client(
            RecordingTransport::new()
                .respond(200, r#"{"id":"m1"}"#)
                .respond(200, "patched")
                .respond(200, "[]"),
        );
        let value = Request::get("/api/maps/m1").send_blocking(&client).unwrap();
        assert_eq!(value["id"], "m1");

        let action = Action::patch("/api/maps/m1", json!({"name": "x"}));
        assert_eq!(action.send_blocking(&client).unwrap().body, "patched");

        let response = Sequence::new(vec![action]).send_blocking(&client).unwrap();
        assert_eq!(response.body, "[]");
    }
}
