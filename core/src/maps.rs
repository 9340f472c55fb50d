//! Repository for maps. Creation and updates are always batched.
//!
//! A batch is answered with one result per step; a map loses its pending
//! changes only when its own step succeeded.

use crate::action::{clear_confirmed, resource_path, Action, Request, Sequence};
use crate::client::Client;
use crate::entity::Entity;
use crate::error::ApiResult;
use crate::http::HttpResponse;
use crate::transport::Transport;
use crate::types::Map;

pub const MAPS_PATH: &str = "/api/maps";

pub fn plan_get_by_id(map_id: &str) -> Request {
    Request::get(resource_path(MAPS_PATH, map_id)).named("maps.get_by_id")
}

/// One `POST /api/maps` per map, carrying all of its pending changes.
/// `None` when there are no maps.
pub fn plan_create<'m>(maps: impl IntoIterator<Item = &'m Map>) -> Option<Sequence> {
    let sequence = Sequence::new(
        maps.into_iter()
            .map(|map| Action::post(MAPS_PATH, map.pending_changes())),
    )
    .named("maps.create");
    (!sequence.is_empty()).then_some(sequence)
}

/// One `PATCH /api/maps/{id}` per map with pending changes. `None` when no
/// map has any.
pub fn plan_update<'m>(maps: impl IntoIterator<Item = &'m Map>) -> Option<Sequence> {
    let sequence = Sequence::new(
        maps.into_iter()
            .filter(|map| map.has_pending_changes())
            .map(|map| Action::patch(resource_path(MAPS_PATH, map.id()), map.pending_changes())),
    )
    .named("maps.update");
    (!sequence.is_empty()).then_some(sequence)
}

/// Map operations bound to a client.
pub struct Maps<'a, T: Transport> {
    client: &'a Client<T>,
}

impl<'a, T: Transport> Maps<'a, T> {
    pub fn new(client: &'a Client<T>) -> Self {
        Self { client }
    }

    pub async fn get_by_id(&self, map_id: &str) -> ApiResult<Map> {
        let value = plan_get_by_id(map_id).send(self.client).await?;
        Map::from_value(value)
    }

    /// Create every draft in one batch. The batch response is returned as-is;
    /// a draft loses its pending changes once its step succeeded.
    pub async fn create<'m>(&self, maps: impl IntoIterator<Item = &'m mut Map>) -> ApiResult<Option<HttpResponse>> {
        let mut maps: Vec<&mut Map> = maps.into_iter().collect();
        let Some(sequence) = plan_create(maps.iter().map(|map| &**map)) else {
            return Ok(None);
        };
        let response = sequence.send(self.client).await?;
        let step_counts = vec![1; maps.len()];
        clear_confirmed(sequence.operation(), &mut maps, &step_counts, &response);
        Ok(Some(response))
    }

    /// Patch every map with pending changes in one batch; no call when none
    /// has any.
    pub async fn update<'m>(&self, maps: impl IntoIterator<Item = &'m mut Map>) -> ApiResult<Option<HttpResponse>> {
        let mut maps: Vec<&mut Map> = maps.into_iter().collect();
        let Some(sequence) = plan_update(maps.iter().map(|map| &**map)) else {
            return Ok(None);
        };
        let response = sequence.send(self.client).await?;
        let step_counts: Vec<usize> = maps.iter().map(|map| usize::from(map.has_pending_changes())).collect();
        clear_confirmed(sequence.operation(), &mut maps, &step_counts, &response);
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::action::BATCH_PATH;
    use crate::config::ServerConfig;
    use crate::error::ApiError;
    use crate::http::HttpMethod;
    use crate::session::Session;
    use crate::transport::testing::RecordingTransport;

    fn client(transport: RecordingTransport) -> Client<RecordingTransport> {
        let session = Session::new("ann@example.com", "secret").with_config(ServerConfig::new("http", "rf.test"));
        Client::with_transport(session, transport)
    }

    fn fetched(id: &str) -> Map {
        Map::from_value(json!({"id": id, "name": "Map", "layout": "LR", "node_count": 4})).unwrap()
    }

    fn batch_body(client: &Client<RecordingTransport>, index: usize) -> Vec<Value> {
        let request = &client.transport().requests()[index];
        assert_eq!(request.url, format!("http://rf.test{BATCH_PATH}"));
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        body.as_array().unwrap().clone()
    }

    #[test]
    fn decode_then_rederive_is_empty() {
        let map = fetched("m1");
        assert_eq!(map.pending_changes(), json!({}));
        assert!(plan_update([&map]).is_none());
    }

    #[test]
    fn create_plan_uses_full_changes() {
        let mut a = Map::default();
        a.set_name("A").set_public(true);
        let b = Map::default();

        let sequence = plan_create([&a, &b]).unwrap();
        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.actions()[0].payload(), &json!({"name": "A", "public": true}));
        assert_eq!(sequence.actions()[1].method(), HttpMethod::Post);
        assert!(plan_create(std::iter::empty::<&Map>()).is_none());
    }

    #[tokio::test]
    async fn get_by_id_decodes_map() {
        let client = client(RecordingTransport::new().respond(200, r#"{"id":"m1","name":"Plans","public":true}"#));
        let map = client.maps().get_by_id("m1").await.unwrap();
        assert_eq!(map.name(), "Plans");
        assert!(map.public());
        assert!(!map.has_pending_changes());
        assert_eq!(client.transport().requests()[0].url, "http://rf.test/api/maps/m1");
    }

    #[tokio::test]
    async fn update_without_changes_makes_no_call() {
        let client = client(RecordingTransport::new());
        let mut a = fetched("m1");
        let mut b = fetched("m2");
        let response = client.maps().update([&mut a, &mut b]).await.unwrap();
        assert!(response.is_none());
        assert_eq!(client.transport().call_count(), 0);
    }

    #[tokio::test]
    async fn one_changed_map_is_a_batch_of_one() {
        let client = client(RecordingTransport::new().respond(200, r#"[{"status":200,"body":{}}]"#));
        let mut a = fetched("m1");
        let mut b = fetched("m2");
        b.set_name("Renamed");

        client.maps().update([&mut a, &mut b]).await.unwrap();

        assert_eq!(client.transport().call_count(), 1);
        let steps = batch_body(&client, 0);
        assert_eq!(
            steps,
            vec![json!({"url": "/api/maps/m2", "method": "PATCH", "body": "{\"name\":\"Renamed\"}"})]
        );
        assert!(!b.has_pending_changes());
    }

    #[tokio::test]
    async fn create_batches_every_draft() {
        let client = client(
            RecordingTransport::new().respond(200, r#"[{"status":200,"body":{"id":"m1"}},{"status":200,"body":{"id":"m2"}}]"#),
        );
        let mut a = Map::default();
        a.set_name("First");
        let mut b = Map::default();
        b.set_name("Second").set_layout("RL");

        client.maps().create([&mut a, &mut b]).await.unwrap();

        let steps = batch_body(&client, 0);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["url"], "/api/maps");
        assert_eq!(steps[1]["body"], "{\"name\":\"Second\",\"layout\":\"RL\"}");
        assert!(!a.has_pending_changes() && !b.has_pending_changes());
    }

    #[tokio::test]
    async fn failed_batch_keeps_changes() {
        let client = client(RecordingTransport::new().respond(500, r#"{"code":"0500","message":"oops"}"#));
        let mut map = fetched("m1");
        map.set_public(true);

        let err = client.maps().update([&mut map]).await.unwrap_err();
        assert!(matches!(err, ApiError::HttpError { status: 500, .. }));
        assert!(map.has_pending_changes());
    }

    #[tokio::test]
    async fn failed_step_keeps_only_that_maps_changes() {
        let client = client(RecordingTransport::new().respond(
            200,
            r#"[{"status":200,"body":{}},{"status":404,"body":{"code":"0404","message":"no map"}}]"#,
        ));
        let mut a = fetched("m1");
        a.set_name("Kept");
        let mut missing = fetched("does-not-exist");
        missing.set_name("Lost?");

        let response = client.maps().update([&mut a, &mut missing]).await.unwrap();
        assert_eq!(response.unwrap().status, 200);
        assert!(!a.has_pending_changes());
        assert!(missing.has_pending_changes());
    }

    #[tokio::test]
    async fn unchanged_maps_do_not_shift_step_results() {
        let client = client(RecordingTransport::new().respond(200, r#"[{"status":500,"body":{}}]"#));
        let mut untouched = fetched("m1");
        let mut changed = fetched("m2");
        changed.set_public(true);

        client.maps().update([&mut untouched, &mut changed]).await.unwrap();
        assert!(changed.has_pending_changes());
    }

    #[tokio::test]
    async fn failed_create_step_keeps_draft() {
        let client = client(RecordingTransport::new().respond(200, r#"[{"status":400,"body":{}}]"#));
        let mut draft = Map::default();
        draft.set_name("Draft");
        client.maps().create([&mut draft]).await.unwrap();
        assert!(draft.has_pending_changes());
    }

    #[tokio::test]
    async fn unreadable_batch_response_keeps_changes() {
        let client = client(RecordingTransport::new().respond(200, "accepted"));
        let mut map = fetched("m1");
        map.set_name("Pending");
        client.maps().update([&mut map]).await.unwrap();
        assert!(map.has_pending_changes());
    }

    #[test]
    fn ids_are_encoded_in_paths() {
        let mut map = fetched("a/b");
        map.set_name("x");
        let sequence = plan_update([&map]).unwrap();
        assert_eq!(sequence.actions()[0].path(), "/api/maps/a%2Fb");
        assert_eq!(plan_get_by_id("a?b").path(), "/api/maps/a%3Fb");
    }
}
