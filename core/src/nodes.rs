//! Repository for map nodes.
//!
//! A node can carry two kinds of pending change: flat field assignments and
//! nested property updates. Each kind becomes its own `PATCH` because the
//! API expects properties as a JSON-encoded `{"update": [...]}` document.

use serde_json::{Map as JsonMap, Value};

use crate::action::{clear_confirmed, resource_path, Action, Request, Sequence};
use crate::client::Client;
use crate::entity::Entity;
use crate::error::ApiResult;
use crate::http::HttpResponse;
use crate::transport::Transport;
use crate::types::{Node, NodeDraft};

pub const NODES_PATH: &str = "/api/nodes";

pub fn plan_get_by_id(node_id: &str) -> Request {
    Request::get(resource_path(NODES_PATH, node_id)).named("nodes.get_by_id")
}

pub fn plan_create(draft: &NodeDraft) -> ApiResult<Action> {
    Ok(Action::post(NODES_PATH, draft.to_payload()?).named("nodes.create"))
}

/// `None` when there are no drafts.
pub fn plan_create_many<'d>(drafts: impl IntoIterator<Item = &'d NodeDraft>) -> ApiResult<Option<Sequence>> {
    let actions = drafts
        .into_iter()
        .map(plan_create)
        .collect::<ApiResult<Vec<_>>>()?;
    let sequence = Sequence::new(actions).named("nodes.create_many");
    Ok((!sequence.is_empty()).then_some(sequence))
}

/// The patches a node needs: field changes first, then property changes.
pub fn plan_node_update(node: &Node) -> ApiResult<Vec<Action>> {
    let path = resource_path(NODES_PATH, node.id());
    let mut actions = Vec::new();
    if !node.changes().is_empty() {
        actions.push(Action::patch(path.clone(), node.pending_changes()));
    }
    if node.has_pending_property_changes() {
        let mut body = JsonMap::new();
        body.insert(
            "properties".to_string(),
            Value::String(node.property_changes().to_wire()?),
        );
        actions.push(Action::patch(path, Value::Object(body)));
    }
    Ok(actions)
}

/// Number of patches `plan_node_update` produces for `node`.
fn update_step_count(node: &Node) -> usize {
    usize::from(!node.changes().is_empty()) + usize::from(node.has_pending_property_changes())
}

/// Every patch for every node, in order. `None` when nothing is pending.
pub fn plan_update<'n>(nodes: impl IntoIterator<Item = &'n Node>) -> ApiResult<Option<Sequence>> {
    let mut sequence = Sequence::default().named("nodes.update");
    for node in nodes {
        for action in plan_node_update(node)? {
            sequence.push(action);
        }
    }
    Ok((!sequence.is_empty()).then_some(sequence))
}

/// Node operations bound to a client.
pub struct Nodes<'a, T: Transport> {
    client: &'a Client<T>,
}

impl<'a, T: Transport> Nodes<'a, T> {
    pub fn new(client: &'a Client<T>) -> Self {
        Self { client }
    }

    pub async fn get_by_id(&self, node_id: &str) -> ApiResult<Node> {
        let value = plan_get_by_id(node_id).send(self.client).await?;
        Node::from_value(value)
    }

    /// Create one node with a direct `POST /api/nodes` and return it as the
    /// server stored it.
    pub async fn create(&self, draft: &NodeDraft) -> ApiResult<Node> {
        let response = plan_create(draft)?.send(self.client).await?;
        Node::from_response(&response.body)
    }

    /// Create several nodes in one batch.
    pub async fn create_many<'d>(
        &self,
        drafts: impl IntoIterator<Item = &'d NodeDraft>,
    ) -> ApiResult<Option<HttpResponse>> {
        let Some(sequence) = plan_create_many(drafts)? else {
            return Ok(None);
        };
        sequence.send(self.client).await.map(Some)
    }

    /// Patch every node with pending changes in one batch; no call when none
    /// has any. A node keeps its pending changes unless all of its steps
    /// succeeded.
    pub async fn update<'n>(&self, nodes: impl IntoIterator<Item = &'n mut Node>) -> ApiResult<Option<HttpResponse>> {
        let mut nodes: Vec<&mut Node> = nodes.into_iter().collect();
        let Some(sequence) = plan_update(nodes.iter().map(|node| &**node))? else {
            return Ok(None);
        };
        let step_counts: Vec<usize> = nodes.iter().map(|node| update_step_count(node)).collect();
        let response = sequence.send(self.client).await?;
        clear_confirmed(sequence.operation(), &mut nodes, &step_counts, &response);
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::ServerConfig;
    use crate::http::HttpMethod;
    use crate::session::Session;
    use crate::transport::testing::RecordingTransport;
    use crate::types::{Position, Properties};

    const NODE: &str = r#"{"id":"n1","map_id":"m1","parent":"p1","position":["R",1],"properties":{"global":{"title":"T"}},"nodelevel":2}"#;

    fn client(transport: RecordingTransport) -> Client<RecordingTransport> {
        let session = Session::new("ann@example.com", "secret").with_config(ServerConfig::new("http", "rf.test"));
        Client::with_transport(session, transport)
    }

    fn node(id: &str) -> Node {
        Node::from_value(json!({"id": id, "properties": {"global": {"title": "Old"}}})).unwrap()
    }

    #[tokio::test]
    async fn create_posts_encoded_draft() {
        let client = client(RecordingTransport::new().respond(200, NODE));
        let mut properties = Properties::new();
        properties.insert("global".to_string(), json!({"title": "T"}));
        let draft = NodeDraft::new("m1", "p1")
            .with_properties(properties)
            .with_position(Position("R".to_string(), 1));

        let created = client.nodes().create(&draft).await.unwrap();
        assert_eq!(created.id(), "n1");
        assert!(!created.has_pending_changes());

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].url, "http://rf.test/api/nodes");
        let body: Value = serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["map_id"], "m1");
        assert_eq!(body["parent"], "p1");
        let sent_properties: Value = serde_json::from_str(body["properties"].as_str().unwrap()).unwrap();
        assert_eq!(sent_properties, json!({"global": {"title": "T"}}));
        let sent_position: Value = serde_json::from_str(body["position"].as_str().unwrap()).unwrap();
        assert_eq!(sent_position, json!(["R", 1]));
    }

    #[test]
    fn field_and_property_changes_are_separate_patches() {
        let mut n = node("n1");
        n.set_hidden(true);
        n.set_property("global", "title", "New");

        let actions = plan_node_update(&n).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].payload(), &json!({"hidden": true}));
        assert_eq!(
            actions[1].payload(),
            &json!({"properties": "{\"update\":[{\"group\":\"global\",\"key\":\"title\",\"value\":\"New\"}]}"})
        );
        assert!(actions.iter().all(|a| a.method() == HttpMethod::Patch && a.path() == "/api/nodes/n1"));
    }

    #[test]
    fn property_only_change_is_one_patch() {
        let mut n = node("n1");
        n.set_property("global", "title", "New");
        let actions = plan_node_update(&n).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(actions[0].payload().get("properties").is_some());
    }

    #[tokio::test]
    async fn update_without_changes_makes_no_call() {
        let client = client(RecordingTransport::new());
        let mut a = node("a");
        let mut b = node("b");
        assert!(client.nodes().update([&mut a, &mut b]).await.unwrap().is_none());
        assert_eq!(client.transport().call_count(), 0);
    }

    #[tokio::test]
    async fn update_batches_in_node_order() {
        let client = client(RecordingTransport::new().respond(200, r#"[{"status":200},{"status":200}]"#));
        let mut a = node("a");
        let mut b = node("b");
        let mut c = node("c");
        a.set_parent("p2");
        c.set_property("global", "title", "C");

        client.nodes().update([&mut a, &mut b, &mut c]).await.unwrap();

        let request = &client.transport().requests()[0];
        let steps: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        let urls: Vec<&str> = steps
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["url"].as_str().unwrap())
            .collect();
        assert_eq!(urls, vec!["/api/nodes/a", "/api/nodes/c"]);
        assert!(!a.has_pending_changes());
        assert!(!c.has_pending_changes());
    }

    #[tokio::test]
    async fn create_many_is_one_batch() {
        let client = client(RecordingTransport::new());
        let drafts = vec![NodeDraft::new("m1", "p1"), NodeDraft::new("m1", "p1").with_title("Second")];
        client.nodes().create_many(&drafts).await.unwrap();

        let request = &client.transport().requests()[0];
        assert!(request.url.ends_with("/api/batch"));
        let steps: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(steps.as_array().unwrap().len(), 2);
        assert_eq!(steps[0]["url"], "/api/nodes");

        assert!(client.nodes().create_many(std::iter::empty::<&NodeDraft>()).await.unwrap().is_none());
        assert_eq!(client.transport().call_count(), 1);
    }

    #[tokio::test]
    async fn get_by_id_decodes_node() {
        let client = client(RecordingTransport::new().respond(200, NODE));
        let n = client.nodes().get_by_id("n1").await.unwrap();
        assert_eq!(n.parent(), "p1");
        assert_eq!(n.nodelevel(), 2);
        assert_eq!(n.property("global", "title"), Some(&json!("T")));
    }

    #[tokio::test]
    async fn node_with_a_failed_step_keeps_both_change_kinds() {
        let client = client(RecordingTransport::new().respond(
            200,
            r#"[{"status":200},{"status":200},{"status":400},{"status":200}]"#,
        ));
        let mut a = node("a");
        let mut b = node("b");
        a.set_hidden(true);
        b.set_hidden(true);
        b.set_property("global", "title", "B");
        a.set_property("global", "title", "A");

        client.nodes().update([&mut a, &mut b]).await.unwrap();

        assert!(!a.has_pending_changes());
        assert!(b.has_pending_changes());
        assert!(!b.changes().is_empty());
        assert!(b.has_pending_property_changes());
    }

    #[test]
    fn node_ids_are_encoded_in_paths() {
        let mut n = node("x/../y");
        n.set_hidden(true);
        assert_eq!(plan_node_update(&n).unwrap()[0].path(), "/api/nodes/x%2F..%2Fy");
    }

    #[test]
    fn plans_carry_operation_names() {
        assert_eq!(plan_get_by_id("n1").operation(), "nodes.get_by_id");
        let mut n = node("n1");
        n.set_hidden(true);
        assert_eq!(plan_update([&n]).unwrap().unwrap().operation(), "nodes.update");
    }
}
