//! Users, maps and nodes as the RedForester API represents them.
//!
//! Decoding is lenient: absent fields take their defaults, so a partial
//! server response still yields an entity.

use chrono::Utc;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map as JsonMap, Value};

use crate::entity::{nullable, tracked_fields, Changes, Entity};
use crate::error::{ApiError, ApiResult};

/// Node properties: groups (`global`, `style`, ...) of key/value pairs.
pub type Properties = JsonMap<String, Value>;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A RedForester account.
///
/// `current` is local: it is `true` only for the user the session is
/// authenticated as, and the server accepts profile patches only for that user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(skip)]
    current: bool,
    #[serde(deserialize_with = "nullable")]
    user_id: String,
    #[serde(deserialize_with = "nullable")]
    username: String,
    #[serde(deserialize_with = "nullable")]
    name: String,
    #[serde(deserialize_with = "nullable")]
    surname: String,
    #[serde(deserialize_with = "nullable")]
    avatar: String,
    #[serde(deserialize_with = "nullable")]
    registration_date: String,
    #[serde(deserialize_with = "nullable")]
    birthday: String,
    #[serde(deserialize_with = "nullable")]
    kv_session: String,
    #[serde(deserialize_with = "nullable")]
    is_extension_user: bool,
    #[serde(skip)]
    changes: Changes,
}

tracked_fields!(User {
    str user_id / set_user_id: String => "user_id";
    str username / set_username: String => "username";
    str name / set_name: String => "name";
    str surname / set_surname: String => "surname";
    str avatar / set_avatar: String => "avatar";
    str registration_date / set_registration_date: String => "registration_date";
    str birthday / set_birthday: String => "birthday";
    str kv_session / set_kv_session: String => "kv_session";
    copy is_extension_user / set_is_extension_user: bool => "is_extension_user";
});

impl User {
    pub fn is_current(&self) -> bool {
        self.current
    }

    pub(crate) fn mark_current(&mut self, current: bool) {
        self.current = current;
    }
}

impl Entity for User {
    const KIND: &'static str = "user";

    fn changes(&self) -> &Changes {
        &self.changes
    }

    fn clear_changes(&mut self) {
        self.changes.clear();
    }
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

/// A mind map. `Map::default()` is an empty draft for `Maps::create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Map {
    #[serde(deserialize_with = "nullable")]
    id: String,
    #[serde(deserialize_with = "nullable")]
    root_node_id: String,
    #[serde(deserialize_with = "nullable")]
    owner: String,
    #[serde(deserialize_with = "nullable")]
    owner_name: String,
    #[serde(deserialize_with = "nullable")]
    owner_avatar: String,
    #[serde(deserialize_with = "nullable")]
    layout: String,
    #[serde(deserialize_with = "nullable")]
    public: bool,
    #[serde(deserialize_with = "nullable")]
    node_count: i64,
    #[serde(deserialize_with = "nullable")]
    user_count: i64,
    #[serde(deserialize_with = "nullable")]
    name: String,
    #[serde(skip)]
    changes: Changes,
}

impl Default for Map {
    fn default() -> Self {
        Self {
            id: String::new(),
            root_node_id: String::new(),
            owner: String::new(),
            owner_name: String::new(),
            owner_avatar: String::new(),
            layout: "LR".to_string(),
            public: false,
            node_count: 0,
            user_count: 0,
            name: "noname".to_string(),
            changes: Changes::default(),
        }
    }
}

tracked_fields!(Map {
    str id / set_id: String => "id";
    str root_node_id / set_root_node_id: String => "root_node_id";
    str owner / set_owner: String => "owner";
    str owner_name / set_owner_name: String => "owner_name";
    str owner_avatar / set_owner_avatar: String => "owner_avatar";
    str layout / set_layout: String => "layout";
    copy public / set_public: bool => "public";
    copy node_count / set_node_count: i64 => "node_count";
    copy user_count / set_user_count: i64 => "user_count";
    str name / set_name: String => "name";
});

impl Entity for Map {
    const KIND: &'static str = "map";

    fn changes(&self) -> &Changes {
        &self.changes
    }

    fn clear_changes(&mut self) {
        self.changes.clear();
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Placement of a node under its parent: side (`"R"`, `"L"`) and index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position(pub String, pub i64);

impl Default for Position {
    fn default() -> Self {
        Position("R".to_string(), 1)
    }
}

/// Accepts `[side, index]` with the index as a number or a numeric string.
/// Missing elements take the default.
impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<Value>::deserialize(deserializer)?;
        let Position(default_side, default_index) = Position::default();
        let side = match raw.first() {
            Some(Value::String(side)) => side.clone(),
            _ => default_side,
        };
        let index = match raw.get(1) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| <D::Error as de::Error>::custom(format!("position index {n} is out of range")))?,
            Some(Value::String(text)) => text
                .trim()
                .parse()
                .map_err(|_| <D::Error as de::Error>::custom(format!("position index {text:?} is not an integer")))?,
            _ => default_index,
        };
        Ok(Position(side, index))
    }
}

impl From<Position> for Value {
    fn from(position: Position) -> Self {
        Value::Array(vec![Value::String(position.0), Value::from(position.1)])
    }
}

/// One nested property assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyUpdate {
    pub group: String,
    pub key: String,
    pub value: Value,
}

/// Nested property assignments, sent apart from flat field patches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyChanges {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    update: Vec<PropertyUpdate>,
}

impl PropertyChanges {
    pub fn is_empty(&self) -> bool {
        self.update.is_empty()
    }

    pub fn updates(&self) -> &[PropertyUpdate] {
        &self.update
    }

    pub fn clear(&mut self) {
        self.update.clear();
    }

    /// The `{"update": [...]}` document, JSON-encoded as the API expects it.
    pub fn to_wire(&self) -> ApiResult<String> {
        serde_json::to_string(self).map_err(|e| ApiError::SerializationError(e.to_string()))
    }
}

/// A node of a map.
///
/// The server nests a node's properties in `body.properties`; the top-level
/// `properties` field is only filled on some responses and is used as a
/// fallback by [`Node::property`] and [`Node::set_property`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    #[serde(deserialize_with = "nullable")]
    id: String,
    #[serde(deserialize_with = "nullable")]
    map_id: String,
    #[serde(deserialize_with = "nullable")]
    parent: String,
    #[serde(deserialize_with = "nullable")]
    position: Position,
    #[serde(deserialize_with = "nullable")]
    properties: Properties,
    #[serde(deserialize_with = "nullable")]
    access: String,
    #[serde(rename = "originalParent", deserialize_with = "nullable")]
    original_parent: String,
    body: Value,
    #[serde(deserialize_with = "nullable")]
    hidden: bool,
    #[serde(deserialize_with = "nullable")]
    readers: Vec<Value>,
    #[serde(deserialize_with = "nullable")]
    nodelevel: i64,
    #[serde(deserialize_with = "nullable")]
    meta: JsonMap<String, Value>,
    #[serde(skip)]
    changes: Changes,
    #[serde(skip)]
    property_changes: PropertyChanges,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            id: String::new(),
            map_id: String::new(),
            parent: String::new(),
            position: Position::default(),
            properties: Properties::new(),
            access: String::new(),
            original_parent: String::new(),
            body: Value::Null,
            hidden: false,
            readers: Vec::new(),
            nodelevel: 1,
            meta: JsonMap::new(),
            changes: Changes::default(),
            property_changes: PropertyChanges::default(),
        }
    }
}

tracked_fields!(Node {
    str id / set_id: String => "id";
    str map_id / set_map_id: String => "map_id";
    str parent / set_parent: String => "parent";
    ref position / set_position: Position => "position";
    ref properties / set_properties: Properties => "properties";
    str access / set_access: String => "access";
    str original_parent / set_original_parent: String => "originalParent";
    ref body / set_body: Value => "body";
    copy hidden / set_hidden: bool => "hidden";
    ref readers / set_readers: Vec<Value> => "readers";
    copy nodelevel / set_nodelevel: i64 => "nodelevel";
    ref meta / set_meta: JsonMap<String, Value> => "meta";
});

impl Node {
    /// Value of property `key` in `group`.
    pub fn property(&self, group: &str, key: &str) -> Option<&Value> {
        self.body
            .get("properties")
            .and_then(|properties| properties.get(group))
            .and_then(|group| group.get(key))
            .or_else(|| self.properties.get(group)?.get(key))
    }

    /// Assign an existing property and record it as a nested change.
    ///
    /// Returns `false`, leaving the node untouched, when `group` or `key`
    /// does not exist on the node.
    pub fn set_property(&mut self, group: &str, key: &str, value: impl Into<Value>) -> bool {
        let nested = self
            .body
            .get_mut("properties")
            .and_then(|properties| properties.get_mut(group))
            .and_then(|group| group.get_mut(key));
        let Some(slot) = nested.or_else(|| self.properties.get_mut(group)?.get_mut(key)) else {
            return false;
        };
        let value = value.into();
        *slot = value.clone();
        self.property_changes.update.push(PropertyUpdate {
            group: group.to_string(),
            key: key.to_string(),
            value,
        });
        true
    }

    pub fn property_changes(&self) -> &PropertyChanges {
        &self.property_changes
    }

    pub fn has_pending_property_changes(&self) -> bool {
        !self.property_changes.is_empty()
    }
}

impl Entity for Node {
    const KIND: &'static str = "node";

    fn changes(&self) -> &Changes {
        &self.changes
    }

    fn clear_changes(&mut self) {
        self.changes.clear();
        self.property_changes.clear();
    }

    fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty() || !self.property_changes.is_empty()
    }
}

/// Input for creating a node under `parent` in map `map_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDraft {
    pub map_id: String,
    pub parent: String,
    pub properties: Properties,
    pub position: Position,
}

impl NodeDraft {
    /// Draft titled with the current UTC time, placed at `("R", 1)`.
    pub fn new(map_id: impl Into<String>, parent: impl Into<String>) -> Self {
        let mut global = JsonMap::new();
        global.insert("title".to_string(), Value::String(Utc::now().to_rfc3339()));
        let mut properties = Properties::new();
        properties.insert("global".to_string(), Value::Object(global));
        Self {
            map_id: map_id.into(),
            parent: parent.into(),
            properties,
            position: Position::default(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Replace the `global.title` property.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let global = self
            .properties
            .entry("global")
            .or_insert_with(|| Value::Object(JsonMap::new()));
        if !global.is_object() {
            *global = Value::Object(JsonMap::new());
        }
        if let Value::Object(group) = global {
            group.insert("title".to_string(), Value::String(title.into()));
        }
        self
    }

    /// `POST /api/nodes` body: `properties` and `position` travel as JSON
    /// strings.
    pub fn to_payload(&self) -> ApiResult<Value> {
        let properties = serde_json::to_string(&self.properties)
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let position = serde_json::to_string(&self.position)
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;

        let mut body = JsonMap::new();
        body.insert("map_id".to_string(), Value::String(self.map_id.clone()));
        body.insert("parent".to_string(), Value::String(self.parent.clone()));
        body.insert("properties".to_string(), Value::String(properties));
        body.insert("position".to_string(), Value::String(position));
        Ok(Value::Object(body))
    }
}
