//! Change tracking for entities mirrored from the server.
//!
//! # Design
//! Fields of `User`, `Map` and `Node` are private and only writable through
//! generated setters. Each setter stores the value and records it in the
//! entity's `Changes` under its wire key, so the set of tracked fields is
//! closed and known at compile time. The tracker records assignments, not
//! differences: writing the current value again is still a pending change.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;

use crate::error::{ApiError, ApiResult};

/// Fields assigned since construction or since the last sync, keyed by wire
/// name. Keeps first-assignment order; re-assigning overwrites in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Changes(Map<String, Value>);

impl Changes {
    pub fn record(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// The changes as a JSON object, ready to be sent as a patch body.
    pub fn to_payload(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// An in-memory mirror of a server-side object.
pub trait Entity: DeserializeOwned {
    /// Name used in log lines and error context.
    const KIND: &'static str;

    fn changes(&self) -> &Changes;

    /// Forget every pending change. Field values are left as they are.
    fn clear_changes(&mut self);

    fn has_pending_changes(&self) -> bool {
        !self.changes().is_empty()
    }

    /// Pending field changes as a JSON object.
    fn pending_changes(&self) -> Value {
        self.changes().to_payload()
    }

    /// Decode a server representation. The result has no pending changes.
    fn from_value(value: Value) -> ApiResult<Self> {
        let mut entity: Self = serde_json::from_value(value).map_err(decode_error::<Self>)?;
        entity.clear_changes();
        Ok(entity)
    }

    /// Decode a response body. The result has no pending changes.
    fn from_response(body: &str) -> ApiResult<Self> {
        let mut entity: Self = serde_json::from_str(body).map_err(decode_error::<Self>)?;
        entity.clear_changes();
        Ok(entity)
    }
}

fn decode_error<E: Entity>(err: serde_json::Error) -> ApiError {
    error!(kind = E::KIND, error = %err, "failed to decode entity");
    ApiError::DeserializationError(format!("{}: {err}", E::KIND))
}

/// Generates a getter and a change-recording setter for each listed field.
///
/// `str` fields get a `&str` getter, `copy` fields return by value and `ref`
/// fields return a reference. The literal is the key recorded in `changes`.
macro_rules! tracked_fields {
    ($entity:ty { $($mode:ident $field:ident / $setter:ident: $ty:ty => $key:literal;)+ }) => {
        impl $entity {
            $(
                tracked_fields!(@get $mode $field: $ty);

                #[doc = concat!("Set `", $key, "` and record it as a pending change.")]
                pub fn $setter(&mut self, value: impl Into<$ty>) -> &mut Self {
                    self.$field = value.into();
                    self.changes.record($key, self.$field.clone());
                    self
                }
            )+
        }
    };
    (@get str $field:ident: $ty:ty) => {
        pub fn $field(&self) -> &str {
            &self.$field
        }
    };
    (@get copy $field:ident: $ty:ty) => {
        pub fn $field(&self) -> $ty {
            self.$field
        }
    };
    (@get ref $field:ident: $ty:ty) => {
        pub fn $field(&self) -> &$ty {
            &self.$field
        }
    };
}

pub(crate) use tracked_fields;

/// Treats an explicit `null` like a missing field.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + serde::Deserialize<'de>,
{
    use serde::Deserialize;
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_overwrites_in_place() {
        let mut changes = Changes::default();
        changes.record("name", "a");
        changes.record("layout", "LR");
        changes.record("name", "b");
        assert_eq!(changes.len(), 2);
        assert_eq!(changes.keys().collect::<Vec<_>>(), vec!["name", "layout"]);
        assert_eq!(changes.get("name"), Some(&Value::from("b")));
    }

    #[test]
    fn payload_is_a_json_object() {
        let mut changes = Changes::default();
        changes.record("public", true);
        changes.record("node_count", 3);
        assert_eq!(
            changes.to_payload(),
            serde_json::json!({"public": true, "node_count": 3})
        );
    }

    #[test]
    fn clear_empties_everything() {
        let mut changes = Changes::default();
        changes.record("name", "x");
        changes.clear();
        assert!(changes.is_empty());
        assert!(!changes.contains("name"));
        assert_eq!(changes.to_payload(), serde_json::json!({}));
    }
}
