use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// Decoded upstream response body, split by shape.
///
/// The merge policy differs per shape, so it is matched on explicitly
/// instead of inspecting a raw `serde_json::Value` at each step.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Object(Map<String, JsonValue>),
    Array(Vec<JsonValue>),
    Scalar(JsonValue),
}

impl Payload {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice::<JsonValue>(bytes).map(Payload::from)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl From<JsonValue> for Payload {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => Payload::Object(map),
            JsonValue::Array(items) => Payload::Array(items),
            other => Payload::Scalar(other),
        }
    }
}

impl From<Payload> for JsonValue {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Object(map) => JsonValue::Object(map),
            Payload::Array(items) => JsonValue::Array(items),
            Payload::Scalar(value) => value,
        }
    }
}
