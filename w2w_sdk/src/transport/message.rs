use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::definitions::DidCommMessage;

/// Fields the relay owns on a stored message
const RELAY_FIELDS: [&str; 4] = ["_id", "to", "from", "msg"];

/// A message as stored by the relay, optionally merged with its resolved content
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// The raw message, or after resolution its `body`
    #[serde(default)]
    pub msg: Value,
    /// Fields of the resolved message (`id`, `type`, `body`, ...)
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl RelayMessage {
    /// Merge the resolved message onto this record
    ///
    /// The relay's `_id`, `to` and `from` win over the resolved ones; `msg`
    /// becomes the resolved `body`.
    pub(crate) fn merge_resolved(mut self, resolved: Value) -> Self {
        let Value::Object(fields) = resolved else {
            return self;
        };

        if self.from.is_none() {
            self.from = fields
                .get("from")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        for (key, value) in fields {
            if !RELAY_FIELDS.contains(&key.as_str()) {
                self.payload.insert(key, value);
            }
        }

        self.msg = self.payload.get("body").cloned().unwrap_or_default();

        self
    }

    /// The message `type`, if the record was resolved
    pub fn message_type(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }

    /// View a resolved record as an application message
    pub fn to_didcomm(&self) -> Option<DidCommMessage> {
        let message_type = self.message_type()?.to_string();

        let id = self
            .payload
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
            .to_string();

        Some(DidCommMessage {
            id,
            message_type,
            from: self.from.clone(),
            to: if self.to.is_empty() {
                vec![]
            } else {
                vec![self.to.clone()]
            },
            body: self.payload.get("body").cloned().unwrap_or_default(),
        })
    }
}
