//! Label Studio webhook payload types.
//!
//! Result entries carry whatever keys the platform sends. Only `type`,
//! `from_name`, `to_name` and `value` are interpreted; everything else is
//! kept in [`ResultEntry::extra`] so untouched entries are written back
//! exactly as they were received.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `type` tag of a multi-choice selection entry.
pub const KIND_CHOICES: &str = "choices";
/// `type` tag of a numeric entry.
pub const KIND_NUMBER: &str = "number";

/// One structured unit of an annotation's output.
///
/// Parsing never fails: a `type`, `from_name` or `to_name` that is not a
/// string stays in [`extra`](Self::extra) under its own key, and an item that
/// is not an object at all is carried opaquely. Either way the entry
/// serializes back to exactly what was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct ResultEntry {
    /// Value type, e.g. `choices` or `number`.
    pub kind: Option<String>,
    /// Control (form field) name this entry belongs to.
    pub from_name: Option<String>,
    /// Object (content) name this entry annotates.
    pub to_name: Option<String>,
    pub value: Option<Value>,
    /// Keys not interpreted here (`id`, `origin`, ...).
    pub extra: Map<String, Value>,
    /// The raw item when it is not a JSON object.
    opaque: Option<Value>,
}

impl From<Value> for ResultEntry {
    fn from(raw: Value) -> Self {
        let mut map = match raw {
            Value::Object(map) => map,
            other => {
                return Self {
                    kind: None,
                    from_name: None,
                    to_name: None,
                    value: None,
                    extra: Map::new(),
                    opaque: Some(other),
                };
            }
        };
        let kind = take_string(&mut map, "type");
        let from_name = take_string(&mut map, "from_name");
        let to_name = take_string(&mut map, "to_name");
        let value = map.remove("value");
        Self {
            kind,
            from_name,
            to_name,
            value,
            extra: map,
            opaque: None,
        }
    }
}

impl From<ResultEntry> for Value {
    fn from(entry: ResultEntry) -> Self {
        if let Some(raw) = entry.opaque {
            return raw;
        }
        let mut map = entry.extra;
        if let Some(kind) = entry.kind {
            map.insert("type".to_string(), Value::String(kind));
        }
        if let Some(from_name) = entry.from_name {
            map.insert("from_name".to_string(), Value::String(from_name));
        }
        if let Some(to_name) = entry.to_name {
            map.insert("to_name".to_string(), Value::String(to_name));
        }
        if let Some(value) = entry.value {
            map.insert("value".to_string(), value);
        }
        Value::Object(map)
    }
}

/// Remove `key` if it holds a string; anything else is left in place.
fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            map.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

/// Kind-specific view of a [`ResultEntry`]'s `value`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<'a> {
    /// Selected choice strings. Non-string items are dropped.
    Choices(Vec<&'a str>),
    Number(&'a serde_json::Number),
    /// Unknown kind, or a known kind whose value has the wrong shape.
    Unrecognized,
}

impl ResultEntry {
    /// Build a numeric entry, the shape used for the written-back score.
    pub fn number(from_name: &str, to_name: &str, number: impl Into<serde_json::Number>) -> Self {
        let mut value = Map::new();
        value.insert(KIND_NUMBER.to_string(), Value::Number(number.into()));
        Self {
            kind: Some(KIND_NUMBER.to_string()),
            from_name: Some(from_name.to_string()),
            to_name: Some(to_name.to_string()),
            value: Some(Value::Object(value)),
            extra: Map::new(),
            opaque: None,
        }
    }

    /// Build a multi-choice entry.
    pub fn choices<S: AsRef<str>>(from_name: &str, to_name: &str, choices: &[S]) -> Self {
        let list = choices
            .iter()
            .map(|c| Value::String(c.as_ref().to_string()))
            .collect();
        let mut value = Map::new();
        value.insert(KIND_CHOICES.to_string(), Value::Array(list));
        Self {
            kind: Some(KIND_CHOICES.to_string()),
            from_name: Some(from_name.to_string()),
            to_name: Some(to_name.to_string()),
            value: Some(Value::Object(value)),
            extra: Map::new(),
            opaque: None,
        }
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn from_name(&self) -> Option<&str> {
        self.from_name.as_deref()
    }

    /// Interpret `value` according to `type`.
    ///
    /// A `choices` entry without a `choices` list yields an empty selection
    /// rather than [`Payload::Unrecognized`]: the annotator simply picked
    /// nothing.
    pub fn payload(&self) -> Payload<'_> {
        let value = self.value.as_ref().and_then(Value::as_object);
        match self.kind() {
            Some(KIND_CHOICES) => {
                let choices = value
                    .and_then(|v| v.get(KIND_CHOICES))
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                Payload::Choices(choices)
            }
            Some(KIND_NUMBER) => match value.and_then(|v| v.get(KIND_NUMBER)) {
                Some(Value::Number(n)) => Payload::Number(n),
                _ => Payload::Unrecognized,
            },
            _ => Payload::Unrecognized,
        }
    }
}

/// An annotation as embedded in a webhook event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Platform identifier. Numeric strings are accepted; `0` and anything
    /// non-numeric are treated the same as absent.
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_result")]
    pub result: Vec<ResultEntry>,
}

impl Annotation {
    /// The identifier, if present and non-zero.
    pub fn annotation_id(&self) -> Option<u64> {
        self.id.filter(|id| *id != 0)
    }
}

/// Inbound webhook delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(default, deserialize_with = "lenient_action")]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "lenient_annotation")]
    pub annotation: Annotation,
}

/// Webhook actions that trigger scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    AnnotationCreated,
    AnnotationUpdated,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ANNOTATION_CREATED" => Some(Self::AnnotationCreated),
            "ANNOTATION_UPDATED" => Some(Self::AnnotationUpdated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnnotationCreated => "ANNOTATION_CREATED",
            Self::AnnotationUpdated => "ANNOTATION_UPDATED",
        }
    }
}

impl WebhookEvent {
    /// Parse a request body. An empty body is an empty event.
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
    }

    /// The scoring action, if this event carries one.
    pub fn scoring_action(&self) -> Option<Action> {
        self.action.as_deref().and_then(Action::parse)
    }
}

fn lenient_id<'de, D>(de: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(de)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A missing, `null` or non-list `result` is an empty one.
fn lenient_result<'de, D>(de: D) -> Result<Vec<ResultEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(de)? {
        Some(Value::Array(items)) => items.into_iter().map(ResultEntry::from).collect(),
        _ => Vec::new(),
    })
}

fn lenient_action<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(de)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_annotation<'de, D>(de: D) -> Result<Annotation, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(de)? {
        Some(raw @ Value::Object(_)) => {
            serde_json::from_value(raw).map_err(serde::de::Error::custom)
        }
        _ => Ok(Annotation::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_keys_roundtrip() {
        let raw = json!({
            "id": "aB3x",
            "type": "textarea",
            "from_name": "notes",
            "to_name": "text",
            "origin": "manual",
            "value": { "text": ["looks fine"] }
        });
        let entry: ResultEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(entry.extra.get("origin"), Some(&json!("manual")));
        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);
    }

    #[test]
    fn choices_payload() {
        let entry: ResultEntry = serde_json::from_value(json!({
            "type": "choices",
            "from_name": "errors",
            "to_name": "text",
            "value": { "choices": ["Temporal Accuracy Error", 7, "Internal Consistency Error"] }
        }))
        .unwrap();
        assert_eq!(
            entry.payload(),
            Payload::Choices(vec!["Temporal Accuracy Error", "Internal Consistency Error"])
        );
    }

    #[test]
    fn choices_without_list_is_empty_selection() {
        let entry: ResultEntry = serde_json::from_value(json!({
            "type": "choices",
            "from_name": "errors",
            "value": { "choices": null }
        }))
        .unwrap();
        assert_eq!(entry.payload(), Payload::Choices(vec![]));

        let bare: ResultEntry =
            serde_json::from_value(json!({ "type": "choices", "from_name": "errors" })).unwrap();
        assert_eq!(bare.payload(), Payload::Choices(vec![]));
    }

    #[test]
    fn number_payload() {
        let entry = ResultEntry::number("final_score", "text", 75);
        match entry.payload() {
            Payload::Number(n) => assert_eq!(n.as_u64(), Some(75)),
            other => panic!("expected number, got {other:?}"),
        }
        let broken: ResultEntry =
            serde_json::from_value(json!({ "type": "number", "value": { "number": "75" } }))
                .unwrap();
        assert_eq!(broken.payload(), Payload::Unrecognized);
    }

    #[test]
    fn unknown_kind_is_unrecognized() {
        let entry: ResultEntry = serde_json::from_value(json!({
            "type": "rating",
            "from_name": "stars",
            "value": { "rating": 4 }
        }))
        .unwrap();
        assert_eq!(entry.payload(), Payload::Unrecognized);
    }

    #[test]
    fn score_entry_wire_shape() {
        let entry = ResultEntry::number("final_score", "text", 88);
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "type": "number",
                "from_name": "final_score",
                "to_name": "text",
                "value": { "number": 88 }
            })
        );
    }

    #[test]
    fn event_parse() {
        let event = WebhookEvent::from_slice(
            br#"{
                "action": "ANNOTATION_UPDATED",
                "annotation": { "id": 42, "result": [], "lead_time": 3.5 },
                "project": { "id": 1 }
            }"#,
        )
        .unwrap();
        assert_eq!(event.scoring_action(), Some(Action::AnnotationUpdated));
        assert_eq!(event.annotation.annotation_id(), Some(42));
    }

    #[test]
    fn empty_body_is_empty_event() {
        let event = WebhookEvent::from_slice(b"  \n").unwrap();
        assert!(event.action.is_none());
        assert!(event.annotation.annotation_id().is_none());
    }

    #[test]
    fn null_annotation_and_result() {
        let event = WebhookEvent::from_slice(
            br#"{ "action": "ANNOTATION_CREATED", "annotation": null }"#,
        )
        .unwrap();
        assert_eq!(event.annotation, Annotation::default());

        let event = WebhookEvent::from_slice(
            br#"{ "action": "ANNOTATION_CREATED", "annotation": { "id": 3, "result": null } }"#,
        )
        .unwrap();
        assert!(event.annotation.result.is_empty());
    }

    #[test]
    fn zero_id_counts_as_missing() {
        let ann = Annotation {
            id: Some(0),
            result: vec![],
        };
        assert!(ann.annotation_id().is_none());
    }

    #[test]
    fn non_string_names_kept_in_extra() {
        let raw = json!({ "type": "rating", "from_name": 5, "to_name": null, "value": { "rating": 4 } });
        let entry: ResultEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(entry.kind(), Some("rating"));
        assert!(entry.from_name().is_none());
        assert!(entry.to_name.is_none());
        assert_eq!(entry.extra.get("from_name"), Some(&json!(5)));
        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);
    }

    #[test]
    fn non_object_items_carried_opaquely() {
        let raw = json!([null, "stray", 3, { "type": "choices", "from_name": "errors" }]);
        let entries: Vec<ResultEntry> = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(entries.len(), 4);
        assert!(entries[..3].iter().all(|e| e.from_name().is_none()));
        assert_eq!(entries[0].payload(), Payload::Unrecognized);
        assert_eq!(serde_json::to_value(&entries).unwrap(), raw);
    }

    #[test]
    fn numeric_string_id_accepted() {
        let event = WebhookEvent::from_slice(
            br#"{ "action": "ANNOTATION_CREATED", "annotation": { "id": " 7 " } }"#,
        )
        .unwrap();
        assert_eq!(event.annotation.annotation_id(), Some(7));

        for id in [r#""abc""#, "-3", "1.5", "true"] {
            let body = format!(r#"{{ "action": "ANNOTATION_CREATED", "annotation": {{ "id": {id} }} }}"#);
            let event = WebhookEvent::from_slice(body.as_bytes()).unwrap();
            assert!(event.annotation.annotation_id().is_none(), "id {id}");
        }
    }

    #[test]
    fn odd_shapes_do_not_fail_parse() {
        let event = WebhookEvent::from_slice(
            br#"{ "action": 12, "annotation": { "id": 1, "result": { "not": "a list" } } }"#,
        )
        .unwrap();
        assert!(event.action.is_none());
        assert!(event.annotation.result.is_empty());

        let event =
            WebhookEvent::from_slice(br#"{ "action": "ANNOTATION_CREATED", "annotation": "x" }"#)
                .unwrap();
        assert_eq!(event.annotation, Annotation::default());
    }

    #[test]
    fn action_parse() {
        assert_eq!(
            Action::parse("ANNOTATION_CREATED"),
            Some(Action::AnnotationCreated)
        );
        assert_eq!(Action::parse("ANNOTATION_DELETED"), None);
        assert_eq!(Action::AnnotationUpdated.as_str(), "ANNOTATION_UPDATED");
    }
}
