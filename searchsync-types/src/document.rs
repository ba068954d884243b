//! Documents read from the primary store and their wire form.
//!
//! A [`Document`] may carry store-native values (object ids, timestamps).
//! Before anything is sent to the search engine it is normalized into a
//! [`NormalizedDocument`], whose body is plain JSON: object ids become hex
//! strings and timestamps become ISO-8601 strings, at any nesting depth.

use crate::ids::{DocumentId, ObjectId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Field name the primary store uses for the document key. It never appears
/// in a normalized body; the id travels in the URI or bulk command instead.
pub const ID_FIELD: &str = "_id";

/// A single field value as stored in the primary store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    ObjectId(ObjectId),
    Date(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Converts to canonical JSON.
    ///
    /// Non-finite floats have no JSON representation and become `null`.
    #[must_use]
    pub fn normalize(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Number((*i).into()),
            Self::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
            Self::ObjectId(id) => Value::String(id.to_hex()),
            Self::Date(at) => Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Array(items) => Value::Array(items.iter().map(Self::normalize).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.normalize()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<ObjectId> for FieldValue {
    fn from(id: ObjectId) -> Self {
        Self::ObjectId(id)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(at: DateTime<Utc>) -> Self {
        Self::Date(at)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        Self::Array(items)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => Self::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

/// A record owned by the primary store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: DocumentId,
    fields: BTreeMap<String, FieldValue>,
}

impl Document {
    /// Creates an empty document with the given id.
    pub fn new(id: impl Into<DocumentId>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Creates a document keyed by a freshly generated [`ObjectId`].
    #[must_use]
    pub fn with_new_id() -> Self {
        Self::new(ObjectId::new())
    }

    /// Adds a field (builder style).
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns the document id.
    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Returns all fields.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Produces the wire form of this document.
    #[must_use]
    pub fn normalize(&self) -> NormalizedDocument {
        let body = self
            .fields
            .iter()
            .filter(|(name, _)| name.as_str() != ID_FIELD)
            .map(|(name, value)| (name.clone(), value.normalize()))
            .collect();

        NormalizedDocument {
            id: self.id.clone(),
            body,
        }
    }
}

/// A document whose body contains only canonical JSON values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedDocument {
    #[serde(skip)]
    id: DocumentId,
    #[serde(flatten)]
    body: Map<String, Value>,
}

impl NormalizedDocument {
    /// Returns the document id.
    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Returns the JSON body.
    #[must_use]
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Serializes the body to a JSON string.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(&self.body)?)
    }
}
