//! Plain record model shared by recipes, users and comments.
//!
//! # Responsibility
//! - Define the identity-plus-attributes shape every collection stores.
//! - Provide shallow merge semantics used by `merge` saves.
//!
//! # Invariants
//! - `object_id` is assigned by the backend and never rewritten locally.
//! - `attributes` never contains the `objectId` key; identity lives only in
//!   `object_id`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend-assigned identity of one record.
pub type ObjectId = String;

/// Free-form record attributes.
pub type Attributes = Map<String, Value>;

/// Wire name of the identity field in plain data.
pub const OBJECT_ID_FIELD: &str = "objectId";

/// One keyed record as plain data.
///
/// Serializes flat, e.g. `{"objectId": "r1", "title": "Soup"}`. A record
/// without identity and attributes serializes as `{}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    #[serde(
        rename = "objectId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub object_id: Option<ObjectId>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl Record {
    /// Creates an empty record without identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record with a known identity.
    pub fn with_id(object_id: impl Into<ObjectId>) -> Self {
        Self {
            object_id: Some(object_id.into()),
            attributes: Attributes::new(),
        }
    }

    /// Builds a record from raw attributes.
    ///
    /// An `objectId` string attribute is lifted into `object_id`.
    pub fn from_attributes(mut attributes: Attributes) -> Self {
        let object_id = match attributes.remove(OBJECT_ID_FIELD) {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id),
            _ => None,
        };
        Self {
            object_id,
            attributes,
        }
    }

    /// Builds a comment record pointing at its parent recipe.
    pub fn comment(recipe_id: &str, text: impl Into<String>) -> Self {
        let mut pointer = Attributes::new();
        pointer.insert(
            OBJECT_ID_FIELD.to_string(),
            Value::String(recipe_id.to_string()),
        );

        Self::new()
            .set("recipe", Value::Object(pointer))
            .set("text", Value::String(text.into()))
    }

    /// Builder-style attribute setter.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts one attribute, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        if key == OBJECT_ID_FIELD {
            return None;
        }
        self.attributes.insert(key, value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    /// Returns whether the record carries neither identity nor attributes.
    pub fn is_empty(&self) -> bool {
        self.object_id.is_none() && self.attributes.is_empty()
    }

    /// Shallow-merges `incoming` into this record.
    ///
    /// Keys present in `incoming` overwrite, absent keys are kept. Identity
    /// is only adopted when this record has none.
    pub fn merge_from(&mut self, incoming: &Record) {
        if self.object_id.is_none() {
            self.object_id = incoming.object_id.clone();
        }
        for (key, value) in &incoming.attributes {
            self.attributes.insert(key.clone(), value.clone());
        }
    }

    /// Returns the plain JSON form of this record.
    pub fn to_value(&self) -> Value {
        let mut object = self.attributes.clone();
        if let Some(object_id) = &self.object_id {
            object.insert(
                OBJECT_ID_FIELD.to_string(),
                Value::String(object_id.clone()),
            );
        }
        Value::Object(object)
    }
}
