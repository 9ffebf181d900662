//! Record types
//!
//! Canonical records (typed, provider neutral) and native records (the
//! untyped attribute bag an adapter produces and consumes).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A canonical attribute value.
///
/// The variant set is closed so that equality and serialization are well
/// defined across providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Attribute present with no value.
    Null,
    /// A string value.
    String(String),
    /// A boolean value.
    Boolean(bool),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// An ordered list of strings (group memberships, multi-valued fields).
    List(Vec<String>),
}

impl AttributeValue {
    /// Get as a string if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as a list if this is a list value.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::String(_) => "string",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Float(_) => "float",
            AttributeValue::List(_) => "list",
        }
    }

    /// Convert a JSON value into a canonical value.
    ///
    /// Objects and arrays holding anything other than strings have no
    /// canonical representation; the JSON kind is returned as the error.
    pub fn from_json(value: &Value) -> Result<Self, &'static str> {
        match value {
            Value::Null => Ok(AttributeValue::Null),
            Value::Bool(b) => Ok(AttributeValue::Boolean(*b)),
            Value::String(s) => Ok(AttributeValue::String(s.clone())),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(AttributeValue::Integer(i)),
                None => n.as_f64().map(AttributeValue::Float).ok_or("number"),
            },
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or("array"))
                .collect::<Result<Vec<_>, _>>()
                .map(AttributeValue::List),
            Value::Object(_) => Err("object"),
        }
    }

    /// Convert into a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Null => Value::Null,
            AttributeValue::String(s) => Value::String(s.clone()),
            AttributeValue::Boolean(b) => Value::Bool(*b),
            AttributeValue::Integer(i) => Value::from(*i),
            AttributeValue::Float(f) => Value::from(*f),
            AttributeValue::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Integer(i64::from(i))
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(items: Vec<String>) -> Self {
        AttributeValue::List(items)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(items: Vec<&str>) -> Self {
        AttributeValue::List(items.into_iter().map(str::to_string).collect())
    }
}

/// Provider-neutral attribute map for one user.
///
/// Attributes are kept in name order so two records with the same content
/// always compare and serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRecord {
    attributes: BTreeMap<String, AttributeValue>,
}

impl CanonicalRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute using builder pattern.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Get a string attribute.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_str)
    }

    /// Check if an attribute exists.
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Attribute names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Iterate over all attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the record has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Convert into the underlying map.
    pub fn into_map(self) -> BTreeMap<String, AttributeValue> {
        self.attributes
    }
}

impl FromIterator<(String, AttributeValue)> for CanonicalRecord {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, AttributeValue>> for CanonicalRecord {
    fn from(attributes: BTreeMap<String, AttributeValue>) -> Self {
        Self { attributes }
    }
}

impl fmt::Display for CanonicalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// A provider's own representation of a user.
///
/// Opaque to the core except through the attribute mapper. Adapters with
/// typed SDK models go through [`NativeRecord::from_serializable`] and
/// [`NativeRecord::into_typed`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeRecord {
    attributes: Map<String, Value>,
}

impl NativeRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute using builder pattern.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set an attribute.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(name.into(), value)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Get a string attribute.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Check if an attribute exists.
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Borrow the attribute bag.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Convert into the attribute bag.
    pub fn into_map(self) -> Map<String, Value> {
        self.attributes
    }

    /// Build a native record from any serializable provider model.
    ///
    /// Fails if the model does not serialize to a JSON object.
    pub fn from_serializable<T: Serialize>(model: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(model)? {
            Value::Object(attributes) => Ok(Self { attributes }),
            other => Err(serde::de::Error::custom(format!(
                "expected an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Deserialize this record into a provider model.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.attributes))
    }
}

impl From<Map<String, Value>> for NativeRecord {
    fn from(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }
}

impl TryFrom<Value> for NativeRecord {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(attributes) => Ok(Self { attributes }),
            other => Err(serde::de::Error::custom(format!(
                "expected an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl fmt::Display for NativeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.attributes).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
