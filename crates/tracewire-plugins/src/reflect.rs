//! Read-only field access into instrumented library objects.
//!
//! Instrumented clients expose their internals through [`Introspect`]. Field
//! layouts differ between library versions, so every access is fallible and
//! callers decide how a missing or mistyped field degrades.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{owner} has no field `{field}`")]
    NoSuchField { owner: String, field: String },

    #[error("field `{field}` is {actual}, expected {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unsupported address type: {0}")]
    UnsupportedAddress(&'static str),

    #[error("address URI has no host")]
    MissingHost,
}

/// An object whose fields can be read by name.
pub trait Introspect: Send + Sync {
    fn type_name(&self) -> &str;

    fn field(&self, name: &str) -> Result<FieldValue, ProbeError>;
}

/// Value of a single field.
#[derive(Clone)]
pub enum FieldValue {
    Null,
    Text(String),
    Uri(Url),
    Integer(i64),
    Boolean(bool),
    List(Vec<FieldValue>),
    Object(Arc<dyn Introspect>),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Text(_) => "text",
            FieldValue::Uri(_) => "uri",
            FieldValue::Integer(_) => "integer",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::List(_) => "list",
            FieldValue::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Interpret the value of `field` as a nested object. `Null` yields `None`.
    pub fn into_object(self, field: &str) -> Result<Option<Arc<dyn Introspect>>, ProbeError> {
        match self {
            FieldValue::Null => Ok(None),
            FieldValue::Object(object) => Ok(Some(object)),
            other => Err(ProbeError::TypeMismatch {
                field: field.to_string(),
                expected: "object",
                actual: other.kind(),
            }),
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("Null"),
            FieldValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            FieldValue::Uri(u) => f.debug_tuple("Uri").field(&u.as_str()).finish(),
            FieldValue::Integer(i) => f.debug_tuple("Integer").field(i).finish(),
            FieldValue::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            FieldValue::List(items) => f.debug_tuple("List").field(items).finish(),
            FieldValue::Object(o) => f.debug_tuple("Object").field(&o.type_name()).finish(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Url> for FieldValue {
    fn from(value: Url) -> Self {
        FieldValue::Uri(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::List(value)
    }
}

impl From<ObjectValue> for FieldValue {
    fn from(value: ObjectValue) -> Self {
        FieldValue::Object(Arc::new(value))
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// A field map standing in for a host object.
///
/// Used when the host hands over a snapshot of an object instead of a live
/// [`Introspect`] implementation.
#[derive(Debug, Clone)]
pub struct ObjectValue {
    type_name: String,
    fields: BTreeMap<String, FieldValue>,
}

impl ObjectValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add or replace a field.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

impl Introspect for ObjectValue {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field(&self, name: &str) -> Result<FieldValue, ProbeError> {
        self.fields
            .get(name)
            .cloned()
            .ok_or_else(|| ProbeError::NoSuchField {
                owner: self.type_name.clone(),
                field: name.to_string(),
            })
    }
}
