//! Generated values and the generator registry.

mod registry;

use std::fmt;

pub use registry::{
    BooleanGenerator,
    IntegerGenerator,
    Registry,
    TextGenerator,
    ValueGenerator,
    generator_fn,
    shrink_integer,
    shrink_text,
};
use serde::{Deserialize, Serialize};

/// Semantic type tag used to look up a generator in the [`Registry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Signed 64-bit integers.
    Integer,
    /// Printable text.
    Text,
    /// `true` or `false`.
    Boolean,
    /// A caller-registered type, identified by name.
    Custom(String),
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("integer"),
            Self::Text => f.write_str("text"),
            Self::Boolean => f.write_str("boolean"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// A concrete value synthesised for a capture, parameter or body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// An integer.
    Integer(i64),
    /// A string.
    Text(String),
    /// A boolean.
    Boolean(bool),
    /// A list of values.
    List(Vec<Value>),
    /// Named fields in declaration order; `None` marks an omitted field.
    Object(Vec<(String, Option<Value>)>),
}

impl Value {
    /// Size measure used to order shrink candidates.
    ///
    /// Integers count their magnitude; text counts one per character plus one
    /// per character other than `'a'`; containers count one per element or
    /// present field plus the element sizes.
    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            Self::Integer(n) => n.unsigned_abs(),
            Self::Text(text) => text.chars().map(|c| if c == 'a' { 1 } else { 2 }).sum(),
            Self::Boolean(flag) => u64::from(*flag),
            Self::List(items) => items.iter().map(|item| 1 + item.size()).sum(),
            Self::Object(fields) => fields
                .iter()
                .filter_map(|(_, value)| value.as_ref())
                .map(|value| 1 + value.size())
                .sum(),
        }
    }

    /// Text form used in paths, query strings, headers and form bodies.
    ///
    /// Containers render as compact JSON.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Integer(n) => n.to_string(),
            Self::Text(text) => text.clone(),
            Self::Boolean(flag) => flag.to_string(),
            Self::List(_) | Self::Object(_) => self.to_json().to_string(),
        }
    }

    /// JSON form of the value; omitted object fields are left out.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Text(text) => serde_json::Value::from(text.as_str()),
            Self::Boolean(flag) => serde_json::Value::from(*flag),
            Self::List(items) => items.iter().map(Self::to_json).collect(),
            Self::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .filter_map(|(name, value)| {
                        value.as_ref().map(|present| (name.clone(), present.to_json()))
                    })
                    .collect(),
            ),
        }
    }

    /// The integer, if this is one.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The text, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// A present field of an object value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Self> {
        match self {
            Self::Object(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .and_then(|(_, value)| value.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text:?}"),
            other => f.write_str(&other.render()),
        }
    }
}
