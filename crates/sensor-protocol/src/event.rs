//! Canonical sensor event representation

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A single reading value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Convert from a JSON value, `None` for null, arrays and objects
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Numeric view of the scalar (numeric strings are parsed)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// Interpret the scalar as an on/off style flag
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "on" | "yes" | "motion" | "detected" | "pressed"
            ),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Reading payload: either a single scalar or a named set of scalars
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(Scalar),
    Mapping(BTreeMap<String, Scalar>),
}

impl Value {
    /// Convert from a JSON value.
    ///
    /// Null entries inside an object are skipped. Returns `None` for null,
    /// arrays, and objects without any scalar entry.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(map) => {
                let fields: BTreeMap<String, Scalar> = map
                    .iter()
                    .filter_map(|(k, v)| Scalar::from_json(v).map(|s| (k.clone(), s)))
                    .collect();
                if fields.is_empty() {
                    None
                } else {
                    Some(Self::Mapping(fields))
                }
            }
            other => Scalar::from_json(other).map(Self::Scalar),
        }
    }

    /// The scalar, if this is not a mapping
    #[must_use]
    pub fn scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Mapping(_) => None,
        }
    }

    /// Named field of a mapping
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Scalar> {
        match self {
            Self::Mapping(map) => map.get(key),
            Self::Scalar(_) => None,
        }
    }

    /// Numeric reading: the scalar itself, or the first of `keys` present in a mapping
    #[must_use]
    pub fn number(&self, keys: &[&str]) -> Option<f64> {
        match self {
            Self::Scalar(s) => s.as_f64(),
            Self::Mapping(map) => keys.iter().find_map(|k| map.get(*k)).and_then(Scalar::as_f64),
        }
    }

    /// Flag reading: the scalar itself, or the first of `keys` present in a mapping
    #[must_use]
    pub fn flag(&self, keys: &[&str]) -> Option<bool> {
        match self {
            Self::Scalar(s) => Some(s.is_truthy()),
            Self::Mapping(map) => keys
                .iter()
                .find_map(|k| map.get(*k))
                .map(Scalar::is_truthy),
        }
    }

    /// Text reading: the scalar itself, or the first of `keys` present in a mapping
    #[must_use]
    pub fn text(&self, keys: &[&str]) -> Option<String> {
        match self {
            Self::Scalar(s) => Some(s.to_string()),
            Self::Mapping(map) => keys.iter().find_map(|k| map.get(*k)).map(ToString::to_string),
        }
    }
}

/// A normalized sensor reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorEvent {
    /// Device code, upper-case (e.g. "DS1")
    pub code: String,
    /// Measurement kind (e.g. "Door", "Motion")
    pub measurement: String,
    /// Human-readable device name
    pub device: String,
    /// Reading payload
    pub value: Value,
    /// Id of the node that produced the reading
    pub pi: String,
    /// Reading time in seconds since the Unix epoch
    pub timestamp: f64,
    /// Whether the reading came from a simulator
    pub simulated: bool,
}
