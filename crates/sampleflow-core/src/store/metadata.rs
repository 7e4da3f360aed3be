//! Per-field metadata values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata key holding a field's display color
pub const COLOR_KEY: &str = "color";

/// Metadata key holding a field's visibility flag
pub const VISIBLE_KEY: &str = "visible";

/// A single metadata value attached to a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) | Self::Float(_) | Self::Bool(_) => None,
        }
    }

    /// Numeric view; integers widen to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Str(_) | Self::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Str(_) | Self::Int(_) | Self::Float(_) => None,
        }
    }

    /// Name of the variant, used in log output
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{}", s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_match_variant() {
        let v = MetadataValue::from(3i64);
        assert_eq!(v.as_f64(), Some(3.0));
        assert_eq!(v.as_bool(), None);
        assert_eq!(v.as_str(), None);

        let v = MetadataValue::from("red");
        assert_eq!(v.as_str(), Some("red"));
        assert_eq!(v.as_f64(), None);
    }

    #[test]
    fn test_serde_tagged_layout() {
        let json = serde_json::to_value(MetadataValue::Bool(true)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "bool", "value": true}));

        let back: MetadataValue =
            serde_json::from_value(serde_json::json!({"type": "float", "value": 2.5})).unwrap();
        assert_eq!(back, MetadataValue::Float(2.5));
    }

    #[test]
    fn test_display() {
        assert_eq!(MetadataValue::Int(-4).to_string(), "-4");
        assert_eq!(MetadataValue::Str("x".into()).to_string(), "x");
        assert_eq!(MetadataValue::Bool(false).type_name(), "bool");
    }
}
