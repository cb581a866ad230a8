//! Scalar type model: the closed set of value types a parameter or result
//! column may take, each paired with its storage representation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ParamError;

/// Closed set of scalar types supported by the task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    Float,
    Int,
    Text,
}

impl ScalarType {
    /// SQLite column type used when a column of this type is created.
    pub fn storage_type(&self) -> &'static str {
        match self {
            ScalarType::Float => "REAL",
            ScalarType::Int => "INTEGER",
            ScalarType::Text => "TEXT",
        }
    }

    pub fn from_storage_type(storage: &str) -> Option<Self> {
        match storage {
            "REAL" => Some(ScalarType::Float),
            "INTEGER" => Some(ScalarType::Int),
            "TEXT" => Some(ScalarType::Text),
            _ => None,
        }
    }

    /// Coerce `value` into this type. Int widens to Float; any other
    /// cross-type combination is rejected.
    pub fn coerce(&self, value: &ScalarValue) -> Result<ScalarValue, ParamError> {
        match (self, value) {
            (ScalarType::Float, ScalarValue::Float(v)) => Ok(ScalarValue::Float(*v)),
            (ScalarType::Float, ScalarValue::Int(v)) => Ok(ScalarValue::Float(*v as f64)),
            (ScalarType::Int, ScalarValue::Int(v)) => Ok(ScalarValue::Int(*v)),
            (ScalarType::Text, ScalarValue::Text(v)) => Ok(ScalarValue::Text(v.clone())),
            _ => Err(ParamError::Coercion {
                expected: *self,
                found: value.clone(),
            }),
        }
    }

    /// Parse a stringified value (manifest defaults, operator-supplied
    /// overrides) into this type.
    pub fn parse(&self, raw: &str) -> Result<ScalarValue, ParamError> {
        match self {
            ScalarType::Float => raw
                .parse::<f64>()
                .map(ScalarValue::Float)
                .map_err(|_| ParamError::Parse {
                    expected: *self,
                    raw: raw.to_string(),
                }),
            ScalarType::Int => raw
                .parse::<i64>()
                .map(ScalarValue::Int)
                .map_err(|_| ParamError::Parse {
                    expected: *self,
                    raw: raw.to_string(),
                }),
            ScalarType::Text => Ok(ScalarValue::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::Float => write!(f, "float"),
            ScalarType::Int => write!(f, "int"),
            ScalarType::Text => write!(f, "text"),
        }
    }
}

/// A concrete scalar value drawn from a parameter domain or produced by an
/// objective function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Float(f64),
    Int(i64),
    Text(String),
}

impl ScalarValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::Float(_) => ScalarType::Float,
            ScalarValue::Int(_) => ScalarType::Int,
            ScalarValue::Text(_) => ScalarType::Text,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int(v as i64)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_types_roundtrip() {
        for ty in [ScalarType::Float, ScalarType::Int, ScalarType::Text] {
            assert_eq!(ScalarType::from_storage_type(ty.storage_type()), Some(ty));
        }
        assert_eq!(ScalarType::from_storage_type("BLOB"), None);
    }

    #[test]
    fn int_widens_to_float() {
        let coerced = ScalarType::Float.coerce(&ScalarValue::Int(2)).unwrap();
        assert_eq!(coerced, ScalarValue::Float(2.0));
    }

    #[test]
    fn cross_type_coercion_rejected() {
        let err = ScalarType::Int.coerce(&ScalarValue::Float(0.5)).unwrap_err();
        match err {
            ParamError::Coercion { expected, .. } => assert_eq!(expected, ScalarType::Int),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(ScalarType::Text.coerce(&ScalarValue::Int(1)).is_err());
        assert!(ScalarType::Int.coerce(&ScalarValue::Text("1".into())).is_err());
    }

    #[test]
    fn parse_stringified_defaults() {
        assert_eq!(
            ScalarType::Float.parse("0.5").unwrap(),
            ScalarValue::Float(0.5)
        );
        assert_eq!(ScalarType::Int.parse("3").unwrap(), ScalarValue::Int(3));
        assert_eq!(
            ScalarType::Text.parse("d1").unwrap(),
            ScalarValue::Text("d1".into())
        );
        assert!(ScalarType::Int.parse("0.5").is_err());
    }

    #[test]
    fn display_matches_stored_form() {
        assert_eq!(ScalarValue::Float(0.5).to_string(), "0.5");
        assert_eq!(ScalarValue::Int(3).to_string(), "3");
        assert_eq!(ScalarValue::Text("d1".into()).to_string(), "d1");
    }
}
