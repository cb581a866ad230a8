//! Parameter definitions and the maps exchanged with caller-supplied hooks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::ParamError;
use crate::scalar::{ScalarType, ScalarValue};

/// Column-name prefix for stored parameter values.
pub const PARAM_COLUMN_PREFIX: &str = "param_";

/// Fully-resolved parameter assignment handed to the objective function and
/// the filter predicate.
pub type ParamMap = BTreeMap<String, ScalarValue>;

/// Named result values returned by the objective function.
pub type ResultMap = BTreeMap<String, ScalarValue>;

/// Immutable definition of one sweep parameter: its name, scalar type,
/// default value and the discrete domain enumerated for grid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub base_type: ScalarType,
    pub default: ScalarValue,
    /// Ordered domain; enumeration follows this order.
    pub domain: Vec<ScalarValue>,
    /// Excluded from the identity key used to count existing samples, but
    /// still stored per row.
    #[serde(default)]
    pub ignored: bool,
}

impl Parameter {
    /// Create a parameter, validating the name, the default and every domain
    /// value against `base_type` at definition time.
    pub fn new(
        name: impl Into<String>,
        base_type: ScalarType,
        default: impl Into<ScalarValue>,
        domain: Vec<ScalarValue>,
    ) -> Result<Self, ParamError> {
        let name = name.into();
        validate_name(&name)?;

        let default = base_type.coerce(&default.into())?;

        let mut coerced = Vec::with_capacity(domain.len());
        for value in &domain {
            let value = base_type
                .coerce(value)
                .map_err(|_| ParamError::DomainTypeMismatch {
                    param: name.clone(),
                    expected: base_type,
                    value: value.clone(),
                })?;
            coerced.push(value);
        }

        Ok(Self {
            name,
            base_type,
            default,
            domain: coerced,
            ignored: false,
        })
    }

    pub fn float(
        name: impl Into<String>,
        default: f64,
        domain: impl IntoIterator<Item = impl Into<ScalarValue>>,
    ) -> Result<Self, ParamError> {
        Self::new(
            name,
            ScalarType::Float,
            default,
            domain.into_iter().map(Into::into).collect(),
        )
    }

    pub fn int(
        name: impl Into<String>,
        default: i64,
        domain: impl IntoIterator<Item = impl Into<ScalarValue>>,
    ) -> Result<Self, ParamError> {
        Self::new(
            name,
            ScalarType::Int,
            default,
            domain.into_iter().map(Into::into).collect(),
        )
    }

    pub fn text(
        name: impl Into<String>,
        default: &str,
        domain: impl IntoIterator<Item = impl Into<ScalarValue>>,
    ) -> Result<Self, ParamError> {
        Self::new(
            name,
            ScalarType::Text,
            default,
            domain.into_iter().map(Into::into).collect(),
        )
    }

    /// Mark this parameter as excluded from sample counting.
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Storage column holding this parameter's value.
    pub fn column_name(&self) -> String {
        format!("{PARAM_COLUMN_PREFIX}{}", self.name)
    }
}

/// Parameter and result names become column names, so they are restricted to
/// identifier characters.
pub fn validate_name(name: &str) -> Result<(), ParamError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ParamError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_domain_accepts_int_literals() {
        let p = Parameter::float("alpha", 0.5, [0.0, 0.5]).unwrap();
        assert_eq!(p.domain, vec![ScalarValue::Float(0.0), ScalarValue::Float(0.5)]);

        // 0 is an Int literal but widens into the Float domain
        let p = Parameter::new(
            "alpha",
            ScalarType::Float,
            0.5,
            vec![ScalarValue::Int(0), ScalarValue::Float(0.5)],
        )
        .unwrap();
        assert_eq!(p.domain[0], ScalarValue::Float(0.0));
    }

    #[test]
    fn domain_type_mismatch_is_fatal() {
        let err = Parameter::new(
            "beta",
            ScalarType::Int,
            1,
            vec![ScalarValue::Int(1), ScalarValue::Text("two".into())],
        )
        .unwrap_err();
        match err {
            ParamError::DomainTypeMismatch { param, value, .. } => {
                assert_eq!(param, "beta");
                assert_eq!(value, ScalarValue::Text("two".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn column_name_is_prefixed() {
        let p = Parameter::int("beta", 1, [1, 2]).unwrap();
        assert_eq!(p.column_name(), "param_beta");
    }

    #[test]
    fn ignored_flag() {
        let p = Parameter::int("gpu", 0, [0]).unwrap().ignored();
        assert!(p.ignored);
    }

    #[test]
    fn names_are_identifier_checked() {
        assert!(Parameter::int("lr_0", 1, [1]).is_ok());
        assert!(Parameter::int("0lr", 1, [1]).is_err());
        assert!(Parameter::int("lr; DROP TABLE tasks", 1, [1]).is_err());
        assert!(Parameter::int("", 1, [1]).is_err());
    }
}
