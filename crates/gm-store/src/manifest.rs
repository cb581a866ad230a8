//! Compatibility manifest guarding against silently incompatible re-runs.
//!
//! The manifest records `(storage type, stringified default)` per parameter
//! name, independent of the task table. A column can pre-exist with
//! compatible semantics from an earlier run using a different parameter
//! subset, so "does this declaration match history" is checked here rather
//! than against the table itself.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use gm_types::{GmResult, Parameter, StoreError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(flatten)]
    entries: BTreeMap<String, (String, String)>,
}

impl Manifest {
    /// Load the manifest, treating a missing file as empty.
    pub fn load(path: &Path) -> GmResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> GmResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check every declared parameter against its recorded entry. The
    /// recorded default is coerced back through the parameter's current type
    /// before comparison, so "1" and "1.0" agree for a float parameter.
    pub fn verify(&self, parameters: &[Parameter]) -> Result<(), StoreError> {
        for parameter in parameters {
            let declared_type = parameter.base_type.storage_type();
            let Some((recorded_type, recorded_default)) = self.entries.get(&parameter.name) else {
                continue;
            };

            let recorded_value = parameter.base_type.parse(recorded_default).ok();
            let compatible =
                recorded_type == declared_type && recorded_value.as_ref() == Some(&parameter.default);
            if !compatible {
                return Err(StoreError::SchemaIncompatible {
                    param: parameter.name.clone(),
                    recorded_type: recorded_type.clone(),
                    recorded_default: recorded_default.clone(),
                    declared_type: declared_type.to_string(),
                    declared_default: parameter.default.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Verify and then record the current declarations. Fails before
    /// recording anything on mismatch.
    pub fn reconcile(&mut self, parameters: &[Parameter]) -> Result<(), StoreError> {
        self.verify(parameters)?;
        for parameter in parameters {
            self.entries.insert(
                parameter.name.clone(),
                (
                    parameter.base_type.storage_type().to_string(),
                    parameter.default.to_string(),
                ),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gm_types::Parameter;
    use tempfile::tempdir;

    fn alpha() -> Parameter {
        Parameter::float("alpha", 0.5, [0.0, 0.5]).unwrap()
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::load(&dir.path().join("manifest.json")).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn reconcile_then_reload_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut manifest = Manifest::load(&path).unwrap();
        manifest.reconcile(&[alpha()]).unwrap();
        manifest.save(&path).unwrap();

        let reloaded = Manifest::load(&path).unwrap();
        assert_eq!(reloaded, manifest);
        // second reconcile of the same declaration is a no-op
        let mut again = reloaded.clone();
        again.reconcile(&[alpha()]).unwrap();
        assert_eq!(again, reloaded);
    }

    #[test]
    fn changed_default_is_rejected() {
        let mut manifest = Manifest::default();
        manifest.reconcile(&[alpha()]).unwrap();

        let changed = Parameter::float("alpha", 0.7, [0.0, 0.5]).unwrap();
        let err = manifest.reconcile(&[changed]).unwrap_err();
        match err {
            StoreError::SchemaIncompatible {
                param,
                recorded_default,
                declared_default,
                ..
            } => {
                assert_eq!(param, "alpha");
                assert_eq!(recorded_default, "0.5");
                assert_eq!(declared_default, "0.7");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn changed_type_is_rejected() {
        let mut manifest = Manifest::default();
        manifest.reconcile(&[alpha()]).unwrap();

        let changed = Parameter::text("alpha", "0.5", ["0.5"]).unwrap();
        assert!(matches!(
            manifest.verify(&[changed]),
            Err(StoreError::SchemaIncompatible { .. })
        ));
    }

    #[test]
    fn stringified_default_coerces_through_current_type() {
        // An int-looking default recorded as "1" must stay compatible with a
        // float parameter whose default is 1.0.
        let one = Parameter::float("beta", 1.0, [1.0, 2.0]).unwrap();
        let mut manifest = Manifest::default();
        manifest.reconcile(&[one.clone()]).unwrap();
        manifest.verify(&[one]).unwrap();
    }

    #[test]
    fn unrecorded_parameters_pass() {
        let manifest = Manifest::default();
        manifest.verify(&[alpha()]).unwrap();
    }
}
