//! Sweep configuration. All coordination state is carried explicitly in this
//! object and the hooks handed to the runner; there is no process-wide
//! registry.

use std::path::PathBuf;

use gm_types::{GmResult, ParamError, ParamMap, Parameter, ScalarValue};

pub const DEFAULT_ROOT_DIR: &str = ".gridmill";

/// Declarative description of one sweep: the parameter declarations, the
/// target sample count per combination, where the store lives and any forced
/// overrides supplied at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub parameters: Vec<Parameter>,
    /// Target number of TERMINATED rows per feasible combination.
    pub num_sample: usize,
    /// Directory holding the task database and the compatibility manifest.
    pub root_dir: PathBuf,
    /// Overrides applied after a row's stored values are loaded and before
    /// the objective runs; recorded alongside the row for auditability.
    pub force_values: ParamMap,
}

impl SweepConfig {
    pub fn new(parameters: Vec<Parameter>) -> Self {
        Self {
            parameters,
            num_sample: 1,
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            force_values: ParamMap::new(),
        }
    }

    pub fn with_num_sample(mut self, num_sample: usize) -> Self {
        self.num_sample = num_sample;
        self
    }

    pub fn with_root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = dir.into();
        self
    }

    pub fn with_force(mut self, name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.force_values.insert(name.into(), value.into());
        self
    }

    /// Every forced value coerced to the type of the parameter it overrides.
    /// Unknown names and uncoercible values are fatal.
    pub fn resolved_forces(&self) -> GmResult<ParamMap> {
        let mut resolved = ParamMap::new();
        for (name, value) in &self.force_values {
            let parameter = self
                .parameters
                .iter()
                .find(|parameter| &parameter.name == name)
                .ok_or_else(|| ParamError::Unknown(name.clone()))?;
            resolved.insert(name.clone(), parameter.base_type.coerce(value)?);
        }
        Ok(resolved)
    }
}
