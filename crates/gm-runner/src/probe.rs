//! Probe mode: one objective call against the declared defaults, with no
//! store involvement. Useful for smoke-testing an objective before pointing
//! a fleet of workers at it.

use gm_types::{GmResult, ObjectiveError, ParamMap, ResultMap};
use tracing::info;

use crate::config::SweepConfig;

/// Run the objective once with every parameter at its declared default,
/// forced overrides applied on top. Nothing is read from or written to the
/// task store; the result is returned directly.
pub fn probe(
    config: &SweepConfig,
    objective: impl Fn(&ParamMap) -> anyhow::Result<Option<ResultMap>>,
) -> GmResult<ResultMap> {
    let forces = config.resolved_forces()?;
    let mut resolved = ParamMap::new();
    for parameter in &config.parameters {
        let value = match forces.get(&parameter.name) {
            Some(forced) => forced.clone(),
            None => parameter.default.clone(),
        };
        resolved.insert(parameter.name.clone(), value);
    }

    info!("Probing objective with {} parameter(s)", resolved.len());
    match objective(&resolved) {
        Ok(Some(results)) => Ok(results),
        Ok(None) => Err(ObjectiveError::NoResult.into()),
        Err(err) => Err(ObjectiveError::Failed(err).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gm_types::{GmError, Parameter, ScalarValue};

    fn config() -> SweepConfig {
        SweepConfig::new(vec![
            Parameter::float("alpha", 0.5, [0.0, 0.5]).unwrap(),
            Parameter::int("beta", 1, [1, 2]).unwrap(),
        ])
    }

    #[test]
    fn probe_uses_defaults() {
        let results = probe(&config(), |config| {
            assert_eq!(config["alpha"], ScalarValue::Float(0.5));
            assert_eq!(config["beta"], ScalarValue::Int(1));
            let mut results = ResultMap::new();
            results.insert("score".to_string(), ScalarValue::Int(42));
            Ok(Some(results))
        })
        .unwrap();
        assert_eq!(results["score"], ScalarValue::Int(42));
    }

    #[test]
    fn probe_applies_forces_over_defaults() {
        let config = config().with_force("beta", 5);
        probe(&config, |config| {
            assert_eq!(config["beta"], ScalarValue::Int(5));
            Ok(Some(ResultMap::new()))
        })
        .unwrap();
    }

    #[test]
    fn probe_surfaces_objective_failure() {
        let err = probe(&config(), |_| anyhow::bail!("bad objective")).unwrap_err();
        assert!(matches!(err, GmError::Objective(ObjectiveError::Failed(_))));

        let err = probe(&config(), |_| Ok(None)).unwrap_err();
        assert!(matches!(err, GmError::Objective(ObjectiveError::NoResult)));
    }
}
