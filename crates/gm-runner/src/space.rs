//! Parameter space enumeration: the Cartesian product of every declared
//! domain, minus combinations rejected by the caller's filter predicate.

use gm_types::{ParamMap, Parameter, ScalarValue};

/// One concrete assignment of a value to every declared parameter, stored
/// positionally in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub values: Vec<ScalarValue>,
}

impl Combination {
    pub fn to_map(&self, parameters: &[Parameter]) -> ParamMap {
        parameters
            .iter()
            .zip(&self.values)
            .map(|(parameter, value)| (parameter.name.clone(), value.clone()))
            .collect()
    }

    /// `(column, value)` pairs over the non-ignored parameters: the identity
    /// key used to count existing samples.
    pub fn identity_filters(&self, parameters: &[Parameter]) -> Vec<(String, ScalarValue)> {
        parameters
            .iter()
            .zip(&self.values)
            .filter(|(parameter, _)| !parameter.ignored)
            .map(|(parameter, value)| (parameter.column_name(), value.clone()))
            .collect()
    }
}

/// Expand the Cartesian product in declared order (outer loops follow the
/// parameter declaration order, inner loops follow each domain's order) and
/// drop combinations the filter rejects. The filter runs once per
/// combination, before any storage I/O; rejected combinations are invisible
/// to every downstream component.
pub fn feasible_combinations(
    parameters: &[Parameter],
    filter: Option<&dyn Fn(&ParamMap) -> bool>,
) -> Vec<Combination> {
    let mut result: Vec<Vec<ScalarValue>> = vec![Vec::new()];
    for parameter in parameters {
        let mut next = Vec::with_capacity(result.len() * parameter.domain.len());
        for existing in &result {
            for value in &parameter.domain {
                let mut combo = existing.clone();
                combo.push(value.clone());
                next.push(combo);
            }
        }
        result = next;
    }

    result
        .into_iter()
        .map(|values| Combination { values })
        .filter(|combination| match filter {
            Some(predicate) => predicate(&combination.to_map(parameters)),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gm_types::Parameter;

    fn params() -> Vec<Parameter> {
        vec![
            Parameter::float("alpha", 0.5, [0.0, 0.5]).unwrap(),
            Parameter::int("beta", 1, [1, 2]).unwrap(),
        ]
    }

    #[test]
    fn product_covers_every_pair_in_declared_order() {
        let combos = feasible_combinations(&params(), None);
        assert_eq!(combos.len(), 4);
        assert_eq!(
            combos[0].values,
            vec![ScalarValue::Float(0.0), ScalarValue::Int(1)]
        );
        assert_eq!(
            combos[1].values,
            vec![ScalarValue::Float(0.0), ScalarValue::Int(2)]
        );
        assert_eq!(
            combos[3].values,
            vec![ScalarValue::Float(0.5), ScalarValue::Int(2)]
        );
    }

    #[test]
    fn filter_excludes_combinations() {
        let filter = |config: &ParamMap| config["beta"] != ScalarValue::Int(2);
        let combos = feasible_combinations(&params(), Some(&filter));
        assert_eq!(combos.len(), 2);
        for combo in &combos {
            assert_eq!(combo.values[1], ScalarValue::Int(1));
        }
    }

    #[test]
    fn identity_filters_skip_ignored_parameters() {
        let parameters = vec![
            Parameter::float("alpha", 0.5, [0.0]).unwrap(),
            Parameter::int("gpu", 0, [0]).unwrap().ignored(),
        ];
        let combos = feasible_combinations(&parameters, None);
        let filters = combos[0].identity_filters(&parameters);
        assert_eq!(
            filters,
            vec![("param_alpha".to_string(), ScalarValue::Float(0.0))]
        );
    }

    #[test]
    fn empty_domain_yields_no_combinations() {
        let parameters = vec![
            Parameter::float("alpha", 0.5, [0.0, 0.5]).unwrap(),
            Parameter::int("beta", 1, Vec::<i64>::new()).unwrap(),
        ];
        assert!(feasible_combinations(&parameters, None).is_empty());
    }
}
