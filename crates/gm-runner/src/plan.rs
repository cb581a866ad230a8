//! Read-only planning view: what `prepare` would do, without doing it.

use gm_store::TaskStore;
use gm_types::{GmResult, ParamMap, Parameter, TaskStatus};
use serde::Serialize;
use tracing::debug;

use crate::config::SweepConfig;
use crate::space::{feasible_combinations, Combination};

/// Per-combination seeding arithmetic shared by `prepare` and `plan`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    pub params: ParamMap,
    /// Rows matching this combination's identity key, any status.
    pub existing_any: i64,
    /// Rows matching this combination's identity key, TERMINATED.
    pub existing_done: i64,
    /// PENDING rows `prepare` would insert.
    pub would_insert: i64,
    /// Samples still missing before the combination converges.
    pub still_required: i64,
}

/// Aggregated preview of a sweep's remaining cost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    pub entries: Vec<PlanEntry>,
    pub would_insert_total: i64,
    pub still_required_total: i64,
}

impl PlanReport {
    fn new(entries: Vec<PlanEntry>) -> Self {
        let would_insert_total = entries.iter().map(|entry| entry.would_insert).sum();
        let still_required_total = entries.iter().map(|entry| entry.still_required).sum();
        Self {
            entries,
            would_insert_total,
            still_required_total,
        }
    }
}

/// Count existing samples per feasible combination. Counting is filtered by
/// the combination's non-ignored parameter values only.
pub(crate) fn survey(
    store: &TaskStore,
    parameters: &[Parameter],
    combinations: &[Combination],
    num_sample: usize,
) -> GmResult<Vec<PlanEntry>> {
    let num_sample = num_sample as i64;
    let mut entries = Vec::with_capacity(combinations.len());
    for combination in combinations {
        let filters = combination.identity_filters(parameters);
        let existing_any = store.count_matching(&filters, None)?;
        let existing_done = store.count_matching(&filters, Some(TaskStatus::Terminated))?;

        let still_required = (num_sample - existing_done).max(0);
        let would_insert = if existing_done < num_sample {
            (num_sample - existing_any).max(0)
        } else {
            0
        };

        entries.push(PlanEntry {
            params: combination.to_map(parameters),
            existing_any,
            existing_done,
            would_insert,
            still_required,
        });
    }
    Ok(entries)
}

/// Compute how many tasks/samples a run would (re)execute. Never inserts,
/// updates or evolves columns: a parameter whose column does not exist yet
/// has no stored samples, so its combinations count as entirely missing.
pub fn plan(
    config: &SweepConfig,
    filter: Option<&dyn Fn(&ParamMap) -> bool>,
) -> GmResult<PlanReport> {
    let store = TaskStore::open(&config.root_dir)?;
    store.ensure_schema()?;
    store.verify_compatibility(&config.parameters)?;

    let combinations = feasible_combinations(&config.parameters, filter);

    // Only query when every identity column exists; the counting SQL would
    // otherwise reference columns the table does not have.
    let existing = store.column_names()?;
    let countable = config
        .parameters
        .iter()
        .filter(|parameter| !parameter.ignored)
        .all(|parameter| existing.contains(&parameter.column_name()));

    let entries = if countable {
        survey(&store, &config.parameters, &combinations, config.num_sample)?
    } else {
        let num_sample = config.num_sample as i64;
        combinations
            .iter()
            .map(|combination| PlanEntry {
                params: combination.to_map(&config.parameters),
                existing_any: 0,
                existing_done: 0,
                would_insert: num_sample,
                still_required: num_sample,
            })
            .collect()
    };
    let report = PlanReport::new(entries);
    debug!(
        "Planned {} combination(s): {} insert(s), {} sample(s) still required",
        report.entries.len(),
        report.would_insert_total,
        report.still_required_total
    );
    Ok(report)
}
