//! The claim/execute/commit worker loop.
//!
//! Each worker is an independent process running this single-threaded loop;
//! the shared task store is the only coordination medium. A row moves
//! `PENDING -> RUNNING -> TERMINATED` on success and falls back to `PENDING`
//! when the objective fails, at which point any worker may reclaim it.

use chrono::Utc;
use gm_store::{ColumnSpec, TaskStore};
use gm_types::{
    GmResult, ObjectiveError, ParamMap, Parameter, ResultMap, RunReport, ScalarValue,
};
use tracing::{debug, info, warn};

use crate::config::SweepConfig;
use crate::plan::survey;
use crate::space::{feasible_combinations, Combination};

pub type ObjectiveFn = Box<dyn Fn(&ParamMap) -> anyhow::Result<Option<ResultMap>>>;
pub type FilterFn = Box<dyn Fn(&ParamMap) -> bool>;
pub type FinishFn = Box<dyn FnMut(u64)>;

/// Drives one worker invocation of a sweep. Hooks are plain values owned by
/// the runner; nothing is registered globally.
pub struct SweepRunner {
    config: SweepConfig,
    objective: ObjectiveFn,
    filter: Option<FilterFn>,
    on_finish: Option<FinishFn>,
}

impl SweepRunner {
    pub fn new(
        config: SweepConfig,
        objective: impl Fn(&ParamMap) -> anyhow::Result<Option<ResultMap>> + 'static,
    ) -> Self {
        Self {
            config,
            objective: Box::new(objective),
            filter: None,
            on_finish: None,
        }
    }

    /// Pure predicate deciding which combinations are feasible.
    pub fn with_filter(mut self, filter: impl Fn(&ParamMap) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Invoked at most once per invocation, with this worker's completed-task
    /// count, when the whole sweep is observed complete. Concurrent workers
    /// may each observe completion, so delivery is at-least-once overall.
    pub fn with_on_finish(mut self, on_finish: impl FnMut(u64) + 'static) -> Self {
        self.on_finish = Some(Box::new(on_finish));
        self
    }

    /// Run the worker to queue exhaustion: validate compatibility, seed
    /// missing rows, then claim/execute/commit until no PENDING row remains.
    pub fn run(&mut self) -> GmResult<RunReport> {
        let parameters = self.config.parameters.clone();
        let forces = self.config.resolved_forces()?;

        let mut store = TaskStore::open(&self.config.root_dir)?;
        store.ensure_schema()?;
        // Compatibility is settled before any column or row mutation.
        store.check_compatibility(&parameters)?;

        let specs: Vec<ColumnSpec> = parameters.iter().map(ColumnSpec::param).collect();
        store.ensure_columns(&specs)?;

        let combinations = feasible_combinations(&parameters, self.filter.as_deref());
        info!(
            "Sweep over {} feasible combination(s), num_sample = {}",
            combinations.len(),
            self.config.num_sample
        );
        self.prepare(&mut store, &parameters, &combinations)?;

        let mut completed: u64 = 0;
        loop {
            let Some(task) = store.claim(&parameters)? else {
                debug!("Queue drained after {} completed task(s)", completed);
                break;
            };

            let resolved = resolve_config(&parameters, &task.values, &forces)?;
            info!("Task {}: {}", task.id, render_config(&resolved));

            let outcome = (self.objective)(&resolved);
            let duration_min =
                (Utc::now() - task.claimed_at).num_milliseconds() as f64 / 60_000.0;

            match outcome {
                Ok(Some(results)) => {
                    store.commit_result(task.id, duration_min, &results, &forces)?;
                    completed += 1;
                }
                Ok(None) => {
                    // Rollback commits before the failure surfaces.
                    store.release(task.id)?;
                    warn!("Task {} produced no result; rolled back to PENDING", task.id);
                    return Err(ObjectiveError::NoResult.into());
                }
                Err(err) => {
                    store.release(task.id)?;
                    warn!("Task {} failed; rolled back to PENDING: {err:#}", task.id);
                    return Err(ObjectiveError::Failed(err).into());
                }
            }
        }

        let (total, terminated) = store.totals()?;
        let swept_clean = total == terminated;
        if swept_clean {
            info!("Sweep complete: {total} task(s) terminated");
            if let Some(on_finish) = self.on_finish.as_mut() {
                on_finish(completed);
            }
        }

        Ok(RunReport {
            completed,
            swept_clean,
            finished_at: Utc::now(),
        })
    }

    /// Seed PENDING rows so the store converges to at least `num_sample`
    /// terminated rows per combination, without over-inserting when some are
    /// already pending or running from a previous invocation.
    fn prepare(
        &self,
        store: &mut TaskStore,
        parameters: &[Parameter],
        combinations: &[Combination],
    ) -> GmResult<usize> {
        let entries = survey(store, parameters, combinations, self.config.num_sample)?;

        let columns: Vec<String> = parameters.iter().map(|p| p.column_name()).collect();
        let mut rows: Vec<Vec<ScalarValue>> = Vec::new();
        for (combination, entry) in combinations.iter().zip(&entries) {
            for _ in 0..entry.would_insert {
                rows.push(combination.values.clone());
            }
        }
        store.insert_pending(&columns, &rows)
    }
}

/// A claimed row's stored values coerced to their declared types, with
/// forced overrides taking precedence.
fn resolve_config(
    parameters: &[Parameter],
    values: &[ScalarValue],
    forces: &ParamMap,
) -> GmResult<ParamMap> {
    let mut resolved = ParamMap::new();
    for (parameter, value) in parameters.iter().zip(values) {
        let value = match forces.get(&parameter.name) {
            Some(forced) => forced.clone(),
            None => parameter.base_type.coerce(value)?,
        };
        resolved.insert(parameter.name.clone(), value);
    }
    Ok(resolved)
}

fn render_config(config: &ParamMap) -> String {
    config
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}
