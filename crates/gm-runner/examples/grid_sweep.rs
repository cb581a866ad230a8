use gm_runner::*;
use gm_types::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("Gridmill grid sweep example");

    // Declare the parameter space: 2 learning rates x 3 batch sizes
    let parameters = vec![
        Parameter::float("lr", 0.01, [0.01, 0.1])?,
        Parameter::int("batch_size", 32, [16, 32, 64])?,
        Parameter::text("optimizer", "adam", ["adam"])?,
    ];

    let config = SweepConfig::new(parameters)
        .with_num_sample(2)
        .with_root_dir(".gridmill-demo");

    // Preview the work before queueing anything
    let report = plan(&config, None)?;
    println!(
        "Plan: {} combination(s), {} row(s) to insert, {} sample(s) still required",
        report.entries.len(),
        report.would_insert_total,
        report.still_required_total
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    // Smoke-test the objective against the defaults, outside the store
    let probed = probe(&config, objective)?;
    println!("Probe result: loss = {}", probed["loss"]);

    // Run the sweep to queue exhaustion
    let mut runner = SweepRunner::new(config, objective)
        .with_filter(|config| {
            // large batches only make sense with the larger learning rate
            config["batch_size"] != ScalarValue::Int(64)
                || config["lr"] == ScalarValue::Float(0.1)
        })
        .with_on_finish(|completed| {
            println!("Sweep finished; this worker completed {completed} task(s)");
        });

    let report = runner.run()?;
    println!(
        "Worker done: {} task(s) completed, swept clean = {}",
        report.completed, report.swept_clean
    );

    Ok(())
}

fn objective(config: &ParamMap) -> anyhow::Result<Option<ResultMap>> {
    let lr = match &config["lr"] {
        ScalarValue::Float(v) => *v,
        other => anyhow::bail!("unexpected lr: {other}"),
    };
    let batch_size = match &config["batch_size"] {
        ScalarValue::Int(v) => *v,
        other => anyhow::bail!("unexpected batch_size: {other}"),
    };

    // Stand-in for a real training run
    let loss = (1.0 - lr).powi(2) + (batch_size as f64).ln() / 100.0;

    let mut results = ResultMap::new();
    results.insert("loss".to_string(), ScalarValue::Float(loss));
    results.insert("epochs".to_string(), ScalarValue::Int(10));
    Ok(Some(results))
}
