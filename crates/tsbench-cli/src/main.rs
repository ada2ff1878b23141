//! tsbench - time-series storage benchmark runner.
//!
//! Generates one dataset, drives every selected backend through the
//! benchmark phases and prints the report.

mod args;
mod formatter;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tsbench::{generate_records, AnyBackend, Harness};

use crate::args::{Args, RunConfig};

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tsbench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if let Err(e) = run(args.into_config()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(config: RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    let bench = &config.bench;
    bench.validate(bench.records)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backends = ?config.backends.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        records = bench.records,
        subset = bench.subset,
        schedule = %bench.schedule,
        load_mode = %bench.load_mode,
        "starting benchmark"
    );

    let dataset = generate_records(bench.records, &bench.context);
    let mut backends = AnyBackend::connect_all(&config.backends)?;
    let report = Harness::new(bench).run(&mut backends, &dataset)?;

    let formatter = formatter::create_formatter(config.format);
    println!("{}", formatter.format_report(&report));

    if let Some(path) = &config.output {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!(path = %path.display(), "report written");
    }

    Ok(())
}
