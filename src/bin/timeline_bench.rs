use std::path::PathBuf;
use std::time::{Duration, Instant};

use agent_timeline::bus::event_types::{
    EVENT_ASSISTANT_OUTPUT, EVENT_DEBUG_TRACE, EVENT_SUBSYSTEM_MESSAGE, EVENT_SYSTEM_ERROR,
    EVENT_SYSTEM_STATUS,
};
use agent_timeline::{init_tracing, ResetOutcome, TimelineConfig, TimelineService};
use serde::Serialize;
use serde_json::json;

const EVENT_CYCLE: [&str; 5] = [
    EVENT_ASSISTANT_OUTPUT,
    EVENT_SYSTEM_STATUS,
    EVENT_SUBSYSTEM_MESSAGE,
    EVENT_DEBUG_TRACE,
    EVENT_SYSTEM_ERROR,
];

#[derive(Debug, Serialize)]
struct TimelineBenchReport {
    events: usize,
    queue_capacity: Option<usize>,
    recorded: usize,
    dropped: u64,
    handler_failures: u64,
    publish_ms: f64,
    dispatch_ms: f64,
    archive_ms: f64,
    events_per_sec: f64,
    backup_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("timeline benchmark failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let mut events = 10_000usize;
    let mut output_path = PathBuf::from("timeline_bench_results.json");
    let mut data_dir: Option<PathBuf> = None;
    let mut queue_capacity: Option<Option<usize>> = None;
    let mut verbose = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(());
        }

        if let Some(value) = arg.strip_prefix("--events=") {
            events = parse_positive_usize(value, "--events")?;
            continue;
        }
        if arg == "--events" {
            let value = args
                .next()
                .ok_or_else(|| "--events requires a value".to_string())?;
            events = parse_positive_usize(&value, "--events")?;
            continue;
        }

        if let Some(value) = arg.strip_prefix("--output=") {
            output_path = PathBuf::from(value);
            continue;
        }
        if arg == "--output" {
            let value = args
                .next()
                .ok_or_else(|| "--output requires a value".to_string())?;
            output_path = PathBuf::from(value);
            continue;
        }

        if let Some(value) = arg.strip_prefix("--data-dir=") {
            data_dir = Some(PathBuf::from(value));
            continue;
        }
        if arg == "--data-dir" {
            let value = args
                .next()
                .ok_or_else(|| "--data-dir requires a value".to_string())?;
            data_dir = Some(PathBuf::from(value));
            continue;
        }

        if let Some(value) = arg.strip_prefix("--queue-capacity=") {
            queue_capacity = Some(parse_capacity(value)?);
            continue;
        }
        if arg == "--queue-capacity" {
            let value = args
                .next()
                .ok_or_else(|| "--queue-capacity requires a value".to_string())?;
            queue_capacity = Some(parse_capacity(&value)?);
            continue;
        }

        if arg == "--verbose" {
            verbose = true;
            continue;
        }

        return Err(format!("unknown argument '{arg}'. Use --help for usage"));
    }

    if verbose {
        init_tracing();
    }

    let mut config = TimelineConfig::from_env().map_err(|error| error.to_string())?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if let Some(capacity) = queue_capacity {
        config.queue_capacity = capacity;
    }
    config.auto_archive_secs = None;
    config.archive_on_shutdown = false;

    let service = TimelineService::start(config).map_err(|error| error.to_string())?;

    let started = Instant::now();
    for i in 0..events {
        let name = EVENT_CYCLE[i % EVENT_CYCLE.len()];
        let payload = if name == EVENT_SUBSYSTEM_MESSAGE {
            json!({ "module": "bench", "content": { "i": i } })
        } else {
            json!({ "module": "bench", "i": i })
        };
        service.publish(name, payload);
    }
    let publish_elapsed = started.elapsed();

    service.bus().flush().await;
    let dispatch_elapsed = started.elapsed();
    let recorded = service.recorder().len().await;

    let archive_started = Instant::now();
    let backup_path = match service.reset().await.map_err(|error| error.to_string())? {
        ResetOutcome::Archived(outcome) => Some(outcome.path),
        ResetOutcome::Empty => None,
    };
    let archive_elapsed = archive_started.elapsed();

    service.shutdown().await.map_err(|error| error.to_string())?;
    let stats = service.bus().stats();

    let report = TimelineBenchReport {
        events,
        queue_capacity: service.config().queue_capacity,
        recorded,
        dropped: stats.dropped,
        handler_failures: stats.handler_failures,
        publish_ms: millis(publish_elapsed),
        dispatch_ms: millis(dispatch_elapsed),
        archive_ms: millis(archive_elapsed),
        events_per_sec: events as f64 / dispatch_elapsed.as_secs_f64().max(f64::EPSILON),
        backup_path,
    };

    let output_json = serde_json::to_string_pretty(&report)
        .map_err(|error| format!("failed to serialize benchmark output: {error}"))?;
    std::fs::write(&output_path, output_json)
        .map_err(|error| format!("failed to write '{}': {error}", output_path.display()))?;

    print_summary(&report);
    println!("\nSaved benchmark output to {}", output_path.display());
    Ok(())
}

fn print_summary(report: &TimelineBenchReport) {
    println!("Timeline pipeline");
    println!("  events published : {}", report.events);
    println!("  entries recorded : {}", report.recorded);
    println!("  events dropped   : {}", report.dropped);
    println!("  handler failures : {}", report.handler_failures);
    println!("  publish          : {:.2} ms", report.publish_ms);
    println!("  publish+dispatch : {:.2} ms", report.dispatch_ms);
    println!("  archive          : {:.2} ms", report.archive_ms);
    println!("  throughput       : {:.0} events/s", report.events_per_sec);
    if let Some(path) = report.backup_path.as_ref() {
        println!("  backup           : {}", path.display());
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn parse_positive_usize(value: &str, flag: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|_| format!("{flag} expects a positive integer, got '{value}'"))?;
    if parsed == 0 {
        return Err(format!("{flag} expects a value greater than 0"));
    }
    Ok(parsed)
}

fn parse_capacity(value: &str) -> Result<Option<usize>, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "none" | "unbounded" => Ok(None),
        other => parse_positive_usize(other, "--queue-capacity").map(Some),
    }
}

fn print_help() {
    println!("Timeline pipeline benchmark");
    println!();
    println!("Usage:");
    println!("  cargo run --bin timeline_bench -- [options]");
    println!();
    println!("Options:");
    println!("  --events <n>                 Events to publish (default: 10000)");
    println!("  --queue-capacity <n|none>    Bus queue capacity (default: config/env)");
    println!("  --data-dir <path>            Where timeline_backups/ is written");
    println!("  --output <path>              JSON report path (default: timeline_bench_results.json)");
    println!("  --verbose                    Enable tracing output (RUST_LOG honored)");
}
