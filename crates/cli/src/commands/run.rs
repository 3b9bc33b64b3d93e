//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::feed::{self, FeedStats, RunStats};

/// Execute the `run` command
pub async fn run_dispatcher(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    // Load and parse configuration
    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        transport = %blueprint.transport.name,
        transport_type = ?blueprint.transport.transport_type,
        burst_cap = blueprint.dispatcher.burst.cap,
        burst_window_ms = blueprint.dispatcher.burst.window_ms,
        queue_capacity = blueprint.dispatcher.queue.capacity,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let dispatcher = dispatcher::create_dispatcher(&blueprint)?;
    let handle = dispatcher.handle();
    let tick_interval = blueprint.dispatcher.tick.interval();
    let started = Instant::now();
    let task = dispatcher.spawn();

    let status_task = (args.status_interval > 0).then(|| {
        tokio::spawn(feed::report_status(
            handle.clone(),
            Duration::from_secs(args.status_interval),
        ))
    });

    let input = feed::open_input(args.input.as_deref()).await?;
    let shutdown_signal = setup_shutdown_signal();
    tokio::pin!(shutdown_signal);

    info!("Reading notification requests...");

    let mut interrupted = false;
    let feed_stats = tokio::select! {
        result = feed::feed_requests(&handle, input) => result?,
        _ = &mut shutdown_signal => {
            warn!("Received shutdown signal, draining...");
            interrupted = true;
            FeedStats::default()
        }
    };

    if !interrupted && args.linger > 0 {
        info!(linger_secs = args.linger, "Input finished, waiting for queue to empty");
        tokio::select! {
            idle = feed::wait_idle(&handle, Duration::from_secs(args.linger), tick_interval) => {
                if !idle {
                    warn!("Queue not empty after linger period");
                }
            }
            _ = &mut shutdown_signal => {
                warn!("Received shutdown signal, draining...");
                interrupted = true;
            }
        }
    }

    handle.shutdown();
    let drain = task
        .await
        .map_err(|e| CliError::dispatcher_task(e.to_string()))?;
    if let Some(status_task) = status_task {
        status_task.abort();
    }

    let stats = RunStats {
        feed: feed_stats,
        interrupted,
        duration: started.elapsed(),
        metrics: handle.metrics(),
        drain,
    };

    info!(
        delivered = stats.metrics.delivered_count,
        dropped = stats.metrics.dropped_count,
        duration_secs = stats.duration.as_secs_f64(),
        throughput = format!("{:.2}", stats.throughput()),
        "Dispatcher finished"
    );

    if args.json {
        println!(
            "{}",
            stats.to_json().context("Failed to serialize run statistics")?
        );
    } else {
        stats.print_summary();
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::NotifierBlueprint) {
    let d = &blueprint.dispatcher;
    println!("\n=== Configuration Summary ===\n");
    println!(
        "Transport: {} ({:?})",
        blueprint.transport.name, blueprint.transport.transport_type
    );
    println!("Burst: {} sends / {}ms", d.burst.cap, d.burst.window_ms);
    println!(
        "Tick: every {}ms, budget {}, timeout {}ms",
        d.tick.interval_ms, d.tick.send_budget, d.tick.send_timeout_ms
    );
    println!(
        "Queue: capacity {}, overflow {:?}",
        d.queue.capacity, d.queue.overflow
    );
    println!(
        "Breaker: {} rate limits / {}ms, cooldown {}ms",
        d.breaker.threshold, d.breaker.window_ms, d.breaker.cooldown_ms
    );
    println!("Drain grace: {}ms", d.drain.grace_ms);
    println!();
}
