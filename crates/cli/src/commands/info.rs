//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{NotifierBlueprint, TransportType};
use tracing::info;

use crate::cli::InfoArgs;

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let json = config_loader::ConfigLoader::to_json(&blueprint)
            .context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint);
    }

    Ok(())
}

fn print_config_info(blueprint: &NotifierBlueprint) {
    let d = &blueprint.dispatcher;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║             Notify Dispatcher Configuration                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📡 Transport");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Name: {}", blueprint.transport.name);
    match blueprint.transport.transport_type {
        TransportType::Log => println!("   └─ Type: log"),
        TransportType::Simulated => {
            let sim = &blueprint.transport.simulation;
            println!("   ├─ Type: simulated (seed {})", sim.seed);
            println!(
                "   ├─ Outcomes: {:.1}% rate limited, {:.1}% transient, {:.1}% permanent",
                sim.rate_limited_ratio * 100.0,
                sim.transient_ratio * 100.0,
                sim.permanent_ratio * 100.0
            );
            match sim.retry_after_ms {
                Some(ms) => println!("   ├─ Retry-after hint: {}ms", ms),
                None => println!("   ├─ Retry-after hint: none"),
            }
            println!("   └─ Latency: {}ms", sim.latency_ms);
        }
    }

    println!("\n🚦 Rate Limiting");
    println!("   ├─ Burst: {} sends / {}ms", d.burst.cap, d.burst.window_ms);
    println!(
        "   ├─ Backoff: {}ms base, {}ms max, {}ms jitter",
        d.backoff.base_ms, d.backoff.max_ms, d.backoff.jitter_ms
    );
    println!(
        "   └─ Breaker: {} rate limits in {}ms, {}ms cooldown",
        d.breaker.threshold, d.breaker.window_ms, d.breaker.cooldown_ms
    );

    println!("\n📬 Queue");
    println!("   ├─ Capacity: {} ({:?})", d.queue.capacity, d.queue.overflow);
    println!("   ├─ Lookahead: {}", d.queue.lookahead);
    println!(
        "   ├─ Tick: {}ms, budget {}, send timeout {}ms",
        d.tick.interval_ms, d.tick.send_budget, d.tick.send_timeout_ms
    );
    println!(
        "   └─ Retries: {} max, {}ms transient delay",
        d.retry.max_retries, d.retry.transient_delay_ms
    );

    println!("\n🧹 Dedup & Announcements");
    println!(
        "   ├─ Dedup: {}ms TTL, {} char prefix",
        d.dedup.ttl_ms, d.dedup.prefix_len
    );
    println!(
        "   ├─ Announce window: {}ms, max batch {}",
        d.announce.buffer_window_ms, d.announce.max_batch
    );
    println!("   └─ Cooldown gap: {}ms", d.announce.cooldown_gap_ms);

    println!("\n🛑 Drain grace: {}ms", d.drain.grace_ms);
    println!();
}
