//! Run statistics and final summary.

use std::time::Duration;

use dispatcher::{DrainReport, MetricsSnapshot};
use serde::Serialize;

/// What the input feed did
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FeedStats {
    /// Requests the dispatcher admitted
    pub accepted: u64,
    /// Requests the dispatcher refused (queue full, malformed)
    pub refused: u64,
    /// Lines that were not valid requests
    pub invalid_lines: u64,
}

/// Statistics from a dispatcher run
#[derive(Debug, Clone)]
pub struct RunStats {
    pub feed: FeedStats,
    /// Stopped by a signal rather than end of input
    pub interrupted: bool,
    /// Wall time from start to end of drain
    pub duration: Duration,
    pub metrics: MetricsSnapshot,
    pub drain: DrainReport,
}

#[derive(Serialize)]
struct RunStatsJson<'a> {
    feed: &'a FeedStats,
    interrupted: bool,
    duration_secs: f64,
    metrics: &'a MetricsSnapshot,
    drain_ticks: usize,
    drained: &'a dispatcher::TickReport,
    dropped_on_shutdown: usize,
    status: &'a contracts::DispatcherStatus,
    dropped_by_reason: &'a [(String, u64)],
}

impl RunStats {
    /// Delivered messages per second of run time
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.metrics.delivered_count as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&RunStatsJson {
            feed: &self.feed,
            interrupted: self.interrupted,
            duration_secs: self.duration.as_secs_f64(),
            metrics: &self.metrics,
            drain_ticks: self.drain.drain_ticks,
            drained: &self.drain.drained,
            dropped_on_shutdown: self.drain.dropped_on_shutdown,
            status: &self.drain.status,
            dropped_by_reason: &self.drain.summary.dropped_by_reason,
        })
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                  Dispatcher Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📥 Input");
        println!("   ├─ Accepted: {}", self.feed.accepted);
        println!("   ├─ Refused: {}", self.feed.refused);
        println!("   ├─ Invalid lines: {}", self.feed.invalid_lines);
        println!(
            "   └─ Ended by: {}",
            if self.interrupted { "signal" } else { "end of input" }
        );

        println!("\n📊 Delivery");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Delivered: {}", self.metrics.delivered_count);
        println!("   ├─ Requeued: {}", self.metrics.requeued_count);
        println!("   ├─ Suppressed duplicates: {}", self.metrics.suppressed_count);
        println!("   ├─ Dropped: {}", self.metrics.dropped_count);
        println!("   └─ Throughput: {:.2} msg/s", self.throughput());

        println!("\n🛑 Drain");
        println!("   ├─ Groups flushed: {}", self.drain.flushed_groups);
        println!("   ├─ Drain ticks: {}", self.drain.drain_ticks);
        println!("   ├─ Delivered while draining: {}", self.drain.drained.delivered);
        println!("   └─ Dropped at shutdown: {}", self.drain.dropped_on_shutdown);

        println!("\n{}", self.drain.summary);
    }
}
