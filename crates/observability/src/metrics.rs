//! Dispatcher 指标收集模块
//!
//! 记录通知分发的运行指标：入队、送达、丢弃、重试、熔断状态。

use std::collections::HashMap;

use contracts::{BreakerState, DispatcherStatus, Priority};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// Register help text and units for every dispatcher metric.
///
/// Called once when the Prometheus exporter is installed.
pub fn describe_metrics() {
    describe_gauge!("notify_dispatcher_queue_depth", Unit::Count, "Items waiting in the scheduler");
    describe_gauge!(
        "notify_dispatcher_blocked_recipients",
        Unit::Count,
        "Recipients inside a backoff block"
    );
    describe_gauge!(
        "notify_dispatcher_sends_in_window",
        Unit::Count,
        "Successful sends inside the current burst window"
    );
    describe_gauge!(
        "notify_dispatcher_pending_groups",
        Unit::Count,
        "Announcement groups still buffering"
    );
    describe_gauge!("notify_dispatcher_breaker_open", "1 while the circuit breaker is open");
    describe_counter!(
        "notify_dispatcher_breaker_opened_total",
        Unit::Count,
        "Times the circuit breaker opened"
    );
    describe_counter!("notify_dispatcher_enqueued_total", Unit::Count, "Items admitted to the queue");
    describe_counter!("notify_dispatcher_delivered_total", Unit::Count, "Successful deliveries");
    describe_counter!("notify_dispatcher_dropped_total", Unit::Count, "Items dropped, by reason");
    describe_counter!("notify_dispatcher_requeued_total", Unit::Count, "Failed attempts requeued");
    describe_counter!("notify_dispatcher_rejected_total", Unit::Count, "Items refused at enqueue");
    describe_histogram!(
        "notify_dispatcher_send_latency_ms",
        Unit::Milliseconds,
        "Transport call latency"
    );
    describe_histogram!(
        "notify_dispatcher_queue_wait_ms",
        Unit::Milliseconds,
        "Time from enqueue to delivery"
    );
    describe_histogram!("notify_dispatcher_tick_attempts", Unit::Count, "Sends attempted per tick");
}

/// 从 DispatcherStatus 记录仪表指标
///
/// 每个 tick 结束时调用。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_status;
///
/// let status = handle.status();
/// record_status(&status);
/// ```
pub fn record_status(status: &DispatcherStatus) {
    record_queue_depth(status.queue_depth);
    gauge!("notify_dispatcher_blocked_recipients").set(status.blocked_recipient_count as f64);
    gauge!("notify_dispatcher_sends_in_window").set(status.sends_in_current_window as f64);
    gauge!("notify_dispatcher_pending_groups").set(status.pending_groups as f64);
    record_breaker_state(status.breaker_state);
}

/// 记录熔断器状态 (1 = open)
pub fn record_breaker_state(state: BreakerState) {
    let open = if state == BreakerState::Open { 1.0 } else { 0.0 };
    gauge!("notify_dispatcher_breaker_open").set(open);
}

/// 记录熔断器打开事件
pub fn record_breaker_opened() {
    counter!("notify_dispatcher_breaker_opened_total").increment(1);
}

/// 记录入队
pub fn record_enqueued(priority: Priority) {
    counter!(
        "notify_dispatcher_enqueued_total",
        "priority" => priority.as_str()
    )
    .increment(1);
}

/// 记录送达
pub fn record_delivered(priority: Priority) {
    counter!(
        "notify_dispatcher_delivered_total",
        "priority" => priority.as_str()
    )
    .increment(1);
}

/// 记录单次发送耗时 (毫秒)
pub fn record_send_latency_ms(latency_ms: f64) {
    histogram!("notify_dispatcher_send_latency_ms").record(latency_ms);
}

/// 记录排队等待时长 (毫秒)
pub fn record_queue_wait_ms(priority: Priority, wait_ms: f64) {
    histogram!(
        "notify_dispatcher_queue_wait_ms",
        "priority" => priority.as_str()
    )
    .record(wait_ms);
}

/// 记录队列深度
pub fn record_queue_depth(depth: usize) {
    gauge!("notify_dispatcher_queue_depth").set(depth as f64);
}

/// 记录丢弃 (reason 为 DropReason 代码)
pub fn record_dropped(reason: &'static str, priority: Priority) {
    counter!(
        "notify_dispatcher_dropped_total",
        "reason" => reason,
        "priority" => priority.as_str()
    )
    .increment(1);
}

/// 记录重新入队 (kind: rate_limited / transient)
pub fn record_requeued(kind: &'static str) {
    counter!("notify_dispatcher_requeued_total", "kind" => kind).increment(1);
}

/// 记录被拒绝的入队请求
pub fn record_rejected(priority: Priority) {
    counter!(
        "notify_dispatcher_rejected_total",
        "priority" => priority.as_str()
    )
    .increment(1);
}

/// 记录单个 tick 的实际发送数
pub fn record_tick_attempts(attempts: usize) {
    histogram!("notify_dispatcher_tick_attempts").record(attempts as f64);
}

/// 分发指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryStatsAggregator {
    /// 送达总数
    pub total_delivered: u64,

    /// 重新入队总数
    pub total_requeued: u64,

    /// 熔断器打开次数
    pub breaker_opens: u64,

    /// 发送耗时统计 (毫秒)
    pub send_latency: RunningStats,

    /// 排队等待统计 (毫秒)
    pub queue_wait: RunningStats,

    /// 各原因丢弃次数
    pub dropped_by_reason: HashMap<&'static str, u64>,
}

impl DeliveryStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次送达
    pub fn record_delivered(&mut self, send_latency_ms: f64, queue_wait_ms: f64) {
        self.total_delivered += 1;
        self.send_latency.push(send_latency_ms);
        self.queue_wait.push(queue_wait_ms);
    }

    /// 记录一次丢弃
    pub fn record_dropped(&mut self, reason: &'static str) {
        *self.dropped_by_reason.entry(reason).or_insert(0) += 1;
    }

    /// 记录一次重新入队
    pub fn record_requeued(&mut self) {
        self.total_requeued += 1;
    }

    /// 记录熔断器打开
    pub fn record_breaker_opened(&mut self) {
        self.breaker_opens += 1;
    }

    /// 丢弃总数
    pub fn total_dropped(&self) -> u64 {
        self.dropped_by_reason.values().sum()
    }

    /// 生成摘要报告
    pub fn summary(&self) -> DeliverySummary {
        let total_dropped = self.total_dropped();
        let finished = self.total_delivered + total_dropped;
        let mut dropped_by_reason: Vec<(String, u64)> = self
            .dropped_by_reason
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        dropped_by_reason.sort();

        DeliverySummary {
            total_delivered: self.total_delivered,
            total_dropped,
            total_requeued: self.total_requeued,
            breaker_opens: self.breaker_opens,
            drop_rate: if finished > 0 {
                total_dropped as f64 / finished as f64 * 100.0
            } else {
                0.0
            },
            send_latency_ms: StatsSummary::from(&self.send_latency),
            queue_wait_ms: StatsSummary::from(&self.queue_wait),
            dropped_by_reason,
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct DeliverySummary {
    pub total_delivered: u64,
    pub total_dropped: u64,
    pub total_requeued: u64,
    pub breaker_opens: u64,
    pub drop_rate: f64,
    pub send_latency_ms: StatsSummary,
    pub queue_wait_ms: StatsSummary,
    pub dropped_by_reason: Vec<(String, u64)>,
}

impl std::fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Delivered: {}", self.total_delivered)?;
        writeln!(
            f,
            "Dropped: {} ({:.2}%)",
            self.total_dropped, self.drop_rate
        )?;
        writeln!(f, "Requeued: {}", self.total_requeued)?;
        writeln!(f, "Breaker opens: {}", self.breaker_opens)?;
        writeln!(f, "Send latency (ms): {}", self.send_latency_ms)?;
        writeln!(f, "Queue wait (ms): {}", self.queue_wait_ms)?;

        if !self.dropped_by_reason.is_empty() {
            writeln!(f, "Dropped by reason:")?;
            for (reason, count) in &self.dropped_by_reason {
                writeln!(f, "  {}: {}", reason, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        stats.push(1.0);
        stats.push(2.0);
        stats.push(3.0);
        stats.push(4.0);
        stats.push(5.0);

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = DeliveryStatsAggregator::new();

        aggregator.record_delivered(12.0, 300.0);
        aggregator.record_delivered(8.0, 100.0);
        aggregator.record_dropped("DUPLICATE");
        aggregator.record_dropped("MAX_RETRIES_EXCEEDED");
        aggregator.record_dropped("DUPLICATE");
        aggregator.record_requeued();

        assert_eq!(aggregator.total_delivered, 2);
        assert_eq!(aggregator.total_dropped(), 3);
        assert_eq!(aggregator.dropped_by_reason.get("DUPLICATE"), Some(&2));

        let summary = aggregator.summary();
        assert!((summary.drop_rate - 60.0).abs() < 1e-10);
        assert!((summary.send_latency_ms.mean - 10.0).abs() < 1e-10);
        assert_eq!(summary.dropped_by_reason[0], ("DUPLICATE".to_string(), 2));
    }

    #[test]
    fn test_summary_display() {
        let summary = DeliverySummary {
            total_delivered: 95,
            total_dropped: 5,
            total_requeued: 7,
            breaker_opens: 1,
            drop_rate: 5.0,
            send_latency_ms: StatsSummary {
                count: 95,
                min: 20.0,
                max: 80.0,
                mean: 50.0,
                std_dev: 15.0,
            },
            queue_wait_ms: StatsSummary::default(),
            dropped_by_reason: vec![("SHUTDOWN".to_string(), 5)],
        };

        let output = format!("{}", summary);
        assert!(output.contains("Delivered: 95"));
        assert!(output.contains("5.00%"));
        assert!(output.contains("SHUTDOWN: 5"));
    }

    #[test]
    fn test_record_helpers_without_recorder() {
        // The metrics facade is a no-op until a recorder is installed
        record_enqueued(Priority::High);
        record_dropped("INTERNAL", Priority::Low);
        record_status(&DispatcherStatus::default());
    }
}
