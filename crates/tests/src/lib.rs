//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置 → 分发器 → 传输 的端到端测试（手动时钟驱动）
//! - 停机排空行为

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{NotifierBlueprint, Priority};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_default_blueprint_survives_toml() {
        let toml = ConfigLoader::to_toml(&NotifierBlueprint::default()).unwrap();
        let parsed = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();

        assert_eq!(parsed.dispatcher.burst.cap, 30);
        assert_eq!(parsed.dispatcher.retry.max_retries, 3);
        assert_eq!(parsed.transport.name, "log");
    }

    #[test]
    fn test_priority_wire_format() {
        let p: Priority = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(p, Priority::Critical);
        assert_eq!(serde_json::to_string(&Priority::Low).unwrap(), "\"low\"");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{BreakerState, NotifierBlueprint, Priority, Transport};
    use dispatcher::{
        create_dispatcher, join_events, BuiltinTransport, Dispatcher, ManualClock,
        SimulatedOutcome, SimulatedTransport,
    };
    use serde_json::Value;

    fn blueprint_from_toml(toml: &str) -> NotifierBlueprint {
        ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap()
    }

    fn manual_dispatcher<T: Transport + Send + Sync + 'static>(
        blueprint: &NotifierBlueprint,
        transport: T,
    ) -> (Dispatcher<T>, ManualClock) {
        let clock = ManualClock::new();
        let dispatcher = Dispatcher::with_clock(
            blueprint.dispatcher.clone(),
            transport,
            Arc::new(clock.clone()),
        )
        .unwrap();
        (dispatcher, clock)
    }

    /// End-to-end: TOML config -> simulated transport -> delivery
    ///
    /// 验证完整的数据流：
    /// 1. ConfigLoader 解析并校验配置
    /// 2. BuiltinTransport 按配置创建模拟传输
    /// 3. Dispatcher 按优先级发送全部通知
    #[tokio::test]
    async fn test_e2e_config_to_delivery() {
        let blueprint = blueprint_from_toml(
            r#"
            [dispatcher.burst]
            cap = 10
            window_ms = 1000

            [dispatcher.tick]
            send_budget = 10

            [transport]
            name = "sim"
            transport_type = "simulated"

            [transport.simulation]
            rate_limited_ratio = 0.0
            transient_ratio = 0.0
            permanent_ratio = 0.0
            latency_ms = 0
            "#,
        );
        let transport = BuiltinTransport::from_config(&blueprint.transport);
        let (dispatcher, clock) = manual_dispatcher(&blueprint, transport);
        let handle = dispatcher.handle();

        for i in 0..15 {
            let priority = if i % 5 == 0 {
                Priority::Critical
            } else {
                Priority::Normal
            };
            handle
                .submit(format!("chat-{i}"), format!("update #{i}"), priority)
                .unwrap();
        }

        let first = dispatcher.tick().await;
        assert_eq!(first.delivered, 10);

        clock.advance(Duration::from_secs(1));
        let second = dispatcher.tick().await;
        assert_eq!(second.delivered, 5);

        let status = dispatcher.status();
        assert_eq!(status.delivered_total, 15);
        assert_eq!(status.queue_depth, 0);
        assert_eq!(status.breaker_state, BreakerState::Closed);
    }

    /// No rolling window ever holds more than `cap` sends
    #[tokio::test]
    async fn test_e2e_burst_window_never_exceeded() {
        let blueprint = blueprint_from_toml(
            r#"
            [dispatcher.burst]
            cap = 5
            window_ms = 1000

            [dispatcher.tick]
            interval_ms = 100
            send_budget = 3
            "#,
        );
        let (dispatcher, clock) =
            manual_dispatcher(&blueprint, SimulatedTransport::reliable("sim"));
        let handle = dispatcher.handle();

        for i in 0..40 {
            handle
                .submit(format!("chat-{}", i % 7), format!("message {i}"), Priority::Low)
                .unwrap();
        }

        // (elapsed ms, delivered in that tick)
        let mut deliveries = Vec::new();
        for step in 0..100u64 {
            let report = dispatcher.tick().await;
            deliveries.push((step * 100, report.delivered));
            clock.advance(Duration::from_millis(100));
        }

        for &(start, _) in &deliveries {
            let in_window: usize = deliveries
                .iter()
                .filter(|(t, _)| *t >= start && *t < start + 1000)
                .map(|(_, n)| n)
                .sum();
            assert!(in_window <= 5, "window at {start}ms had {in_window} sends");
        }

        let total: usize = deliveries.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 40);
    }

    /// Duplicates inside the TTL are suppressed; merged groups go out once
    #[tokio::test]
    async fn test_e2e_dedup_and_merge() {
        let blueprint = blueprint_from_toml(
            r#"
            [dispatcher.dedup]
            ttl_ms = 30000

            [dispatcher.announce]
            buffer_window_ms = 10000
            max_batch = 20
            cooldown_gap_ms = 15000
            "#,
        );
        let (dispatcher, clock) =
            manual_dispatcher(&blueprint, SimulatedTransport::reliable("sim"));
        let handle = dispatcher.handle();

        handle
            .submit("chat-1", "Server restarting", Priority::High)
            .unwrap();
        handle
            .submit("chat-1", "server   RESTARTING", Priority::High)
            .unwrap();
        for name in ["alice", "bob"] {
            handle
                .enqueue_mergeable(
                    "chat-1",
                    "joins",
                    Value::from(name),
                    join_events("New members: "),
                    Priority::Low,
                )
                .unwrap();
        }

        let report = dispatcher.tick().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.suppressed, 1);

        clock.advance(Duration::from_secs(10));
        let report = dispatcher.tick().await;
        assert_eq!(report.flushed_groups, 1);
        assert_eq!(report.delivered, 1);

        // Past the TTL the same text goes out again
        clock.advance(Duration::from_secs(21));
        handle
            .submit("chat-1", "Server restarting", Priority::High)
            .unwrap();
        assert_eq!(dispatcher.tick().await.delivered, 1);

        let sent: Vec<String> = dispatcher
            .transport()
            .sent()
            .into_iter()
            .map(|(_, p)| p.into_string())
            .collect();
        assert_eq!(
            sent,
            vec![
                "Server restarting",
                "New members: alice, bob",
                "Server restarting"
            ]
        );
        assert_eq!(dispatcher.status().suppressed_total, 1);
    }

    /// Sustained rate limiting opens the breaker; no calls while open
    #[tokio::test]
    async fn test_e2e_breaker_fail_fast() {
        let blueprint = blueprint_from_toml(
            r#"
            [dispatcher.backoff]
            base_ms = 100
            max_ms = 1000
            jitter_ms = 0

            [dispatcher.breaker]
            threshold = 3
            window_ms = 60000
            cooldown_ms = 60000

            [dispatcher.retry]
            max_retries = 10
            "#,
        );
        let transport = SimulatedTransport::scripted(
            "sim",
            vec![SimulatedOutcome::RateLimited(None); 3],
        );
        let (dispatcher, clock) = manual_dispatcher(&blueprint, transport);
        let handle = dispatcher.handle();

        for i in 0..3 {
            handle
                .submit(format!("chat-{i}"), "ping", Priority::Normal)
                .unwrap();
        }
        dispatcher.tick().await;
        assert_eq!(dispatcher.status().breaker_state, BreakerState::Open);

        for _ in 0..10 {
            clock.advance(Duration::from_secs(5));
            assert!(dispatcher.tick().await.skipped_breaker_open);
        }
        assert_eq!(dispatcher.transport().call_count(), 3);

        clock.advance(Duration::from_secs(10));
        let report = dispatcher.tick().await;
        assert_eq!(report.delivered, 3);
        assert_eq!(dispatcher.status().breaker_state, BreakerState::Closed);
    }

    /// Spawned on the real clock: deliver, then drain on shutdown
    #[tokio::test]
    async fn test_e2e_spawned_run_and_drain() {
        let blueprint = blueprint_from_toml(
            r#"
            [dispatcher.tick]
            interval_ms = 10

            [dispatcher.drain]
            grace_ms = 500
            "#,
        );
        let dispatcher = create_dispatcher(&blueprint).unwrap();
        let handle = dispatcher.handle();
        let task = dispatcher.spawn();

        for i in 0..5 {
            handle
                .submit(format!("chat-{i}"), format!("hello {i}"), Priority::Normal)
                .unwrap();
        }

        let mut delivered = 0;
        for _ in 0..100 {
            delivered = handle.status().delivered_total;
            if delivered == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(delivered, 5);

        handle.shutdown();
        let report = task.await.unwrap();
        assert_eq!(report.dropped_on_shutdown, 0);
        assert_eq!(report.summary.total_delivered, 5);
        assert!(handle.submit("chat-9", "late", Priority::Critical).is_err());
    }
}
