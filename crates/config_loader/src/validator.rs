//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (validator derive)
//! - backoff.base_ms <= backoff.max_ms
//! - tick.send_budget <= burst.cap
//! - announce.max_batch <= queue.capacity
//! - 模拟传输的比例之和 <= 1

use contracts::{ContractError, NotifierBlueprint, TransportType};
use ::validator::Validate;

/// 校验 NotifierBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &NotifierBlueprint) -> Result<(), ContractError> {
    blueprint.validate()?;
    validate_backoff(blueprint)?;
    validate_budget(blueprint)?;
    validate_announce(blueprint)?;
    validate_simulation(blueprint)?;
    Ok(())
}

/// 校验退避上下限
fn validate_backoff(blueprint: &NotifierBlueprint) -> Result<(), ContractError> {
    let backoff = &blueprint.dispatcher.backoff;
    if backoff.base_ms > backoff.max_ms {
        return Err(ContractError::config_validation(
            "dispatcher.backoff.base_ms / dispatcher.backoff.max_ms",
            format!(
                "base_ms ({}) must be <= max_ms ({})",
                backoff.base_ms, backoff.max_ms
            ),
        ));
    }
    Ok(())
}

/// 单次 tick 预算不能超过突发上限
fn validate_budget(blueprint: &NotifierBlueprint) -> Result<(), ContractError> {
    let dispatcher = &blueprint.dispatcher;
    if dispatcher.tick.send_budget > dispatcher.burst.cap {
        return Err(ContractError::config_validation(
            "dispatcher.tick.send_budget",
            format!(
                "send_budget ({}) must be <= burst.cap ({})",
                dispatcher.tick.send_budget, dispatcher.burst.cap
            ),
        ));
    }
    Ok(())
}

/// 合并批次不能超过队列容量
fn validate_announce(blueprint: &NotifierBlueprint) -> Result<(), ContractError> {
    let dispatcher = &blueprint.dispatcher;
    if dispatcher.announce.max_batch > dispatcher.queue.capacity {
        return Err(ContractError::config_validation(
            "dispatcher.announce.max_batch",
            format!(
                "max_batch ({}) must be <= queue.capacity ({})",
                dispatcher.announce.max_batch, dispatcher.queue.capacity
            ),
        ));
    }
    Ok(())
}

/// 校验模拟传输的结果分布
fn validate_simulation(blueprint: &NotifierBlueprint) -> Result<(), ContractError> {
    if blueprint.transport.transport_type != TransportType::Simulated {
        return Ok(());
    }
    let sim = &blueprint.transport.simulation;
    let total = sim.rate_limited_ratio + sim.transient_ratio + sim.permanent_ratio;
    if total > 1.0 {
        return Err(ContractError::config_validation(
            "transport.simulation",
            format!("failure ratios sum to {total:.3}, must be <= 1"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&NotifierBlueprint::default()).is_ok());
    }

    #[test]
    fn test_base_above_max() {
        let mut bp = NotifierBlueprint::default();
        bp.dispatcher.backoff.base_ms = 10_000;
        bp.dispatcher.backoff.max_ms = 1_000;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("must be <= max_ms"), "got: {err}");
    }

    #[test]
    fn test_budget_above_cap() {
        let mut bp = NotifierBlueprint::default();
        bp.dispatcher.burst.cap = 5;
        bp.dispatcher.tick.send_budget = 6;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("send_budget"), "got: {err}");
    }

    #[test]
    fn test_max_batch_above_capacity() {
        let mut bp = NotifierBlueprint::default();
        bp.dispatcher.queue.capacity = 10;
        bp.dispatcher.announce.max_batch = 11;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("max_batch"), "got: {err}");
    }

    #[test]
    fn test_range_violation_reports_path() {
        let mut bp = NotifierBlueprint::default();
        bp.dispatcher.breaker.threshold = 0;
        let err = validate(&bp).unwrap_err();
        match err {
            ContractError::ConfigValidation { field, .. } => {
                assert_eq!(field, "dispatcher.breaker.threshold")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_simulation_ratios_sum() {
        let mut bp = NotifierBlueprint::default();
        bp.transport.transport_type = TransportType::Simulated;
        bp.transport.simulation.rate_limited_ratio = 0.6;
        bp.transport.simulation.transient_ratio = 0.6;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("must be <= 1"), "got: {err}");
    }

    #[test]
    fn test_simulation_ratios_ignored_for_log_transport() {
        let mut bp = NotifierBlueprint::default();
        bp.transport.simulation.rate_limited_ratio = 0.6;
        bp.transport.simulation.transient_ratio = 0.6;
        assert!(validate(&bp).is_ok());
    }
}
