//! # Dispatcher
//!
//! 限流通知分发模块。
//!
//! 负责：
//! - 按优先级排队待发送的通知
//! - 遵守平台限流：全局突发窗口、按接收方退避、熔断
//! - 短时去重、合并同组公告
//! - 停机时优先发送紧急通知

pub mod announce;
pub mod breaker;
pub mod clock;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod rate_state;
pub mod scheduler;
mod state;
pub mod throttle;
pub mod transports;

pub use announce::{join_events, AnnouncementBuffer, MergeFn, MergeableEvent};
pub use breaker::CircuitBreaker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use contracts::{DispatchItem, Payload, Priority, RecipientId, Transport};
pub use dedup::DedupCache;
pub use dispatcher::{create_dispatcher, Dispatcher, DrainReport};
pub use error::{DispatchError, DropReason};
pub use handle::DispatcherHandle;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use rate_state::{backoff_delay, RateTracker, RecipientRateState};
pub use scheduler::{Admission, PriorityScheduler};
pub use state::TickReport;
pub use throttle::BurstThrottle;
pub use transports::{BuiltinTransport, LogTransport, SimulatedOutcome, SimulatedTransport};
