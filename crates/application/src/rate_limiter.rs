//! 滑动窗口限流器。
//!
//! 对每个 subject key 维护窗口内的事件时间戳：窗口内计数达到
//! 上限则拒绝且不记录新事件，否则记录并放行。拒绝只是一个
//! 普通的返回值，绝不向流水线抛异常。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Duration;

use crate::clock::Clock;

/// 一条限流策略：窗口长度 + 窗口内最大事件数。
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_events: u32,
}

impl RateLimitPolicy {
    pub fn new(window: Duration, max_events: u32) -> Self {
        Self { window, max_events }
    }

    /// 每分钟 `max_events` 次。
    pub fn per_minute(max_events: u32) -> Self {
        Self::new(Duration::minutes(1), max_events)
    }
}

/// 进程内滑动窗口计数器。
///
/// 时间一律来自注入的时钟，窗口判定可在测试里确定性重放。
pub struct SlidingWindowLimiter {
    clock: Arc<dyn Clock>,
    events: RwLock<HashMap<String, Vec<domain::Timestamp>>>,
}

impl SlidingWindowLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            events: RwLock::new(HashMap::new()),
        }
    }

    /// 检查并记录一次事件。返回 `true` 表示放行。
    ///
    /// 被拒绝的事件不会被记录，因此不会把窗口往后顶。
    pub fn check_and_record(&self, subject_key: &str, policy: RateLimitPolicy) -> bool {
        let now = self.clock.now();
        let cutoff = now - policy.window;

        let mut events = match self.events.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // 顺带清掉早已滑出窗口的 key，长寿命进程不会无界增长
        let sweep_cutoff = now - policy.window.max(Duration::hours(1));
        events.retain(|_, entries| {
            entries.retain(|ts| *ts >= sweep_cutoff);
            !entries.is_empty()
        });

        let entries = events.entry(subject_key.to_owned()).or_default();
        entries.retain(|ts| *ts >= cutoff);

        if entries.len() as u32 >= policy.max_events {
            return false;
        }

        entries.push(now);
        true
    }

    #[cfg(test)]
    fn subject_count(&self) -> usize {
        match self.events.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
