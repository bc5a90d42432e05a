use rand::Rng;
use serde::{Deserialize, Serialize};

/// 重试策略配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 首次重试延迟（毫秒）
    pub initial_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 随机抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 300_000, // 5分钟
            backoff_factor: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// 是否还能再尝试（attempts 为已经执行过的次数）
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// 第 attempts 次失败后的延迟（毫秒），带抖动
    pub fn delay_ms(&self, attempts: u32) -> u64 {
        let exponent = attempts.saturating_sub(1) as f64;
        let base = self.initial_delay_ms as f64 * self.backoff_factor.powf(exponent);
        let capped = base.min(self.max_delay_ms as f64);
        let jitter = capped * self.jitter_factor * (rand::thread_rng().gen::<f64>() - 0.5);
        (capped + jitter).max(0.0) as u64
    }

    /// 计算下次尝试的时间戳（毫秒）；超过最大次数时返回 None
    pub fn next_attempt_at(&self, attempts: u32, now_ms: i64) -> Option<i64> {
        if !self.should_retry(attempts) {
            return None;
        }
        Some(now_ms + self.delay_ms(attempts) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_ms(1), 1_000);
        assert_eq!(policy.delay_ms(2), 2_000);
        assert_eq!(policy.delay_ms(3), 4_000);
        assert_eq!(policy.delay_ms(30), 300_000);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.next_attempt_at(1, 0).is_some());
        assert!(policy.next_attempt_at(4, 0).is_some());
        assert!(policy.next_attempt_at(5, 0).is_none());
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy {
            jitter_factor: 0.5,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.delay_ms(1);
            assert!((750..=1_250).contains(&delay), "delay={}", delay);
        }
    }
}
