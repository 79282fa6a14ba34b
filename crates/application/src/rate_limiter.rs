//! 发送限流
//!
//! 敏感操作防护：滑动窗口内限制单用户的发送次数。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use domain::{DomainError, UserId};
use tokio::sync::Mutex;

pub struct SendRateLimiter {
    max_per_window: u32,
    window: Duration,
    entries: Mutex<HashMap<UserId, (Instant, u32)>>,
}

impl SendRateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 默认：每分钟 50 条。
    pub fn with_defaults() -> Self {
        Self::new(50, Duration::from_secs(60))
    }

    pub async fn check(&self, user: UserId) -> Result<(), DomainError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        // 清理过期窗口
        entries.retain(|_, (started, _)| now.duration_since(*started) < self.window);

        match entries.get_mut(&user) {
            Some((started, count)) => {
                if *count >= self.max_per_window {
                    let retry_in = self.window - now.duration_since(*started);
                    return Err(DomainError::RateLimited(format!(
                        "发送过于频繁，请{}秒后再试",
                        retry_in.as_secs().max(1)
                    )));
                }
                *count += 1;
            }
            None => {
                entries.insert(user, (now, 1));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limits_after_max_sends_in_window() {
        let limiter = SendRateLimiter::new(3, Duration::from_secs(60));
        let user = UserId::generate();

        for _ in 0..3 {
            assert!(limiter.check(user).await.is_ok());
        }
        assert!(matches!(
            limiter.check(user).await,
            Err(DomainError::RateLimited(_))
        ));

        // 其他用户不受影响
        assert!(limiter.check(UserId::generate()).await.is_ok());
    }
}
