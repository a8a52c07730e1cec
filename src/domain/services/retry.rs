//! Retry Policy and Error Formatting
//!
//! 接続リトライの方針とエラーチェーンの整形

use std::time::Duration;

// Defaults for SMTP delivery
pub const MAX_CONNECTION_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY_SECS: u64 = 5;

/// 固定間隔のリトライ方針
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 接続を試みる最大回数（1回目を含む）
    pub max_attempts: u32,
    /// 試行間の待ち時間
    pub delay: Duration,
}

impl RetryPolicy {
    /// 新しい方針を作成（最大回数は最低1回）
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// `attempt` 回目（1始まり）が失敗した後に待つ時間
    ///
    /// 最後の試行の後は待たないので `None`
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt < self.max_attempts {
            Some(self.delay)
        } else {
            None
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            MAX_CONNECTION_ATTEMPTS,
            Duration::from_secs(RETRY_DELAY_SECS),
        )
    }
}

/// Convert error chain to string including all causes
pub fn error_chain_to_string(e: &anyhow::Error) -> String {
    let mut messages = Vec::new();
    for cause in e.chain() {
        messages.push(cause.to_string());
    }
    messages.join(" | ")
}
