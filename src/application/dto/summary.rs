//! # Summary DTO
//!
//! 各フェーズの集計結果

use std::fmt;

/// 取得・パッケージフェーズの集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// パッケージまで完了した数
    pub processed: usize,
    /// 処理済みとして飛ばした数
    pub skipped: usize,
    /// 失敗した数
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} skipped, {} failed",
            self.processed, self.skipped, self.failed
        )
    }
}

/// 配信フェーズの集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    /// 送信して保管した数
    pub sent: usize,
    /// 配信済みだったので送らずに保管した数
    pub archived: usize,
    /// 送信に失敗して残した数
    pub failed: usize,
}

impl DeliverySummary {
    /// 何も処理しなかったか
    pub fn is_empty(&self) -> bool {
        self.sent + self.archived + self.failed == 0
    }
}

impl fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sent, {} archived, {} failed",
            self.sent, self.archived, self.failed
        )
    }
}
