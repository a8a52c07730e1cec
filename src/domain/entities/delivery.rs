//! # Delivery Entities
//!
//! 配信先、配信履歴、配信結果

use std::collections::HashSet;

/// 配信先の集合
///
/// 送信を試みる前に空でないことを確認する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSet {
    addresses: Vec<String>,
}

impl DestinationSet {
    /// 空白を除去し、空の要素を捨てて作成
    pub fn new(addresses: impl IntoIterator<Item = String>) -> Self {
        Self {
            addresses: addresses
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    /// カンマ区切りの文字列から作成
    ///
    /// ```
    /// use issue_courier::domain::entities::delivery::DestinationSet;
    ///
    /// let set = DestinationSet::parse_list(" a@kindle.com, ,b@kindle.com ");
    /// assert_eq!(set.addresses(), &["a@kindle.com", "b@kindle.com"]);
    /// ```
    pub fn parse_list(raw: &str) -> Self {
        Self::new(raw.split(',').map(str::to_string))
    }

    /// 配信先
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// 配信先の数
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// 配信先が空かどうか
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// 配信履歴
///
/// 既に配信したファイル名の集合。重複行は集合として扱う
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryHistory {
    delivered: HashSet<String>,
}

impl DeliveryHistory {
    /// 空の履歴を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 改行区切りのテキストから読み込む（空行は無視）
    pub fn from_lines(content: &str) -> Self {
        Self {
            delivered: content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// 配信済みかどうか
    pub fn is_delivered(&self, filename: &str) -> bool {
        self.delivered.contains(filename.trim())
    }

    /// 配信済みとして追加
    pub fn add(&mut self, filename: &str) {
        self.delivered.insert(filename.trim().to_string());
    }

    /// 配信済みファイルの数
    pub fn len(&self) -> usize {
        self.delivered.len()
    }

    /// 履歴が空かどうか
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
    }
}

/// 1ファイルの配信結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// 送信に成功した宛先の数
    pub delivered: usize,
    /// 送信を試みた宛先の数
    pub attempted: usize,
    /// 接続を試みた回数
    pub connection_attempts: u32,
}

impl DispatchReport {
    /// 少なくとも1件届いていれば成功
    pub fn is_success(&self) -> bool {
        self.delivered > 0
    }
}
