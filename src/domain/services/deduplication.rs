//! # Deduplication Service
//!
//! 重複排除サービス

use std::collections::HashSet;
use std::hash::Hash;

use crate::domain::entities::work_item::WorkItem;

/// 重複排除サービス
///
/// カタログやリンク一覧の重複を、最初の出現順を保ったまま取り除く
pub struct DeduplicationService;

impl DeduplicationService {
    /// 最初の出現を残して重複を除外する
    ///
    /// 後から現れた重複は捨てられ、前に繰り上がることはない
    ///
    /// # Arguments
    ///
    /// * `items` - フィルタリング対象
    ///
    /// # Returns
    ///
    /// 重複が除外されたリスト（元の順序）
    pub fn unique_in_order<T, I>(items: I) -> Vec<T>
    where
        T: Eq + Hash + Clone,
        I: IntoIterator<Item = T>,
    {
        let mut seen = HashSet::new();
        items
            .into_iter()
            .filter(|item| seen.insert(item.clone()))
            .collect()
    }

    /// スラッグ一覧から WorkItem を作成する（重複排除込み）
    ///
    /// # Arguments
    ///
    /// * `slugs` - カタログから取り出したスラッグ
    ///
    /// # Returns
    ///
    /// 出現順の位置を持つ WorkItem のリスト
    pub fn to_work_items<I>(slugs: I) -> Vec<WorkItem>
    where
        I: IntoIterator<Item = String>,
    {
        Self::unique_in_order(slugs)
            .into_iter()
            .enumerate()
            .map(|(position, slug)| WorkItem::new(slug, position))
            .collect()
    }
}
