//! # WorkItem Entity
//!
//! カタログから発見された1件の処理単位（雑誌の号）

/// 処理単位
///
/// 実行ごとにカタログから生成され、永続化されない
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// 識別子（カタログ内で一意なスラッグ、例: "edicao-18"）
    pub slug: String,
    /// カタログ上の出現順
    pub position: usize,
}

impl WorkItem {
    /// 新しい処理単位を作成
    pub fn new(slug: impl Into<String>, position: usize) -> Self {
        Self {
            slug: slug.into(),
            position,
        }
    }

    /// リンクの href からスラッグを取り出す
    ///
    /// 前後の `/` を取り除いた最後のパス要素を返します。
    ///
    /// # 例
    ///
    /// ```
    /// use issue_courier::domain::entities::work_item::WorkItem;
    ///
    /// assert_eq!(
    ///     WorkItem::slug_from_href("https://example.com/digital/edicao/edicao-18/"),
    ///     Some("edicao-18".to_string())
    /// );
    /// assert_eq!(WorkItem::slug_from_href("/"), None);
    /// ```
    pub fn slug_from_href(href: &str) -> Option<String> {
        let slug = href.trim().trim_matches('/').rsplit('/').next()?.trim();
        if slug.is_empty() {
            None
        } else {
            Some(slug.to_string())
        }
    }
}
