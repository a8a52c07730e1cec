//! # ArtifactSet / PackagedArtifact
//!
//! 1件の処理単位から取得した成果物と、パッケージ後の配信用ファイル

use std::path::PathBuf;

/// カバー画像のファイル名
pub const COVER_FILE_NAME: &str = "cover.jpg";

/// 成果物1件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// 記事のテキスト（発見順の連番付き）
    Text { sequence: usize, content: String },
    /// 画像のバイト列
    Image { file_name: String, bytes: Vec<u8> },
}

impl Artifact {
    /// 出力ディレクトリ内でのファイル名
    pub fn file_name(&self) -> String {
        match self {
            Artifact::Text { sequence, .. } => article_file_name(*sequence),
            Artifact::Image { file_name, .. } => file_name.clone(),
        }
    }

    /// 書き込むバイト列
    pub fn bytes(&self) -> &[u8] {
        match self {
            Artifact::Text { content, .. } => content.as_bytes(),
            Artifact::Image { bytes, .. } => bytes,
        }
    }
}

/// 記事ファイル名（ゼロ埋めした発見順）
///
/// ```
/// use issue_courier::domain::entities::artifact_set::article_file_name;
///
/// assert_eq!(article_file_name(0), "article_00.md");
/// assert_eq!(article_file_name(12), "article_12.md");
/// ```
pub fn article_file_name(sequence: usize) -> String {
    format!("article_{:02}.md", sequence)
}

/// 記事ファイル名から発見順の番号を取り出す
///
/// 100件を超えると桁数が揃わないため、並べ替えは名前ではなくこの番号で行う。
pub fn article_sequence(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix("article_")?
        .strip_suffix(".md")?
        .parse()
        .ok()
}

/// 成果物の集合
///
/// 処理単位ごとに作られ、他の処理単位と共有されることはない
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    item_slug: String,
    artifacts: Vec<Artifact>,
    cover: Option<Vec<u8>>,
}

impl ArtifactSet {
    /// 空の成果物集合を作成
    pub fn new(item_slug: impl Into<String>) -> Self {
        Self {
            item_slug: item_slug.into(),
            artifacts: Vec::new(),
            cover: None,
        }
    }

    /// 対象の処理単位の識別子
    pub fn item_slug(&self) -> &str {
        &self.item_slug
    }

    /// 成果物（追加順）
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// カバー画像
    pub fn cover(&self) -> Option<&[u8]> {
        self.cover.as_deref()
    }

    /// 記事を追加
    pub fn push_article(&mut self, sequence: usize, content: String) {
        self.artifacts.push(Artifact::Text { sequence, content });
    }

    /// 画像を追加
    pub fn push_image(&mut self, file_name: impl Into<String>, bytes: Vec<u8>) {
        self.artifacts.push(Artifact::Image {
            file_name: file_name.into(),
            bytes,
        });
    }

    /// カバー画像を設定
    pub fn set_cover(&mut self, bytes: Vec<u8>) {
        self.cover = Some(bytes);
    }

    /// 記事の数
    pub fn article_count(&self) -> usize {
        self.artifacts
            .iter()
            .filter(|a| matches!(a, Artifact::Text { .. }))
            .count()
    }

    /// ディスクに書き出すファイル一覧（ファイル名順 = パッケージ順）
    pub fn files(&self) -> Vec<(String, &[u8])> {
        let mut files: Vec<(String, &[u8])> = self
            .artifacts
            .iter()
            .map(|a| (a.file_name(), a.bytes()))
            .collect();
        if let Some(cover) = &self.cover {
            files.push((COVER_FILE_NAME.to_string(), cover.as_slice()));
        }
        files.sort_by(|a, b| {
            let key = |name: &str| article_sequence(name).unwrap_or(usize::MAX);
            key(&a.0).cmp(&key(&b.0)).then_with(|| a.0.cmp(&b.0))
        });
        files
    }
}

/// パッケージ済みの配信用ファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
    /// ファイルのパス
    pub path: PathBuf,
    /// 表示名（ファイル名）
    pub display_name: String,
}
