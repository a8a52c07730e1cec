//! # Settings DTO
//!
//! 設定ファイルから組み立てられ、各ユースケースのコンストラクタに渡される。
//! グローバルな参照はしない。

use std::time::Duration;

use crate::domain::entities::delivery::DestinationSet;
use crate::domain::repositories::renderer::SubmitStrategy;
use crate::domain::services::retry::RetryPolicy;

/// ログイン設定
#[derive(Debug, Clone)]
pub struct LoginSettings {
    /// ログインページの URL
    pub login_url: String,
    /// ユーザー名
    pub username: String,
    /// パスワード
    pub password: String,
    /// ユーザー名入力欄（ログインフォームの有無の判定にも使う）
    pub username_selector: String,
    /// パスワード入力欄
    pub password_selector: String,
    /// ログインボタンの探し方（順に試す）
    pub submit_strategies: Vec<SubmitStrategy>,
    /// ページ遷移のタイムアウト
    pub navigation_timeout: Duration,
    /// ボタン1つあたりのクリック待ち
    pub click_timeout: Duration,
    /// ログイン後に落ち着くまでの待ち
    pub settle_timeout: Duration,
    /// 再利用したセッションがまだ有効か確かめるかどうか
    pub verify_reused: bool,
}

/// サイト巡回の設定
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    /// サイトのベース URL
    pub base_url: String,
    /// 一覧ページのパス
    pub index_path: String,
    /// 各処理単位のページのパス（末尾にスラッグが付く）
    pub item_path: String,
    /// 一覧ページの処理単位リンク
    pub edition_link_selector: String,
    /// カバー画像
    pub cover_selector: String,
    /// 記事リンク
    pub article_link_selector: String,
    /// 著者コンテナ
    pub author_container_selector: String,
    /// 著者名（コンテナ内）
    pub author_name_selector: String,
    /// 著者紹介（コンテナ内）
    pub author_bio_selector: String,
    /// タイトルの区切り文字（順に適用）
    pub title_separators: Vec<String>,
    /// タイトルから削除する定型文字列
    pub title_boilerplate: Vec<String>,
    /// ページ遷移のタイムアウト
    pub navigation_timeout: Duration,
    /// ダウンロードのタイムアウト
    pub http_timeout: Duration,
}

impl ScrapeSettings {
    /// 一覧ページの URL
    pub fn index_url(&self) -> String {
        format!("{}{}", self.base_url, self.index_path)
    }

    /// 処理単位のページの URL
    ///
    /// ```
    /// # use issue_courier::application::dto::settings::ScrapeSettings;
    /// # use std::time::Duration;
    /// let settings = ScrapeSettings {
    ///     base_url: "https://example.com/digital".to_string(),
    ///     index_path: "/edicoes/".to_string(),
    ///     item_path: "/edicao/".to_string(),
    ///     edition_link_selector: String::new(),
    ///     cover_selector: String::new(),
    ///     article_link_selector: String::new(),
    ///     author_container_selector: String::new(),
    ///     author_name_selector: String::new(),
    ///     author_bio_selector: String::new(),
    ///     title_separators: vec![],
    ///     title_boilerplate: vec![],
    ///     navigation_timeout: Duration::from_secs(30),
    ///     http_timeout: Duration::from_secs(30),
    /// };
    ///
    /// assert_eq!(settings.item_url("ed-1"), "https://example.com/digital/edicao/ed-1");
    /// assert_eq!(settings.index_url(), "https://example.com/digital/edicoes/");
    /// ```
    pub fn item_url(&self, slug: &str) -> String {
        format!("{}{}{}", self.base_url, self.item_path, slug)
    }
}

/// パッケージ設定
#[derive(Debug, Clone)]
pub struct BookSettings {
    /// 著者（ファイル名とメタデータ）
    pub author: String,
    /// 言語コード
    pub language: String,
    /// 表示タイトルの置換表
    pub title_replacements: Vec<(String, String)>,
}

/// 配信設定
#[derive(Debug, Clone)]
pub struct MailSettings {
    /// 差出人アドレス（SMTP ユーザー）
    pub sender: String,
    /// SMTP パスワード
    pub password: String,
    /// 宛先
    pub recipients: DestinationSet,
    /// 件名
    pub subject: String,
    /// 本文
    pub body: String,
    /// 接続リトライ
    pub retry: RetryPolicy,
}
