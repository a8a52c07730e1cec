//! # Domain Services
//!
//! エンティティに属さないビジネスルール
//!
//! - **deduplication**: 出現順を保った重複排除
//! - **html**: レンダリング済み HTML に対するセレクタ検索
//! - **retry**: 接続リトライの方針
//! - **title**: タイトル整形とファイル名の導出

pub mod deduplication;
pub mod html;
pub mod retry;
pub mod title;
