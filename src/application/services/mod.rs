//! # Application Services
//!
//! ユースケースが共有する、ブラウザ資源と認証状態の管理
//!
//! - **lease**: 実行環境とコンテキストの取得・解放
//! - **session_store**: 認証済みコンテキストの払い出し

pub mod lease;
pub mod session_store;
