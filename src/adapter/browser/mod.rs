//! Browser Adapters
//!
//! ヘッドレスブラウザによるページ描画

pub mod chromium;
