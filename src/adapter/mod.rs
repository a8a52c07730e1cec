//! Adapter Layer
//!
//! 外部システム（Chromium, SMTP, pandoc, ファイルシステム）との統合

pub mod browser;
pub mod config;
pub mod content;
pub mod mail;
pub mod repositories;
