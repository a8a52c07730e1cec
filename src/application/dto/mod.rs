//! # Data Transfer Objects
//!
//! - **settings**: ユースケースが受け取る設定値
//! - **summary**: 実行結果の集計

pub mod settings;
pub mod summary;
