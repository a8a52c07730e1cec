//! Content Adapters
//!
//! 本文抽出、画像処理、ダウンロード、EPUB パッケージ

pub mod http;
pub mod markdown;
pub mod pandoc;
pub mod raster;
