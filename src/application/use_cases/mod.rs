//! # Use Cases
//!
//! アプリケーションのビジネスフロー（ユースケース）
//!
//! ## ユースケース
//!
//! - **CatalogLister**: 一覧ページから処理単位を列挙
//! - **ItemFetcher**: 処理単位1件の成果物を取得
//! - **Dispatcher**: パッケージ1件を全宛先へ送信
//! - **RunCoordinator**: 取得・パッケージフェーズ
//! - **DeliveryPass**: 配信フェーズ

pub mod deliver_packages;
pub mod dispatch;
pub mod fetch_item;
pub mod list_catalog;
pub mod run_pipeline;
