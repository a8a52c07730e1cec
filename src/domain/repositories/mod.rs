//! # Domain Repositories
//!
//! Repository / 外部協調者の trait（インターフェース）定義
//!
//! ## 特徴
//!
//! - Domain層では実装を持たない（traitの定義のみ）
//! - Adapter層で具体的な実装を提供
//! - 依存性逆転の原則（DIP）を実現

pub mod collaborators;
pub mod ledger_repository;
pub mod mail_transport;
pub mod output_repository;
pub mod renderer;
pub mod session_repository;
