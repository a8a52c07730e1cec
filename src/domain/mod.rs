//! # Domain Layer
//!
//! このモジュールはビジネスの核心的なルールとエンティティを定義します。
//!
//! ## 特徴
//!
//! - ブラウザ、SMTP、ファイルシステムについて何も知らない
//! - 外部とのやり取りは trait として定義するだけ
//! - 純粋なビジネスロジック
//!
//! ## 構成要素
//!
//! - **entities**: ビジネスエンティティ（WorkItem, ArtifactSet, SessionStateなど）
//! - **error**: パイプライン全体のエラー分類
//! - **repositories**: Repository / 外部協調者の trait（インターフェース定義のみ）
//! - **services**: Domain Service（重複排除、タイトル整形、HTML 解析、リトライ方針）

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
