//! Repository Implementations
//!
//! Domain層のRepositoryトレイトの実装

pub mod fs_output_repository;
pub mod json_session_repository;
pub mod text_ledger_repository;
