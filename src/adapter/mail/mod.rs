//! Mail Adapters
//!
//! メール配信経路の実装

pub mod smtp;
