//! # Domain Entities
//!
//! ビジネスエンティティとバリューオブジェクトを定義するモジュール
//!
//! ## エンティティ
//!
//! - **WorkItem**: カタログ上の処理単位
//! - **ArtifactSet / PackagedArtifact**: 取得した成果物と配信用ファイル
//! - **SessionState**: 永続化されたログイン状態
//! - **DestinationSet / DeliveryHistory / DispatchReport**: 配信関連

pub mod artifact_set;
pub mod delivery;
pub mod session_state;
pub mod work_item;
