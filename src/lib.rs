//! 物件点検のクライアント側オーケストレーション
//!
//! 画像のステージング、並列数制限付きのアップロード・AI解析、
//! デバウンス付きの永続化、マージパッチによるドキュメント更新を提供する。

pub mod analyzer;
pub mod batch;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod gateway;
pub mod normalizer;
pub mod progress;
pub mod retry;
pub mod services;
pub mod session;
pub mod staging;

pub use error::{ErrorCategory, InspectionError, Result};
