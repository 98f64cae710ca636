//! 解析結果の正規化モジュール
//!
//! AIの自由記述をドキュメントの列挙値へ寄せる。

pub mod condition;

pub use condition::normalize_condition;
