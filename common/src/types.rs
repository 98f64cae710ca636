//! 点検ドキュメントの型定義
//!
//! コアとアダプタで共有される型:
//! - InspectionDocument: レポート単位の点検ドキュメント（唯一の永続エンティティ）
//! - ComponentRecord: 部屋ごとの点検コンポーネント
//! - AnalysisResult: AI解析サービスの出力

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// コンポーネントの状態評価
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Excellent,
    Good,
    Fair,
    Poor,
    NeedsReplacement,
}

impl Condition {
    pub const ALL: [Condition; 5] = [
        Condition::Excellent,
        Condition::Good,
        Condition::Fair,
        Condition::Poor,
        Condition::NeedsReplacement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Excellent => "excellent",
            Condition::Good => "good",
            Condition::Fair => "fair",
            Condition::Poor => "poor",
            Condition::NeedsReplacement => "needs_replacement",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Condition::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown condition: {}", s))
    }
}

/// アップロード済み画像への参照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub id: String,
    pub url: String,
}

/// 点検コンポーネント（壁、設備、備品など）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentRecord {
    /// 不変ID（ドキュメント内で一意）
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    pub cleanliness: String,
    pub notes: String,
    pub images: Vec<ImageRef>,
    pub is_optional: bool,
    pub is_custom: bool,
    /// 直近のAI解析結果（中身は解釈しない）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
}

/// 追加の部屋
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomBlock {
    pub id: String,
    pub name: String,
    pub room_type: String,
    pub components: Vec<ComponentRecord>,
}

/// レポート単位の点検ドキュメント
///
/// 部分更新のプリミティブは無いため、常にドキュメント全体を読み書きする。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InspectionDocument {
    /// メインの部屋ID（`components` の所有者）
    pub room_id: String,
    pub general_condition: String,
    pub components: Vec<ComponentRecord>,
    pub additional_rooms: Vec<RoomBlock>,
    pub sections: Value,
    /// 前方互換用の追加フィールド（`additionalData` のマージ先）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InspectionDocument {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            ..Default::default()
        }
    }

    /// ドキュメント内の全コンポーネント数
    pub fn component_count(&self) -> usize {
        self.components.len()
            + self
                .additional_rooms
                .iter()
                .map(|r| r.components.len())
                .sum::<usize>()
    }

    /// 全部屋からIDでコンポーネントを探す
    pub fn find_component(&self, component_id: &str) -> Option<&ComponentRecord> {
        self.components
            .iter()
            .chain(self.additional_rooms.iter().flat_map(|r| r.components.iter()))
            .find(|c| c.id == component_id)
    }
}

/// AI解析の状態評価部分
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConditionAssessment {
    pub summary: String,
    pub points: Vec<String>,
    pub rating: String,
}

/// AI解析結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResult {
    pub description: String,
    pub condition: ConditionAssessment,
    pub cleanliness: String,
    pub metadata: Value,
}
