//! 解析プロンプト生成
//!
//! コンポーネント単位で全画像をまとめて1回の解析に渡すためのプロンプト

use crate::types::Condition;

/// 解析プロンプト生成
///
/// # Arguments
/// * `room_type` - 部屋の種別（kitchen, bathroom等）
/// * `component_name` - コンポーネント名
/// * `image_count` - 同時に渡す画像枚数
pub fn build_analysis_prompt(room_type: &str, component_name: &str, image_count: usize) -> String {
    let ratings = Condition::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are a property inspector. The {image_count} attached photos all show the same component: "{component_name}" in a {room_type}. Consider them together.

Return exactly one JSON object:
{{
  "description": "objective description of the component",
  "condition": {{
    "summary": "one sentence",
    "points": ["individual defects or observations"],
    "rating": "one of: {ratings}"
  }},
  "cleanliness": "clean / acceptable / dirty",
  "metadata": {{}}
}}"#
    )
}
