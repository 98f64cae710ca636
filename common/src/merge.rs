//! マージパッチ（コアとアダプタで共通）
//!
//! コンポーネント単位の部分更新を既存レコードへ適用する。優先順位:
//! - 識別フィールド（id, name, type, isOptional, isCustom）は常に既存レコードが勝つ
//! - 内容フィールドはパッチが勝つ
//! - パッチが省略したフィールドは既存値を維持する（省略によるnull化はしない）

use crate::error::{Error, Result};
use crate::types::{ComponentRecord, Condition, ImageRef, InspectionDocument};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// ドキュメント直下で `additionalData` による上書きを禁止するキー
const RESERVED_KEYS: &[&str] = &["roomId", "generalCondition", "components", "additionalRooms"];

/// コンポーネントへの部分更新
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentPatch {
    /// 新規追加時のみ使用（既存レコードの名前は変更しない）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub component_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanliness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// 画像リストの置き換え
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageRef>>,
    /// 画像の追記（IDで重複排除）
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub add_images: Vec<ImageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_optional: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_custom: Option<bool>,
}

impl ComponentPatch {
    /// 何も変更しないパッチか
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.component_type.is_none()
            && self.description.is_none()
            && self.condition.is_none()
            && self.cleanliness.is_none()
            && self.notes.is_none()
            && self.images.is_none()
            && self.add_images.is_empty()
            && self.analysis.is_none()
            && self.is_optional.is_none()
            && self.is_custom.is_none()
    }
}

/// ID付きのパッチ（一括更新用: 一致すればマージ、なければ追加）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentUpsert {
    pub id: String,
    #[serde(flatten)]
    pub patch: ComponentPatch,
}

/// レポート一括更新
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<ComponentUpsert>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Map<String, Value>>,
}

impl ReportPatch {
    /// ドキュメントに触れる前の検証
    pub fn validate(&self) -> Result<()> {
        if self.general_condition.is_none()
            && self.components.is_none()
            && self.additional_data.is_none()
        {
            return Err(Error::Validation("report patch has no fields".into()));
        }

        if let Some(components) = &self.components {
            if let Some(pos) = components.iter().position(|c| c.id.trim().is_empty()) {
                return Err(Error::Validation(format!(
                    "component upsert #{} has an empty id",
                    pos
                )));
            }
        }

        if let Some(data) = &self.additional_data {
            if let Some(key) = data.keys().find(|k| RESERVED_KEYS.contains(&k.as_str())) {
                return Err(Error::Validation(format!(
                    "additionalData may not overwrite `{}`",
                    key
                )));
            }
        }

        Ok(())
    }
}

/// 一括更新の適用結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub merged: usize,
    pub appended: usize,
}

/// 既存レコードにパッチをマージした新しいレコードを返す
pub fn merge_component(existing: &ComponentRecord, patch: &ComponentPatch) -> ComponentRecord {
    let mut images = patch
        .images
        .clone()
        .unwrap_or_else(|| existing.images.clone());
    append_images(&mut images, &patch.add_images);

    ComponentRecord {
        // 識別フィールドは既存優先
        id: existing.id.clone(),
        name: existing.name.clone(),
        component_type: existing.component_type.clone(),
        is_optional: existing.is_optional,
        is_custom: existing.is_custom,
        // 内容フィールドはパッチ優先、省略時は既存値
        description: patch
            .description
            .clone()
            .unwrap_or_else(|| existing.description.clone()),
        condition: patch.condition.or(existing.condition),
        cleanliness: patch
            .cleanliness
            .clone()
            .unwrap_or_else(|| existing.cleanliness.clone()),
        notes: patch.notes.clone().unwrap_or_else(|| existing.notes.clone()),
        images,
        analysis: patch.analysis.clone().or_else(|| existing.analysis.clone()),
    }
}

/// パッチから新規レコードを作成
pub fn new_component(id: &str, patch: &ComponentPatch) -> ComponentRecord {
    let base = ComponentRecord {
        id: id.to_string(),
        name: patch.name.clone().unwrap_or_default(),
        component_type: patch.component_type.clone().unwrap_or_default(),
        is_optional: patch.is_optional.unwrap_or(false),
        is_custom: patch.is_custom.unwrap_or(false),
        ..Default::default()
    };
    merge_component(&base, patch)
}

fn append_images(images: &mut Vec<ImageRef>, extra: &[ImageRef]) {
    for image in extra {
        if !images.iter().any(|i| i.id == image.id) {
            images.push(image.clone());
        }
    }
}

/// 部屋IDからコンポーネント配列を解決
///
/// メインの部屋ID → `components`、それ以外 → `additionalRooms` の該当エントリ
pub fn resolve_room_mut<'a>(
    doc: &'a mut InspectionDocument,
    room_id: &str,
) -> Option<&'a mut Vec<ComponentRecord>> {
    if doc.room_id == room_id {
        return Some(&mut doc.components);
    }
    doc.additional_rooms
        .iter_mut()
        .find(|r| r.id == room_id)
        .map(|r| &mut r.components)
}

/// 単一コンポーネントへのパッチ適用
///
/// 対象コンポーネント以外は変更しない。
pub fn apply_component_patch(
    doc: &mut InspectionDocument,
    room_id: &str,
    component_id: &str,
    patch: &ComponentPatch,
) -> Result<()> {
    let components = resolve_room_mut(doc, room_id)
        .ok_or_else(|| Error::RoomNotFound(room_id.to_string()))?;

    let slot = components
        .iter_mut()
        .find(|c| c.id == component_id)
        .ok_or_else(|| Error::ComponentNotFound(component_id.to_string()))?;

    *slot = merge_component(slot, patch);
    Ok(())
}

/// 全部屋からIDでコンポーネントを探す（可変）
fn find_component_mut<'a>(doc: &'a mut InspectionDocument, component_id: &str) -> Option<&'a mut ComponentRecord> {
    doc.components
        .iter_mut()
        .chain(doc.additional_rooms.iter_mut().flat_map(|r| r.components.iter_mut()))
        .find(|c| c.id == component_id)
}

/// レポート一括パッチの適用
///
/// - generalCondition: 上書き
/// - components: ID単位でupsert。既存IDは所属する部屋（追加の部屋を含む）でマージし、
///   どの部屋にもなければメインの部屋の `components` へ追加する
/// - additionalData: ドキュメント直下へ浅いマージ
pub fn apply_report_patch(doc: &mut InspectionDocument, patch: &ReportPatch) -> Result<PatchSummary> {
    patch.validate()?;
    let mut summary = PatchSummary::default();

    if let Some(general) = &patch.general_condition {
        doc.general_condition = general.clone();
    }

    if let Some(upserts) = &patch.components {
        for upsert in upserts {
            match find_component_mut(doc, &upsert.id) {
                Some(existing) => {
                    *existing = merge_component(existing, &upsert.patch);
                    summary.merged += 1;
                }
                None => {
                    doc.components.push(new_component(&upsert.id, &upsert.patch));
                    summary.appended += 1;
                }
            }
        }
    }

    if let Some(data) = &patch.additional_data {
        for (key, value) in data {
            if key == "sections" {
                doc.sections = value.clone();
            } else {
                doc.extra.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(summary)
}
