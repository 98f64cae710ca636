//! マージパッチ・ドキュメントAPI
//!
//! どの操作もドキュメント全体を1回読み、1回書く。同時実行制御トークンは持たず、
//! 最後に書いた側のマージ結果がそのまま残る（last-write-wins）。
//! 別コンポーネントを編集する2者の読み込みが競合した場合、
//! 一方の変更が上書きされ得る。
//!
//! 解決できない部屋・コンポーネントは即座にエラーを返し、内部でリトライしない。
//! リトライは呼び出し側が `retry::with_retry` で行う。

mod json_store;

pub use json_store::JsonDocumentStore;

use crate::error::{InspectionError, Result};
use crate::services::DocumentStore;
use inspection_common::{
    apply_component_patch, apply_report_patch, resolve_room_mut, ComponentPatch, ComponentRecord,
    InspectionDocument, PatchSummary, ReportPatch,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct DocumentApi {
    store: Arc<dyn DocumentStore>,
}

impl DocumentApi {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get_document(&self, report_id: &str) -> Result<InspectionDocument> {
        require("report id", report_id)?;
        self.store.read_document(report_id).await
    }

    /// 新しいドキュメントを作成。既存のものは `overwrite` 指定時のみ置き換える
    pub async fn create_document(&self, report_id: &str, doc: &InspectionDocument, overwrite: bool) -> Result<()> {
        require("report id", report_id)?;
        require("room id", &doc.room_id)?;
        if !overwrite {
            match self.store.read_document(report_id).await {
                Ok(_) => {
                    return Err(InspectionError::Validation(format!(
                        "report already exists: {}",
                        report_id
                    )))
                }
                Err(InspectionError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        self.store.write_document(report_id, doc).await
    }

    /// 1コンポーネントへの部分更新
    pub async fn update_component(
        &self,
        report_id: &str,
        room_id: &str,
        component_id: &str,
        patch: &ComponentPatch,
    ) -> Result<()> {
        require("report id", report_id)?;
        require("room id", room_id)?;
        require("component id", component_id)?;
        if patch.is_empty() {
            return Err(InspectionError::Validation(format!(
                "update for {} has no fields",
                component_id
            )));
        }

        let mut doc = self.store.read_document(report_id).await?;
        apply_component_patch(&mut doc, room_id, component_id, patch)?;
        self.store.write_document(report_id, &doc).await?;

        debug!(report_id, room_id, component_id, "Component updated");
        Ok(())
    }

    /// generalCondition・components・additionalData をまとめて1回で書き込む
    pub async fn update_report_batch(&self, report_id: &str, patch: &ReportPatch) -> Result<PatchSummary> {
        require("report id", report_id)?;
        patch.validate()?;

        let mut doc = self.store.read_document(report_id).await?;
        let summary = apply_report_patch(&mut doc, patch)?;
        self.store.write_document(report_id, &doc).await?;

        debug!(
            report_id,
            merged = summary.merged,
            appended = summary.appended,
            "Report batch updated"
        );
        Ok(summary)
    }

    /// 部屋のコンポーネント一覧を最新スナップショットで置き換える
    pub async fn save_room_components(
        &self,
        report_id: &str,
        room_id: &str,
        components: &[ComponentRecord],
    ) -> Result<()> {
        require("report id", report_id)?;
        require("room id", room_id)?;
        let mut seen = HashSet::new();
        for component in components {
            require("component id", &component.id)?;
            if !seen.insert(component.id.as_str()) {
                return Err(InspectionError::Validation(format!(
                    "duplicate component id in room snapshot: {}",
                    component.id
                )));
            }
        }

        let mut doc = self.store.read_document(report_id).await?;
        let room = resolve_room_mut(&mut doc, room_id)
            .ok_or_else(|| InspectionError::not_found("room", room_id))?;
        *room = components.to_vec();
        self.store.write_document(report_id, &doc).await?;

        debug!(report_id, room_id, count = components.len(), "Room snapshot saved");
        Ok(())
    }
}

fn require(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(InspectionError::Validation(format!("{} is empty", what)));
    }
    Ok(())
}
