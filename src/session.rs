//! 編集セッション
//!
//! ステージング、バッチ実行、デバウンス保存を1つにまとめる。
//! ステージングはセッション内のメモリにのみ存在する。

use crate::batch::{BatchOutcome, BatchRunner, BatchTarget, ComponentBatch};
use crate::error::Result;
use crate::gateway::{ComponentGateway, PendingUpdate, RoomSaver};
use crate::progress::{BatchProgress, ProgressTracker};
use crate::staging::{StagingEntry, StagingStore};
use inspection_common::ComponentRecord;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

pub struct InspectionSession {
    report_id: String,
    staging: Mutex<StagingStore>,
    runner: BatchRunner,
    gateway: ComponentGateway,
    rooms: RoomSaver,
}

impl InspectionSession {
    pub fn new(report_id: &str, runner: BatchRunner, gateway: ComponentGateway, rooms: RoomSaver) -> Self {
        Self {
            report_id: report_id.to_string(),
            staging: Mutex::new(StagingStore::new()),
            runner,
            gateway,
            rooms,
        }
    }

    pub fn report_id(&self) -> &str {
        &self.report_id
    }

    fn staging(&self) -> MutexGuard<'_, StagingStore> {
        self.staging.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- ステージング ---

    pub fn stage_images(&self, component_id: &str, component_name: &str, images: &[String]) {
        self.staging().add_staged_images(component_id, component_name, images);
    }

    pub fn remove_staged_image(&self, component_id: &str, index: usize) -> Option<String> {
        self.staging().remove_staged_image(component_id, index)
    }

    pub fn discard_staged(&self, component_id: &str) -> Option<StagingEntry> {
        self.staging().clear_component(component_id)
    }

    pub fn staged(&self, component_id: &str) -> Option<StagingEntry> {
        self.staging().get(component_id).cloned()
    }

    pub fn total_staged_images(&self) -> usize {
        self.staging().total_staged_images()
    }

    pub fn staged_entries(&self) -> Vec<StagingEntry> {
        self.staging().entries_with_images()
    }

    // --- バッチ ---

    pub fn progress(&self) -> &ProgressTracker {
        self.runner.progress()
    }

    pub fn overall_progress(&self) -> BatchProgress {
        self.runner.progress().overall()
    }

    /// 画像のあるステージングをすべてバッチ処理する
    ///
    /// 成功したコンポーネントのステージングは消し、失敗したものは残して再実行できるようにする。
    /// 処理中のエントリは対象外。
    pub async fn process_staged(&self, target: &BatchTarget) -> BatchOutcome {
        let batches: Vec<ComponentBatch> = {
            let mut staging = self.staging();
            let entries: Vec<StagingEntry> = staging
                .entries_with_images()
                .into_iter()
                .filter(|e| !e.is_processing)
                .collect();
            for entry in &entries {
                staging.set_processing(&entry.component_id, true);
            }
            entries
                .into_iter()
                .map(|e| ComponentBatch {
                    component_id: e.component_id,
                    component_name: e.component_name,
                    staged_images: e.staged_images,
                })
                .collect()
        };

        if batches.is_empty() {
            return BatchOutcome::default();
        }

        let outcome = self.runner.process_batch_parallel(target, &batches).await;

        let mut staging = self.staging();
        for result in &outcome.results {
            staging.clear_component(&result.component_id);
        }
        for error in &outcome.errors {
            staging.set_processing(&error.component_id, false);
        }
        info!(
            report_id = %self.report_id,
            processed = outcome.results.len(),
            remaining = staging.total_staged_images(),
            "Staged images processed"
        );
        outcome
    }

    // --- 保存 ---

    pub fn queue_component_update(&self, update: PendingUpdate) {
        self.gateway.queue_component_update(&self.report_id, update);
    }

    pub async fn force_save(&self) -> Result<usize> {
        let progress = self.runner.progress();
        progress.set_saving(true);
        let result = self.gateway.force_save(&self.report_id).await;
        progress.set_saving(false);
        result
    }

    pub fn pending_count(&self) -> usize {
        self.gateway.pending_count()
    }

    pub fn debounced_room_save(&self, room_id: &str, components: Vec<ComponentRecord>) {
        self.rooms.debounced_save(room_id, components);
    }

    pub async fn save_room_immediately(&self, room_id: &str, components: Vec<ComponentRecord>) -> Result<()> {
        self.rooms.save_immediately(room_id, components).await
    }

    pub fn pending_room_count(&self) -> usize {
        self.rooms.pending_count()
    }
}
