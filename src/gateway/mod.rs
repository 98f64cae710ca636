//! デバウンス付き永続化ゲートウェイ
//!
//! - `ComponentGateway`: コンポーネント単位の更新をまとめ、1回の一括パッチで書く
//! - `RoomSaver`: 部屋単位の最新スナップショットを書く
//!
//! どちらも `DebouncedQueue` にフラッシュ先を与えたもの。

mod queue;

pub use queue::{DebouncedQueue, FlushFailure, FlushTarget, QueuePhase};

use crate::document::DocumentApi;
use crate::error::Result;
use crate::retry::{with_retry, RetryConfig};
use crate::services::{Notification, Notifier};
use async_trait::async_trait;
use inspection_common::{ComponentPatch, ComponentRecord, ComponentUpsert, Condition, ImageRef, ReportPatch};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_COMPONENT_DEBOUNCE: Duration = Duration::from_millis(1000);
pub const DEFAULT_ROOM_DEBOUNCE: Duration = Duration::from_millis(2000);

/// フラッシュ待ちのコンポーネント更新
///
/// 同じコンポーネントへの後続の更新で丸ごと置き換えられる。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingUpdate {
    pub component_id: String,
    pub images: Option<Vec<ImageRef>>,
    pub description: Option<String>,
    pub condition: Option<Condition>,
    pub analysis_data: Option<Value>,
}

impl PendingUpdate {
    fn to_upsert(&self) -> ComponentUpsert {
        ComponentUpsert {
            id: self.component_id.clone(),
            patch: ComponentPatch {
                images: self.images.clone(),
                description: self.description.clone(),
                condition: self.condition,
                analysis: self.analysis_data.clone(),
                ..Default::default()
            },
        }
    }
}

/// (report_id, component_id)
type ComponentKey = (String, String);

struct ComponentFlush {
    api: DocumentApi,
    retry: RetryConfig,
}

#[async_trait]
impl FlushTarget<ComponentKey, PendingUpdate> for ComponentFlush {
    async fn flush(&self, batch: &[(ComponentKey, PendingUpdate)]) -> std::result::Result<(), FlushFailure<ComponentKey>> {
        // レポートごとに1回の一括パッチ。失敗したレポートのキーだけを戻し、他のレポートは続行する
        let mut by_report: BTreeMap<&str, Vec<ComponentUpsert>> = BTreeMap::new();
        for ((report_id, _), update) in batch {
            by_report
                .entry(report_id.as_str())
                .or_default()
                .push(update.to_upsert());
        }

        let mut failed: Vec<ComponentKey> = Vec::new();
        let mut first_error = None;
        for (report_id, mut upserts) in by_report {
            upserts.sort_by(|a, b| a.id.cmp(&b.id));
            let patch = ReportPatch {
                components: Some(upserts),
                ..Default::default()
            };
            if let Err(e) = with_retry(|| self.api.update_report_batch(report_id, &patch), &self.retry, None).await {
                warn!(report_id, error = %e, "Report flush failed");
                failed.extend(
                    batch
                        .iter()
                        .filter(|((r, _), _)| r == report_id)
                        .map(|(key, _)| key.clone()),
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => Ok(()),
            Some(error) => Err(FlushFailure::new(failed, error)),
        }
    }
}

/// コンポーネント更新ゲートウェイ
#[derive(Clone)]
pub struct ComponentGateway {
    queue: DebouncedQueue<ComponentKey, PendingUpdate>,
    notifier: Arc<dyn Notifier>,
}

impl ComponentGateway {
    pub fn new(
        api: DocumentApi,
        retry: RetryConfig,
        window: Duration,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let target = Arc::new(ComponentFlush { api, retry });
        Self {
            queue: DebouncedQueue::new("components", window, target),
            notifier,
        }
    }

    /// 更新を積み、デバウンスタイマーを再設定
    pub fn queue_component_update(&self, report_id: &str, update: PendingUpdate) {
        let key = (report_id.to_string(), update.component_id.clone());
        self.queue.enqueue(key, update);
    }

    /// 指定レポートの保留中の更新を即座に書き込む
    ///
    /// 書き込んだコンポーネント数を返す。失敗時は更新を保持したままエラーを返す。
    /// 他のレポートの更新はデバウンスタイマーに任せる。
    pub async fn force_save(&self, report_id: &str) -> Result<usize> {
        match self.queue.flush_where(|(r, _)| r == report_id).await {
            Ok(saved) => {
                info!(report_id, saved, "Forced save completed");
                self.notifier.notify(&Notification::SaveFinished { saved });
                Ok(saved)
            }
            Err(e) => {
                self.notifier.notify(&Notification::SaveFailed {
                    pending: self.queue.pending_count(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }

    pub fn phase(&self) -> QueuePhase {
        self.queue.phase()
    }
}

struct RoomFlush {
    api: DocumentApi,
    report_id: String,
    retry: RetryConfig,
}

#[async_trait]
impl FlushTarget<String, Vec<ComponentRecord>> for RoomFlush {
    async fn flush(&self, batch: &[(String, Vec<ComponentRecord>)]) -> std::result::Result<(), FlushFailure<String>> {
        let mut failed = Vec::new();
        let mut first_error = None;
        for (room_id, components) in batch {
            let saved = with_retry(
                || self.api.save_room_components(&self.report_id, room_id, components),
                &self.retry,
                None,
            )
            .await;
            if let Err(e) = saved {
                warn!(report_id = %self.report_id, room_id = %room_id, error = %e, "Room flush failed");
                failed.push(room_id.clone());
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => Ok(()),
            Some(error) => Err(FlushFailure::new(failed, error)),
        }
    }
}

/// 部屋単位のスナップショット保存
///
/// 差分を蓄積せず、常に最後に渡されたスナップショットを書く。
#[derive(Clone)]
pub struct RoomSaver {
    queue: DebouncedQueue<String, Vec<ComponentRecord>>,
}

impl RoomSaver {
    pub fn new(api: DocumentApi, report_id: &str, retry: RetryConfig, window: Duration) -> Self {
        let target = Arc::new(RoomFlush {
            api,
            report_id: report_id.to_string(),
            retry,
        });
        Self {
            queue: DebouncedQueue::new("rooms", window, target),
        }
    }

    pub fn debounced_save(&self, room_id: &str, components: Vec<ComponentRecord>) {
        self.queue.enqueue(room_id.to_string(), components);
    }

    /// タイマーを取り消して即座に書き込む
    pub async fn save_immediately(&self, room_id: &str, components: Vec<ComponentRecord>) -> Result<()> {
        self.queue.put_and_flush(room_id.to_string(), components).await?;
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }
}
