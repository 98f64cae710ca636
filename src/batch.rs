//! 並列数制限付きバッチ実行
//!
//! ステージング済みの (コンポーネント, 画像) を `max_concurrency` 件ずつのチャンクに分け、
//! チャンク内は同時に実行し、チャンク全体が確定してから次のチャンクへ進む。
//!
//! 1コンポーネントの処理:
//! 1. 画像を1枚ずつ順番にアップロード（進捗 0〜50%）
//! 2. 画像レコードを登録
//! 3. 全画像をまとめて1回だけAI解析（画像間の文脈を与えるため）
//! 4. 解析結果と画像をマージパッチで書き込み
//! 5. 進捗 100%
//!
//! どこで失敗しても `errors` に記録し、他のコンポーネントやチャンクは継続する。

use crate::document::DocumentApi;
use crate::error::{InspectionError, Result};
use crate::normalizer::normalize_condition;
use crate::progress::ProgressTracker;
use crate::retry::{with_retry, RetryConfig};
use crate::services::{
    AnalysisOptions, Analyzer, ImageRecordStore, ImageUploader, Notification, Notifier, UploadContext,
};
use futures::future::join_all;
use inspection_common::{AnalysisResult, ComponentPatch, ImageRef};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// 1コンポーネント分の入力
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentBatch {
    pub component_id: String,
    pub component_name: String,
    pub staged_images: Vec<String>,
}

/// バッチ共通の対象情報
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchTarget {
    pub report_id: String,
    pub room_id: String,
    pub room_type: String,
    pub property_label: String,
    pub room_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentResult {
    pub component_id: String,
    pub images: Vec<ImageRef>,
    pub analysis: AnalysisResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentError {
    pub component_id: String,
    pub error: String,
}

/// 部分失敗を含む集約結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub results: Vec<ComponentResult>,
    pub errors: Vec<ComponentError>,
}

impl BatchOutcome {
    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// 外部サービス一式
#[derive(Clone)]
pub struct BatchServices {
    pub uploader: Arc<dyn ImageUploader>,
    pub records: Arc<dyn ImageRecordStore>,
    pub analyzer: Arc<dyn Analyzer>,
    pub documents: DocumentApi,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Clone)]
pub struct BatchRunner {
    services: BatchServices,
    progress: ProgressTracker,
    max_concurrency: usize,
    storage_retry: RetryConfig,
    batch_retry: RetryConfig,
}

impl BatchRunner {
    pub fn new(services: BatchServices, progress: ProgressTracker) -> Self {
        Self {
            services,
            progress,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            storage_retry: RetryConfig::storage(),
            batch_retry: RetryConfig::batch(),
        }
    }

    /// 0は1として扱う
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_retry_configs(mut self, storage: RetryConfig, batch: RetryConfig) -> Self {
        self.storage_retry = storage;
        self.batch_retry = batch;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// チャンク単位で並列実行し、全チャンク完了後に1回だけ集約通知する
    pub async fn process_batch_parallel(&self, target: &BatchTarget, batches: &[ComponentBatch]) -> BatchOutcome {
        let ids: Vec<String> = batches.iter().map(|b| b.component_id.clone()).collect();
        self.progress.reset(&ids);

        let mut outcome = BatchOutcome::default();
        let chunk_count = batches.len().div_ceil(self.max_concurrency);

        for (chunk_idx, chunk) in batches.chunks(self.max_concurrency).enumerate() {
            debug!(chunk = chunk_idx + 1, of = chunk_count, size = chunk.len(), "Starting chunk");

            let settled = join_all(chunk.iter().map(|batch| self.process_component(target, batch))).await;

            for (batch, result) in chunk.iter().zip(settled) {
                match result {
                    Ok(result) => outcome.results.push(result),
                    Err(e) => {
                        warn!(component_id = %batch.component_id, error = %e, "Component failed");
                        self.progress.fail(&batch.component_id, e.to_string());
                        outcome.errors.push(ComponentError {
                            component_id: batch.component_id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            succeeded = outcome.results.len(),
            failed = outcome.errors.len(),
            "Batch processing finished"
        );
        self.services.notifier.notify(&Notification::BatchFinished {
            succeeded: outcome.results.len(),
            failed: outcome.errors.len(),
        });
        outcome
    }

    async fn process_component(&self, target: &BatchTarget, batch: &ComponentBatch) -> Result<ComponentResult> {
        if batch.staged_images.is_empty() {
            return Err(InspectionError::Validation(format!(
                "no staged images for {}",
                batch.component_id
            )));
        }

        let services = &self.services;
        let total = batch.staged_images.len();
        self.progress.uploading(&batch.component_id, 0, total);

        // (a) 1枚ずつアップロード
        let ctx = UploadContext {
            report_id: target.report_id.clone(),
            room_id: target.room_id.clone(),
            property_label: target.property_label.clone(),
            room_label: target.room_label.clone(),
            component_label: batch.component_name.clone(),
        };
        let mut storage_refs = Vec::with_capacity(total);
        for (idx, image) in batch.staged_images.iter().enumerate() {
            let storage_ref = with_retry(|| services.uploader.upload(image, &ctx), &self.storage_retry, None).await?;
            storage_refs.push(storage_ref);
            self.progress.uploading(&batch.component_id, idx + 1, total);
        }

        // (b) 画像レコード
        let images = with_retry(
            || {
                services
                    .records
                    .add_many_image_records(&target.report_id, &target.room_id, &storage_refs)
            },
            &self.storage_retry,
            None,
        )
        .await?;

        // (c) 全画像をまとめて1回解析
        self.progress.analyzing(&batch.component_id);
        let urls: Vec<String> = images.iter().map(|i| i.url.clone()).collect();
        let options = AnalysisOptions {
            report_id: target.report_id.clone(),
            component_id: batch.component_id.clone(),
        };
        let analysis = with_retry(
            || {
                services
                    .analyzer
                    .analyze(&urls, &target.room_type, &batch.component_name, &options)
            },
            &self.batch_retry,
            None,
        )
        .await?;

        // (d) コンポーネントへ書き込み
        let patch = analysis_patch(&analysis, &images)?;
        with_retry(
            || {
                services
                    .documents
                    .update_component(&target.report_id, &target.room_id, &batch.component_id, &patch)
            },
            &self.storage_retry,
            None,
        )
        .await?;

        // (e)
        self.progress.complete(&batch.component_id);
        debug!(component_id = %batch.component_id, images = images.len(), "Component processed");

        Ok(ComponentResult {
            component_id: batch.component_id.clone(),
            images,
            analysis,
        })
    }
}

/// 解析結果からコンポーネントへのパッチを作る
///
/// 評価が解釈できない場合は状態評価を変更しない。
pub fn analysis_patch(analysis: &AnalysisResult, images: &[ImageRef]) -> Result<ComponentPatch> {
    let cleanliness = (!analysis.cleanliness.is_empty()).then(|| analysis.cleanliness.clone());
    Ok(ComponentPatch {
        description: Some(analysis.description.clone()),
        condition: normalize_condition(&analysis.condition.rating),
        cleanliness,
        add_images: images.to_vec(),
        analysis: Some(serde_json::to_value(analysis)?),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspection_common::{Condition, ConditionAssessment};

    #[test]
    fn test_analysis_patch() {
        let analysis = AnalysisResult {
            description: "Cracked tile".to_string(),
            condition: ConditionAssessment {
                rating: "Poor".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let images = vec![ImageRef {
            id: "i1".to_string(),
            url: "u1".to_string(),
        }];

        let patch = analysis_patch(&analysis, &images).unwrap();
        assert_eq!(patch.description.as_deref(), Some("Cracked tile"));
        assert_eq!(patch.condition, Some(Condition::Poor));
        assert_eq!(patch.cleanliness, None);
        assert_eq!(patch.add_images, images);
        assert_eq!(patch.images, None);
        assert!(patch.analysis.is_some());
    }

    #[test]
    fn test_unknown_rating_keeps_condition() {
        let analysis = AnalysisResult {
            description: "Odd".to_string(),
            condition: ConditionAssessment {
                rating: "unclear".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let patch = analysis_patch(&analysis, &[]).unwrap();
        assert_eq!(patch.condition, None);
    }
}
