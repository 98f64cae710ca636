//! 外部サービスとの境界
//!
//! 画像アップロード、画像レコード、AI解析、ドキュメントストア、通知。
//! 実装は差し替え可能で、`local` にファイルベースの実装がある。

pub mod local;

use crate::error::Result;
use async_trait::async_trait;
use inspection_common::{AnalysisResult, ImageRef, InspectionDocument};
use tracing::{info, warn};

pub use local::LocalImageStorage;

/// アップロード時のラベル情報（保存先パスやメタデータに使う）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadContext {
    pub report_id: String,
    pub room_id: String,
    pub property_label: String,
    pub room_label: String,
    pub component_label: String,
}

/// 画像アップロード
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// 画像を外部ストレージへ送り、ストレージ参照を返す
    async fn upload(&self, image: &str, ctx: &UploadContext) -> Result<String>;
}

/// 画像レコード
#[async_trait]
pub trait ImageRecordStore: Send + Sync {
    async fn add_image_record(&self, report_id: &str, room_id: &str, storage_ref: &str)
        -> Result<ImageRef>;

    async fn add_many_image_records(
        &self,
        report_id: &str,
        room_id: &str,
        storage_refs: &[String],
    ) -> Result<Vec<ImageRef>> {
        let mut records = Vec::with_capacity(storage_refs.len());
        for storage_ref in storage_refs {
            records.push(self.add_image_record(report_id, room_id, storage_ref).await?);
        }
        Ok(records)
    }
}

/// 解析オプション
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub report_id: String,
    pub component_id: String,
}

/// AI解析（ブラックボックス）
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// 1コンポーネントの全画像をまとめて解析する
    async fn analyze(
        &self,
        image_refs: &[String],
        room_type: &str,
        component_name: &str,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult>;
}

/// ドキュメントストア（ドキュメント全体の読み書きのみ）
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read_document(&self, report_id: &str) -> Result<InspectionDocument>;

    async fn write_document(&self, report_id: &str, doc: &InspectionDocument) -> Result<()>;
}

/// 集約通知
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    BatchFinished { succeeded: usize, failed: usize },
    SaveFinished { saved: usize },
    SaveFailed { pending: usize, error: String },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// tracingへ出力するだけの通知先
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::BatchFinished { succeeded, failed } if *failed > 0 => {
                warn!(succeeded, failed, "Batch finished with errors")
            }
            Notification::BatchFinished { succeeded, .. } => {
                info!(succeeded, "Batch finished")
            }
            Notification::SaveFinished { saved } => info!(saved, "Saved pending updates"),
            Notification::SaveFailed { pending, error } => {
                warn!(pending, error = %error, "Save failed, updates kept for next attempt")
            }
        }
    }
}
