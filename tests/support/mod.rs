//! 統合テスト用のインメモリ実装
#![allow(dead_code)]

use async_trait::async_trait;
use inspection_common::{AnalysisResult, ComponentRecord, ConditionAssessment, ImageRef, InspectionDocument};
use inspection_sync::batch::{BatchRunner, BatchServices};
use inspection_sync::document::DocumentApi;
use inspection_sync::error::{InspectionError, Result};
use inspection_sync::progress::ProgressTracker;
use inspection_sync::services::{
    AnalysisOptions, Analyzer, DocumentStore, ImageRecordStore, ImageUploader, Notification, Notifier,
    UploadContext,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// ドキュメントを保持し、書き込み回数と失敗注入を持つストア
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, InspectionDocument>>,
    pub writes: AtomicUsize,
    /// 残り回数だけ書き込みを失敗させる
    pub failing_writes: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn with_document(report_id: &str, doc: InspectionDocument) -> Arc<Self> {
        let store = Self::default();
        store.docs.lock().unwrap().insert(report_id.to_string(), doc);
        Arc::new(store)
    }

    pub fn insert(&self, report_id: &str, doc: InspectionDocument) {
        self.docs.lock().unwrap().insert(report_id.to_string(), doc);
    }

    pub fn document(&self, report_id: &str) -> InspectionDocument {
        self.docs.lock().unwrap().get(report_id).cloned().expect("document exists")
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read_document(&self, report_id: &str) -> Result<InspectionDocument> {
        self.docs
            .lock()
            .unwrap()
            .get(report_id)
            .cloned()
            .ok_or_else(|| InspectionError::not_found("report", report_id))
    }

    async fn write_document(&self, report_id: &str, doc: &InspectionDocument) -> Result<()> {
        let failing = self.failing_writes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_writes.store(failing - 1, Ordering::SeqCst);
            return Err(InspectionError::Store("network unavailable".into()));
        }
        self.docs.lock().unwrap().insert(report_id.to_string(), doc.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 同時実行数を計測するアップローダ
#[derive(Default)]
pub struct FakeUploader {
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub uploads: AtomicUsize,
    /// この画像は常に失敗（リトライ対象外）
    pub broken: Mutex<HashSet<String>>,
    /// この画像は最初の1回だけ一時的に失敗
    pub flaky: Mutex<HashSet<String>>,
}

impl FakeUploader {
    pub fn break_image(&self, image: &str) {
        self.broken.lock().unwrap().insert(image.to_string());
    }

    pub fn flake_image(&self, image: &str) {
        self.flaky.lock().unwrap().insert(image.to_string());
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageUploader for FakeUploader {
    async fn upload(&self, image: &str, ctx: &UploadContext) -> Result<String> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.uploads.fetch_add(1, Ordering::SeqCst);

        if self.broken.lock().unwrap().contains(image) {
            return Err(InspectionError::Upload(format!("{}: corrupt image", image)));
        }
        if self.flaky.lock().unwrap().remove(image) {
            return Err(InspectionError::Upload(format!("{}: connection reset", image)));
        }
        Ok(format!("{}/{}/{}", ctx.report_id, ctx.room_id, image))
    }
}

#[derive(Default)]
pub struct MemoryRecords;

#[async_trait]
impl ImageRecordStore for MemoryRecords {
    async fn add_image_record(&self, _report_id: &str, _room_id: &str, storage_ref: &str) -> Result<ImageRef> {
        Ok(ImageRef {
            id: format!("img:{}", storage_ref),
            url: format!("https://storage.test/{}", storage_ref),
        })
    }
}

/// 呼び出しを記録する解析器
#[derive(Default)]
pub struct FakeAnalyzer {
    pub calls: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(
        &self,
        image_refs: &[String],
        _room_type: &str,
        component_name: &str,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        self.calls
            .lock()
            .unwrap()
            .push((options.component_id.clone(), image_refs.len()));
        Ok(AnalysisResult {
            description: format!("{} looks fine", component_name),
            condition: ConditionAssessment {
                summary: "ok".to_string(),
                points: vec![],
                rating: "Good".to_string(),
            },
            cleanliness: "clean".to_string(),
            metadata: serde_json::Value::Null,
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.notifications.lock().unwrap().push(notification.clone());
    }
}

pub fn component(id: &str, name: &str) -> ComponentRecord {
    ComponentRecord {
        id: id.to_string(),
        name: name.to_string(),
        component_type: "fixture".to_string(),
        ..Default::default()
    }
}

/// `kitchen` に c1〜c5 を持つドキュメント
pub fn kitchen_document() -> InspectionDocument {
    let mut doc = InspectionDocument::new("kitchen");
    doc.components = (1..=5)
        .map(|i| component(&format!("c{}", i), &format!("Component {}", i)))
        .collect();
    doc
}

pub struct Harness {
    pub store: Arc<MemoryDocumentStore>,
    pub uploader: Arc<FakeUploader>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub notifier: Arc<RecordingNotifier>,
    pub api: DocumentApi,
}

impl Harness {
    pub fn new(report_id: &str, doc: InspectionDocument) -> Self {
        let store = MemoryDocumentStore::with_document(report_id, doc);
        let api = DocumentApi::new(store.clone());
        Self {
            store,
            uploader: Arc::new(FakeUploader::default()),
            analyzer: Arc::new(FakeAnalyzer::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            api,
        }
    }

    pub fn services(&self) -> BatchServices {
        BatchServices {
            uploader: self.uploader.clone(),
            records: Arc::new(MemoryRecords),
            analyzer: self.analyzer.clone(),
            documents: self.api.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn runner(&self) -> BatchRunner {
        BatchRunner::new(self.services(), ProgressTracker::new())
    }
}
