//! ステージングストア
//!
//! 撮影済み・未アップロードの画像をコンポーネント単位で保持する。
//! 編集セッション内でのみ有効で、永続化しない。

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// コンポーネント1件分のステージング
#[derive(Debug, Clone, PartialEq)]
pub struct StagingEntry {
    pub component_id: String,
    pub component_name: String,
    pub staged_images: Vec<String>,
    pub is_processing: bool,
    pub timestamp: DateTime<Utc>,
}

/// コンポーネントIDをキーとしたステージング
///
/// 画像を削除しきってもエントリは残るため、存在ではなく枚数で判定すること。
#[derive(Debug, Default)]
pub struct StagingStore {
    entries: HashMap<String, StagingEntry>,
}

impl StagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 画像を追記（なければ作成）し、タイムスタンプを更新
    pub fn add_staged_images(&mut self, component_id: &str, component_name: &str, images: &[String]) {
        let now = Utc::now();
        let entry = self
            .entries
            .entry(component_id.to_string())
            .or_insert_with(|| StagingEntry {
                component_id: component_id.to_string(),
                component_name: component_name.to_string(),
                staged_images: Vec::new(),
                is_processing: false,
                timestamp: now,
            });
        entry.component_name = component_name.to_string();
        entry.staged_images.extend(images.iter().cloned());
        entry.timestamp = now;
    }

    /// 指定位置の画像を削除。エントリや位置がなければ何もしない
    pub fn remove_staged_image(&mut self, component_id: &str, index: usize) -> Option<String> {
        let entry = self.entries.get_mut(component_id)?;
        if index >= entry.staged_images.len() {
            return None;
        }
        Some(entry.staged_images.remove(index))
    }

    /// 保存成功後またはキャンセル時に呼ぶ
    pub fn clear_component(&mut self, component_id: &str) -> Option<StagingEntry> {
        self.entries.remove(component_id)
    }

    pub fn set_processing(&mut self, component_id: &str, processing: bool) {
        if let Some(entry) = self.entries.get_mut(component_id) {
            entry.is_processing = processing;
        }
    }

    pub fn get(&self, component_id: &str) -> Option<&StagingEntry> {
        self.entries.get(component_id)
    }

    /// ステージング中の画像総数
    pub fn total_staged_images(&self) -> usize {
        self.entries.values().map(|e| e.staged_images.len()).sum()
    }

    /// 画像が1枚以上あるエントリ（古い順）
    pub fn entries_with_images(&self) -> Vec<StagingEntry> {
        let mut entries: Vec<StagingEntry> = self
            .entries
            .values()
            .filter(|e| !e.staged_images.is_empty())
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.component_id.cmp(&b.component_id))
        });
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
