//! 進捗トラッキング
//!
//! コンポーネントごとの状態遷移:
//! `Pending → Uploading(0–50) → Analyzing(50) → Complete(100)`、
//! どの状態からでも `Error` へ遷移する。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// コンポーネント処理状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentStatus {
    Pending,
    Uploading,
    Analyzing,
    Complete,
    Error,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Pending => "pending",
            ComponentStatus::Uploading => "uploading",
            ComponentStatus::Analyzing => "analyzing",
            ComponentStatus::Complete => "complete",
            ComponentStatus::Error => "error",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, ComponentStatus::Complete | ComponentStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentProgress {
    pub status: ComponentStatus,
    /// 0〜100
    pub progress: u8,
    pub error: Option<String>,
}

impl Default for ComponentProgress {
    fn default() -> Self {
        Self {
            status: ComponentStatus::Pending,
            progress: 0,
            error: None,
        }
    }
}

/// バッチ全体のフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Uploading,
    Analyzing,
    Saving,
    Finished,
}

/// UI向けの集約進捗
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub phase: BatchPhase,
    /// 0.0〜100.0
    pub percentage: f32,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct TrackerState {
    components: HashMap<String, ComponentProgress>,
    saving: bool,
}

/// 進捗マップ（読み取りはスナップショットで行う）
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // 書き込み中のパニックでも進捗表示は継続する
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 新しいバッチの開始。全コンポーネントをPendingにする
    pub fn reset(&self, component_ids: &[String]) {
        let mut state = self.lock();
        state.components = component_ids
            .iter()
            .map(|id| (id.clone(), ComponentProgress::default()))
            .collect();
        state.saving = false;
    }

    /// アップロード進捗（完了枚数/全枚数 を 0〜50% に割り当て）
    pub fn uploading(&self, component_id: &str, uploaded: usize, total: usize) {
        let progress = if total == 0 {
            0
        } else {
            ((uploaded.min(total) * 50) / total) as u8
        };
        self.set(component_id, ComponentStatus::Uploading, progress, None);
    }

    pub fn analyzing(&self, component_id: &str) {
        self.set(component_id, ComponentStatus::Analyzing, 50, None);
    }

    pub fn complete(&self, component_id: &str) {
        self.set(component_id, ComponentStatus::Complete, 100, None);
    }

    /// 直前の進捗値は保持する
    pub fn fail(&self, component_id: &str, error: impl Into<String>) {
        let mut state = self.lock();
        let entry = state.components.entry(component_id.to_string()).or_default();
        entry.status = ComponentStatus::Error;
        entry.error = Some(error.into());
    }

    pub fn set_saving(&self, saving: bool) {
        self.lock().saving = saving;
    }

    fn set(&self, component_id: &str, status: ComponentStatus, progress: u8, error: Option<String>) {
        let mut state = self.lock();
        state.components.insert(
            component_id.to_string(),
            ComponentProgress {
                status,
                progress,
                error,
            },
        );
    }

    pub fn get(&self, component_id: &str) -> Option<ComponentProgress> {
        self.lock().components.get(component_id).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, ComponentProgress> {
        self.lock().components.clone()
    }

    /// 集約進捗を計算
    pub fn overall(&self) -> BatchProgress {
        let state = self.lock();
        let total = state.components.len();
        let completed = state
            .components
            .values()
            .filter(|p| p.status == ComponentStatus::Complete)
            .count();
        let failed = state
            .components
            .values()
            .filter(|p| p.status == ComponentStatus::Error)
            .count();

        let percentage = if total == 0 {
            0.0
        } else {
            let sum: u32 = state
                .components
                .values()
                .map(|p| if p.status == ComponentStatus::Error { 100 } else { p.progress as u32 })
                .sum();
            sum as f32 / total as f32
        };

        let phase = if total == 0 {
            BatchPhase::Idle
        } else if completed + failed == total {
            BatchPhase::Finished
        } else if state.saving {
            BatchPhase::Saving
        } else if state
            .components
            .values()
            .any(|p| p.status == ComponentStatus::Analyzing)
        {
            BatchPhase::Analyzing
        } else {
            BatchPhase::Uploading
        };

        BatchProgress {
            phase,
            percentage,
            total,
            completed,
            failed,
        }
    }
}
