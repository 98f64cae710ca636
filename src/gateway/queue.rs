//! 汎用デバウンスキュー
//!
//! キーごとに最新のペイロードだけを保持し、最後の投入から `window` 経過後、
//! または明示的なフラッシュで、保留中の全件を1回のフラッシュに渡す。
//!
//! 状態は `Idle` / `Armed(deadline)` / `Flushing` の3つ。
//! - 投入: ペイロードを置き換え、タイマーを再設定（世代番号を進める）
//! - タイマー満了: 世代番号が現在のものと一致する場合のみフラッシュ
//! - 明示フラッシュ: タイマーを取り消してからフラッシュ
//!
//! フラッシュ開始時に保留分を取り出すため、フラッシュ中の投入は次回に回る。
//! 失敗時はフラッシュ先が失敗を報告したキーだけを戻す（同じキーの新しい値があればそちらを残す）。
//! 書き込み済みのキーは戻さない。自動リトライはしない。

use crate::error::{InspectionError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// 一部または全部のキーの書き込みに失敗した
#[derive(Debug)]
pub struct FlushFailure<K> {
    /// 書き込めなかったキー（キューに戻す）
    pub failed: Vec<K>,
    pub error: InspectionError,
}

impl<K> FlushFailure<K> {
    pub fn new(failed: Vec<K>, error: InspectionError) -> Self {
        Self { failed, error }
    }
}

/// フラッシュ先
///
/// 失敗したキーだけを `FlushFailure` で返すこと。報告されなかったキーは書き込み済みとみなす。
#[async_trait]
pub trait FlushTarget<K, P>: Send + Sync {
    async fn flush(&self, batch: &[(K, P)]) -> std::result::Result<(), FlushFailure<K>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    Idle,
    Armed { deadline: Instant },
    Flushing,
}

struct QueueState<K, P> {
    pending: HashMap<K, P>,
    in_flight: HashSet<K>,
    /// (期限, 世代番号)
    armed: Option<(Instant, u64)>,
    generation: u64,
}

struct Shared<K, P> {
    state: Mutex<QueueState<K, P>>,
    flush_lock: tokio::sync::Mutex<()>,
    target: Arc<dyn FlushTarget<K, P>>,
    window: Duration,
    name: &'static str,
}

impl<K, P> Shared<K, P> {
    fn lock(&self) -> MutexGuard<'_, QueueState<K, P>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct DebouncedQueue<K, P> {
    shared: Arc<Shared<K, P>>,
}

impl<K, P> Clone for DebouncedQueue<K, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, P> DebouncedQueue<K, P>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, window: Duration, target: Arc<dyn FlushTarget<K, P>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    pending: HashMap::new(),
                    in_flight: HashSet::new(),
                    armed: None,
                    generation: 0,
                }),
                flush_lock: tokio::sync::Mutex::new(()),
                target,
                window,
                name,
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.shared.window
    }

    /// ペイロードを投入してタイマーを再設定
    ///
    /// Tokioランタイム内で呼ぶこと。
    pub fn enqueue(&self, key: K, payload: P) {
        let (deadline, generation) = {
            let mut state = self.shared.lock();
            state.pending.insert(key, payload);
            state.generation += 1;
            let deadline = Instant::now() + self.shared.window;
            state.armed = Some((deadline, state.generation));
            (deadline, state.generation)
        };

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            sleep_until(deadline).await;
            fire(shared, generation).await;
        });
    }

    /// タイマーを取り消して即座にフラッシュ。フラッシュした件数を返す
    pub async fn flush(&self) -> Result<usize> {
        self.cancel_timer();
        flush_pending(&self.shared, |_| true).await
    }

    /// 条件に合うキーだけを即座にフラッシュ
    ///
    /// 他のキーが残る場合、タイマーはそのまま残す。
    pub async fn flush_where<F>(&self, filter: F) -> Result<usize>
    where
        F: Fn(&K) -> bool,
    {
        flush_pending(&self.shared, filter).await
    }

    /// タイマーを待たずに1件を投入してフラッシュ
    pub async fn put_and_flush(&self, key: K, payload: P) -> Result<usize> {
        {
            let mut state = self.shared.lock();
            state.pending.insert(key, payload);
        }
        self.flush().await
    }

    /// 保留中のタイマーを取り消す（保留データは残る）
    pub fn cancel_timer(&self) {
        self.shared.lock().armed = None;
    }

    /// フラッシュ待ち（フラッシュ中を含む）の異なるキー数
    pub fn pending_count(&self) -> usize {
        let state = self.shared.lock();
        state.pending.len()
            + state
                .in_flight
                .iter()
                .filter(|k| !state.pending.contains_key(*k))
                .count()
    }

    pub fn pending_payload(&self, key: &K) -> Option<P> {
        self.shared.lock().pending.get(key).cloned()
    }

    pub fn phase(&self) -> QueuePhase {
        let state = self.shared.lock();
        if !state.in_flight.is_empty() {
            QueuePhase::Flushing
        } else if let Some((deadline, _)) = state.armed {
            QueuePhase::Armed { deadline }
        } else {
            QueuePhase::Idle
        }
    }
}

async fn fire<K, P>(shared: Arc<Shared<K, P>>, generation: u64)
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    let current = {
        let state = shared.lock();
        state.armed.map(|(_, g)| g) == Some(generation)
    };
    if !current {
        return;
    }

    if let Err(e) = flush_pending(&shared, |_| true).await {
        warn!(queue = shared.name, error = %e, "Debounced flush failed, keeping updates");
    }
}

async fn flush_pending<K, P, F>(shared: &Shared<K, P>, filter: F) -> Result<usize>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
    F: Fn(&K) -> bool,
{
    let _flush_guard = shared.flush_lock.lock().await;

    let batch: Vec<(K, P)> = {
        let mut state = shared.lock();
        let keys: Vec<K> = state.pending.keys().filter(|k| filter(*k)).cloned().collect();
        let batch: Vec<(K, P)> = keys
            .into_iter()
            .filter_map(|k| state.pending.remove(&k).map(|p| (k, p)))
            .collect();
        if state.pending.is_empty() {
            state.armed = None;
        }
        state.in_flight = batch.iter().map(|(k, _)| k.clone()).collect();
        batch
    };
    if batch.is_empty() {
        return Ok(0);
    }

    debug!(queue = shared.name, count = batch.len(), "Flushing queued updates");
    let result = shared.target.flush(&batch).await;

    let mut state = shared.lock();
    state.in_flight.clear();
    match result {
        Ok(()) => Ok(batch.len()),
        Err(FlushFailure { failed, error }) => {
            let failed: HashSet<K> = failed.into_iter().collect();
            for (key, payload) in batch {
                if failed.contains(&key) {
                    // フラッシュ中に投入された新しい値を優先
                    state.pending.entry(key).or_insert(payload);
                }
            }
            Err(error)
        }
    }
}
