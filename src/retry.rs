//! リトライエンジン
//!
//! ネットワーク向け呼び出しを指数バックオフ＋ジッタ付きでリトライする。
//! エラーはメッセージの部分一致（大文字小文字無視）で分類し、
//! リトライ不可または試行回数切れの場合は最後のエラーをそのまま返す。

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// リトライ対象とみなすエラーメッセージのパターン
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "unavailable",
    "deadline-exceeded",
    "resource-exhausted",
    "rate limit",
    "connection reset",
    "econnreset",
    "503",
];

/// ジッタの振れ幅（±10%）
const JITTER_RATIO: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 1以上。1ならリトライなし
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::storage()
    }
}

impl RetryConfig {
    /// ストレージ向け: 3回、1秒から最大8秒
    pub fn storage() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
            backoff_factor: 2.0,
            jitter: true,
            retryable_errors: default_patterns(),
        }
    }

    /// バッチ向けの控えめな設定: 2回、0.5秒から最大5秒
    pub fn batch() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            backoff_factor: 2.0,
            jitter: true,
            retryable_errors: default_patterns(),
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// `failed_attempt` 回目の失敗後の待ち時間（ジッタなし）
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        Duration::from_millis(self.raw_delay_ms(failed_attempt).round() as u64)
    }

    fn raw_delay_ms(&self, failed_attempt: u32) -> f64 {
        let exponent = failed_attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent);
        delay.min(self.max_delay_ms as f64).max(0.0)
    }

    /// 実際に待つ時間（設定によりジッタを加える）
    pub fn next_delay(&self, failed_attempt: u32) -> Duration {
        let ms = self.raw_delay_ms(failed_attempt);
        if !self.jitter || ms == 0.0 {
            return Duration::from_millis(ms.round() as u64);
        }
        let factor = 1.0 + rand::rng().random_range(-JITTER_RATIO..=JITTER_RATIO);
        Duration::from_millis((ms * factor).max(0.0).round() as u64)
    }

    /// エラーメッセージがリトライ対象パターンに一致するか
    pub fn is_retryable(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.retryable_errors
            .iter()
            .any(|p| !p.is_empty() && message.contains(&p.to_lowercase()))
    }
}

fn default_patterns() -> Vec<String> {
    DEFAULT_RETRYABLE_ERRORS.iter().map(|s| s.to_string()).collect()
}

/// 1回の試行のスナップショット（進捗コールバック用）
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    /// 1始まり
    pub attempt: u32,
    pub max_attempts: u32,
    /// 次の試行までの待ち時間。試行前と最終失敗時はゼロ
    pub delay: Duration,
    pub last_error: Option<String>,
    pub retryable: bool,
}

impl fmt::Display for RetryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt {}/{}", self.attempt, self.max_attempts)?;
        if let Some(err) = &self.last_error {
            write!(f, " ({})", err)?;
        }
        Ok(())
    }
}

/// 進捗コールバック。制御フローには影響しない
pub type RetryProgress<'a> = &'a (dyn Fn(&RetryContext) + Send + Sync);

/// 操作をリトライ付きで実行
///
/// `on_progress` は各試行の前と各失敗時に呼ばれる。
/// `max_attempts` が0の場合は1として扱う。
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    config: &RetryConfig,
    on_progress: Option<RetryProgress<'_>>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut last_error: Option<String> = None;
    let mut attempt = 1;

    loop {
        if let Some(report) = on_progress {
            report(&RetryContext {
                attempt,
                max_attempts,
                delay: Duration::ZERO,
                last_error: last_error.clone(),
                retryable: true,
            });
        }

        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let message = err.to_string();
        let retryable = config.is_retryable(&message);
        let exhausted = attempt >= max_attempts;
        let delay = if retryable && !exhausted {
            config.next_delay(attempt)
        } else {
            Duration::ZERO
        };

        if let Some(report) = on_progress {
            report(&RetryContext {
                attempt,
                max_attempts,
                delay,
                last_error: Some(message.clone()),
                retryable,
            });
        }

        if !retryable || exhausted {
            warn!(attempt, max_attempts, retryable, error = %message, "Operation failed");
            return Err(err);
        }

        debug!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %message,
            "Retrying after backoff"
        );
        sleep(delay).await;
        last_error = Some(message);
        attempt += 1;
    }
}
