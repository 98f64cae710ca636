use crate::batch::DEFAULT_MAX_CONCURRENCY;
use crate::error::{InspectionError, Result};
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// データディレクトリを上書きする環境変数
pub const DATA_DIR_ENV: &str = "INSPECTION_SYNC_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// ドキュメントと画像の保存先（未設定時は ~/.local/share/inspection-sync）
    pub data_dir: Option<PathBuf>,
    pub max_concurrency: usize,
    pub component_debounce_ms: u64,
    pub room_debounce_ms: u64,
    pub analyzer_command: String,
    pub storage_retry: RetryConfig,
    pub batch_retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            component_debounce_ms: 1000,
            room_debounce_ms: 2000,
            analyzer_command: "claude".into(),
            storage_retry: RetryConfig::storage(),
            batch_retry: RetryConfig::batch(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| InspectionError::Config("home directory not found".into()))?;
        Ok(home.join(".config").join("inspection-sync").join("config.json"))
    }

    /// 環境変数 > 設定ファイル > デフォルト の順で解決
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let base = dirs::data_local_dir()
            .ok_or_else(|| InspectionError::Config("data directory not found".into()))?;
        Ok(base.join("inspection-sync"))
    }

    pub fn documents_dir(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("reports"))
    }

    pub fn images_dir(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("images"))
    }

    pub fn component_debounce(&self) -> Duration {
        Duration::from_millis(self.component_debounce_ms)
    }

    pub fn room_debounce(&self) -> Duration {
        Duration::from_millis(self.room_debounce_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(InspectionError::Config("max_concurrency must be at least 1".into()));
        }
        for (name, retry) in [("storage_retry", &self.storage_retry), ("batch_retry", &self.batch_retry)] {
            if retry.max_attempts == 0 {
                return Err(InspectionError::Config(format!(
                    "{}.max_attempts must be at least 1",
                    name
                )));
            }
        }
        if self.analyzer_command.trim().is_empty() {
            return Err(InspectionError::Config("analyzer_command is empty".into()));
        }
        Ok(())
    }

    /// `config set <key> <value>` 用
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = |e: &dyn std::fmt::Display| InspectionError::Config(format!("{}: {}", key, e));
        match key {
            "data_dir" => self.data_dir = Some(PathBuf::from(value)),
            "max_concurrency" => self.max_concurrency = value.parse().map_err(|e| invalid(&e))?,
            "component_debounce_ms" => {
                self.component_debounce_ms = value.parse().map_err(|e| invalid(&e))?
            }
            "room_debounce_ms" => self.room_debounce_ms = value.parse().map_err(|e| invalid(&e))?,
            "analyzer_command" => self.analyzer_command = value.to_string(),
            _ => return Err(InspectionError::Config(format!("unknown key: {}", key))),
        }
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.component_debounce(), Duration::from_millis(1000));
        assert_eq!(config.room_debounce(), Duration::from_millis(2000));
        assert_eq!(config.storage_retry.max_attempts, 3);
        assert_eq!(config.batch_retry.max_attempts, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.max_concurrency = 5;
        config.data_dir = Some(dir.path().join("data"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().expect("Failed to create temp dir");
        let loaded = Config::load_from(&dir.path().join("none.json")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_concurrency": 2}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.max_concurrency, 2);
        assert_eq!(loaded.analyzer_command, "claude");
    }

    #[test]
    fn test_validate_rejects_zero() {
        let mut config = Config::default();
        config.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.batch_retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("max_concurrency", "4").unwrap();
        assert_eq!(config.max_concurrency, 4);

        assert!(config.set_value("max_concurrency", "abc").is_err());
        assert!(config.set_value("max_concurrency", "0").is_err());
        assert!(config.set_value("nope", "1").is_err());
    }
}
