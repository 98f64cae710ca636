//! ローカルファイルシステム上の画像ストレージ
//!
//! 画像を `<root>/<report>/<room>/` へ内容ハッシュ名でコピーし、
//! 画像レコードを同じディレクトリの `images.json` に保持する。

use super::{ImageRecordStore, ImageUploader, UploadContext};
use crate::error::{InspectionError, Result};
use async_trait::async_trait;
use inspection_common::ImageRef;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

const RECORDS_FILE_NAME: &str = "images.json";

pub struct LocalImageStorage {
    root: PathBuf,
    // images.json の読み書きを直列化
    records_lock: Mutex<()>,
}

impl LocalImageStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            records_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn room_dir(&self, report_id: &str, room_id: &str) -> PathBuf {
        self.root.join(path_segment(report_id)).join(path_segment(room_id))
    }

    /// 画像レコード一覧を読み込み（ファイルがなければ空）
    pub async fn load_records(&self, report_id: &str, room_id: &str) -> Result<Vec<ImageRef>> {
        let path = self.room_dir(report_id, room_id).join(RECORDS_FILE_NAME);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// パスに使えない文字を `_` に置換
fn path_segment(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl ImageUploader for LocalImageStorage {
    async fn upload(&self, image: &str, ctx: &UploadContext) -> Result<String> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| InspectionError::Upload(format!("{}: {}", image, e)))?;
        if bytes.is_empty() {
            return Err(InspectionError::Upload(format!("{}: empty image", image)));
        }

        let ext = Path::new(image)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_lowercase();
        let hash = sha256_hex(&bytes);
        let file_name = format!("{}-{}.{}", path_segment(&ctx.component_label), &hash[..16], ext);

        let dir = self.room_dir(&ctx.report_id, &ctx.room_id);
        tokio::fs::create_dir_all(&dir).await?;
        let dest = dir.join(&file_name);
        if tokio::fs::metadata(&dest).await.is_err() {
            tokio::fs::write(&dest, &bytes).await?;
        }

        let storage_ref = format!(
            "{}/{}/{}",
            path_segment(&ctx.report_id),
            path_segment(&ctx.room_id),
            file_name
        );
        debug!(image, storage_ref = %storage_ref, property = %ctx.property_label, "Stored image");
        Ok(storage_ref)
    }
}

#[async_trait]
impl ImageRecordStore for LocalImageStorage {
    async fn add_image_record(&self, report_id: &str, room_id: &str, storage_ref: &str) -> Result<ImageRef> {
        let _guard = self.records_lock.lock().await;

        let mut records = self.load_records(report_id, room_id).await?;
        let id = format!("img-{}", &sha256_hex(storage_ref.as_bytes())[..12]);
        if let Some(existing) = records.iter().find(|r| r.id == id) {
            return Ok(existing.clone());
        }

        let record = ImageRef {
            id,
            url: self.root.join(storage_ref).display().to_string(),
        };
        records.push(record.clone());

        let dir = self.room_dir(report_id, room_id);
        tokio::fs::create_dir_all(&dir).await?;
        let json = serde_json::to_vec_pretty(&records)?;
        tokio::fs::write(dir.join(RECORDS_FILE_NAME), json).await?;
        Ok(record)
    }
}
