//! JSONファイルによるドキュメントストア
//!
//! レポートごとに `<dir>/<report_id>.json` を1つ持つ。
//! 書き込みは一時ファイルへ書いてからリネームする。

use crate::error::{InspectionError, Result};
use crate::services::DocumentStore;
use async_trait::async_trait;
use inspection_common::InspectionDocument;
use std::path::{Path, PathBuf};

pub struct JsonDocumentStore {
    dir: PathBuf,
}

impl JsonDocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn document_path(&self, report_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(report_id)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn file_stem(report_id: &str) -> String {
    report_id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn read_document(&self, report_id: &str) -> Result<InspectionDocument> {
        let path = self.document_path(report_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InspectionError::not_found("report", report_id));
            }
            Err(e) => return Err(InspectionError::Store(format!("{}: {}", path.display(), e))),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_document(&self, report_id: &str, doc: &InspectionDocument) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.document_path(report_id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| InspectionError::Store(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| InspectionError::Store(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspection_common::ComponentRecord;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = JsonDocumentStore::new(dir.path());

        let err = store.read_document("r1").await.unwrap_err();
        assert!(matches!(err, InspectionError::NotFound { kind: "report", .. }));
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = JsonDocumentStore::new(dir.path().join("docs"));

        let mut doc = InspectionDocument::new("kitchen");
        doc.components.push(ComponentRecord {
            id: "c1".to_string(),
            name: "Sink".to_string(),
            ..Default::default()
        });
        store.write_document("r/1", &doc).await.unwrap();

        assert!(store.document_path("r/1").ends_with("r_1.json"));
        let loaded = store.read_document("r/1").await.unwrap();
        assert_eq!(loaded, doc);
        assert!(!store.document_path("r/1").with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupted_document() {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = JsonDocumentStore::new(dir.path());
        std::fs::write(store.document_path("r1"), "{ invalid json }").unwrap();

        let err = store.read_document("r1").await.unwrap_err();
        assert!(matches!(err, InspectionError::Json(_)));
    }
}
