use std::path::{Path, PathBuf};

use super::types::ReportSnapshot;
use crate::error::ReportError;

/// Directory of `<id>.json` report files.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, id: &str) -> PathBuf {
        let name: String = id
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    /// Writes the snapshot, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be encoded or written.
    pub async fn persist(&self, snapshot: &ReportSnapshot) -> Result<PathBuf, ReportError> {
        let path = self.path_for(&snapshot.id);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ReportError::Write {
                path: self.dir.clone(),
                source,
            })?;
        let encoded = serde_json::to_vec_pretty(snapshot)
            .map_err(|source| ReportError::Encode { source })?;
        tokio::fs::write(&path, encoded)
            .await
            .map_err(|source| ReportError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Reads a previously persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is missing or malformed.
    pub async fn load(&self, id: &str) -> Result<ReportSnapshot, ReportError> {
        let path = self.path_for(id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| ReportError::Read {
                path: path.clone(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|source| ReportError::Decode { path, source })
    }
}
