use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::info;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk storage for file attachments, keyed by relay-generated
/// filenames. Client-supplied names never reach the filesystem.
#[derive(Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub async fn new(root: PathBuf) -> Result<Self, ContentError> {
        fs::create_dir_all(&root).await?;
        info!("Content storage directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    pub async fn save(&self, filename: &str, body: &[u8]) -> Result<(), ContentError> {
        let path = self.path_for(filename);
        fs::write(&path, body).await?;
        info!("file saved: {}", path.display());
        Ok(())
    }
}
