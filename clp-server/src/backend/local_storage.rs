//! Filesystem object store for the local backend

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{BackendError, BackendResult, ObjectStore};

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create the root directory if needed
    pub async fn new(root: &Path) -> BackendResult<Self> {
        fs::create_dir_all(root).await?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Resolve an object path under the root; rejects absolute paths and `..`
    fn resolve(&self, path: &str) -> BackendResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(BackendError::InvalidInput(format!(
                "invalid object path '{}'",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
        upsert: bool,
    ) -> BackendResult<()> {
        let target = self.resolve(path)?;
        if !upsert && fs::try_exists(&target).await? {
            return Err(BackendError::Conflict(format!("object '{}' exists", path)));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        debug!(path = %target.display(), size = bytes.len(), "Writing object");
        fs::write(&target, bytes).await?;
        Ok(())
    }

    async fn download(&self, path: &str) -> BackendResult<Vec<u8>> {
        let target = self.resolve(path)?;
        match fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, paths: &[String]) -> BackendResult<()> {
        for path in paths {
            let target = self.resolve(path)?;
            match fs::remove_file(&target).await {
                Ok(()) => debug!(path = %target.display(), "Removed object"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
