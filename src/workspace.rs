//! # Temp Workspace Module
//!
//! Una directory di lavoro per batch, con ciclo di vita esplicito.
//!
//! ## Responsabilità:
//! - `allocate(batch_id)`: crea `DragNConvert-<batch_id>` sotto la root temporanea;
//!   idempotente, lo stesso batch riceve sempre la stessa directory
//! - `release(batch_id)`: rimozione ricorsiva
//!
//! ## Limiti noti:
//! Il rilascio è esplicito (dismiss dell'utente o avvio di un nuovo batch),
//! mai automatico all'uscita del processo. Dopo una terminazione anomala le
//! directory `DragNConvert-*` restano orfane nella root temporanea.
//!
//! Tutti i worker di un batch scrivono qui, ognuno su un file con nome univoco.

use crate::error::ConvertError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const WORKSPACE_PREFIX: &str = "DragNConvert-";

/// Owns one scratch directory per batch
pub struct TempWorkspaceManager {
    root: PathBuf,
    allocated: Mutex<HashMap<Uuid, PathBuf>>,
}

impl TempWorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allocated: Mutex::new(HashMap::new()),
        }
    }

    /// Path a batch's workspace has (or would have)
    pub fn path_for(&self, batch_id: Uuid) -> PathBuf {
        self.root.join(format!("{}{}", WORKSPACE_PREFIX, batch_id))
    }

    /// Create the batch workspace, or return the existing one
    pub async fn allocate(&self, batch_id: Uuid) -> Result<PathBuf, ConvertError> {
        if let Some(existing) = self.lookup(batch_id) {
            if tokio::fs::try_exists(&existing).await.unwrap_or(false) {
                return Ok(existing);
            }
        }

        let path = self.path_for(batch_id);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| ConvertError::write_failure(&path, e))?;
        debug!("Allocated workspace: {}", path.display());

        if let Ok(mut allocated) = self.allocated.lock() {
            allocated.insert(batch_id, path.clone());
        }
        Ok(path)
    }

    /// Remove the batch workspace recursively
    pub async fn release(&self, batch_id: Uuid) {
        let path = match self.allocated.lock() {
            Ok(mut allocated) => allocated.remove(&batch_id),
            Err(_) => None,
        };
        let Some(path) = path else {
            return;
        };

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => info!("🧹 Cleared workspace {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {}", path.display(), e),
        }
    }

    pub fn is_allocated(&self, batch_id: Uuid) -> bool {
        self.lookup(batch_id).is_some()
    }

    fn lookup(&self, batch_id: Uuid) -> Option<PathBuf> {
        self.allocated.lock().ok()?.get(&batch_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_allocate_is_idempotent() {
        let root = TempDir::new().unwrap();
        let manager = TempWorkspaceManager::new(root.path());
        let id = Uuid::new_v4();

        let first = manager.allocate(id).await.unwrap();
        std::fs::write(first.join("staged.png"), b"x").unwrap();
        let second = manager.allocate(id).await.unwrap();

        assert_eq!(first, second);
        assert!(second.join("staged.png").exists());
        assert!(first.file_name().unwrap().to_string_lossy().starts_with(WORKSPACE_PREFIX));
    }

    #[tokio::test]
    async fn test_release_removes_recursively() {
        let root = TempDir::new().unwrap();
        let manager = TempWorkspaceManager::new(root.path());
        let id = Uuid::new_v4();

        let path = manager.allocate(id).await.unwrap();
        std::fs::create_dir(path.join("manifest")).unwrap();
        std::fs::write(path.join("manifest").join("batch-config.json"), b"{}").unwrap();

        manager.release(id).await;
        assert!(!path.exists());
        assert!(!manager.is_allocated(id));

        // Releasing twice is harmless
        manager.release(id).await;
    }

    #[tokio::test]
    async fn test_distinct_batches_get_distinct_workspaces() {
        let root = TempDir::new().unwrap();
        let manager = TempWorkspaceManager::new(root.path());
        let a = manager.allocate(Uuid::new_v4()).await.unwrap();
        let b = manager.allocate(Uuid::new_v4()).await.unwrap();
        assert_ne!(a, b);
    }
}
