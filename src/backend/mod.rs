//! # Transform Backend Module
//!
//! Interfaccia verso chi fa davvero decode → resize → encode di un file.
//!
//! ## Implementazioni intercambiabili:
//! - `native`: libreria codec in-process (`image`), una chiamata per task
//! - `worker`: processo esterno che riceve un manifest `{inputPath, outputPath, options}`
//!   e restituisce una lista parallela di risultati
//!
//! L'orchestratore non sa quale forma è in uso: vede solo `TransformBackend`.
//! Il token di cancellazione arriva fino al backend, così un backend a processo
//! può terminare il figlio.

pub mod manifest;
pub mod native;
pub mod worker;

use crate::config::{BackendKind, EngineConfig};
use crate::error::ConvertError;
use crate::preset::{EncodeOptions, OutputFormat};
use crate::resize::Dimensions;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use native::NativeBackend;
pub use worker::WorkerBackend;

/// Everything a backend needs to convert one file
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub source: PathBuf,
    /// Unique staging path inside the batch workspace
    pub destination: PathBuf,
    pub target: Dimensions,
    pub format: OutputFormat,
    pub quality: u8,
    pub options: EncodeOptions,
}

/// What a backend hands back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    /// The backend wrote the file at this path
    Written(PathBuf),
    /// Encoded bytes; the engine writes them to the staging path
    Encoded(Vec<u8>),
}

#[async_trait]
pub trait TransformBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Max concurrent jobs this backend wants, `None` for no limit
    fn concurrency_limit(&self) -> Option<usize> {
        None
    }

    /// Whether this backend can produce `format` at all
    fn supports(&self, _format: OutputFormat) -> bool {
        true
    }

    /// Source image dimensions
    async fn probe(&self, path: &Path, token: &CancellationToken) -> Result<Dimensions, ConvertError>;

    /// Resize to `request.target` without cropping and encode
    async fn transform(
        &self,
        request: &TransformRequest,
        token: &CancellationToken,
    ) -> Result<TransformOutput, ConvertError>;
}

/// Build the backend selected in the config
pub fn from_config(config: &EngineConfig) -> Arc<dyn TransformBackend> {
    match config.backend {
        BackendKind::Native => Arc::new(NativeBackend::new()),
        BackendKind::Worker => {
            let worker = WorkerBackend::new(config.worker.clone());
            match config.max_concurrency {
                Some(limit) => Arc::new(worker.with_concurrency(limit)),
                None => Arc::new(worker),
            }
        }
    }
}

/// Number of CPU cores, at least 1
pub(crate) fn available_cores() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Read image dimensions from the file header only
pub(crate) async fn probe_header(path: &Path) -> Result<Dimensions, ConvertError> {
    let owned = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || image::image_dimensions(&owned))
        .await
        .map_err(|e| ConvertError::Backend(format!("Probe task failed: {}", e)))?;

    match result {
        Ok((width, height)) => Ok(Dimensions::new(width, height)),
        Err(image::ImageError::IoError(e)) => Err(ConvertError::source_unreadable(path, e)),
        Err(e) => Err(ConvertError::Backend(format!("Failed to probe {}: {}", path.display(), e))),
    }
}
