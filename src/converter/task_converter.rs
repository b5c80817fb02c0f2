//! # Task Converter Module
//!
//! Worker per la conversione di singoli file.
//! Separato dall'orchestratore: non tocca mai la lista dei task, restituisce
//! solo l'esito che il loop di coordinamento applica.
//!
//! ## Pipeline per file:
//! 1. Dimensione sorgente (prima della trasformazione: l'originale può sparire dopo)
//! 2. Probe delle dimensioni tramite backend
//! 3. Calcolo dimensioni di destinazione (`Dimensions::fit_within`)
//! 4. Trasformazione verso un file di staging univoco nel workspace
//! 5. Creazione directory di output e spostamento nel path finale (sovrascrive)
//! 6. Cancellazione best-effort dell'originale se richiesto dal preset
//!
//! Un job di un batch già cancellato non tocca mai gli output finali né
//! l'originale: il token viene ricontrollato prima dello spostamento e prima
//! della cancellazione, e il file di staging viene scartato.

use crate::backend::{TransformBackend, TransformOutput, TransformRequest};
use crate::batch::{Task, TaskOutput};
use crate::converter::path_resolver::OutputPathResolver;
use crate::error::ConvertError;
use crate::file_manager::FileManager;
use crate::resize::Dimensions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Converts one task's file; shared by all jobs of a batch
pub struct TaskConverter {
    backend: Arc<dyn TransformBackend>,
    /// Resolved once per batch; the error message is replayed for every task
    output_directory: Result<Option<PathBuf>, String>,
    workspace: PathBuf,
    timeout: Option<Duration>,
    /// Fresh for every launch, so runs never share staging files
    run_id: Uuid,
}

impl TaskConverter {
    pub fn new(
        backend: Arc<dyn TransformBackend>,
        output_directory: Result<Option<PathBuf>, String>,
        workspace: PathBuf,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            backend,
            output_directory,
            workspace,
            timeout,
            run_id: Uuid::new_v4(),
        }
    }

    /// Run the whole pipeline for one task
    pub async fn convert(&self, task: &Task, token: &CancellationToken) -> Result<TaskOutput, ConvertError> {
        let output_directory = self
            .output_directory
            .clone()
            .map_err(ConvertError::OutputPathUnresolvable)?;
        let preset = &task.preset;
        let source = &task.source_path;

        let input_size = FileManager::file_size(source)
            .await
            .map_err(|e| ConvertError::source_unreadable(source, e))?;

        let source_dims = self.backend.probe(source, token).await?;
        let bounds = Dimensions::new(preset.max_width, preset.max_height);
        let target = source_dims.fit_within(bounds);
        debug!(
            "{}: {} -> {} (scale {:.3})",
            source.display(),
            source_dims,
            target,
            source_dims.scale_to(bounds)
        );

        let staging = OutputPathResolver::staging_path(&self.workspace, source, task.id, self.run_id, preset.format)?;
        let final_path =
            OutputPathResolver::final_path(output_directory.as_deref(), &self.workspace, source, preset.format)?;

        let request = TransformRequest {
            source: source.clone(),
            destination: staging,
            target,
            format: preset.format,
            quality: preset.quality,
            options: preset.encode_options(),
        };

        let staged = match self.run_backend(&request, token).await? {
            TransformOutput::Written(path) => path,
            TransformOutput::Encoded(bytes) => {
                tokio::fs::write(&request.destination, bytes)
                    .await
                    .map_err(|e| ConvertError::write_failure(&request.destination, e))?;
                request.destination.clone()
            }
        };

        if token.is_cancelled() {
            Self::discard(&staged).await;
            return Err(ConvertError::Cancelled);
        }

        if let Some(ref dir) = output_directory {
            OutputPathResolver::ensure_dir(dir).await?;
        }
        FileManager::move_file(&staged, &final_path)
            .await
            .map_err(|e| ConvertError::write_failure(&final_path, e))?;

        let output_size = FileManager::file_size(&final_path)
            .await
            .map_err(|e| ConvertError::write_failure(&final_path, e))?;

        if preset.delete_original && !token.is_cancelled() {
            Self::delete_original(source, &final_path).await;
        }

        Ok(TaskOutput {
            output_path: final_path,
            input_size,
            output_size,
        })
    }

    async fn run_backend(
        &self,
        request: &TransformRequest,
        token: &CancellationToken,
    ) -> Result<TransformOutput, ConvertError> {
        let transform = self.backend.transform(request, token);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, transform).await.map_err(|_| {
                ConvertError::Backend(format!(
                    "Transform of {} timed out after {}s",
                    request.source.display(),
                    limit.as_secs()
                ))
            })?,
            None => transform.await,
        }
    }

    async fn discard(staged: &Path) {
        if let Err(e) = tokio::fs::remove_file(staged).await {
            debug!("Failed to discard {}: {}", staged.display(), e);
        }
    }

    /// Best-effort; failures are logged and otherwise ignored
    async fn delete_original(source: &Path, output: &Path) {
        if Self::same_file(source, output).await {
            debug!("Output replaced the source in place, not deleting {}", source.display());
            return;
        }
        match tokio::fs::remove_file(source).await {
            Ok(()) => debug!("Deleted original {}", source.display()),
            Err(e) => warn!("Failed to delete original {}: {}", source.display(), e),
        }
    }

    async fn same_file(a: &Path, b: &Path) -> bool {
        if a == b {
            return true;
        }
        match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::write_png;
    use crate::backend::NativeBackend;
    use crate::error::ErrorKind;
    use crate::preset::{OutputFormat, Preset};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Finishes the transform, but the batch is superseded meanwhile
    struct SupersededBackend;

    #[async_trait]
    impl TransformBackend for SupersededBackend {
        fn name(&self) -> &'static str {
            "superseded"
        }

        async fn probe(&self, _path: &Path, _token: &CancellationToken) -> Result<Dimensions, ConvertError> {
            Ok(Dimensions::new(100, 100))
        }

        async fn transform(
            &self,
            _request: &TransformRequest,
            token: &CancellationToken,
        ) -> Result<TransformOutput, ConvertError> {
            token.cancel();
            Ok(TransformOutput::Encoded(b"late".to_vec()))
        }
    }

    fn converter(output: Result<Option<PathBuf>, String>, workspace: &Path) -> TaskConverter {
        TaskConverter::new(Arc::new(NativeBackend::new()), output, workspace.to_path_buf(), None)
    }

    fn task(source: &Path, max: u32, format: OutputFormat) -> Task {
        Task::new(source.to_path_buf(), Preset::new("Test", max, max, format, 80))
    }

    #[tokio::test]
    async fn test_converts_into_output_directory() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path().join("ws");
        std::fs::create_dir(&workspace).unwrap();
        let source = dir.path().join("wide.png");
        write_png(&source, 64, 32);
        let out_dir = dir.path().join("out").join("web");

        let output = converter(Ok(Some(out_dir.clone())), &workspace)
            .convert(&task(&source, 32, OutputFormat::Jpeg), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.output_path, out_dir.join("wide.jpeg"));
        assert_eq!(output.input_size, std::fs::metadata(&source).unwrap().len());
        assert_eq!(output.output_size, std::fs::metadata(&output.output_path).unwrap().len());
        assert_eq!(image::image_dimensions(&output.output_path).unwrap(), (32, 16));
        // Staging file was moved away
        assert_eq!(std::fs::read_dir(&workspace).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_small_images_are_not_enlarged() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("icon.png");
        write_png(&source, 12, 8);
        let workspace = dir.path().join("ws");
        std::fs::create_dir(&workspace).unwrap();

        let output = converter(Ok(None), &workspace)
            .convert(&task(&source, 1000, OutputFormat::Png), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.output_path, workspace.join("icon.png"));
        assert_eq!(image::image_dimensions(&output.output_path).unwrap(), (12, 8));
    }

    #[tokio::test]
    async fn test_delete_original_after_success() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("photo.png");
        write_png(&source, 20, 20);
        let mut task = task(&source, 10, OutputFormat::Tiff);
        task.preset.delete_original = true;

        let output = converter(Ok(Some(dir.path().join("out"))), dir.path())
            .convert(&task, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!source.exists());
        assert!(output.output_path.exists());
        assert!(output.input_size > 0);
    }

    #[tokio::test]
    async fn test_unresolved_output_directory() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("photo.png");
        write_png(&source, 4, 4);

        let err = converter(Err("no custom path".to_string()), dir.path())
            .convert(&task(&source, 10, OutputFormat::Png), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::OutputPath));
    }

    #[tokio::test]
    async fn test_unencodable_format_keeps_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("photo.png");
        write_png(&source, 4, 4);
        let mut task = task(&source, 10, OutputFormat::Avif);
        task.preset.delete_original = true;

        let err = converter(Ok(None), dir.path())
            .convert(&task, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Backend));
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_superseded_job_leaves_outputs_alone() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path().join("ws");
        std::fs::create_dir(&workspace).unwrap();
        let source = dir.path().join("photo.png");
        std::fs::write(&source, b"original").unwrap();
        let final_path = dir.path().join("photo.jpeg");
        std::fs::write(&final_path, b"from the newer run").unwrap();

        let mut task = task(&source, 10, OutputFormat::Jpeg);
        task.preset.delete_original = true;
        let converter = TaskConverter::new(
            Arc::new(SupersededBackend),
            Ok(Some(dir.path().to_path_buf())),
            workspace.clone(),
            None,
        );

        let err = converter.convert(&task, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConvertError::Cancelled));
        assert_eq!(std::fs::read(&final_path).unwrap(), b"from the newer run");
        assert!(source.exists());
        assert_eq!(std::fs::read_dir(&workspace).unwrap().count(), 0);
    }
}
