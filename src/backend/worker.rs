//! Out-of-process backend driving a batch worker script (e.g. a sharp script
//! run by node).
//!
//! Each call writes a manifest into a fresh directory under the batch
//! workspace, runs `<program> <script> <manifest dir>` and reads the
//! parallel result list back.

use super::manifest::{Manifest, ManifestEntry, ManifestResult, CONFIG_FILE, RESULTS_FILE};
use super::{available_cores, probe_header, TransformBackend, TransformOutput, TransformRequest};
use crate::config::WorkerConfig;
use crate::error::ConvertError;
use crate::resize::Dimensions;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct WorkerBackend {
    config: WorkerConfig,
    concurrency: usize,
}

impl WorkerBackend {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            concurrency: available_cores(),
        }
    }

    /// Override the CPU-derived concurrency limit
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run a whole manifest through the worker.
    ///
    /// The manifest directory lives under `scratch_dir` and is removed when
    /// this returns.
    pub async fn run_manifest(
        &self,
        entries: Vec<ManifestEntry>,
        scratch_dir: &Path,
        token: &CancellationToken,
    ) -> Result<Vec<ManifestResult>, ConvertError> {
        let expected = entries.len();
        let manifest_dir = tempfile::Builder::new()
            .prefix("manifest-")
            .tempdir_in(scratch_dir)
            .map_err(|e| ConvertError::write_failure(scratch_dir, e))?;

        let config_path = manifest_dir.path().join(CONFIG_FILE);
        let body = serde_json::to_vec_pretty(&Manifest { tasks: entries })
            .map_err(|e| ConvertError::Backend(format!("Failed to serialize manifest: {}", e)))?;
        tokio::fs::write(&config_path, body)
            .await
            .map_err(|e| ConvertError::write_failure(&config_path, e))?;

        debug!(
            "Running worker {} {} with {} entries",
            self.config.program.display(),
            self.config.script.display(),
            expected
        );

        let child = Command::new(&self.config.program)
            .arg(&self.config.script)
            .arg(manifest_dir.path())
            .env(&self.config.concurrency_env, self.concurrency.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ConvertError::Backend(format!("Failed to start worker {}: {}", self.config.program.display(), e))
            })?;

        // Dropping the child on cancellation kills it
        let output = tokio::select! {
            _ = token.cancelled() => {
                warn!("Worker cancelled, killing process");
                return Err(ConvertError::Cancelled);
            }
            output = child.wait_with_output() => output
                .map_err(|e| ConvertError::Backend(format!("Failed to wait for worker: {}", e)))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::Backend(format!(
                "Worker exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let results_path = manifest_dir.path().join(RESULTS_FILE);
        let raw = tokio::fs::read(&results_path)
            .await
            .map_err(|e| ConvertError::Backend(format!("Worker wrote no results ({}): {}", results_path.display(), e)))?;
        let results: Vec<ManifestResult> = serde_json::from_slice(&raw)
            .map_err(|e| ConvertError::Backend(format!("Failed to parse worker results: {}", e)))?;

        if results.len() != expected {
            return Err(ConvertError::Backend(format!(
                "Worker returned {} results for {} entries",
                results.len(),
                expected
            )));
        }

        Ok(results)
    }
}

#[async_trait]
impl TransformBackend for WorkerBackend {
    fn name(&self) -> &'static str {
        "worker"
    }

    fn concurrency_limit(&self) -> Option<usize> {
        Some(self.concurrency)
    }

    async fn probe(&self, path: &Path, _token: &CancellationToken) -> Result<Dimensions, ConvertError> {
        probe_header(path).await
    }

    async fn transform(
        &self,
        request: &TransformRequest,
        token: &CancellationToken,
    ) -> Result<TransformOutput, ConvertError> {
        let scratch_dir = request.destination.parent().ok_or_else(|| {
            ConvertError::OutputPathUnresolvable(format!("No parent for {}", request.destination.display()))
        })?;

        let results = self
            .run_manifest(vec![ManifestEntry::from(request)], scratch_dir, token)
            .await?;

        match results.into_iter().next() {
            Some(result) if result.success => Ok(TransformOutput::Written(result.output_path)),
            Some(result) => Err(ConvertError::Backend(
                result.error.unwrap_or_else(|| "Unknown worker error".to_string()),
            )),
            None => Err(ConvertError::Backend("Worker returned no result".to_string())),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::preset::OutputFormat;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sh_worker(dir: &Path, body: &str) -> WorkerConfig {
        let script = dir.join("worker.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        WorkerConfig {
            program: PathBuf::from("sh"),
            script,
            concurrency_env: "SHARP_CONCURRENCY".to_string(),
        }
    }

    fn request(source: &Path, destination: &Path) -> TransformRequest {
        TransformRequest {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            target: Dimensions::new(100, 50),
            format: OutputFormat::Webp,
            quality: 85,
            options: OutputFormat::Webp.encode_options(85),
        }
    }

    #[tokio::test]
    async fn test_worker_success() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in.png");
        let dest = dir.path().join("in-1.webp");
        std::fs::write(&source, b"pixels").unwrap();

        let body = format!(
            r#"test -f "$1/{config}" || exit 3
[ "$SHARP_CONCURRENCY" = "2" ] || exit 4
cp "{src}" "{dst}"
printf '[{{"success":true,"inputPath":"{src}","outputPath":"{dst}"}}]' > "$1/{results}""#,
            config = CONFIG_FILE,
            results = RESULTS_FILE,
            src = source.display(),
            dst = dest.display(),
        );
        let backend = WorkerBackend::new(sh_worker(dir.path(), &body)).with_concurrency(2);

        let output = backend
            .transform(&request(&source, &dest), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, TransformOutput::Written(dest.clone()));
        assert_eq!(std::fs::read(&dest).unwrap(), b"pixels");

        // The manifest directory is cleaned up
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("manifest-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_worker_nonzero_exit_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let backend = WorkerBackend::new(sh_worker(dir.path(), "echo 'sharp exploded' >&2\nexit 1"));

        let err = backend
            .transform(&request(&dir.path().join("a.png"), &dir.path().join("a.webp")), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Backend));
        assert!(err.to_string().contains("sharp exploded"));
    }

    #[tokio::test]
    async fn test_worker_entry_failure() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            r#"printf '[{{"success":false,"error":"Input buffer contains unsupported image format","inputPath":"a","outputPath":"b"}}]' > "$1/{}""#,
            RESULTS_FILE
        );
        let backend = WorkerBackend::new(sh_worker(dir.path(), &body));

        let err = backend
            .transform(&request(&dir.path().join("a.png"), &dir.path().join("a.webp")), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported image format"));
    }

    #[tokio::test]
    async fn test_worker_result_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let body = format!("printf '[]' > \"$1/{}\"", RESULTS_FILE);
        let backend = WorkerBackend::new(sh_worker(dir.path(), &body));

        let err = backend
            .transform(&request(&dir.path().join("a.png"), &dir.path().join("a.webp")), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("0 results for 1 entries"));
    }
}
