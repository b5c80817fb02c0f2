//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione del motore di conversione.
//!
//! ## Responsabilità:
//! - Definisce `EngineConfig` con backend, concorrenza, timeout e root temporanea
//! - Fornisce validazione dei parametri
//! - Supporta caricamento/salvataggio da/verso file JSON
//! - Fornisce valori di default sensati
//!
//! ## Parametri di configurazione:
//! - `backend`: `native` (libreria in-process) o `worker` (processo esterno), default `native`
//! - `max_concurrency`: limite di job paralleli (default: quello del backend)
//! - `task_timeout_secs`: timeout per singola trasformazione (default: nessuno)
//! - `temp_root`: dove creare i workspace (default: temp di sistema)
//! - `worker`: programma, script e variabile d'ambiente del worker esterno
//! - `json_output`: eventi JSON su stdout invece della progress bar
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = EngineConfig {
//!     max_concurrency: Some(4),
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which TransformBackend implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Native,
    Worker,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "native" => Ok(BackendKind::Native),
            "worker" => Ok(BackendKind::Worker),
            other => Err(anyhow::anyhow!("Unknown backend: {} (expected native or worker)", other)),
        }
    }
}

/// External batch worker invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Interpreter or executable, e.g. `node`
    pub program: PathBuf,
    /// Script passed as first argument
    pub script: PathBuf,
    /// Environment variable carrying the concurrency limit
    pub concurrency_env: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("node"),
            script: PathBuf::from("image-processor.js"),
            concurrency_env: "SHARP_CONCURRENCY".to_string(),
        }
    }
}

/// Configuration for the conversion engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// Overrides the backend's concurrency limit
    pub max_concurrency: Option<usize>,
    /// Per-task timeout around the backend call
    pub task_timeout_secs: Option<u64>,
    /// Parent directory for batch workspaces
    pub temp_root: Option<PathBuf>,
    pub worker: WorkerConfig,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Native,
            max_concurrency: None,
            task_timeout_secs: None,
            temp_root: None,
            worker: WorkerConfig::default(),
            json_output: false,
        }
    }
}

impl EngineConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == Some(0) {
            return Err(anyhow::anyhow!("Max concurrency must be greater than 0"));
        }

        if self.task_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("Task timeout must be greater than 0 seconds"));
        }

        if self.backend == BackendKind::Worker && self.worker.program.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Worker backend requires a worker program"));
        }

        if let Some(ref root) = self.temp_root {
            if root.exists() && !root.is_dir() {
                return Err(anyhow::anyhow!("Temp root is not a directory: {}", root.display()));
            }
        }

        Ok(())
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Load configuration from file, defaults if it does not exist
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
