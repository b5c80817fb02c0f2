//! # Conversion Orchestrator
//!
//! Orchestratore principale: un solo batch attivo alla volta.
//!
//! ## Responsabilità:
//! - Avvio batch: snapshot del preset, workspace, risoluzione directory di output
//! - Un job per file, limitati da un `Semaphore` (limite del backend o della config)
//! - Punto di merge unico: i job inviano `TaskEvent` su un canale, solo il loop
//!   di coordinamento modifica la lista dei task e pubblica gli snapshot
//! - Supersessione: un nuovo batch cancella il token del precedente e ne rilascia
//!   il workspace; dopo la cancellazione il vecchio batch non pubblica più nulla
//! - Restart del batch corrente, dismiss
//!
//! ## Cancellazione:
//! Cooperativa, a granularità di job. Un job non ancora partito non parte; una
//! trasformazione già in corso non viene interrotta (il backend worker termina
//! il processo figlio), ma il suo esito viene scartato.

use crate::backend::TransformBackend;
use crate::batch::{Batch, Task, TaskEvent};
use crate::config::EngineConfig;
use crate::converter::path_resolver::OutputPathResolver;
use crate::converter::task_converter::TaskConverter;
use crate::error::{ConvertError, TaskError};
use crate::preset::Preset;
use crate::stats::BatchSummary;
use crate::workspace::TempWorkspaceManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Caller's view of one running batch
#[derive(Debug)]
pub struct BatchHandle {
    id: Uuid,
    snapshots: watch::Receiver<Batch>,
    join: JoinHandle<Option<Batch>>,
}

impl BatchHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot stream of this batch; stops changing once it is superseded
    pub fn subscribe(&self) -> watch::Receiver<Batch> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> Batch {
        self.snapshots.borrow().clone()
    }

    /// Final batch, or `None` if it was superseded before finishing
    pub async fn wait(self) -> Option<Batch> {
        match self.join.await {
            Ok(batch) => batch,
            Err(e) => {
                error!("Coordinator for batch {} failed: {}", self.id, e);
                None
            }
        }
    }
}

/// Bookkeeping for the batch currently owned by the orchestrator
struct ActiveRun {
    batch_id: Uuid,
    token: CancellationToken,
    snapshots: watch::Receiver<Batch>,
    output_directory: Result<Option<PathBuf>, String>,
}

/// Starts, supersedes, restarts and dismisses batches
pub struct ConversionOrchestrator {
    backend: Arc<dyn TransformBackend>,
    config: EngineConfig,
    workspaces: TempWorkspaceManager,
    current: Arc<watch::Sender<Option<Batch>>>,
    active: Mutex<Option<ActiveRun>>,
}

impl ConversionOrchestrator {
    pub fn new(backend: Arc<dyn TransformBackend>, config: EngineConfig) -> Self {
        let workspaces = TempWorkspaceManager::new(config.temp_root());
        let (current, _) = watch::channel(None);
        Self {
            backend,
            config,
            workspaces,
            current: Arc::new(current),
            active: Mutex::new(None),
        }
    }

    /// Snapshots of whatever batch is current, `None` when idle
    pub fn subscribe(&self) -> watch::Receiver<Option<Batch>> {
        self.current.subscribe()
    }

    pub fn current_batch(&self) -> Option<Batch> {
        self.current.borrow().clone()
    }

    pub fn workspaces(&self) -> &TempWorkspaceManager {
        &self.workspaces
    }

    /// Start converting `files` with a snapshot of `preset`, superseding any
    /// batch still running
    pub async fn start_batch(&self, files: Vec<PathBuf>, preset: Preset) -> Result<BatchHandle, ConvertError> {
        if files.is_empty() {
            return Err(ConvertError::NoInput);
        }
        preset.check_bounds()?;
        if !self.backend.supports(preset.format) {
            return Err(ConvertError::UnsupportedFormat {
                format: preset.format,
                backend: self.backend.name(),
            });
        }

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.supersede(previous).await;
        }

        let mut batch = Batch::new(&files, &preset);
        let workspace = self.allocate_or_go_idle(batch.id).await?;

        let output_directory = OutputPathResolver::resolve(&preset, &files).map_err(|e| e.to_string());
        if let Err(ref reason) = output_directory {
            warn!("Batch {}: {}", batch.id, reason);
        }
        batch.output_directory = output_directory.clone().ok().flatten();
        batch.temp_directory = Some(workspace.clone());

        info!(
            "🚀 Starting batch {} ({} files, preset '{}', {})",
            batch.id,
            batch.tasks.len(),
            preset.nickname,
            preset.describe()
        );

        let (handle, run) = self.launch(batch, output_directory, workspace);
        *active = Some(run);
        Ok(handle)
    }

    /// Reset every task of the current batch to pending and run it again.
    ///
    /// The batch keeps its id, workspace and output directory.
    pub async fn restart(&self) -> Result<BatchHandle, ConvertError> {
        let mut active = self.active.lock().await;
        let previous = active.take().ok_or(ConvertError::NoActiveBatch)?;
        previous.token.cancel();

        let mut batch = previous.snapshots.borrow().clone();
        batch.tasks = batch.tasks.iter().map(Task::reset).collect();
        batch.end_time = None;

        let workspace = self.allocate_or_go_idle(batch.id).await?;
        batch.temp_directory = Some(workspace.clone());

        info!("🔁 Restarting batch {} ({} files)", batch.id, batch.tasks.len());
        let (handle, run) = self.launch(batch, previous.output_directory, workspace);
        *active = Some(run);
        Ok(handle)
    }

    /// Cancel the current batch, release its workspace and go idle
    pub async fn dismiss(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.supersede(previous).await;
        }
        self.current.send_replace(None);
    }

    /// The previous batch is already cancelled here, so on failure nothing is current
    async fn allocate_or_go_idle(&self, batch_id: Uuid) -> Result<PathBuf, ConvertError> {
        self.workspaces.allocate(batch_id).await.map_err(|e| {
            error!("Failed to allocate workspace for batch {}: {}", batch_id, e);
            self.current.send_replace(None);
            e
        })
    }

    async fn supersede(&self, previous: ActiveRun) {
        info!("⏹️  Cancelling batch {}", previous.batch_id);
        previous.token.cancel();
        self.workspaces.release(previous.batch_id).await;
    }

    fn concurrency_for(&self, task_count: usize) -> usize {
        self.config
            .max_concurrency
            .or_else(|| self.backend.concurrency_limit())
            .unwrap_or(task_count)
            .max(1)
    }

    fn launch(
        &self,
        mut batch: Batch,
        output_directory: Result<Option<PathBuf>, String>,
        workspace: PathBuf,
    ) -> (BatchHandle, ActiveRun) {
        batch.start_time = Some(SystemTime::now());
        let id = batch.id;
        let token = CancellationToken::new();

        let (snapshots, receiver) = watch::channel(batch.clone());
        // The previous token is already cancelled, so its coordinator can no
        // longer overwrite this
        self.current.send_replace(Some(batch.clone()));

        let converter = Arc::new(TaskConverter::new(
            self.backend.clone(),
            output_directory.clone(),
            workspace,
            self.config.task_timeout(),
        ));
        let limit = self.concurrency_for(batch.tasks.len());
        debug!("Batch {} runs with {} concurrent jobs on {}", id, limit, self.backend.name());

        let coordinator = Coordinator {
            batch,
            converter,
            token: token.clone(),
            limit,
            snapshots,
            current: self.current.clone(),
        };
        let join = tokio::spawn(coordinator.run());

        let handle = BatchHandle {
            id,
            snapshots: receiver.clone(),
            join,
        };
        let run = ActiveRun {
            batch_id: id,
            token,
            snapshots: receiver,
            output_directory,
        };
        (handle, run)
    }
}

/// Owns the batch while it runs; the only writer of its task list
struct Coordinator {
    batch: Batch,
    converter: Arc<TaskConverter>,
    token: CancellationToken,
    limit: usize,
    snapshots: watch::Sender<Batch>,
    current: Arc<watch::Sender<Option<Batch>>>,
}

impl Coordinator {
    async fn run(mut self) -> Option<Batch> {
        let (events, mut inbox) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(self.limit));

        for (index, task) in self.batch.tasks.iter().enumerate() {
            let job = Job {
                index,
                task: task.clone(),
                converter: self.converter.clone(),
                token: self.token.clone(),
                semaphore: semaphore.clone(),
                events: events.clone(),
            };
            tokio::spawn(job.run());
        }
        drop(events);

        loop {
            let event = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!("Batch {} superseded, coordinator stopping", self.batch.id);
                    return None;
                }
                event = inbox.recv() => event,
            };
            let Some(event) = event else {
                break;
            };
            if self.batch.apply(event) && !self.publish() {
                return None;
            }
        }

        self.batch.end_time = Some(SystemTime::now());
        if !self.publish() {
            return None;
        }

        let summary = BatchSummary::from_tasks(&self.batch.tasks);
        info!("✅ Batch {} finished: {}", self.batch.id, summary.format_summary());
        Some(self.batch)
    }

    /// Publish the current snapshot unless the batch was cancelled.
    ///
    /// The cancellation check runs under the channel lock, so nothing lands
    /// after a newer batch has been published.
    fn publish(&self) -> bool {
        let token = &self.token;
        let batch = &self.batch;

        let published = self.snapshots.send_if_modified(|snapshot| {
            if token.is_cancelled() {
                return false;
            }
            *snapshot = batch.clone();
            true
        });
        if !published {
            return false;
        }

        self.current.send_if_modified(|current| {
            if token.is_cancelled() {
                return false;
            }
            match current {
                Some(existing) if existing.id == batch.id => {
                    *existing = batch.clone();
                    true
                }
                _ => false,
            }
        });
        true
    }
}

/// One file's conversion, detached from the coordinator
struct Job {
    index: usize,
    task: Task,
    converter: Arc<TaskConverter>,
    token: CancellationToken,
    semaphore: Arc<Semaphore>,
    events: mpsc::UnboundedSender<TaskEvent>,
}

impl Job {
    async fn run(self) {
        let _permit = tokio::select! {
            _ = self.token.cancelled() => return,
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };
        if self.token.is_cancelled() {
            return;
        }

        let index = self.index;
        if self.events.send(TaskEvent::Started { index }).is_err() {
            return;
        }

        let outcome = match self.converter.convert(&self.task, &self.token).await {
            Ok(output) => Ok(output),
            Err(ConvertError::Cancelled) => {
                debug!("{}: dropped, batch was cancelled", self.task.source_path.display());
                return;
            }
            Err(e) => {
                warn!("❌ {}: {}", self.task.source_path.display(), e);
                Err(TaskError::from(e))
            }
        };

        if let Ok(ref output) = outcome {
            debug!(
                "{} -> {} ({} -> {} bytes)",
                self.task.source_path.display(),
                output.output_path.display(),
                output.input_size,
                output.output_size
            );
        }

        // The coordinator is gone once the batch is superseded
        let _ = self.events.send(TaskEvent::Finished { index, outcome });
    }
}
