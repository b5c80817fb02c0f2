//! # Task & Batch Data Model
//!
//! Questo modulo definisce lo stato di ogni file (Task) e del gruppo (Batch).
//!
//! ## Strutture dati:
//! - `Task`: unità di lavoro per singolo file, con macchina a stati
//!   `pending → converting → {completed, failed}` (nessun ritorno indietro)
//! - `Batch`: lista ordinata di Task di un singolo drop + directory risolte
//! - `TaskEvent`: messaggio inviato dai worker al punto di merge unico
//!
//! ## Regole:
//! - Il progresso è monotono non decrescente fino allo stato terminale
//! - Allo stato terminale il progresso vale 1.0, sia successo che errore
//! - `output_path` solo su completed, `error` solo su failed
//! - Le proprietà derivate (stato, progresso, totali) sono calcolate da `stats`
//!
//! Solo il loop di coordinamento dell'orchestratore chiama `Batch::apply`.

use crate::error::TaskError;
use crate::preset::Preset;
use crate::stats;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::debug;
use uuid::Uuid;

/// Per-task (and derived per-batch) status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Converting,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Converting => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }
}

/// Result of a successful conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub output_path: PathBuf,
    pub input_size: u64,
    pub output_size: u64,
}

/// One source file and its conversion state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub source_path: PathBuf,
    /// Snapshot taken when the batch started
    pub preset: Preset,
    pub status: TaskStatus,
    pub progress: f64,
    pub output_path: Option<PathBuf>,
    pub error: Option<TaskError>,
    pub input_size: u64,
    pub output_size: u64,
}

impl Task {
    pub fn new(source_path: PathBuf, preset: Preset) -> Self {
        Self::with_id(Uuid::new_v4(), source_path, preset)
    }

    pub fn with_id(id: Uuid, source_path: PathBuf, preset: Preset) -> Self {
        Self {
            id,
            source_path,
            preset,
            status: TaskStatus::Pending,
            progress: 0.0,
            output_path: None,
            error: None,
            input_size: 0,
            output_size: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn reduction_percentage(&self) -> f64 {
        stats::reduction_percentage(self.input_size, self.output_size)
    }

    /// Forward-only transition check
    fn can_move_to(&self, next: TaskStatus) -> bool {
        next.rank() > self.status.rank()
    }

    /// New value in `converting`, or `None` if the transition is not allowed
    pub fn converting(&self) -> Option<Task> {
        if !self.can_move_to(TaskStatus::Converting) {
            return None;
        }
        let mut next = self.clone();
        next.status = TaskStatus::Converting;
        Some(next)
    }

    pub fn completed(&self, output: TaskOutput) -> Option<Task> {
        if !self.can_move_to(TaskStatus::Completed) {
            return None;
        }
        let mut next = self.clone();
        next.status = TaskStatus::Completed;
        next.progress = 1.0;
        next.output_path = Some(output.output_path);
        next.input_size = output.input_size;
        next.output_size = output.output_size;
        next.error = None;
        Some(next)
    }

    pub fn failed(&self, error: TaskError) -> Option<Task> {
        if !self.can_move_to(TaskStatus::Failed) {
            return None;
        }
        let mut next = self.clone();
        next.status = TaskStatus::Failed;
        next.progress = 1.0;
        next.output_path = None;
        next.error = Some(error);
        Some(next)
    }

    /// Fresh pending copy keeping the id, used by a batch restart
    pub fn reset(&self) -> Task {
        Task::with_id(self.id, self.source_path.clone(), self.preset.clone())
    }
}

/// Message from a conversion job to the coordinating loop
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Started { index: usize },
    Finished { index: usize, outcome: Result<TaskOutput, TaskError> },
}

impl TaskEvent {
    pub fn index(&self) -> usize {
        match self {
            TaskEvent::Started { index } | TaskEvent::Finished { index, .. } => *index,
        }
    }
}

/// One drop event's files processed under one preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub tasks: Vec<Task>,
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
    pub output_directory: Option<PathBuf>,
    pub temp_directory: Option<PathBuf>,
}

impl Batch {
    pub fn new(files: &[PathBuf], preset: &Preset) -> Self {
        Self {
            id: Uuid::new_v4(),
            tasks: files.iter().map(|f| Task::new(f.clone(), preset.clone())).collect(),
            start_time: None,
            end_time: None,
            output_directory: None,
            temp_directory: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        stats::batch_status(&self.tasks)
    }

    pub fn progress(&self) -> f64 {
        stats::mean_progress(&self.tasks)
    }

    pub fn total_input_size(&self) -> u64 {
        stats::total_input_size(&self.tasks)
    }

    pub fn total_output_size(&self) -> u64 {
        stats::total_output_size(&self.tasks)
    }

    pub fn total_reduction_percentage(&self) -> f64 {
        stats::reduction_percentage(self.total_input_size(), self.total_output_size())
    }

    pub fn has_completed_tasks(&self) -> bool {
        self.tasks.iter().any(|t| t.status == TaskStatus::Completed)
    }

    /// Every task reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(Task::is_terminal)
    }

    /// Apply one worker event, replacing the task entry in place.
    ///
    /// Returns `false` when the event is ignored (unknown index or a
    /// transition the state machine forbids).
    pub fn apply(&mut self, event: TaskEvent) -> bool {
        let index = event.index();
        let Some(current) = self.tasks.get(index) else {
            debug!("Ignoring event for unknown task index {}", index);
            return false;
        };

        let next = match event {
            TaskEvent::Started { .. } => current.converting(),
            TaskEvent::Finished { outcome: Ok(output), .. } => current.completed(output),
            TaskEvent::Finished { outcome: Err(error), .. } => current.failed(error),
        };

        match next {
            Some(task) => {
                self.tasks[index] = task;
                true
            }
            None => {
                debug!("Ignoring backward transition for task {} ({:?})", index, current.status);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn batch_of(n: usize) -> Batch {
        let files: Vec<PathBuf> = (0..n).map(|i| PathBuf::from(format!("/src/img{}.png", i))).collect();
        Batch::new(&files, &Preset::default())
    }

    fn output(size: u64) -> TaskOutput {
        TaskOutput {
            output_path: PathBuf::from("/out/img.jpeg"),
            input_size: 1000,
            output_size: size,
        }
    }

    #[test]
    fn test_new_batch_snapshots_preset() {
        let mut preset = Preset::default();
        let batch = Batch::new(&[PathBuf::from("/a.png")], &preset);
        preset.max_width = 10;
        assert_eq!(batch.tasks[0].preset.max_width, 1920);
        assert_eq!(batch.status(), TaskStatus::Pending);
        assert_eq!(batch.progress(), 0.0);
    }

    #[test]
    fn test_forward_only_state_machine() {
        let mut batch = batch_of(1);
        assert!(batch.apply(TaskEvent::Started { index: 0 }));
        assert_eq!(batch.tasks[0].status, TaskStatus::Converting);

        assert!(batch.apply(TaskEvent::Finished { index: 0, outcome: Ok(output(400)) }));
        let task = &batch.tasks[0];
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 1.0);
        assert_eq!(task.output_path.as_deref(), Some(std::path::Path::new("/out/img.jpeg")));
        assert_eq!(task.reduction_percentage(), 60.0);

        // No way back from a terminal state
        assert!(!batch.apply(TaskEvent::Started { index: 0 }));
        let err = TaskError::new(ErrorKind::Backend, "late");
        assert!(!batch.apply(TaskEvent::Finished { index: 0, outcome: Err(err) }));
        assert_eq!(batch.tasks[0].status, TaskStatus::Completed);
    }

    #[test]
    fn test_failure_sets_error_and_full_progress() {
        let mut batch = batch_of(2);
        batch.apply(TaskEvent::Started { index: 1 });
        let err = TaskError::new(ErrorKind::Input, "missing");
        batch.apply(TaskEvent::Finished { index: 1, outcome: Err(err.clone()) });

        assert_eq!(batch.tasks[1].status, TaskStatus::Failed);
        assert_eq!(batch.tasks[1].error, Some(err));
        assert_eq!(batch.tasks[1].progress, 1.0);
        assert!(batch.tasks[1].output_path.is_none());
        assert_eq!(batch.progress(), 0.5);
        assert_eq!(batch.status(), TaskStatus::Failed);
        assert!(!batch.is_finished());
        assert!(!batch.has_completed_tasks());

        batch.apply(TaskEvent::Started { index: 0 });
        batch.apply(TaskEvent::Finished { index: 0, outcome: Ok(output(10)) });
        assert!(batch.has_completed_tasks());
        assert!(batch.is_finished());
    }

    #[test]
    fn test_unknown_index_is_ignored() {
        let mut batch = batch_of(1);
        assert!(!batch.apply(TaskEvent::Started { index: 7 }));
    }

    #[test]
    fn test_reset_keeps_identity() {
        let mut batch = batch_of(1);
        batch.apply(TaskEvent::Started { index: 0 });
        batch.apply(TaskEvent::Finished { index: 0, outcome: Ok(output(10)) });
        let reset = batch.tasks[0].reset();
        assert_eq!(reset.id, batch.tasks[0].id);
        assert_eq!(reset.status, TaskStatus::Pending);
        assert_eq!(reset.output_size, 0);
    }
}
