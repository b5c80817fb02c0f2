//! # Statistics Module
//!
//! Funzioni pure sulle liste di Task: stato del batch, progresso medio,
//! totali delle dimensioni e percentuale di riduzione.
//!
//! Nessuno stato nascosto: ogni valore è ricalcolato dallo snapshot passato,
//! quindi le funzioni sono sicure da qualunque thread o consumer.

use crate::batch::{Task, TaskStatus};
use crate::file_manager::FileManager;
use serde::{Deserialize, Serialize};

/// Derived batch status.
///
/// `Completed` iff every task is completed; otherwise `Failed` if any task
/// failed; otherwise `Converting` if any task is converting; otherwise
/// `Pending`. An empty list is `Pending`.
pub fn batch_status(tasks: &[Task]) -> TaskStatus {
    if tasks.is_empty() {
        return TaskStatus::Pending;
    }
    if tasks.iter().all(|t| t.status == TaskStatus::Completed) {
        TaskStatus::Completed
    } else if tasks.iter().any(|t| t.status == TaskStatus::Failed) {
        TaskStatus::Failed
    } else if tasks.iter().any(|t| t.status == TaskStatus::Converting) {
        TaskStatus::Converting
    } else {
        TaskStatus::Pending
    }
}

/// Arithmetic mean of task progress, 0 for no tasks
pub fn mean_progress(tasks: &[Task]) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }
    tasks.iter().map(|t| t.progress).sum::<f64>() / tasks.len() as f64
}

pub fn total_input_size(tasks: &[Task]) -> u64 {
    tasks.iter().map(|t| t.input_size).sum()
}

pub fn total_output_size(tasks: &[Task]) -> u64 {
    tasks.iter().map(|t| t.output_size).sum()
}

/// `(1 - output/input) * 100`, 0 when `input` is 0
pub fn reduction_percentage(input_size: u64, output_size: u64) -> f64 {
    if input_size == 0 {
        return 0.0;
    }
    (1.0 - output_size as f64 / input_size as f64) * 100.0
}

/// Counts and totals for the final report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub pending: usize,
    pub converting: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_input_size: u64,
    pub total_output_size: u64,
    pub reduction_percent: f64,
}

impl BatchSummary {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        let total_input_size = total_input_size(tasks);
        let total_output_size = total_output_size(tasks);

        Self {
            total: tasks.len(),
            pending: count(TaskStatus::Pending),
            converting: count(TaskStatus::Converting),
            completed: count(TaskStatus::Completed),
            failed: count(TaskStatus::Failed),
            total_input_size,
            total_output_size,
            reduction_percent: reduction_percentage(total_input_size, total_output_size),
        }
    }

    /// Tasks in a terminal state
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Converted: {}/{} | Failed: {} | {} -> {} ({:.1}% smaller)",
            self.completed,
            self.total,
            self.failed,
            FileManager::format_size(self.total_input_size),
            FileManager::format_size(self.total_output_size),
            self.reduction_percent
        )
    }
}
