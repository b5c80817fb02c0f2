//! # JSON Output Module
//!
//! Output strutturato in JSON per chi pilota il convertitore da un altro processo.
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout
//! - Costruisce i messaggi a partire da `Batch`, `Task` e `BatchSummary`
//!
//! ## Tipi di messaggi:
//! - `start`: batch avviato (preset, numero di file, directory)
//! - `file_complete`: un task ha raggiunto uno stato terminale
//! - `progress`: avanzamento del batch dopo ogni file terminato
//! - `complete`: fine del batch con statistiche finali
//! - `error`: errore che impedisce di avviare o completare il batch

use crate::batch::{Batch, Task, TaskStatus};
use crate::preset::Preset;
use crate::stats::BatchSummary;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Tipo di messaggio JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        batch_id: Uuid,
        preset: String,
        description: String,
        total_files: usize,
        output_dir: Option<PathBuf>,
        temp_dir: Option<PathBuf>,
    },

    #[serde(rename = "file_complete")]
    FileComplete {
        index: usize,
        path: PathBuf,
        status: TaskStatus,
        output_path: Option<PathBuf>,
        input_size: u64,
        output_size: u64,
        reduction_percent: f64,
        error: Option<String>,
    },

    #[serde(rename = "progress")]
    Progress {
        current: usize,
        total: usize,
        percentage: f64,
        completed: usize,
        failed: usize,
    },

    #[serde(rename = "complete")]
    Complete {
        batch_id: Uuid,
        status: TaskStatus,
        completed: usize,
        failed: usize,
        total_input_size: u64,
        total_output_size: u64,
        reduction_percent: f64,
        duration_seconds: f64,
    },

    /// Errore generale
    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(batch: &Batch, preset: &Preset) -> Self {
        Self::Start {
            batch_id: batch.id,
            preset: preset.nickname.clone(),
            description: preset.describe(),
            total_files: batch.tasks.len(),
            output_dir: batch.output_directory.clone(),
            temp_dir: batch.temp_directory.clone(),
        }
    }

    pub fn file_complete(index: usize, task: &Task) -> Self {
        Self::FileComplete {
            index,
            path: task.source_path.clone(),
            status: task.status,
            output_path: task.output_path.clone(),
            input_size: task.input_size,
            output_size: task.output_size,
            reduction_percent: task.reduction_percentage(),
            error: task.error.as_ref().map(|e| e.to_string()),
        }
    }

    pub fn progress(summary: &BatchSummary) -> Self {
        let current = summary.finished();
        let percentage = if summary.total > 0 {
            (current as f64 / summary.total as f64) * 100.0
        } else {
            0.0
        };

        Self::Progress {
            current,
            total: summary.total,
            percentage,
            completed: summary.completed,
            failed: summary.failed,
        }
    }

    pub fn complete(batch: &Batch, duration_seconds: f64) -> Self {
        let summary = BatchSummary::from_tasks(&batch.tasks);
        Self::Complete {
            batch_id: batch.id,
            status: batch.status(),
            completed: summary.completed,
            failed: summary.failed,
            total_input_size: summary.total_input_size,
            total_output_size: summary.total_output_size,
            reduction_percent: summary.reduction_percent,
            duration_seconds,
        }
    }

    /// Crea un messaggio di errore
    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{TaskEvent, TaskOutput};

    #[test]
    fn test_message_tags() {
        let preset = Preset::default();
        let mut batch = Batch::new(&[PathBuf::from("/p/a.png")], &preset);

        let start = serde_json::to_value(JsonMessage::start(&batch, &preset)).unwrap();
        assert_eq!(start["type"], "start");
        assert_eq!(start["total_files"], 1);

        batch.apply(TaskEvent::Started { index: 0 });
        batch.apply(TaskEvent::Finished {
            index: 0,
            outcome: Ok(TaskOutput {
                output_path: PathBuf::from("/p/a.jpeg"),
                input_size: 200,
                output_size: 50,
            }),
        });

        let file = serde_json::to_value(JsonMessage::file_complete(0, &batch.tasks[0])).unwrap();
        assert_eq!(file["type"], "file_complete");
        assert_eq!(file["status"], "completed");
        assert_eq!(file["reduction_percent"], 75.0);
        assert!(file["error"].is_null());

        let done = serde_json::to_value(JsonMessage::complete(&batch, 1.5)).unwrap();
        assert_eq!(done["type"], "complete");
        assert_eq!(done["completed"], 1);
        assert_eq!(done["status"], "completed");
    }

    #[test]
    fn test_progress_percentage() {
        let summary = BatchSummary {
            total: 4,
            completed: 1,
            failed: 1,
            ..Default::default()
        };
        match JsonMessage::progress(&summary) {
            JsonMessage::Progress { current, percentage, .. } => {
                assert_eq!(current, 2);
                assert_eq!(percentage, 50.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
