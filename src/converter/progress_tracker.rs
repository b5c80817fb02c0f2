//! # Progress Tracking Module
//!
//! Osserva gli snapshot pubblicati dall'orchestratore e li traduce in
//! feedback per l'utente: progress bar tradizionale oppure eventi JSON.
//!
//! Non tiene contatori propri: ogni snapshot è completo, il tracker ricorda
//! solo quali task ha già riportato come terminati.

use crate::batch::{Batch, Task, TaskStatus};
use crate::json_output::JsonMessage;
use crate::preset::Preset;
use crate::progress::ProgressManager;
use crate::stats::BatchSummary;
use std::time::Instant;
use tokio::sync::watch;

pub struct ProgressTracker {
    json_output: bool,
    bar: ProgressManager,
    reported: Vec<bool>,
    started: Instant,
}

impl ProgressTracker {
    /// Announce the batch and prepare the progress bar
    pub fn new(batch: &Batch, preset: &Preset, json_output: bool) -> Self {
        let total = batch.tasks.len();
        let bar = if json_output {
            JsonMessage::start(batch, preset).emit();
            ProgressManager::hidden(total as u64)
        } else {
            let bar = ProgressManager::new(total as u64);
            bar.set_message(&format!("{} → {}", preset.nickname, preset.describe()));
            bar
        };

        Self {
            json_output,
            bar,
            reported: vec![false; total],
            started: Instant::now(),
        }
    }

    /// Report tasks that became terminal since the last snapshot.
    ///
    /// Returns how many were newly reported.
    pub fn observe(&mut self, batch: &Batch) -> usize {
        if self.reported.len() != batch.tasks.len() {
            self.reported = vec![false; batch.tasks.len()];
        }

        let mut newly_finished = 0;
        let mut last_message = None;
        for (index, task) in batch.tasks.iter().enumerate() {
            if !task.is_terminal() || self.reported[index] {
                continue;
            }
            self.reported[index] = true;
            newly_finished += 1;

            if self.json_output {
                JsonMessage::file_complete(index, task).emit();
            }
            last_message = Some(Self::file_message(task));
        }

        if newly_finished > 0 {
            let summary = BatchSummary::from_tasks(&batch.tasks);
            if self.json_output {
                JsonMessage::progress(&summary).emit();
            }
            if let Some(message) = last_message {
                self.bar.advance_to(summary.finished() as u64, &message);
            }
        }

        newly_finished
    }

    fn file_message(task: &Task) -> String {
        let name = task
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| task.source_path.display().to_string());

        match (task.status, &task.error) {
            (TaskStatus::Failed, Some(error)) => format!("❌ {}: {}", name, error),
            (TaskStatus::Failed, None) => format!("❌ {}", name),
            _ => format!("✅ {}: {:.1}% smaller", name, task.reduction_percentage()),
        }
    }

    /// Close the bar (or emit `complete`) and return the summary line
    pub fn finish(&self, batch: &Batch) -> String {
        let summary = BatchSummary::from_tasks(&batch.tasks).format_summary();
        if self.json_output {
            JsonMessage::complete(batch, self.started.elapsed().as_secs_f64()).emit();
        }
        self.bar.finish(&summary);
        summary
    }

    /// Follow a batch until it finishes or stops publishing.
    ///
    /// Returns the last snapshot seen.
    pub async fn follow(mut self, mut snapshots: watch::Receiver<Batch>) -> Batch {
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            self.observe(&snapshot);
            if snapshot.end_time.is_some() {
                self.finish(&snapshot);
                return snapshot;
            }

            if snapshots.changed().await.is_err() {
                let last = snapshots.borrow().clone();
                self.observe(&last);
                if last.end_time.is_some() {
                    self.finish(&last);
                } else {
                    self.bar.abandon("Batch cancelled");
                }
                return last;
            }
        }
    }
}
