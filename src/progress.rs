//! # Progress Bar Module
//!
//! Feedback visivo per il batch corrente con `indicatif`.
//!
//! ## Responsabilità:
//! - Barra con file terminati / totale, tempo trascorso e ETA
//! - Messaggio per ogni file terminato (riduzione o errore)
//! - Messaggio finale con il riepilogo di `BatchSummary`
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:04] [=========>------------------------------] 3/12 (25%) ✅ photo.jpg: 72.4% smaller
//! ```
//!
//! La posizione viene impostata (non incrementata) perché arriva da uno
//! snapshot del batch, non da un evento singolo.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar for one batch
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Hidden bar, for JSON mode and tests
    pub fn hidden(total_files: u64) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total_files);
        Self { bar }
    }

    /// Move to `finished` files done and show `message`
    pub fn advance_to(&self, finished: u64, message: &str) {
        self.bar.set_position(finished);
        self.bar.set_message(message.to_string());
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Stop without marking the batch done
    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}
