//! # Converter Module
//!
//! Motore di conversione, separato in sottomoduli:
//! - `orchestrator`: ciclo di vita dei batch e loop di coordinamento
//! - `task_converter`: pipeline per singolo file
//! - `progress_tracker`: feedback da snapshot (progress bar o JSON)
//! - `path_resolver`: logica di calcolo path centralizzata

pub mod orchestrator;
pub mod path_resolver;
pub mod progress_tracker;
pub mod task_converter;

pub use orchestrator::{BatchHandle, ConversionOrchestrator};
pub use path_resolver::OutputPathResolver;
pub use progress_tracker::ProgressTracker;
pub use task_converter::TaskConverter;
