//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore della conversione.
//!
//! ## Responsabilità:
//! - Definisce `ConvertError` per tutti i fallimenti del motore
//! - Classifica gli errori nelle quattro categorie task-local (`ErrorKind`)
//! - Fornisce `TaskError`, la forma clonabile e serializzabile salvata nel Task
//!
//! ## Categorie di errori:
//! - `Input`: sorgente mancante o illeggibile
//! - `Backend`: decode/resize/encode falliti (incluso exit code != 0 del worker)
//! - `Io`: copia/spostamento/creazione directory falliti
//! - `OutputPath`: destinazione non risolvibile o invalida
//!
//! Tutte e quattro restano confinate al singolo task: non interrompono mai
//! gli altri task dello stesso batch.
//!
//! ## Esempio:
//! ```rust,ignore
//! let err = ConvertError::Backend("unsupported format".to_string());
//! assert_eq!(err.kind(), Some(ErrorKind::Backend));
//! ```

use crate::preset::OutputFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Errors raised by the conversion engine
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("Source unreadable: {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backend failure: {0}")]
    Backend(String),

    #[error("Output path unresolvable: {0}")]
    OutputPathUnresolvable(String),

    #[error("Write failure: {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid preset: {0}")]
    InvalidPreset(String),

    #[error("No input files")]
    NoInput,

    #[error("No batch to restart")]
    NoActiveBatch,

    #[error("{format} output is not supported by the {backend} backend")]
    UnsupportedFormat {
        format: OutputFormat,
        backend: &'static str,
    },

    /// The batch was superseded while the task was running
    #[error("Cancelled")]
    Cancelled,
}

/// Task-local error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    Backend,
    Io,
    OutputPath,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Input => "input",
            ErrorKind::Backend => "backend",
            ErrorKind::Io => "io",
            ErrorKind::OutputPath => "output path",
        };
        f.write_str(name)
    }
}

impl ConvertError {
    /// Task-local category, `None` for batch-level precondition errors
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ConvertError::SourceUnreadable { .. } => Some(ErrorKind::Input),
            ConvertError::Backend(_) => Some(ErrorKind::Backend),
            ConvertError::OutputPathUnresolvable(_) => Some(ErrorKind::OutputPath),
            ConvertError::WriteFailure { .. } => Some(ErrorKind::Io),
            ConvertError::InvalidPreset(_)
            | ConvertError::NoInput
            | ConvertError::NoActiveBatch
            | ConvertError::UnsupportedFormat { .. }
            | ConvertError::Cancelled => None,
        }
    }

    pub(crate) fn source_unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SourceUnreadable { path: path.into(), source }
    }

    pub(crate) fn write_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailure { path: path.into(), source }
    }
}

/// Error captured on a failed task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl From<&ConvertError> for TaskError {
    fn from(err: &ConvertError) -> Self {
        // Batch-level errors never reach a task; if one does, treat it as bad input
        let kind = err.kind().unwrap_or(ErrorKind::Input);
        Self::new(kind, err.to_string())
    }
}

impl From<ConvertError> for TaskError {
    fn from(err: ConvertError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ConvertError::source_unreadable("/a.jpg", io).kind(), Some(ErrorKind::Input));
        assert_eq!(ConvertError::Backend("x".into()).kind(), Some(ErrorKind::Backend));
        assert_eq!(ConvertError::OutputPathUnresolvable("x".into()).kind(), Some(ErrorKind::OutputPath));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(ConvertError::write_failure("/out", io).kind(), Some(ErrorKind::Io));
        assert_eq!(ConvertError::NoInput.kind(), None);
    }

    #[test]
    fn test_task_error_from_convert_error() {
        let err = ConvertError::Backend("decoder exploded".to_string());
        let task_err = TaskError::from(&err);
        assert_eq!(task_err.kind, ErrorKind::Backend);
        assert!(task_err.message.contains("decoder exploded"));
        assert_eq!(task_err.to_string(), "backend error: Backend failure: decoder exploded");
    }
}
