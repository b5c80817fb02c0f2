//! # Drag Convert Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare del motore di conversione batch
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione del motore e validazione parametri
//! - `error`: Errori del motore e categorie di errore per task
//! - `preset`: Preset, formati di output e politiche di output
//! - `batch`: Task, Batch e macchina a stati dei task
//! - `stats`: Proprietà derivate del batch (stato, progresso, riduzione)
//! - `resize`: Calcolo delle dimensioni di destinazione
//! - `workspace`: Directory temporanee per batch
//! - `backend`: Interfaccia di trasformazione e implementazioni native/worker
//! - `converter`: Orchestratore, conversione per file, path e progress
//! - `settings`: Impostazioni persistite e preset salvati
//! - `file_manager`: Operazioni sui file e validazione del drop
//! - `progress` / `json_output`: Feedback per l'utente
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use drag_convert::{backend, ConversionOrchestrator, EngineConfig, Preset};
//!
//! let config = EngineConfig::default();
//! let orchestrator = ConversionOrchestrator::new(backend::from_config(&config), config);
//! let handle = orchestrator.start_batch(files, Preset::default()).await?;
//! let batch = handle.wait().await;
//! ```

pub mod backend;
pub mod batch;
pub mod config;
pub mod converter;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod preset;
pub mod progress;
pub mod resize;
pub mod settings;
pub mod stats;
pub mod workspace;

pub use backend::{TransformBackend, TransformOutput, TransformRequest};
pub use batch::{Batch, Task, TaskStatus};
pub use config::{BackendKind, EngineConfig};
pub use converter::{BatchHandle, ConversionOrchestrator};
pub use error::{ConvertError, ErrorKind, TaskError};
pub use preset::{OutputFormat, OutputLocation, Preset};
pub use settings::{AppSettings, SettingsStore};
pub use stats::BatchSummary;
