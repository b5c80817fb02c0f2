//! # Path Resolution Module
//!
//! Centralizza tutta la logica di calcolo dei path di output.
//!
//! ## Politiche:
//! - `temporary`: nessuna directory, i risultati restano nel workspace
//! - `sourceDirectory`: directory del *primo* file droppato, per tutto il batch
//! - `custom`: `customOutputPath` così com'è, creata prima della prima scrittura
//!
//! ## Nomi dei file:
//! - finale: `<stem>.<estensione formato>`, sovrascritto se esiste già
//! - staging: `<stem>-<task id>.<estensione>` nel workspace, univoco per worker

use crate::error::ConvertError;
use crate::preset::{OutputFormat, OutputLocation, Preset};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Decides where a batch's results are written
pub struct OutputPathResolver;

impl OutputPathResolver {
    /// Output directory for a batch, `None` for temp-only results
    pub fn resolve(preset: &Preset, dropped: &[PathBuf]) -> Result<Option<PathBuf>, ConvertError> {
        let resolved = match preset.output_location {
            OutputLocation::Temporary => None,
            OutputLocation::SourceDirectory => {
                let first = dropped
                    .first()
                    .ok_or_else(|| ConvertError::OutputPathUnresolvable("No dropped files".to_string()))?;
                let parent = first
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .ok_or_else(|| {
                        ConvertError::OutputPathUnresolvable(format!("No parent directory for {}", first.display()))
                    })?;
                Some(parent.to_path_buf())
            }
            OutputLocation::Custom => {
                let custom = preset.custom_output_path.as_ref().ok_or_else(|| {
                    ConvertError::OutputPathUnresolvable(format!(
                        "Preset '{}' has no custom output path",
                        preset.nickname
                    ))
                })?;
                if custom.as_os_str().is_empty() {
                    return Err(ConvertError::OutputPathUnresolvable(format!(
                        "Preset '{}' has an empty custom output path",
                        preset.nickname
                    )));
                }
                Some(custom.clone())
            }
        };

        debug!("Resolved output directory for {:?}: {:?}", preset.output_location, resolved);
        Ok(resolved)
    }

    fn file_stem(source: &Path) -> Result<String, ConvertError> {
        source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConvertError::OutputPathUnresolvable(format!("Invalid file name: {}", source.display())))
    }

    /// `<stem>.<format extension>`
    pub fn output_file_name(source: &Path, format: OutputFormat) -> Result<String, ConvertError> {
        Ok(format!("{}.{}", Self::file_stem(source)?, format.extension()))
    }

    /// Scratch file inside the workspace, unique per task and per run.
    ///
    /// A restarted batch keeps its task ids and workspace, so `run_id` keeps
    /// a late job of the previous run off the new run's staging file.
    pub fn staging_path(
        workspace: &Path,
        source: &Path,
        task_id: Uuid,
        run_id: Uuid,
        format: OutputFormat,
    ) -> Result<PathBuf, ConvertError> {
        let name = format!(
            "{}-{}-{}.{}",
            Self::file_stem(source)?,
            task_id.simple(),
            run_id.simple(),
            format.extension()
        );
        Ok(workspace.join(name))
    }

    /// Final location: the output directory, or the workspace for temp-only results
    pub fn final_path(
        output_directory: Option<&Path>,
        workspace: &Path,
        source: &Path,
        format: OutputFormat,
    ) -> Result<PathBuf, ConvertError> {
        let dir = output_directory.unwrap_or(workspace);
        Ok(dir.join(Self::output_file_name(source, format)?))
    }

    /// Create the directory and its parents if missing
    pub async fn ensure_dir(dir: &Path) -> Result<(), ConvertError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ConvertError::write_failure(dir, e))
    }
}
