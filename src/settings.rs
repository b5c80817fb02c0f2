//! # Settings Module
//!
//! Persistenza delle impostazioni dell'applicazione tra un avvio e l'altro.
//!
//! ## Responsabilità:
//! - Lista dei preset (con quattro preset di default se vuota)
//! - Ultimo preset usato, directory di output di default, auto-chiusura
//! - Salvataggio in `~/.drag-convert/settings.json`
//!
//! ## Strategia di persistence:
//! - Caricamento tollerante: file mancante o corrotto → impostazioni di default
//! - Salvataggio best-effort: gli errori vengono loggati, mai propagati
//!
//! ## Esempio struttura settings file:
//! ```json
//! {
//!   "presets": [ { "id": "…", "nickname": "HD WebP", "maxWidth": 1920, … } ],
//!   "lastUsedPresetId": "…",
//!   "defaultOutputPath": null,
//!   "autoCloseAfterConversion": false,
//!   "autoCloseDelay": 5.0
//! }
//! ```

use crate::preset::{OutputFormat, Preset};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const SETTINGS_DIR: &str = ".drag-convert";
const SETTINGS_FILE: &str = "settings.json";

/// The four presets a fresh install starts with
pub fn default_presets() -> Vec<Preset> {
    vec![
        Preset::new("4K PNG", 3840, 2160, OutputFormat::Png, 90),
        Preset::new("HD WebP", 1920, 1080, OutputFormat::Webp, 85),
        Preset::new("Mobile JPEG", 1280, 720, OutputFormat::Jpeg, 80),
        Preset::new("Mobile AVIF", 1280, 720, OutputFormat::Avif, 80),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub presets: Vec<Preset>,
    pub last_used_preset_id: Option<Uuid>,
    pub default_output_path: Option<PathBuf>,
    pub auto_close_after_conversion: bool,
    /// Seconds
    pub auto_close_delay: f64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            presets: default_presets(),
            last_used_preset_id: None,
            default_output_path: None,
            auto_close_after_conversion: false,
            auto_close_delay: 5.0,
        }
    }
}

impl AppSettings {
    /// Seed the default presets if the list is empty
    pub fn ensure_presets(&mut self) {
        if self.presets.is_empty() {
            self.presets = default_presets();
        }
    }

    /// Last used preset, else the first one, else a default preset
    pub fn last_used_preset(&self) -> Preset {
        self.last_used_preset_id
            .and_then(|id| self.presets.iter().find(|p| p.id == id))
            .or_else(|| self.presets.first())
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_last_used(&mut self, id: Uuid) {
        self.last_used_preset_id = Some(id);
    }

    /// Look a preset up by id or by nickname (case-insensitive)
    pub fn find_preset(&self, query: &str) -> Option<&Preset> {
        if let Ok(id) = Uuid::parse_str(query) {
            if let Some(preset) = self.presets.iter().find(|p| p.id == id) {
                return Some(preset);
            }
        }
        self.presets
            .iter()
            .find(|p| p.nickname.eq_ignore_ascii_case(query.trim()))
    }

    pub fn add_preset(&mut self, preset: Preset) {
        self.presets.push(preset);
    }

    /// Replace the preset with the same id; `false` if there is none
    pub fn update_preset(&mut self, preset: Preset) -> bool {
        match self.presets.iter_mut().find(|p| p.id == preset.id) {
            Some(existing) => {
                *existing = preset;
                true
            }
            None => false,
        }
    }

    pub fn delete_preset(&mut self, id: Uuid) -> bool {
        let before = self.presets.len();
        self.presets.retain(|p| p.id != id);
        if self.last_used_preset_id == Some(id) {
            self.last_used_preset_id = None;
        }
        self.presets.len() != before
    }

    /// Move the preset at `from` so it ends up at index `to`
    pub fn move_preset(&mut self, from: usize, to: usize) -> bool {
        if from >= self.presets.len() || to >= self.presets.len() {
            return false;
        }
        let preset = self.presets.remove(from);
        self.presets.insert(to, preset);
        true
    }
}

/// Reads and writes `AppSettings` as JSON
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.drag-convert/settings.json`
    pub fn default_location() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
            .join(SETTINGS_DIR);
        Ok(Self::new(dir.join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: unreadable or invalid settings fall back to defaults
    pub async fn load(&self) -> AppSettings {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", self.path.display());
                return AppSettings::default();
            }
            Err(e) => {
                warn!("Failed to read settings {}: {}", self.path.display(), e);
                return AppSettings::default();
            }
        };

        match serde_json::from_str::<AppSettings>(&content) {
            Ok(mut settings) => {
                settings.ensure_presets();
                settings
            }
            Err(e) => {
                warn!("Invalid settings file {}: {}", self.path.display(), e);
                AppSettings::default()
            }
        }
    }

    /// Best-effort; failures are logged
    pub async fn save(&self, settings: &AppSettings) {
        if let Err(e) = self.try_save(settings).await {
            warn!("Failed to save settings {}: {}", self.path.display(), e);
        }
    }

    async fn try_save(&self, settings: &AppSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, content).await?;
        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}
