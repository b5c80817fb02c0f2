//! # Preset Module
//!
//! Configurazione di conversione immutabile, referenziata per valore in ogni Task.
//!
//! ## Responsabilità:
//! - Definisce `Preset` (dimensioni massime, formato, qualità, politica di output)
//! - Definisce `OutputFormat` come insieme chiuso di varianti
//! - Tabella formato → (estensione, lossy, builder delle opzioni di encode)
//! - Validazione dei parametri
//!
//! ## Tabella formati:
//! | Formato | Estensione | Qualità | Opzioni extra |
//! |---------|------------|---------|---------------|
//! | jpeg    | jpeg       | ✅      | -             |
//! | png     | png        | ❌      | -             |
//! | webp    | webp       | ✅      | effort 6, lossless false |
//! | avif    | avif       | ✅      | effort 6, chroma 4:4:4 |
//! | tiff    | tiff       | ❌      | -             |
//! | heif    | heic       | ✅      | -             |
//!
//! Aggiungere un formato significa aggiungere una riga a `FORMAT_TABLE`.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Output image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    Tiff,
    Heif,
}

/// Per-format encoder options handed to the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lossless: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chroma_subsampling: Option<String>,
}

/// One row of the format table
pub struct FormatSpec {
    pub format: OutputFormat,
    pub name: &'static str,
    pub extension: &'static str,
    pub lossy: bool,
    build_options: fn(u8) -> EncodeOptions,
}

fn lossy_options(quality: u8) -> EncodeOptions {
    EncodeOptions {
        quality: Some(quality),
        ..Default::default()
    }
}

fn lossless_options(_quality: u8) -> EncodeOptions {
    EncodeOptions::default()
}

fn webp_options(quality: u8) -> EncodeOptions {
    EncodeOptions {
        quality: Some(quality),
        effort: Some(6),
        lossless: Some(false),
        ..Default::default()
    }
}

fn avif_options(quality: u8) -> EncodeOptions {
    EncodeOptions {
        quality: Some(quality),
        effort: Some(6),
        chroma_subsampling: Some("4:4:4".to_string()),
        ..Default::default()
    }
}

pub static FORMAT_TABLE: &[FormatSpec] = &[
    FormatSpec { format: OutputFormat::Jpeg, name: "jpeg", extension: "jpeg", lossy: true, build_options: lossy_options },
    FormatSpec { format: OutputFormat::Png, name: "png", extension: "png", lossy: false, build_options: lossless_options },
    FormatSpec { format: OutputFormat::Webp, name: "webp", extension: "webp", lossy: true, build_options: webp_options },
    FormatSpec { format: OutputFormat::Avif, name: "avif", extension: "avif", lossy: true, build_options: avif_options },
    FormatSpec { format: OutputFormat::Tiff, name: "tiff", extension: "tiff", lossy: false, build_options: lossless_options },
    FormatSpec { format: OutputFormat::Heif, name: "heif", extension: "heic", lossy: true, build_options: lossy_options },
];

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::Webp,
        OutputFormat::Avif,
        OutputFormat::Tiff,
        OutputFormat::Heif,
    ];

    /// Row of the format table for this variant
    pub fn spec(&self) -> &'static FormatSpec {
        // Every variant has a row; the tests below keep it that way
        FORMAT_TABLE
            .iter()
            .find(|spec| spec.format == *self)
            .unwrap_or(&FORMAT_TABLE[0])
    }

    pub fn extension(&self) -> &'static str {
        self.spec().extension
    }

    /// Name understood by the batch worker (`sharp().toFormat(name)`)
    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    /// Whether the quality parameter applies
    pub fn supports_quality(&self) -> bool {
        self.spec().lossy
    }

    pub fn encode_options(&self, quality: u8) -> EncodeOptions {
        (self.spec().build_options)(quality)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "jpg" => return Ok(OutputFormat::Jpeg),
            "tif" => return Ok(OutputFormat::Tiff),
            "heic" => return Ok(OutputFormat::Heif),
            _ => {}
        }
        FORMAT_TABLE
            .iter()
            .find(|spec| spec.name == lower)
            .map(|spec| spec.format)
            .ok_or_else(|| ConvertError::InvalidPreset(format!("Unknown output format: {}", s)))
    }
}

/// Where converted files are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputLocation {
    /// Results live only in the batch workspace
    Temporary,
    /// Directory of the first dropped file
    SourceDirectory,
    /// `Preset::custom_output_path`
    Custom,
}

impl OutputLocation {
    pub fn label(&self) -> &'static str {
        match self {
            OutputLocation::Temporary => "Temporary Only",
            OutputLocation::SourceDirectory => "Same as Source",
            OutputLocation::Custom => "Custom Location",
        }
    }
}

/// Named, reusable conversion configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: Uuid,
    pub nickname: String,
    pub max_width: u32,
    pub max_height: u32,
    pub format: OutputFormat,
    /// 1-100, ignored for lossless formats
    pub quality: u8,
    pub output_location: OutputLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_output_path: Option<PathBuf>,
    pub delete_original: bool,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            nickname: "New Preset".to_string(),
            max_width: 1920,
            max_height: 1080,
            format: OutputFormat::Jpeg,
            quality: 85,
            output_location: OutputLocation::SourceDirectory,
            custom_output_path: None,
            delete_original: false,
        }
    }
}

impl Preset {
    pub fn new(nickname: &str, max_width: u32, max_height: u32, format: OutputFormat, quality: u8) -> Self {
        Self {
            nickname: nickname.to_string(),
            max_width,
            max_height,
            format,
            quality,
            ..Default::default()
        }
    }

    /// Bounding box and quality checks, enough to run a batch
    pub fn check_bounds(&self) -> Result<(), ConvertError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(ConvertError::InvalidPreset(format!(
                "Preset '{}' must have positive max dimensions, got {}x{}",
                self.nickname, self.max_width, self.max_height
            )));
        }
        if self.quality == 0 || self.quality > 100 {
            return Err(ConvertError::InvalidPreset(format!(
                "Preset '{}' quality must be between 1 and 100, got {}",
                self.nickname, self.quality
            )));
        }
        Ok(())
    }

    /// Full validation as the preset editor would apply it
    pub fn validate(&self) -> Result<(), ConvertError> {
        self.check_bounds()?;
        match (self.output_location, &self.custom_output_path) {
            (OutputLocation::Custom, None) => Err(ConvertError::InvalidPreset(format!(
                "Preset '{}' uses a custom location but has no path",
                self.nickname
            ))),
            (OutputLocation::Custom, Some(_)) => Ok(()),
            (_, Some(_)) => Err(ConvertError::InvalidPreset(format!(
                "Preset '{}' has a custom path but location is '{}'",
                self.nickname,
                self.output_location.label()
            ))),
            (_, None) => Ok(()),
        }
    }

    /// Encoder options for this preset's format and quality
    pub fn encode_options(&self) -> EncodeOptions {
        self.format.encode_options(self.quality)
    }

    pub fn describe(&self) -> String {
        format!(
            "{} ({}, {}x{}, quality: {})",
            self.nickname, self.format, self.max_width, self.max_height, self.quality
        )
    }
}
