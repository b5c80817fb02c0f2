//! # Batch Worker Protocol
//!
//! Tipi serde del protocollo con il worker esterno.
//!
//! ## Richiesta (`batch-config.json` nella directory del manifest):
//! ```json
//! { "tasks": [ { "inputPath": "/a.png", "outputPath": "/ws/a.webp",
//!                "options": { "maxWidth": 1920, "maxHeight": 1080,
//!                             "format": "webp", "quality": 85, "effort": 6 } } ] }
//! ```
//!
//! ## Risposta (`batch-results.json`, lista parallela):
//! ```json
//! [ { "success": true, "inputPath": "/a.png", "outputPath": "/ws/a.webp" } ]
//! ```
//!
//! Exit code 0: manifest processato (i singoli entry possono comunque fallire).
//! Exit code != 0: fallimento dell'intero manifest, diagnostica su stderr.

use super::TransformRequest;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const CONFIG_FILE: &str = "batch-config.json";
pub const RESULTS_FILE: &str = "batch-results.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub format: String,
    pub quality: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lossless: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chroma_subsampling: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub options: ManifestOptions,
}

impl From<&TransformRequest> for ManifestEntry {
    /// The target size is passed as the bounding box; the worker fits
    /// inside it without enlarging, which lands exactly on the target.
    fn from(request: &TransformRequest) -> Self {
        Self {
            input_path: request.source.clone(),
            output_path: request.destination.clone(),
            options: ManifestOptions {
                max_width: request.target.width,
                max_height: request.target.height,
                format: request.format.name().to_string(),
                quality: request.quality,
                effort: request.options.effort,
                lossless: request.options.lossless,
                chroma_subsampling: request.options.chroma_subsampling.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub tasks: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResult {
    pub success: bool,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::OutputFormat;
    use crate::resize::Dimensions;

    #[test]
    fn test_entry_wire_shape() {
        let request = TransformRequest {
            source: PathBuf::from("/in/photo.png"),
            destination: PathBuf::from("/ws/photo-1.avif"),
            target: Dimensions::new(1280, 720),
            format: OutputFormat::Avif,
            quality: 80,
            options: OutputFormat::Avif.encode_options(80),
        };
        let manifest = Manifest {
            tasks: vec![ManifestEntry::from(&request)],
        };

        let json = serde_json::to_value(&manifest).unwrap();
        let entry = &json["tasks"][0];
        assert_eq!(entry["inputPath"], "/in/photo.png");
        assert_eq!(entry["outputPath"], "/ws/photo-1.avif");
        assert_eq!(entry["options"]["maxWidth"], 1280);
        assert_eq!(entry["options"]["format"], "avif");
        assert_eq!(entry["options"]["quality"], 80);
        assert_eq!(entry["options"]["chromaSubsampling"], "4:4:4");
        assert!(entry["options"].get("lossless").is_none());
    }

    #[test]
    fn test_result_parsing() {
        let raw = r#"[
            {"success": true, "inputPath": "/a.png", "outputPath": "/ws/a.webp"},
            {"success": false, "error": "Input file is missing", "inputPath": "/b.png", "outputPath": "/ws/b.webp"}
        ]"#;
        let results: Vec<ManifestResult> = serde_json::from_str(raw).unwrap();
        assert!(results[0].success);
        assert_eq!(results[0].error, None);
        assert!(!results[1].success);
        assert_eq!(results[1].error.as_deref(), Some("Input file is missing"));
    }
}
