//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file usate dal motore e dalla CLI.
//!
//! ## Responsabilità:
//! - Validazione dei file droppati per estensione (il motore non ri-valida il contenuto)
//! - Espansione ricorsiva delle directory droppate
//! - Lettura dimensione file
//! - Spostamento con sovrascrittura (rename, fallback copy+remove tra filesystem)
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati accettati in input:
//! JPG, JPEG, PNG, AVIF, WebP, TIFF/TIF, HEIC/HEIF

use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "avif", "webp", "tiff", "tif", "heic", "heif"];

/// Manages file operations and drop validation
pub struct FileManager;

impl FileManager {
    /// Check if a file is an accepted image by extension
    pub fn is_supported_image(path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext_lower.as_str())
        } else {
            false
        }
    }

    /// True if every path is an accepted image
    pub fn validate_drop(paths: &[PathBuf]) -> bool {
        !paths.is_empty() && paths.iter().all(|p| Self::is_supported_image(p))
    }

    /// Expand dropped paths into image files, keeping drop order.
    ///
    /// Directories are walked recursively; unsupported files are skipped.
    pub fn collect_images(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for path in paths {
            if path.is_dir() {
                let mut found: Vec<PathBuf> = WalkDir::new(path)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path())
                    .filter(|p| Self::is_supported_image(p))
                    .collect();
                found.sort();
                debug!("Found {} images in {}", found.len(), path.display());
                files.extend(found);
            } else if Self::is_supported_image(path) {
                files.push(path.clone());
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        }

        // Relative paths resolve against the cwd; the engine expects absolute ones
        let files = files
            .into_iter()
            .map(|p| std::path::absolute(&p).unwrap_or(p))
            .collect();

        Ok(files)
    }

    /// Size in bytes
    pub async fn file_size(path: &Path) -> std::io::Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Move `from` to `to`, overwriting whatever is at `to`.
    ///
    /// `rename` replaces the destination atomically, so two movers racing on
    /// the same `to` both succeed and the last one wins.
    pub async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
        match fs::rename(from, to).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Cross-device moves need a copy
                debug!("Rename failed ({}), falling back to copy: {}", e, to.display());
                fs::copy(from, to).await?;
                let _ = fs::remove_file(from).await;
                Ok(())
            }
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_supported_extensions() {
        assert!(FileManager::is_supported_image(Path::new("/a/photo.JPG")));
        assert!(FileManager::is_supported_image(Path::new("/a/photo.heic")));
        assert!(!FileManager::is_supported_image(Path::new("/a/movie.mp4")));
        assert!(!FileManager::is_supported_image(Path::new("/a/README")));

        assert!(FileManager::validate_drop(&[PathBuf::from("a.png"), PathBuf::from("b.webp")]));
        assert!(!FileManager::validate_drop(&[PathBuf::from("a.png"), PathBuf::from("b.txt")]));
        assert!(!FileManager::validate_drop(&[]));
    }

    #[test]
    fn test_collect_images_walks_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.png"), b"x").unwrap();
        std::fs::write(dir.path().join("nested").join("a.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let loose = dir.path().join("loose.webp");
        std::fs::write(&loose, b"x").unwrap();

        let files = FileManager::collect_images(&[loose.clone(), dir.path().join("nested")]).unwrap();
        assert_eq!(files, vec![loose, dir.path().join("nested").join("a.jpg")]);

        let all = FileManager::collect_images(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_move_file_overwrites() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("staged.png");
        let to = dir.path().join("final.png");
        std::fs::write(&from, b"new").unwrap();
        std::fs::write(&to, b"old contents").unwrap();

        FileManager::move_file(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"new");
        assert_eq!(FileManager::file_size(&to).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_moves_to_same_destination() {
        let dir = TempDir::new().unwrap();
        let to = dir.path().join("final.jpeg");
        std::fs::write(&to, b"previous").unwrap();

        for round in 0..20 {
            let a = dir.path().join(format!("a-{}.jpeg", round));
            let b = dir.path().join(format!("b-{}.jpeg", round));
            std::fs::write(&a, b"aaaa").unwrap();
            std::fs::write(&b, b"bbbb").unwrap();

            let (first, second) = tokio::join!(FileManager::move_file(&a, &to), FileManager::move_file(&b, &to));
            first.unwrap();
            second.unwrap();
            assert_eq!(std::fs::read(&to).unwrap().len(), 4);
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(1536), "1.50 KB");
        assert_eq!(FileManager::format_size(5 * 1024 * 1024), "5.00 MB");
    }
}
