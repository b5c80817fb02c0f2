//! # Image Resize Module
//!
//! Calcolo delle dimensioni di destinazione.
//!
//! ## Regola di ridimensionamento:
//! ```text
//! scale  = min(maxWidth / srcWidth, maxHeight / srcHeight, 1.0)
//! width  = floor(srcWidth  * scale)
//! height = floor(srcHeight * scale)
//! ```
//! - Mai oltre il bounding box del preset
//! - Mai upscaling (scale limitato a 1.0)
//! - Aspect ratio preservato con un unico fattore di scala, nessun crop
//!
//! Il calcolo usa aritmetica intera esatta: `333 / 1000 * 1000` in virgola
//! mobile dà 332.99999..., qui dà 333.

use serde::{Deserialize, Serialize};

/// Pixel dimensions of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Largest size inside `max` with the same aspect ratio, never upscaled.
    ///
    /// Each axis is clamped to at least one pixel.
    pub fn fit_within(&self, max: Dimensions) -> Dimensions {
        let (src_w, src_h) = (u64::from(self.width), u64::from(self.height));
        let (max_w, max_h) = (u64::from(max.width), u64::from(max.height));

        if src_w == 0 || src_h == 0 || (src_w <= max_w && src_h <= max_h) {
            return *self;
        }

        // max_w / src_w <= max_h / src_h  <=>  max_w * src_h <= max_h * src_w
        let (width, height) = if max_w * src_h <= max_h * src_w {
            (max_w, src_h * max_w / src_w)
        } else {
            (src_w * max_h / src_h, max_h)
        };

        Dimensions {
            width: width.max(1) as u32,
            height: height.max(1) as u32,
        }
    }

    /// `min(max_w / w, max_h / h, 1.0)`, for logging
    pub fn scale_to(&self, max: Dimensions) -> f64 {
        if self.width == 0 || self.height == 0 {
            return 1.0;
        }
        let sx = f64::from(max.width) / f64::from(self.width);
        let sy = f64::from(max.height) / f64::from(self.height);
        sx.min(sy).min(1.0)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
