use std::io::Cursor;

use anyhow::Context;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::{Error, Result};

pub const NORMALIZED_MIME: &str = "image/png";

/// How the source aspect ratio is reconciled with the target geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    /// Scale to cover the target, then center-crop the overflow.
    Cover,
    /// Scale to fit inside the target and pad with transparent pixels.
    Contain,
    /// Scale each axis independently.
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeSpec {
    pub width: u32,
    pub height: u32,
    pub fit: FitMode,
}

impl NormalizeSpec {
    pub const UPLOAD: Self = Self::square(512, FitMode::Cover);
    pub const VARIATION: Self = Self::square(256, FitMode::Cover);

    pub const fn square(side: u32, fit: FitMode) -> Self {
        Self {
            width: side,
            height: side,
            fit,
        }
    }
}

/// Decodes `bytes` and re-encodes them as a PNG of exactly the requested geometry.
pub fn normalize(bytes: &[u8], spec: NormalizeSpec) -> Result<Vec<u8>> {
    if spec.width == 0 || spec.height == 0 {
        return Err(Error::InvalidRequest(
            "normalization target must have non-zero dimensions".to_string(),
        ));
    }
    let source =
        image::load_from_memory(bytes).map_err(|err| Error::UnsupportedFormat(err.to_string()))?;

    let resized = match spec.fit {
        FitMode::Cover => source.resize_to_fill(spec.width, spec.height, FilterType::Lanczos3),
        FitMode::Stretch => source.resize_exact(spec.width, spec.height, FilterType::Lanczos3),
        FitMode::Contain => {
            let inner = source
                .resize(spec.width, spec.height, FilterType::Lanczos3)
                .to_rgba8();
            let mut canvas = RgbaImage::new(spec.width, spec.height);
            let x = (spec.width - inner.width()) / 2;
            let y = (spec.height - inner.height()) / 2;
            imageops::overlay(&mut canvas, &inner, i64::from(x), i64::from(y));
            DynamicImage::ImageRgba8(canvas)
        }
    };

    let mut out = Cursor::new(Vec::new());
    resized
        .write_to(&mut out, ImageFormat::Png)
        .context("png encode failed")?;
    tracing::debug!(
        width = spec.width,
        height = spec.height,
        fit = ?spec.fit,
        input_bytes = bytes.len(),
        output_bytes = out.get_ref().len(),
        "normalized image"
    );
    Ok(out.into_inner())
}
