//! Cheap deterministic visual descriptors.
//!
//! Used by the fallback branch of the intake pipeline when the multimodal
//! oracle gave nothing usable. Pure arithmetic over a small thumbnail.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use brecho_model::ImageView;

use crate::constants::BRIGHTNESS_THRESHOLD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brightness {
    Light,
    Dark,
}

/// Dominant hue from plain channel comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DominantHue {
    Reddish,
    Greenish,
    Bluish,
    Yellowish,
    Neutral,
}

impl DominantHue {
    fn classify([r, g, b]: [u8; 3]) -> Self {
        let (r, g, b) = (r as u32, g as u32, b as u32);
        if r > g && r > b {
            Self::Reddish
        } else if g > r && g > b {
            Self::Greenish
        } else if b > r && b > g {
            Self::Bluish
        } else if (r + g) as f64 > b as f64 * 1.5 {
            Self::Yellowish
        } else {
            Self::Neutral
        }
    }
}

/// Descriptor of one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualDescriptor {
    /// `photo_1`, `photo_2`, ...
    pub view: String,
    /// Original pixel dimensions as `WxH`.
    pub dimensions: String,
    /// Width over height, two decimals.
    pub aspect_ratio: f64,
    pub brightness: Brightness,
    pub dominant_hue: DominantHue,
    /// Mean RGB over the thumbnail, truncated to integers.
    pub average_rgb: [u8; 3],
}

/// Describe one view. `index` is zero-based.
pub fn describe_view(index: usize, view: &ImageView, thumbnail: u32) -> VisualDescriptor {
    let side = thumbnail.max(1);
    let thumb = view.resized(side, side);

    let mut sums = [0u64; 3];
    for px in thumb.pixels() {
        for (sum, channel) in sums.iter_mut().zip(px.0) {
            *sum += channel as u64;
        }
    }
    let count = (side as u64 * side as u64).max(1);
    let average_rgb = sums.map(|s| (s / count) as u8);

    let luminance = average_rgb.iter().map(|&c| c as u32).sum::<u32>() / 3;
    let brightness = if luminance > BRIGHTNESS_THRESHOLD {
        Brightness::Light
    } else {
        Brightness::Dark
    };

    let (width, height) = (view.width(), view.height());
    let aspect_ratio = (width as f64 / height as f64 * 100.0).round() / 100.0;

    VisualDescriptor {
        view: format!("photo_{}", index + 1),
        dimensions: format!("{}x{}", width, height),
        aspect_ratio,
        brightness,
        dominant_hue: DominantHue::classify(average_rgb),
        average_rgb,
    }
}

/// Describe every view, in order.
pub fn describe_views(views: &[ImageView], thumbnail: u32) -> Vec<VisualDescriptor> {
    views
        .par_iter()
        .enumerate()
        .map(|(i, view)| describe_view(i, view, thumbnail))
        .collect()
}
