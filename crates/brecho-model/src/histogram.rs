//! Color histogram embedding model.
//!
//! A deterministic joint RGB histogram. It carries far less meaning than
//! CLIP but needs no weights, so it keeps search and intake working on
//! machines without the model files (and in tests).

use crate::config::ModelInfo;
use crate::error::ModelResult;
use crate::view::ImageView;
use crate::ImageEmbeddingModel;

/// Bins per channel.
const BINS: usize = 4;

/// Thumbnail side the histogram is computed over.
const THUMBNAIL: u32 = 64;

pub const HISTOGRAM_MODEL_ID: &str = "color-histogram-4x4x4";

/// Joint RGB histogram, `BINS^3` dimensions, L2-normalized.
#[derive(Debug)]
pub struct ColorHistogramModel {
    info: ModelInfo,
}

impl Default for ColorHistogramModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorHistogramModel {
    pub fn new() -> Self {
        Self {
            info: ModelInfo::new(HISTOGRAM_MODEL_ID, BINS * BINS * BINS, THUMBNAIL),
        }
    }

    fn embed_one(&self, view: &ImageView) -> Vec<f32> {
        let thumb = view.resized(THUMBNAIL, THUMBNAIL);
        let mut hist = vec![0f32; self.info.dimension];

        let bin = |v: u8| (v as usize * BINS) / 256;
        for px in thumb.pixels() {
            let [r, g, b] = px.0;
            hist[(bin(r) * BINS + bin(g)) * BINS + bin(b)] += 1.0;
        }

        let norm = hist.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-12);
        hist.iter_mut().for_each(|x| *x /= norm);
        hist
    }
}

impl ImageEmbeddingModel for ColorHistogramModel {
    fn embed_images(&self, views: &[ImageView]) -> ModelResult<Vec<Vec<f32>>> {
        Ok(views.iter().map(|v| self.embed_one(v)).collect())
    }

    fn dimension(&self) -> usize {
        self.info.dimension
    }

    fn model_info(&self) -> &ModelInfo {
        &self.info
    }
}
