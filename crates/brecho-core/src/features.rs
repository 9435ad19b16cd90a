//! Feature extraction and multi-view pooling.
//!
//! A [`FeatureExtractor`] wraps the process-wide image model. It turns each
//! view into a unit vector and collapses the views of one physical item
//! into a single representative vector with [`pool`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use brecho_model::{EmbeddingConfig, ImageEmbeddingModel, ImageView};

use crate::db_adapter::IntoBrechoResult;
use crate::errors::BrechoError;
use crate::model_adapter::create_embedding_model;

/// Guard against division by a near-zero norm.
pub const NORM_EPSILON: f32 = 1e-9;

// ============================================================================
// PoolingMode
// ============================================================================

/// How several views of one item are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolingMode {
    /// Elementwise mean: the typical appearance.
    #[default]
    Mean,
    /// Elementwise max: the most salient view per dimension.
    Max,
}

impl PoolingMode {
    /// Parse a mode name. `"max"` selects [`PoolingMode::Max`]; every other
    /// value, including unknown ones, selects [`PoolingMode::Mean`].
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("max") {
            Self::Max
        } else {
            Self::Mean
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for PoolingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Vector math
// ============================================================================

/// Scale `v` to unit L2 length in place.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm + NORM_EPSILON;
    v.iter_mut().for_each(|x| *x /= denom);
}

/// Pool per-view vectors into one unit vector.
///
/// # Errors
///
/// [`BrechoError::InvalidArgument`] if `vectors` is empty or the vectors do
/// not share one dimension.
pub fn pool(vectors: &[Vec<f32>], mode: PoolingMode) -> Result<Vec<f32>, BrechoError> {
    let Some(first) = vectors.first() else {
        return Err(BrechoError::InvalidArgument(
            "cannot pool an empty set of vectors".to_string(),
        ));
    };

    let dim = first.len();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(BrechoError::InvalidArgument(format!(
            "cannot pool vectors of different dimensions ({} and {})",
            dim,
            bad.len()
        )));
    }

    let mut pooled = match mode {
        PoolingMode::Mean => {
            let mut sum = vec![0f32; dim];
            for v in vectors {
                sum.iter_mut().zip(v).for_each(|(acc, x)| *acc += x);
            }
            let n = vectors.len() as f32;
            sum.iter_mut().for_each(|x| *x /= n);
            sum
        }
        PoolingMode::Max => {
            let mut max = first.clone();
            for v in &vectors[1..] {
                max.iter_mut().zip(v).for_each(|(acc, x)| *acc = acc.max(*x));
            }
            max
        }
    };

    l2_normalize(&mut pooled);
    Ok(pooled)
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode uploaded image bytes into views.
///
/// # Errors
///
/// [`BrechoError::Extraction`] naming the first view that fails to decode.
pub fn decode_views<B: AsRef<[u8]>>(images: &[B]) -> Result<Vec<ImageView>, BrechoError> {
    images
        .iter()
        .enumerate()
        .map(|(i, bytes)| {
            ImageView::decode(bytes.as_ref()).into_brecho_result().map_err(|e| match e {
                BrechoError::Extraction { message } => {
                    BrechoError::extraction(format!("photo {}: {}", i + 1, message))
                }
                other => other,
            })
        })
        .collect()
}

// ============================================================================
// FeatureExtractor
// ============================================================================

/// Turns views into unit feature vectors.
///
/// Cloning shares the underlying model, which is loaded once and only read.
#[derive(Clone)]
pub struct FeatureExtractor {
    model: Arc<dyn ImageEmbeddingModel>,
}

impl fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("model", &self.model.model_id())
            .field("dimension", &self.model.dimension())
            .finish()
    }
}

impl FeatureExtractor {
    pub fn new(model: Arc<dyn ImageEmbeddingModel>) -> Self {
        Self { model }
    }

    /// Load the configured model.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, BrechoError> {
        Ok(Self::new(create_embedding_model(config)?))
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// Pay model initialization cost before the first request.
    pub fn warm_up(&self) -> Result<(), BrechoError> {
        self.model.warm_up().into_brecho_result()
    }

    /// Embed one view.
    pub fn embed_view(&self, view: &ImageView) -> Result<Vec<f32>, BrechoError> {
        let mut vectors = self.embed_views(std::slice::from_ref(view))?;
        vectors.pop().ok_or_else(|| {
            BrechoError::Internal(format!("model {} returned no vector", self.model_id()))
        })
    }

    /// Embed a batch of views, one unit vector per view, in order.
    pub fn embed_views(&self, views: &[ImageView]) -> Result<Vec<Vec<f32>>, BrechoError> {
        if views.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = self.model.embed_images(views).into_brecho_result()?;
        if vectors.len() != views.len() {
            return Err(BrechoError::Internal(format!(
                "model {} returned {} vectors for {} views",
                self.model_id(),
                vectors.len(),
                views.len()
            )));
        }

        for v in &mut vectors {
            l2_normalize(v);
        }
        Ok(vectors)
    }

    /// Embed all views and pool them into one representative vector.
    ///
    /// # Errors
    ///
    /// [`BrechoError::InvalidArgument`] when `views` is empty.
    pub fn embed_pooled(
        &self,
        views: &[ImageView],
        mode: PoolingMode,
    ) -> Result<Vec<f32>, BrechoError> {
        let vectors = self.embed_views(views)?;
        pool(&vectors, mode)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{histogram_extractor, solid_png};

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    fn sample_vectors() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.6, 0.8, 0.0],
            vec![0.5, 0.5, 0.5, 0.5],
        ]
    }

    #[test]
    fn test_pooling_mode_from_name() {
        assert_eq!(PoolingMode::from_name("max"), PoolingMode::Max);
        assert_eq!(PoolingMode::from_name(" MAX "), PoolingMode::Max);
        assert_eq!(PoolingMode::from_name("mean"), PoolingMode::Mean);
        assert_eq!(PoolingMode::from_name("median"), PoolingMode::Mean);
        assert_eq!(PoolingMode::from_name(""), PoolingMode::Mean);
    }

    #[test]
    fn test_pool_output_is_unit_length() {
        for mode in [PoolingMode::Mean, PoolingMode::Max] {
            let pooled = pool(&sample_vectors(), mode).unwrap();
            assert!((norm(&pooled) - 1.0).abs() < 1e-6, "{mode}: {}", norm(&pooled));
        }
    }

    #[test]
    fn test_unknown_mode_equals_mean() {
        let vectors = sample_vectors();
        let unknown = pool(&vectors, PoolingMode::from_name("geometric")).unwrap();
        let mean = pool(&vectors, PoolingMode::Mean).unwrap();
        assert_eq!(unknown, mean);
    }

    #[test]
    fn test_max_pooling_takes_elementwise_max() {
        let pooled = pool(&[vec![1.0, 0.0], vec![0.0, 1.0]], PoolingMode::Max).unwrap();
        let expected = 1.0 / 2f32.sqrt();
        assert!((pooled[0] - expected).abs() < 1e-6);
        assert!((pooled[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_pool_single_vector_is_itself() {
        let v = vec![0.0, 0.6, 0.8];
        let pooled = pool(std::slice::from_ref(&v), PoolingMode::Mean).unwrap();
        for (a, b) in pooled.iter().zip(&v) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pool_rejects_empty_and_ragged_input() {
        let err = pool(&[], PoolingMode::Mean).unwrap_err();
        assert!(matches!(err, BrechoError::InvalidArgument(_)));

        let err = pool(&[vec![1.0, 0.0], vec![1.0]], PoolingMode::Max).unwrap_err();
        assert!(matches!(err, BrechoError::InvalidArgument(_)));
    }

    #[test]
    fn test_embed_view_is_unit_length() {
        let extractor = histogram_extractor();
        let views = decode_views(&[
            solid_png(40, 30, [200, 30, 30]),
            solid_png(12, 64, [20, 20, 20]),
            solid_png(1, 1, [255, 255, 255]),
        ])
        .unwrap();

        for view in &views {
            let v = extractor.embed_view(view).unwrap();
            assert_eq!(v.len(), extractor.dimension());
            assert!((norm(&v) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_decode_views_names_the_bad_photo() {
        let images = vec![solid_png(4, 4, [1, 2, 3]), b"not an image".to_vec()];
        let err = decode_views(&images).unwrap_err();
        assert!(matches!(err, BrechoError::Extraction { .. }));
        assert!(err.to_string().contains("photo 2"));
    }

    #[test]
    fn test_embed_pooled_requires_views() {
        let extractor = histogram_extractor();
        let err = extractor.embed_pooled(&[], PoolingMode::Mean).unwrap_err();
        assert!(matches!(err, BrechoError::InvalidArgument(_)));
    }
}
