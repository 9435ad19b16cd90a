//! # brecho-model
//!
//! ML inference layer for Brecho: image embeddings plus the clients for the
//! remote vision oracle and speech-to-text service.
//!
//! - **Image embedding models**: turn decoded views into unit vectors
//! - **Oracle client**: Ollama-compatible multimodal/text generation
//! - **Speech client**: optional audio transcription
//! - **Model locator**: runtime path resolution for installed weights
//!
//! ## Model Location
//!
//! Models are searched in this order:
//! 1. `$BRECHO_MODELS_DIR` environment variable
//! 2. `~/.brecho/models` user directory
//! 3. `{exe_dir}/models` next to the binary
//!
//! ## Features
//!
//! - `embedded` (default): CLIP inference through Candle
//! - `metal` / `cuda`: GPU acceleration for Candle
//!
//! ## Usage
//!
//! ```ignore
//! use brecho_model::{create_image_embedding_model, EmbeddingConfig, ImageView};
//!
//! let model = create_image_embedding_model(&EmbeddingConfig::default())?;
//! let view = ImageView::decode(&bytes)?;
//! let vectors = model.embed_images(&[view])?;
//! assert_eq!(vectors[0].len(), model.dimension());
//! ```

pub mod config;
pub mod error;
pub mod histogram;
pub mod model_locator;
pub mod oracle;
pub mod speech;
pub mod view;

#[cfg(feature = "embedded")]
mod clip;

pub use config::{
    DevicePreference, EmbeddingConfig, EmbeddingProviderKind, ModelInfo, OracleConfig,
    SpeechConfig,
};
pub use error::{ModelError, ModelResult};
pub use histogram::ColorHistogramModel;
pub use model_locator::{
    ModelLocator, BRECHO_MODELS_DIR_ENV, DEFAULT_CLIP_MODEL_NAME, EMBEDDINGS_SUBDIR,
};
pub use oracle::{InferenceOracle, OllamaOracle, OracleRequest};
pub use speech::{HttpTranscriber, SpeechTranscriber};
pub use view::ImageView;

#[cfg(feature = "embedded")]
pub use clip::CandleClipModel;

/// Default image model (full Hugging Face identifier).
pub const DEFAULT_CLIP_MODEL_ID: &str = "openai/clip-vit-base-patch32";

// ============================================================================
// Image Embedding Model Trait
// ============================================================================

/// Trait for image embedding models.
///
/// Implementations are loaded once and then only read, so they must be
/// `Send + Sync` to be shared by concurrent requests.
pub trait ImageEmbeddingModel: Send + Sync + std::fmt::Debug {
    /// Embed a batch of views. One unit-length vector per view, in order.
    fn embed_images(&self, views: &[ImageView]) -> ModelResult<Vec<Vec<f32>>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Get model information.
    fn model_info(&self) -> &ModelInfo;

    /// Get the model ID.
    fn model_id(&self) -> &str {
        &self.model_info().model_id
    }

    /// Warm up the model by embedding a blank view.
    fn warm_up(&self) -> ModelResult<()> {
        let blank = ImageView::from_rgb(image::RgbImage::new(8, 8))?;
        let _ = self.embed_images(&[blank])?;
        Ok(())
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// Create an image embedding model from configuration.
///
/// # Errors
///
/// Returns `ModelError` if the weights are missing or fail to load, or if
/// the provider was not compiled in.
pub fn create_image_embedding_model(
    config: &EmbeddingConfig,
) -> ModelResult<Box<dyn ImageEmbeddingModel>> {
    match config.provider {
        EmbeddingProviderKind::Histogram => Ok(Box::new(ColorHistogramModel::new())),

        #[cfg(feature = "embedded")]
        EmbeddingProviderKind::Clip => Ok(Box::new(CandleClipModel::new(config)?)),

        #[cfg(not(feature = "embedded"))]
        EmbeddingProviderKind::Clip => Err(ModelError::ProviderNotAvailable {
            provider: "clip".to_string(),
            reason: "built without the 'embedded' feature. Use 'histogram' instead.".to_string(),
        }),
    }
}
