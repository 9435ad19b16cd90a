//! Candle-based CLIP image embedding model.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use tracing::info;

use crate::config::{DevicePreference, EmbeddingConfig, ModelInfo};
use crate::error::{ModelError, ModelResult};
use crate::view::ImageView;
use crate::ImageEmbeddingModel;

/// Output dimension of the ViT-B/32 projection head.
const CLIP_DIMENSION: usize = 512;

// ============================================================================
// CandleClipModel
// ============================================================================

/// CLIP ViT-B/32 vision tower, L2-normalized projection output.
pub struct CandleClipModel {
    model_info: ModelInfo,
    model: ClipModel,
    device: Device,
}

impl std::fmt::Debug for CandleClipModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleClipModel")
            .field("model_id", &self.model_info.model_id)
            .field("dimension", &self.model_info.dimension)
            .finish()
    }
}

impl CandleClipModel {
    /// Load CLIP weights from the configured model directory.
    pub fn new(config: &EmbeddingConfig) -> ModelResult<Self> {
        let model_path = config.effective_model_path();
        let weights_path = model_path.join("model.safetensors");

        if !weights_path.exists() {
            return Err(ModelError::ModelNotFound {
                model_id: config.model_id.clone(),
                path: model_path,
            });
        }

        let clip_config = ClipConfig::vit_base_patch32();
        let input_size = clip_config.image_size as u32;
        let device = Self::select_device(config.device)?;

        info!(
            "Loading image model '{}' from {:?} (dim={})",
            config.model_id, model_path, CLIP_DIMENSION
        );

        // SAFETY: the weights file is not modified while the process runs.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device).map_err(
                |e| ModelError::model_load(model_path.display().to_string(), e.to_string()),
            )?
        };

        let model = ClipModel::new(vb, &clip_config)
            .map_err(|e| ModelError::model_load(&config.model_id, e.to_string()))?;

        Ok(Self {
            model_info: ModelInfo::new(&config.model_id, CLIP_DIMENSION, input_size),
            model,
            device,
        })
    }

    fn select_device(pref: DevicePreference) -> ModelResult<Device> {
        if pref == DevicePreference::Cpu {
            return Ok(Device::Cpu);
        }
        match (gpu_device(), pref) {
            (Ok(device), _) => Ok(device),
            (Err(reason), DevicePreference::Gpu) => Err(ModelError::DeviceNotAvailable { reason }),
            (Err(reason), _) => {
                info!("Running CLIP on CPU ({})", reason);
                Ok(Device::Cpu)
            }
        }
    }

    fn err(&self, e: candle_core::Error) -> ModelError {
        ModelError::embedding_failed(&self.model_info.model_id, e.to_string())
    }

    /// Resize-to-fill, then scale pixels from [0, 255] to [-1, 1], CHW layout.
    fn preprocess(&self, view: &ImageView) -> ModelResult<Tensor> {
        let size = self.model_info.input_size as usize;
        let raw = view.resized_to_fill(self.model_info.input_size).into_raw();

        Tensor::from_vec(raw, (size, size, 3), &Device::Cpu)
            .and_then(|t| t.permute((2, 0, 1)))
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.affine(2.0 / 255.0, -1.0))
            .map_err(|e| self.err(e))
    }
}

impl ImageEmbeddingModel for CandleClipModel {
    fn embed_images(&self, views: &[ImageView]) -> ModelResult<Vec<Vec<f32>>> {
        if views.is_empty() {
            return Ok(vec![]);
        }

        let pixels = views
            .iter()
            .map(|v| self.preprocess(v))
            .collect::<ModelResult<Vec<_>>>()?;

        let batch = Tensor::stack(&pixels, 0)
            .and_then(|t| t.to_device(&self.device))
            .map_err(|e| self.err(e))?;

        let features = self
            .model
            .get_image_features(&batch)
            .map_err(|e| self.err(e))?;

        let norm = features
            .sqr()
            .and_then(|t| t.sum_keepdim(1))
            .and_then(|t| t.sqrt())
            .and_then(|t| t.clamp(1e-12, f64::MAX))
            .map_err(|e| self.err(e))?;

        let normalized = features.broadcast_div(&norm).map_err(|e| self.err(e))?;

        normalized.to_vec2::<f32>().map_err(|e| self.err(e))
    }

    fn dimension(&self) -> usize {
        self.model_info.dimension
    }

    fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }
}

/// The first accelerator this build can open, or why there is none.
fn gpu_device() -> Result<Device, String> {
    #[cfg(feature = "metal")]
    {
        return Device::new_metal(0).map_err(|e| format!("Metal device 0 unavailable: {}", e));
    }
    #[cfg(feature = "cuda")]
    {
        return Device::new_cuda(0).map_err(|e| {
            format!("CUDA device 0 unavailable, check the NVIDIA driver: {}", e)
        });
    }
    #[allow(unreachable_code)]
    Err("built without GPU support; rebuild with --features metal or --features cuda".to_string())
}
