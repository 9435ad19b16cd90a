//! Finding installed model weights on disk.
//!
//! Weights are never downloaded at runtime. The first existing directory of
//! `$BRECHO_MODELS_DIR`, `~/.brecho/models` and `{exe_dir}/models` is the
//! models root; inside it a model may sit at `embeddings/<name>`, at its full
//! id (`openai/clip-vit-base-patch32`) or at its bare name.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{ModelError, ModelResult};

pub const BRECHO_MODELS_DIR_ENV: &str = "BRECHO_MODELS_DIR";

pub const EMBEDDINGS_SUBDIR: &str = "embeddings";

pub const DEFAULT_CLIP_MODEL_NAME: &str = "clip-vit-base-patch32";

/// A directory only counts as an installed model if it has these.
pub const WEIGHT_FILES: &[&str] = &["model.safetensors"];

/// Resolves model ids to directories.
#[derive(Debug, Clone, Default)]
pub struct ModelLocator {
    pinned_root: Option<PathBuf>,
}

impl ModelLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the search and use `root` only.
    pub fn with_base_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            pinned_root: Some(root.into()),
        }
    }

    /// Roots in the order they are tried.
    fn candidate_roots(&self) -> Vec<PathBuf> {
        if let Some(root) = &self.pinned_root {
            return vec![root.clone()];
        }

        let from_env = env::var_os(BRECHO_MODELS_DIR_ENV).map(PathBuf::from);
        let from_home = dirs::home_dir().map(|home| home.join(".brecho").join("models"));
        let beside_exe = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("models")));

        [from_env, from_home, beside_exe].into_iter().flatten().collect()
    }

    /// The first candidate root that exists.
    pub fn resolve_base_dir(&self) -> ModelResult<PathBuf> {
        let roots = self.candidate_roots();
        match roots.iter().find(|root| root.is_dir()) {
            Some(root) => Ok(root.clone()),
            None => Err(ModelError::ModelsDirectoryNotFound { searched: roots }),
        }
    }

    /// Directory holding the weights for `model_id`.
    pub fn embedding_model_path(&self, model_id: &str) -> ModelResult<PathBuf> {
        let root = self.resolve_base_dir()?;
        let name = extract_model_name(model_id);

        let preferred = root.join(EMBEDDINGS_SUBDIR).join(name);
        [preferred.clone(), root.join(model_id), root.join(name)]
            .into_iter()
            .find(|dir| holds_weights(dir))
            .ok_or_else(|| ModelError::ModelNotFound {
                model_id: model_id.to_string(),
                path: preferred,
            })
    }
}

/// `"openai/clip-vit-base-patch32"` becomes `"clip-vit-base-patch32"`.
pub fn extract_model_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

fn holds_weights(dir: &Path) -> bool {
    dir.is_dir() && WEIGHT_FILES.iter().all(|file| dir.join(file).is_file())
}
