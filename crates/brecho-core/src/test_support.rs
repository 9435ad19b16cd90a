//! Fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use brecho_db::vector::{Metadata, NeighborResult};
use brecho_model::{
    ColorHistogramModel, ImageView, InferenceOracle, ModelError, ModelResult, OracleRequest,
    SpeechTranscriber,
};

use crate::features::FeatureExtractor;

pub(crate) fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub(crate) fn solid_view(width: u32, height: u32, rgb: [u8; 3]) -> ImageView {
    ImageView::from_rgb(RgbImage::from_pixel(width, height, Rgb(rgb))).unwrap()
}

/// Extractor over the dependency-free color histogram model.
pub(crate) fn histogram_extractor() -> FeatureExtractor {
    FeatureExtractor::new(Arc::new(ColorHistogramModel::new()))
}

/// `SKU-0 .. SKU-{n-1}` with growing distances.
pub(crate) fn neighbors(n: usize) -> Vec<NeighborResult> {
    (0..n)
        .map(|i| {
            let mut metadata = Metadata::new();
            metadata.insert("brand".into(), format!("Brand {}", i).into());
            NeighborResult::new(format!("SKU-{}", i), 0.1 * i as f32, metadata)
        })
        .collect()
}

/// Oracle that answers from a script and records every request.
///
/// `None` entries, and calls past the end of the script, fail with a
/// transport error.
#[derive(Clone, Default)]
pub(crate) struct ScriptedOracle {
    replies: Arc<Mutex<VecDeque<Option<String>>>>,
    requests: Arc<Mutex<Vec<OracleRequest>>>,
    delay: Duration,
}

impl ScriptedOracle {
    pub(crate) fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Option<&'static str>>,
    {
        Self {
            replies: Arc::new(Mutex::new(
                replies.into_iter().map(|r| r.map(str::to_string)).collect(),
            )),
            ..Self::default()
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceOracle for ScriptedOracle {
    async fn generate(&self, request: OracleRequest) -> ModelResult<String> {
        let reply = {
            self.requests.lock().unwrap().push(request);
            self.replies.lock().unwrap().pop_front().flatten()
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        reply.ok_or_else(|| ModelError::transport("scripted", "no reply"))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub(crate) struct FixedTranscriber {
    text: Option<String>,
}

impl FixedTranscriber {
    pub(crate) fn new(text: Option<&str>) -> Self {
        Self {
            text: text.map(str::to_string),
        }
    }
}

#[async_trait]
impl SpeechTranscriber for FixedTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Option<String> {
        self.text.clone()
    }
}
