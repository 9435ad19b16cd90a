//! The intake service: the one entry point the gateway and CLI talk to.
//!
//! [`IntakeService`] owns the embedding model, the vector index and the
//! remote collaborators. CPU-bound work (embedding, index I/O, JPEG encoding)
//! runs on the blocking pool so request handlers stay responsive.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use brecho_db::vector::{IndexEntry, Metadata, MetadataValue, NeighborResult, VectorIndexBackend};
use brecho_model::{ImageView, InferenceOracle, SpeechTranscriber};

use crate::config::GlobalConfig;
use crate::constants::SKU_LENGTH;
use crate::db_adapter::{open_index, IntoBrechoResult};
use crate::descriptors::VisualDescriptor;
use crate::errors::BrechoError;
use crate::features::{decode_views, FeatureExtractor};
use crate::model_adapter::{create_oracle, create_transcriber};
use crate::pipeline::{
    Deadline, IntakePipeline, PipelineInput, PipelineSettings, ProposalSource, StageRecord,
};
use crate::proposal::Proposal;
use crate::task::run_blocking;

// ============================================================================
// Request / response types
// ============================================================================

/// Catalog fields sent along with the photos of an item being indexed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Catalog key. A fresh UUID is used when absent.
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub consignor_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub list_price: Option<f64>,
    /// Free-form extra fields, stored verbatim.
    #[serde(default)]
    pub extras_json: Option<String>,
}

impl CatalogItem {
    /// The key this item is stored under.
    fn resolve_id(&self) -> String {
        self.sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    /// Metadata stored next to the vector. Missing fields are explicit nulls.
    pub fn to_metadata(&self, id: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("sku".into(), MetadataValue::from(id));
        metadata.insert("consignor_id".into(), self.consignor_id.clone().into());
        metadata.insert("category".into(), self.category.clone().into());
        metadata.insert("brand".into(), self.brand.clone().into());
        metadata.insert("size".into(), self.size.clone().into());
        metadata.insert("condition".into(), self.condition.clone().into());
        metadata.insert("list_price".into(), self.list_price.into());
        metadata.insert("extras".into(), self.extras_json.clone().into());
        metadata
    }
}

/// Result of [`IntakeService::index_item`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedItem {
    pub id: String,
    pub metadata: Metadata,
}

/// Everything the intake pipeline learned about one item.
#[derive(Debug, Clone, Serialize)]
pub struct IntakeReport {
    /// Provisional SKU for the new item.
    pub sku: String,
    pub proposal: Proposal,
    pub source: ProposalSource,
    pub price_suggestion: Option<Proposal>,
    pub neighbors: Vec<NeighborResult>,
    pub descriptors: Vec<VisualDescriptor>,
    pub audio_hint: Option<String>,
    pub stages: Vec<StageRecord>,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Snapshot for health checks and `brecho status`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub model_id: String,
    pub dimension: usize,
    pub index_backend: &'static str,
    pub indexed_items: usize,
    pub oracle: String,
    pub speech_enabled: bool,
}

/// First [`SKU_LENGTH`] hex digits of a random UUID, uppercased.
pub fn provisional_sku() -> String {
    let mut sku = Uuid::new_v4().simple().to_string();
    sku.truncate(SKU_LENGTH);
    sku.to_uppercase()
}

// ============================================================================
// IntakeService
// ============================================================================

/// Similarity search, catalog indexing and intake analysis.
///
/// # Construction
///
/// Use [`IntakeService::from_global_config`] in the binary and
/// [`IntakeService::new`] to inject collaborators in tests.
pub struct IntakeService {
    config: GlobalConfig,
    extractor: FeatureExtractor,
    index: Arc<dyn VectorIndexBackend>,
    oracle: Arc<dyn InferenceOracle>,
    transcriber: Option<Arc<dyn SpeechTranscriber>>,
    settings: PipelineSettings,
}

impl std::fmt::Debug for IntakeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakeService")
            .field("model", &self.extractor.model_id())
            .field("index", &self.index.backend_name())
            .field("oracle", &self.oracle.name())
            .field("speech", &self.transcriber.is_some())
            .finish()
    }
}

impl IntakeService {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Build the service from configuration: load the model, open (or
    /// create) the index and set up the remote clients.
    ///
    /// # Errors
    ///
    /// Invalid configuration, an unavailable model or an incompatible index.
    pub fn from_global_config(config: GlobalConfig) -> Result<Self, BrechoError> {
        for warning in config.validate()? {
            warn!("{}", warning);
        }

        let extractor = FeatureExtractor::from_config(&config.embedding)?;
        let index = open_index(&config.index, extractor.dimension(), extractor.model_id())?;
        let oracle = create_oracle(&config.oracle)?;
        let transcriber = create_transcriber(&config.speech)?;

        info!(
            "Intake service ready: model {} ({}d), {} index at {}",
            extractor.model_id(),
            extractor.dimension(),
            index.backend_name(),
            config.index.effective_path().display()
        );

        Self::new(config, extractor, index, oracle, transcriber)
    }

    /// Assemble the service from ready collaborators.
    ///
    /// # Errors
    ///
    /// [`BrechoError::DimensionMismatch`] when the model and the index
    /// disagree on vector length.
    pub fn new(
        config: GlobalConfig,
        extractor: FeatureExtractor,
        index: Arc<dyn VectorIndexBackend>,
        oracle: Arc<dyn InferenceOracle>,
        transcriber: Option<Arc<dyn SpeechTranscriber>>,
    ) -> Result<Self, BrechoError> {
        if extractor.dimension() != index.dimension() {
            return Err(BrechoError::DimensionMismatch {
                expected: index.dimension(),
                actual: extractor.dimension(),
            });
        }
        let settings = PipelineSettings::from_config(&config);
        Ok(Self {
            config,
            extractor,
            index,
            oracle,
            transcriber,
            settings,
        })
    }

    /// Override the overall intake budget.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.settings.request_timeout = timeout;
        self
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn health(&self) -> Result<ServiceHealth, BrechoError> {
        let index = Arc::clone(&self.index);
        let indexed_items = run_blocking(move || index.len().into_brecho_result()).await?;
        Ok(ServiceHealth {
            model_id: self.extractor.model_id().to_string(),
            dimension: self.extractor.dimension(),
            index_backend: self.index.backend_name(),
            indexed_items,
            oracle: self.oracle.name().to_string(),
            speech_enabled: self.transcriber.is_some(),
        })
    }

    /// Decode uploaded photos off the async threads.
    pub async fn decode_images(&self, images: Vec<Vec<u8>>) -> Result<Vec<ImageView>, BrechoError> {
        run_blocking(move || decode_views(&images)).await
    }

    // -------------------------------------------------------------------------
    // Search and indexing
    // -------------------------------------------------------------------------

    /// Nearest catalog items to `vector`, closest first.
    pub async fn search_by_vector(
        &self,
        vector: Vec<f32>,
        k: usize,
    ) -> Result<Vec<NeighborResult>, BrechoError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let index = Arc::clone(&self.index);
        run_blocking(move || index.query(&vector, k).into_brecho_result()).await
    }

    /// Embed and pool the views, then search.
    pub async fn search_by_images(
        &self,
        views: Vec<ImageView>,
        k: usize,
    ) -> Result<Vec<NeighborResult>, BrechoError> {
        let vector = self.embed_pooled(views).await?;
        self.search_by_vector(vector, k).await
    }

    /// Insert or replace one entry.
    pub async fn upsert(
        &self,
        id: String,
        vector: Vec<f32>,
        metadata: Metadata,
    ) -> Result<(), BrechoError> {
        if id.trim().is_empty() {
            return Err(BrechoError::InvalidArgument("id must not be empty".into()));
        }
        let index = Arc::clone(&self.index);
        run_blocking(move || {
            index
                .upsert(&[IndexEntry::new(id, vector, metadata)])
                .into_brecho_result()
        })
        .await
    }

    /// Embed the photos of a catalog item and store it under its SKU.
    pub async fn index_item(
        &self,
        views: Vec<ImageView>,
        item: CatalogItem,
    ) -> Result<IndexedItem, BrechoError> {
        let photo_count = views.len();
        let vector = self.embed_pooled(views).await?;
        let id = item.resolve_id();
        let metadata = item.to_metadata(&id);

        self.upsert(id.clone(), vector, metadata.clone()).await?;
        info!("Indexed {} from {} photos", id, photo_count);

        Ok(IndexedItem { id, metadata })
    }

    async fn embed_pooled(&self, views: Vec<ImageView>) -> Result<Vec<f32>, BrechoError> {
        if views.is_empty() {
            return Err(BrechoError::InvalidArgument(
                "at least one image is required".into(),
            ));
        }
        let extractor = self.extractor.clone();
        let mode = self.config.pipeline.pooling();
        run_blocking(move || extractor.embed_pooled(&views, mode)).await
    }

    // -------------------------------------------------------------------------
    // Intake
    // -------------------------------------------------------------------------

    /// Analyze a new item: similar items, an attribute proposal and a price
    /// suggestion, within the configured request budget.
    ///
    /// # Errors
    ///
    /// - [`BrechoError::InvalidArgument`] when no photo is given
    /// - [`BrechoError::DeadlineExceeded`] when the budget runs out
    /// - embedding and index errors
    ///
    /// Oracle failures are not errors; they push the pipeline to its
    /// fallback branch or leave the price suggestion empty.
    pub async fn run_intake_pipeline(
        &self,
        views: Vec<ImageView>,
        audio: Option<Vec<u8>>,
    ) -> Result<IntakeReport, BrechoError> {
        let budget = self.settings.request_timeout;
        let deadline = Deadline::starting_now(budget);

        match tokio::time::timeout(budget, self.intake(views, audio, deadline)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Intake cancelled after {:.1}s", budget.as_secs_f64());
                Err(deadline.exceeded())
            }
        }
    }

    async fn intake(
        &self,
        views: Vec<ImageView>,
        audio: Option<Vec<u8>>,
        deadline: Deadline,
    ) -> Result<IntakeReport, BrechoError> {
        if views.is_empty() {
            return Err(BrechoError::InvalidArgument(
                "at least one image is required".into(),
            ));
        }
        let started = Instant::now();
        info!("Starting intake with {} photos", views.len());

        let audio_hint = self.transcribe(audio).await;

        let pooled = self.embed_pooled(views.clone()).await?;
        let neighbors = self
            .search_by_vector(pooled, self.config.pipeline.neighbor_count)
            .await?;
        info!(
            "[{:.1}s] Embedding and search done, {} similar items",
            started.elapsed().as_secs_f64(),
            neighbors.len()
        );

        let pipeline = IntakePipeline::new(self.oracle.as_ref(), &self.settings, deadline);
        let outcome = pipeline
            .run(PipelineInput {
                views: &views,
                neighbors: &neighbors,
                audio_hint: audio_hint.as_deref(),
            })
            .await?;

        let report = IntakeReport {
            sku: provisional_sku(),
            proposal: outcome.proposal,
            source: outcome.source,
            price_suggestion: outcome.price_suggestion,
            neighbors,
            descriptors: outcome.descriptors,
            audio_hint,
            stages: outcome.stages,
            elapsed_ms: started.elapsed().as_millis() as u64,
            created_at: Utc::now(),
        };
        info!(
            "Intake {} finished in {:.1}s ({:?} proposal, {} fields)",
            report.sku,
            started.elapsed().as_secs_f64(),
            report.source,
            report.proposal.len()
        );
        Ok(report)
    }

    async fn transcribe(&self, audio: Option<Vec<u8>>) -> Option<String> {
        let audio = audio.filter(|a| !a.is_empty())?;
        match &self.transcriber {
            Some(transcriber) => {
                let hint = transcriber.transcribe(&audio).await;
                debug!("Audio transcribed: {}", hint.is_some());
                hint
            }
            None => {
                debug!("Audio clip ignored, speech collaborator disabled");
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::test_support::{histogram_extractor, solid_view, FixedTranscriber, ScriptedOracle};
    use tempfile::TempDir;

    fn service_with(
        dir: &TempDir,
        oracle: ScriptedOracle,
        transcriber: Option<FixedTranscriber>,
    ) -> IntakeService {
        let extractor = histogram_extractor();
        let index_config = IndexConfig {
            path: Some(dir.path().join("vectordb")),
            ..IndexConfig::default()
        };
        let index =
            open_index(&index_config, extractor.dimension(), extractor.model_id()).unwrap();
        let transcriber =
            transcriber.map(|t| Arc::new(t) as Arc<dyn SpeechTranscriber>);
        IntakeService::new(
            GlobalConfig::default(),
            extractor,
            index,
            Arc::new(oracle),
            transcriber,
        )
        .unwrap()
    }

    fn red_item() -> Vec<ImageView> {
        vec![solid_view(32, 48, [200, 20, 20]), solid_view(48, 32, [210, 30, 25])]
    }

    async fn seed_catalog(service: &IntakeService) {
        let item = |sku: &str, brand: &str| CatalogItem {
            sku: Some(sku.to_string()),
            brand: Some(brand.to_string()),
            category: Some("Vestido".to_string()),
            ..CatalogItem::default()
        };
        service.index_item(red_item(), item("X1", "Farm")).await.unwrap();
        service
            .index_item(vec![solid_view(20, 20, [20, 180, 30])], item("G1", "Zara"))
            .await
            .unwrap();
        service
            .index_item(vec![solid_view(20, 20, [20, 30, 190])], item("B1", "Hering"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_indexed_item_is_found_by_its_own_photos() {
        let dir = TempDir::new().unwrap();
        let service = service_with(&dir, ScriptedOracle::new([]), None);
        seed_catalog(&service).await;

        let results = service.search_by_images(red_item(), 5).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "X1");
        assert!(results[0].distance < 0.01);
        assert_eq!(results[0].metadata["brand"], MetadataValue::from("Farm"));
        assert!(results[0].metadata["consignor_id"].is_null());
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[tokio::test]
    async fn test_search_edge_cases() {
        let dir = TempDir::new().unwrap();
        let service = service_with(&dir, ScriptedOracle::new([]), None);

        let dim = service.extractor().dimension();
        let empty = service.search_by_vector(vec![1.0; dim], 5).await.unwrap();
        assert!(empty.is_empty());

        seed_catalog(&service).await;
        assert!(service
            .search_by_vector(vec![1.0; dim], 0)
            .await
            .unwrap()
            .is_empty());

        let err = service.search_by_vector(vec![1.0; 3], 5).await.unwrap_err();
        assert!(matches!(err, BrechoError::DimensionMismatch { .. }));

        let err = service.search_by_images(Vec::new(), 5).await.unwrap_err();
        assert!(matches!(err, BrechoError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_entry() {
        let dir = TempDir::new().unwrap();
        let service = service_with(&dir, ScriptedOracle::new([]), None);
        let dim = service.extractor().dimension();

        let mut first = vec![0.0; dim];
        first[0] = 1.0;
        let mut second = vec![0.0; dim];
        second[1] = 1.0;

        let mut m1 = Metadata::new();
        m1.insert("brand".into(), "Farm".into());
        let mut m2 = Metadata::new();
        m2.insert("brand".into(), "Animale".into());

        service.upsert("X".into(), first, m1).await.unwrap();
        service.upsert("X".into(), second.clone(), m2).await.unwrap();

        assert_eq!(service.health().await.unwrap().indexed_items, 1);
        let hits = service.search_by_vector(second, 1).await.unwrap();
        assert_eq!(hits[0].id, "X");
        assert!(hits[0].distance < 1e-4);
        assert_eq!(hits[0].metadata["brand"], MetadataValue::from("Animale"));

        let err = service
            .upsert("  ".into(), vec![0.0; dim], Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BrechoError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_index_item_without_sku_gets_uuid() {
        let dir = TempDir::new().unwrap();
        let service = service_with(&dir, ScriptedOracle::new([]), None);

        let indexed = service
            .index_item(red_item(), CatalogItem::default())
            .await
            .unwrap();
        assert!(Uuid::parse_str(&indexed.id).is_ok());
        assert_eq!(indexed.metadata["sku"], MetadataValue::from(indexed.id.as_str()));
        assert!(indexed.metadata["list_price"].is_null());
    }

    #[tokio::test]
    async fn test_intake_falls_back_with_neighbors() {
        let dir = TempDir::new().unwrap();
        let oracle = ScriptedOracle::new([
            None,
            Some("{\"category\": \"Vestido\", \"brand\": \"Farm\"}"),
            Some("{\"range\": \"R$90-140\", \"reason\": \"marca desejada\"}"),
        ]);
        let service = service_with(&dir, oracle.clone(), None);
        seed_catalog(&service).await;

        let report = service.run_intake_pipeline(red_item(), None).await.unwrap();

        assert_eq!(report.source, ProposalSource::Fallback);
        assert_eq!(report.proposal.brand().as_deref(), Some("Farm"));
        assert!(report.price_suggestion.is_some());
        assert_eq!(report.neighbors[0].id, "X1");
        assert_eq!(report.descriptors.len(), 2);
        assert_eq!(report.sku.len(), SKU_LENGTH);
        assert_eq!(report.sku, report.sku.to_uppercase());

        let requests = oracle.requests();
        assert!(requests[1].prompt.contains("X1"));
    }

    #[tokio::test]
    async fn test_intake_passes_transcribed_audio() {
        let dir = TempDir::new().unwrap();
        let oracle = ScriptedOracle::new([Some("{\"category\": \"Saia\"}"), Some("{}")]);
        let service = service_with(
            &dir,
            oracle.clone(),
            Some(FixedTranscriber::new(Some("saia midi de linho"))),
        );

        let report = service
            .run_intake_pipeline(red_item(), Some(b"RIFF....".to_vec()))
            .await
            .unwrap();
        assert_eq!(report.audio_hint.as_deref(), Some("saia midi de linho"));
        assert_eq!(report.source, ProposalSource::Primary);
        assert!(report.price_suggestion.is_none());
        assert!(oracle.requests()[0].prompt.contains("saia midi de linho"));
    }

    #[tokio::test]
    async fn test_audio_ignored_without_transcriber() {
        let dir = TempDir::new().unwrap();
        let service = service_with(&dir, ScriptedOracle::new([]), None);
        let report = service
            .run_intake_pipeline(red_item(), Some(vec![1, 2, 3]))
            .await
            .unwrap();
        assert!(report.audio_hint.is_none());
        assert!(report.proposal.is_empty());
    }

    #[tokio::test]
    async fn test_intake_deadline() {
        let dir = TempDir::new().unwrap();
        let oracle = ScriptedOracle::new([Some("{\"category\": \"Saia\"}")])
            .with_delay(Duration::from_secs(5));
        let service = service_with(&dir, oracle, None)
            .with_request_timeout(Duration::from_millis(200));

        let started = Instant::now();
        let err = service.run_intake_pipeline(red_item(), None).await.unwrap_err();
        assert!(matches!(err, BrechoError::DeadlineExceeded { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_intake_requires_photos() {
        let dir = TempDir::new().unwrap();
        let service = service_with(&dir, ScriptedOracle::new([]), None);
        let err = service.run_intake_pipeline(Vec::new(), None).await.unwrap_err();
        assert!(matches!(err, BrechoError::InvalidArgument(_)));
    }

    #[test]
    fn test_provisional_sku_shape() {
        let sku = provisional_sku();
        assert_eq!(sku.len(), 8);
        assert!(sku.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
