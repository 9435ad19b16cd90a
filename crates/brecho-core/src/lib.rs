//! # brecho-core
//!
//! Intake kernel for Brecho, a second-hand clothing store.
//!
//! This crate turns photos of a garment into a pooled visual embedding,
//! finds similar catalog items in the vector index and drives the remote
//! vision oracle through the intake analysis pipeline. It is consumed by the
//! `brecho` binary (CLI and HTTP gateway).
//!
//! ## Main Types
//!
//! - [`IntakeService`] – entry point for search, indexing and intake
//! - [`IntakePipeline`] – the primary / fallback / price state machine
//! - [`FeatureExtractor`] – per-view embeddings and pooling
//! - [`Proposal`] – attribute proposal returned by the oracle
//! - [`BrechoError`] – domain error type
//!
//! ## Example
//!
//! ```ignore
//! use brecho_core::{decode_views, GlobalConfig, IntakeService};
//!
//! let service = IntakeService::from_global_config(GlobalConfig::load_default()?)?;
//! let views = decode_views(&[front_jpeg, back_jpeg])?;
//! let report = service.run_intake_pipeline(views, None).await?;
//! println!("{} -> {}", report.sku, report.proposal.to_json());
//! ```

pub mod config;
pub mod constants;
pub mod db_adapter;
pub mod descriptors;
pub mod errors;
pub mod extract;
pub mod features;
pub mod model_adapter;
pub mod pipeline;
pub mod prompts;
pub mod proposal;
pub mod service;
mod task;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{GlobalConfig, IndexConfig, PipelineConfig, ServerConfig};
pub use descriptors::{describe_views, Brightness, DominantHue, VisualDescriptor};
pub use errors::{BrechoError, BrechoResult};
pub use extract::{extract_json_object, parse_proposal};
pub use features::{decode_views, pool, FeatureExtractor, PoolingMode};
pub use pipeline::{
    Deadline, EmptyReason, IntakePipeline, PipelineSettings, PipelineStage, ProposalSource,
    StageOutcome,
};
pub use proposal::{ConditionGrade, Proposal, ProposalValue, WellKnownKey};
pub use service::{CatalogItem, IndexedItem, IntakeReport, IntakeService, ServiceHealth};

// Collaborator types callers need to build requests.
pub use brecho_db::vector::{Metadata, MetadataValue, NeighborResult};
pub use brecho_model::{
    DevicePreference, EmbeddingConfig, EmbeddingProviderKind, ImageView, OracleConfig, SpeechConfig,
};
