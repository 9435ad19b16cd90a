//! The intake analysis pipeline.
//!
//! ```text
//! PrimaryMultimodal ──produced──────────────────────────────┐
//!        │ empty                                            ▼
//!        └─> FallbackSummary ─> FallbackText ──────> PriceSuggestion ─> Done
//! ```
//!
//! Every oracle call ends in a [`StageOutcome`]: a non-empty proposal, or
//! empty with a reason. Transport failures, timeouts and unparsable answers
//! all land on the empty side and the pipeline moves on; nothing is retried.
//! The only hard failure is running out of the request [`Deadline`].

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use brecho_db::vector::NeighborResult;
use brecho_model::{ImageView, InferenceOracle, OracleRequest};

use crate::config::GlobalConfig;
use crate::db_adapter::IntoBrechoResult;
use crate::descriptors::{describe_views, VisualDescriptor};
use crate::errors::BrechoError;
use crate::extract::{extract_json_object, ExtractFailure};
use crate::prompts::{fallback_prompt, intake_prompt, price_prompt, Prompt};
use crate::proposal::Proposal;
use crate::task::run_blocking;

// ============================================================================
// Settings
// ============================================================================

/// Budgets and oracle knobs for one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub primary_timeout: Duration,
    pub fallback_timeout: Duration,
    pub price_timeout: Duration,
    /// Overall budget for one intake request.
    pub request_timeout: Duration,
    pub fallback_neighbor_count: usize,
    pub descriptor_thumbnail: u32,
    pub multimodal_temperature: f32,
    pub text_temperature: f32,
    pub language: String,
}

impl PipelineSettings {
    pub fn from_config(config: &GlobalConfig) -> Self {
        let p = &config.pipeline;
        Self {
            primary_timeout: Duration::from_secs(p.primary_timeout_secs),
            fallback_timeout: Duration::from_secs(p.fallback_timeout_secs),
            price_timeout: Duration::from_secs(p.price_timeout_secs),
            request_timeout: p.request_timeout(),
            fallback_neighbor_count: p.fallback_neighbor_count,
            descriptor_thumbnail: p.descriptor_thumbnail,
            multimodal_temperature: config.oracle.multimodal_temperature,
            text_temperature: config.oracle.text_temperature,
            language: config.oracle.language.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&GlobalConfig::default())
    }
}

// ============================================================================
// Deadline
// ============================================================================

/// Wall-clock budget shared by every stage of one request.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn starting_now(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The per-call timeout cut down to what is left, or `None` once the
    /// budget is spent.
    pub fn clamp(&self, per_call: Duration) -> Option<Duration> {
        let remaining = self.remaining();
        if remaining.is_zero() {
            None
        } else {
            Some(per_call.min(remaining))
        }
    }

    pub fn check(&self) -> Result<(), BrechoError> {
        if self.is_expired() {
            Err(self.exceeded())
        } else {
            Ok(())
        }
    }

    pub fn exceeded(&self) -> BrechoError {
        BrechoError::DeadlineExceeded { after: self.budget }
    }
}

// ============================================================================
// Stages and outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    PrimaryMultimodal,
    FallbackSummary,
    FallbackText,
    PriceSuggestion,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryMultimodal => "primary_multimodal",
            Self::FallbackSummary => "fallback_summary",
            Self::FallbackText => "fallback_text",
            Self::PriceSuggestion => "price_suggestion",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an oracle stage produced nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum EmptyReason {
    /// Transport error, timeout or error status.
    OracleFailed(String),
    /// The answer held no JSON object.
    NoObject,
    /// The JSON object did not decode.
    Malformed(String),
    /// A valid but empty object. Treated like a failure.
    EmptyObject,
    /// The photos could not be prepared for the oracle.
    ImagesUnavailable(String),
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OracleFailed(e) => write!(f, "oracle failed: {}", e),
            Self::NoObject => write!(f, "no JSON object in answer"),
            Self::Malformed(e) => write!(f, "malformed JSON: {}", e),
            Self::EmptyObject => write!(f, "empty JSON object"),
            Self::ImagesUnavailable(e) => write!(f, "photos unavailable: {}", e),
        }
    }
}

/// Result of one oracle stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Produced(Proposal),
    Empty { reason: EmptyReason },
}

impl StageOutcome {
    /// Classify raw oracle text. Only an object without keys counts as
    /// empty; keys whose values are all `null` still make a proposal.
    pub fn from_response(text: &str) -> Self {
        match extract_json_object(text) {
            Ok(object) if object.is_empty() => Self::Empty {
                reason: EmptyReason::EmptyObject,
            },
            Ok(object) => Self::Produced(Proposal::from_json_object(object)),
            Err(ExtractFailure::NoObject) => Self::Empty {
                reason: EmptyReason::NoObject,
            },
            Err(ExtractFailure::Malformed(e)) => Self::Empty {
                reason: EmptyReason::Malformed(e),
            },
        }
    }

    pub fn is_produced(&self) -> bool {
        matches!(self, Self::Produced(_))
    }

    /// The proposal, or an empty one.
    pub fn into_proposal(self) -> Proposal {
        match self {
            Self::Produced(p) => p,
            Self::Empty { .. } => Proposal::default(),
        }
    }

    fn summary(&self) -> String {
        match self {
            Self::Produced(p) => format!("produced {} fields", p.len()),
            Self::Empty { reason } => format!("empty ({})", reason),
        }
    }
}

/// Which branch produced the final proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalSource {
    Primary,
    Fallback,
}

/// One line of the stage trace.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: PipelineStage,
    /// Milliseconds since the request started.
    pub at_ms: u64,
    pub outcome: String,
}

// ============================================================================
// Pipeline
// ============================================================================

/// What the pipeline works from.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInput<'a> {
    pub views: &'a [ImageView],
    /// Nearest catalog items for the pooled vector, closest first.
    pub neighbors: &'a [NeighborResult],
    /// Transcribed spoken description, if any.
    pub audio_hint: Option<&'a str>,
}

/// What the pipeline produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub proposal: Proposal,
    pub source: ProposalSource,
    pub price_suggestion: Option<Proposal>,
    /// Filled when the fallback branch ran.
    pub descriptors: Vec<VisualDescriptor>,
    pub stages: Vec<StageRecord>,
}

/// One run of the intake state machine.
pub struct IntakePipeline<'a> {
    oracle: &'a dyn InferenceOracle,
    settings: &'a PipelineSettings,
    deadline: Deadline,
}

impl<'a> IntakePipeline<'a> {
    pub fn new(
        oracle: &'a dyn InferenceOracle,
        settings: &'a PipelineSettings,
        deadline: Deadline,
    ) -> Self {
        Self {
            oracle,
            settings,
            deadline,
        }
    }

    /// Run every stage in order.
    ///
    /// # Errors
    ///
    /// Only [`BrechoError::DeadlineExceeded`] (checked before each oracle
    /// call and once more at the end) and internal task failures.
    pub async fn run(&self, input: PipelineInput<'_>) -> Result<PipelineOutcome, BrechoError> {
        let mut stages = Vec::new();

        let primary = self.primary(input).await?;
        self.record(&mut stages, PipelineStage::PrimaryMultimodal, primary.summary());

        let (proposal, source, descriptors) = match primary {
            StageOutcome::Produced(proposal) => (proposal, ProposalSource::Primary, Vec::new()),
            StageOutcome::Empty { reason } => {
                info!("Primary analysis empty ({}), using fallback analysis", reason);

                let views = input.views.to_vec();
                let thumbnail = self.settings.descriptor_thumbnail;
                let descriptors =
                    run_blocking(move || Ok(describe_views(&views, thumbnail))).await?;
                self.record(
                    &mut stages,
                    PipelineStage::FallbackSummary,
                    format!("{} views described", descriptors.len()),
                );

                let fallback = self.fallback(input, &descriptors).await?;
                self.record(&mut stages, PipelineStage::FallbackText, fallback.summary());

                (fallback.into_proposal(), ProposalSource::Fallback, descriptors)
            }
        };

        let price = self.price(&proposal).await?;
        self.record(&mut stages, PipelineStage::PriceSuggestion, price.summary());
        let price_suggestion = match price {
            StageOutcome::Produced(p) => Some(p),
            StageOutcome::Empty { .. } => None,
        };

        self.deadline.check()?;
        self.record(
            &mut stages,
            PipelineStage::Done,
            format!("proposal from {:?} branch", source).to_lowercase(),
        );

        Ok(PipelineOutcome {
            proposal,
            source,
            price_suggestion,
            descriptors,
            stages,
        })
    }

    async fn primary(&self, input: PipelineInput<'_>) -> Result<StageOutcome, BrechoError> {
        self.deadline.check()?;

        let views = input.views.to_vec();
        let encoded = run_blocking(move || {
            views
                .iter()
                .map(|v| v.to_jpeg_base64())
                .collect::<Result<Vec<_>, _>>()
                .into_brecho_result()
        })
        .await;

        let images = match encoded {
            Ok(images) => images,
            Err(BrechoError::Internal(e)) => return Err(BrechoError::Internal(e)),
            Err(e) => {
                warn!("Could not encode photos for the oracle: {}", e);
                return Ok(StageOutcome::Empty {
                    reason: EmptyReason::ImagesUnavailable(e.to_string()),
                });
            }
        };

        let prompt = intake_prompt(&self.settings.language, input.audio_hint);
        let request = self
            .request(prompt, self.settings.multimodal_temperature)
            .with_images(images);
        self.consult(
            PipelineStage::PrimaryMultimodal,
            request,
            self.settings.primary_timeout,
        )
        .await
    }

    async fn fallback(
        &self,
        input: PipelineInput<'_>,
        descriptors: &[VisualDescriptor],
    ) -> Result<StageOutcome, BrechoError> {
        let take = self.settings.fallback_neighbor_count.min(input.neighbors.len());
        let prompt = fallback_prompt(
            &self.settings.language,
            input.views.len(),
            descriptors,
            &input.neighbors[..take],
            input.audio_hint,
        );
        let request = self.request(prompt, self.settings.text_temperature);
        self.consult(
            PipelineStage::FallbackText,
            request,
            self.settings.fallback_timeout,
        )
        .await
    }

    async fn price(&self, proposal: &Proposal) -> Result<StageOutcome, BrechoError> {
        let prompt = price_prompt(&self.settings.language, proposal);
        let request = self.request(prompt, self.settings.text_temperature);
        self.consult(
            PipelineStage::PriceSuggestion,
            request,
            self.settings.price_timeout,
        )
        .await
    }

    fn request(&self, prompt: Prompt, temperature: f32) -> OracleRequest {
        OracleRequest::text(prompt.system, prompt.user, temperature)
    }

    /// One oracle call. Failures become [`StageOutcome::Empty`].
    async fn consult(
        &self,
        stage: PipelineStage,
        request: OracleRequest,
        per_call: Duration,
    ) -> Result<StageOutcome, BrechoError> {
        let timeout = self
            .deadline
            .clamp(per_call)
            .ok_or_else(|| self.deadline.exceeded())?;

        debug!(
            "{}: asking '{}' (timeout {:.1}s, {} images)",
            stage,
            self.oracle.name(),
            timeout.as_secs_f64(),
            request.images.len()
        );

        match self.oracle.generate(request.with_timeout(timeout)).await {
            Ok(text) => Ok(StageOutcome::from_response(&text)),
            Err(e) => {
                warn!("{}: oracle call failed: {}", stage, e);
                Ok(StageOutcome::Empty {
                    reason: EmptyReason::OracleFailed(e.to_string()),
                })
            }
        }
    }

    fn record(&self, stages: &mut Vec<StageRecord>, stage: PipelineStage, outcome: String) {
        let at = self.deadline.elapsed();
        info!("[{:.1}s] {}: {}", at.as_secs_f64(), stage, outcome);
        stages.push(StageRecord {
            stage,
            at_ms: at.as_millis() as u64,
            outcome,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{neighbors, solid_view, ScriptedOracle};

    fn settings() -> PipelineSettings {
        PipelineSettings::default()
    }

    fn views() -> Vec<ImageView> {
        vec![solid_view(30, 40, [200, 20, 20]), solid_view(40, 30, [20, 20, 200])]
    }

    async fn run(
        oracle: &ScriptedOracle,
        settings: &PipelineSettings,
        budget: Duration,
        audio_hint: Option<&str>,
    ) -> Result<PipelineOutcome, BrechoError> {
        let views = views();
        let neighbors = neighbors(5);
        IntakePipeline::new(oracle, settings, Deadline::starting_now(budget))
            .run(PipelineInput {
                views: &views,
                neighbors: &neighbors,
                audio_hint,
            })
            .await
    }

    #[test]
    fn test_stage_outcome_classification() {
        assert!(StageOutcome::from_response("{\"Categoria\": \"Saia\"}").is_produced());
        assert_eq!(
            StageOutcome::from_response("sorry"),
            StageOutcome::Empty {
                reason: EmptyReason::NoObject
            }
        );
        assert_eq!(
            StageOutcome::from_response("{}"),
            StageOutcome::Empty {
                reason: EmptyReason::EmptyObject
            }
        );
        assert_eq!(
            StageOutcome::from_response("{\"a\": null}"),
            StageOutcome::Produced(Proposal::default())
        );
        assert!(matches!(
            StageOutcome::from_response("{oops}"),
            StageOutcome::Empty {
                reason: EmptyReason::Malformed(_)
            }
        ));
    }

    #[test]
    fn test_deadline_clamp() {
        let deadline = Deadline::starting_now(Duration::from_secs(10));
        let clamped = deadline.clamp(Duration::from_secs(300)).unwrap();
        assert!(clamped <= Duration::from_secs(10));
        assert_eq!(
            deadline.clamp(Duration::from_secs(1)),
            Some(Duration::from_secs(1))
        );

        let spent = Deadline::starting_now(Duration::ZERO);
        assert!(spent.clamp(Duration::from_secs(1)).is_none());
        assert!(matches!(
            spent.check(),
            Err(BrechoError::DeadlineExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let oracle = ScriptedOracle::new([
            Some("Análise: {\"Categoria\": \"Vestido\", \"Marca\": \"Farm\", \"Condição\": \"A\"}"),
            Some("{\"Faixa\": \"R$80-120\", \"Motivo\": \"marca conhecida\"}"),
        ]);
        let out = run(&oracle, &settings(), Duration::from_secs(60), None)
            .await
            .unwrap();

        assert_eq!(out.source, ProposalSource::Primary);
        assert_eq!(out.proposal.category().as_deref(), Some("Vestido"));
        assert!(out.descriptors.is_empty());
        let price = out.price_suggestion.unwrap();
        assert_eq!(
            price
                .known_text(crate::proposal::WellKnownKey::PriceRange)
                .as_deref(),
            Some("R$80-120")
        );

        let requests = oracle.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].images.len(), 2);
        assert!(requests[1].images.is_empty());
        assert!(requests[1].prompt.contains("\"category\":\"Vestido\""));
        assert!(requests[1].prompt.contains("\"brand\":\"Farm\""));
        assert!(requests[1].prompt.contains("\"condition\":\"A\""));

        let stages: Vec<_> = out.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                PipelineStage::PrimaryMultimodal,
                PipelineStage::PriceSuggestion,
                PipelineStage::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_unparsable_primary_uses_fallback_fields() {
        let oracle = ScriptedOracle::new([
            Some("I'm sorry, I cannot analyze these images."),
            Some("```json\n{\"category\": \"Camisa\", \"color\": \"azul\"}\n```"),
            Some("{\"range\": \"R$30-50\", \"reason\": \"básica\"}"),
        ]);
        let out = run(&oracle, &settings(), Duration::from_secs(60), None)
            .await
            .unwrap();

        assert_eq!(out.source, ProposalSource::Fallback);
        assert_eq!(out.proposal.category().as_deref(), Some("Camisa"));
        assert_eq!(out.proposal.len(), 2);
        assert_eq!(out.descriptors.len(), 2);
        assert!(out.price_suggestion.is_some());

        let requests = oracle.requests();
        assert_eq!(requests.len(), 3);
        let fallback = &requests[1];
        assert!(fallback.images.is_empty());
        assert!(fallback.prompt.contains("SKU-2"));
        assert!(!fallback.prompt.contains("SKU-3"), "only 3 neighbors go to the fallback");
        assert!(fallback.prompt.contains("photo_2"));
    }

    #[tokio::test]
    async fn test_primary_with_only_null_fields_is_kept() {
        let oracle = ScriptedOracle::new([
            Some("{\"Categoria\": null, \"Marca\": null}"),
            Some("{\"Faixa\": \"R$20-40\"}"),
        ]);
        let out = run(&oracle, &settings(), Duration::from_secs(60), None)
            .await
            .unwrap();

        assert_eq!(out.source, ProposalSource::Primary);
        assert!(out.proposal.is_empty());
        assert!(out.descriptors.is_empty());
        assert!(out.price_suggestion.is_some());
        assert_eq!(oracle.requests().len(), 2, "no fallback call");
    }

    #[tokio::test]
    async fn test_everything_empty_still_terminates() {
        let oracle = ScriptedOracle::new([None, Some("{}"), Some("no idea")]);
        let out = run(&oracle, &settings(), Duration::from_secs(60), None)
            .await
            .unwrap();

        assert_eq!(out.source, ProposalSource::Fallback);
        assert!(out.proposal.is_empty());
        assert!(out.price_suggestion.is_none());
        assert_eq!(oracle.requests().len(), 3);
        assert!(oracle.requests()[2].prompt.contains("\"category\":null"));
    }

    #[tokio::test]
    async fn test_empty_object_from_primary_falls_back() {
        let oracle = ScriptedOracle::new([
            Some("{}"),
            Some("{\"category\": \"Bolsa\"}"),
            Some("{\"range\": \"R$40-60\"}"),
        ]);
        let out = run(&oracle, &settings(), Duration::from_secs(60), None)
            .await
            .unwrap();
        assert_eq!(out.source, ProposalSource::Fallback);
        assert_eq!(out.proposal.category().as_deref(), Some("Bolsa"));
    }

    #[tokio::test]
    async fn test_spent_deadline_fails_before_calling_oracle() {
        let oracle = ScriptedOracle::new([Some("{\"category\": \"x\"}")]);
        let err = run(&oracle, &settings(), Duration::ZERO, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BrechoError::DeadlineExceeded { .. }));
        assert!(oracle.requests().is_empty());
    }

    #[tokio::test]
    async fn test_per_call_timeout_clamped_to_budget() {
        let oracle = ScriptedOracle::new([Some("{\"category\": \"Tênis\"}"), Some("{}")]);
        run(&oracle, &settings(), Duration::from_secs(5), None)
            .await
            .unwrap();

        let requests = oracle.requests();
        assert!(requests[0].timeout <= Duration::from_secs(5));
        assert!(requests[1].timeout <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_audio_hint_reaches_primary_prompt() {
        let oracle = ScriptedOracle::new([Some("{\"category\": \"Calça\"}"), Some("{}")]);
        run(
            &oracle,
            &settings(),
            Duration::from_secs(60),
            Some("calça jeans 42"),
        )
        .await
        .unwrap();
        assert!(oracle.requests()[0].prompt.contains("calça jeans 42"));
    }

    #[tokio::test]
    async fn test_temperatures_per_stage() {
        let oracle = ScriptedOracle::new([None, None, None]);
        run(&oracle, &settings(), Duration::from_secs(60), None)
            .await
            .unwrap();
        let requests = oracle.requests();
        assert!((requests[0].temperature - 0.3).abs() < 1e-6);
        assert!((requests[1].temperature - 0.2).abs() < 1e-6);
        assert!((requests[2].temperature - 0.2).abs() < 1e-6);
    }
}
