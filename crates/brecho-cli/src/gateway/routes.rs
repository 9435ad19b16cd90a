//! Gateway handlers.
//!
//! Photo uploads are `multipart/form-data` with one part per photo (`image`
//! or `images`); vector endpoints take JSON.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use brecho_core::{
    CatalogItem, IntakeReport, IntakeService, Metadata, NeighborResult, ServiceHealth,
    WellKnownKey,
};

use super::error::{ApiError, ApiResult};

pub type AppState = Arc<IntakeService>;

// ============================================================================
// Multipart form
// ============================================================================

/// Parts of an upload, split into photos, audio and text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub images: Vec<Vec<u8>>,
    pub audio: Option<Vec<u8>>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" | "images" => {
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        form.images.push(bytes.to_vec());
                    }
                }
                "audio" => {
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        form.audio = Some(bytes.to_vec());
                    }
                }
                _ => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    /// A text field, trimmed; blank counts as absent.
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn parse<T: FromStr>(&self, key: &str) -> ApiResult<Option<T>> {
        match self.text(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| ApiError::BadRequest(format!("field '{}' is not valid: {}", key, raw))),
        }
    }

    fn catalog_item(&self) -> ApiResult<CatalogItem> {
        Ok(CatalogItem {
            sku: self.text("sku"),
            consignor_id: self.text("consignor_id"),
            category: self.text("category"),
            brand: self.text("brand"),
            size: self.text("size"),
            condition: self.text("condition"),
            list_price: self.parse("list_price")?,
            extras_json: self.text("extras_json"),
        })
    }
}

// ============================================================================
// Bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    #[serde(flatten)]
    pub health: ServiceHealth,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<NeighborResult>,
}

#[derive(Debug, Deserialize)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    #[serde(default)]
    pub top_k: Option<i64>,
}

/// Requested neighbor count; zero or negative asks for nothing.
fn neighbor_count(requested: Option<i64>, default: usize) -> usize {
    match requested {
        None => default,
        Some(k) => usize::try_from(k).unwrap_or(0),
    }
}

#[derive(Debug, Deserialize)]
pub struct VectorUpsert {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Serialize)]
pub struct UpsertResponse {
    pub ok: bool,
    pub sku: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// The intake report plus the long-form texts pulled out of the proposal.
#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    #[serde(flatten)]
    pub report: IntakeReport,
    pub description: Option<String>,
    pub detailed_report: Option<String>,
    pub estimated_value: Option<String>,
}

impl From<IntakeReport> for IntakeResponse {
    fn from(report: IntakeReport) -> Self {
        let proposal = &report.proposal;
        let description = proposal.description();
        let detailed_report = proposal.known_text(WellKnownKey::DetailedReport);
        let estimated_value = proposal.known_text(WellKnownKey::EstimatedValue);
        Self {
            report,
            description,
            detailed_report,
            estimated_value,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health(State(service): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy",
        service: "brecho-gateway",
        version: env!("CARGO_PKG_VERSION"),
        health: service.health().await?,
    }))
}

pub async fn search_by_image(
    State(service): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SearchResponse>> {
    let form = UploadForm::read(multipart).await?;
    let top_k = neighbor_count(
        form.parse::<i64>("top_k")?,
        service.config().pipeline.neighbor_count,
    );

    let views = service.decode_images(form.images).await?;
    let results = service.search_by_images(views, top_k).await?;
    Ok(Json(SearchResponse { results }))
}

pub async fn search_by_vector(
    State(service): State<AppState>,
    Json(query): Json<VectorQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let top_k = neighbor_count(query.top_k, service.config().pipeline.neighbor_count);
    let results = service.search_by_vector(query.vector, top_k).await?;
    Ok(Json(SearchResponse { results }))
}

pub async fn index_upsert(
    State(service): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<UpsertResponse>> {
    let form = UploadForm::read(multipart).await?;
    let item = form.catalog_item()?;

    let views = service.decode_images(form.images).await?;
    let indexed = service.index_item(views, item).await?;
    Ok(Json(UpsertResponse {
        ok: true,
        sku: indexed.id,
        metadata: Some(indexed.metadata),
    }))
}

pub async fn index_upsert_vector(
    State(service): State<AppState>,
    Json(body): Json<VectorUpsert>,
) -> ApiResult<Json<UpsertResponse>> {
    service
        .upsert(body.id.clone(), body.vector, body.metadata)
        .await?;
    Ok(Json(UpsertResponse {
        ok: true,
        sku: body.id,
        metadata: None,
    }))
}

pub async fn intake_autoregister(
    State(service): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<IntakeResponse>> {
    let form = UploadForm::read(multipart).await?;
    let views = service.decode_images(form.images).await?;
    let report = service.run_intake_pipeline(views, form.audio).await?;
    Ok(Json(report.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbor_count() {
        assert_eq!(neighbor_count(None, 5), 5);
        assert_eq!(neighbor_count(Some(3), 5), 3);
        assert_eq!(neighbor_count(Some(0), 5), 0);
        assert_eq!(neighbor_count(Some(-1), 5), 0);
    }
}
