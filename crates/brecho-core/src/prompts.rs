//! Prompt construction for the three oracle calls.
//!
//! Every prompt asks for one strict JSON object. Field names are English;
//! the values are written in the configured language.

use serde::Serialize;
use serde_json::json;

use brecho_db::vector::NeighborResult;

use crate::descriptors::VisualDescriptor;
use crate::proposal::Proposal;

/// Fields requested from the intake analyses.
pub const INTAKE_FIELDS: &[&str] = &[
    "category",
    "subcategory",
    "brand",
    "gender",
    "size",
    "fit",
    "color",
    "fabric",
    "condition",
    "defects",
    "title",
    "tags",
    "description",
    "detailedReport",
    "estimatedValue",
];

/// A system + user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

fn field_list() -> String {
    INTAKE_FIELDS
        .iter()
        .map(|f| format!("\"{}\"", f))
        .collect::<Vec<_>>()
        .join(", ")
}

const GRADE_SCALE: &str =
    "condition must be one of: A (perfect), A- (very good), B (good, light signs of use), C (visible wear).";

const PRICE_BANDS: &str =
    "Typical second-hand bands: basics R$15-40, quality pieces R$40-120, premium R$100-300+.";

/// Primary multimodal analysis. The photos travel next to the prompt.
pub fn intake_prompt(language: &str, audio_hint: Option<&str>) -> Prompt {
    let system = format!(
        "You are an expert in visual analysis of second-hand clothing. \
         Describe only what is clearly visible in the photos and do not invent information. \
         Be precise about materials, garment type and condition. {} \
         Write every value in {}.",
        GRADE_SCALE, language
    );

    let mut user = format!(
        "Analyze the garment shown in the photos in as much detail as possible: \
         the specific type of piece, apparent fabric, colors and visual traits, \
         current condition, style and fit, and any other relevant detail. \
         Take observed quality and condition into account for pricing. {} \
         Return one JSON object with the keys: {}. \
         description is 2-3 sentences about the piece, its cut and occasions of use. \
         detailedReport is the full analysis of what you observed, including the \
         justification of estimatedValue.",
        PRICE_BANDS,
        field_list()
    );

    if let Some(hint) = audio_hint.map(str::trim).filter(|h| !h.is_empty()) {
        user.push_str(&format!(
            "\n\nThe person registering the item said: \"{}\". \
             Use it for details the photos cannot show (brand, size, fabric), \
             but trust the photos when they disagree.",
            hint
        ));
    }

    Prompt { system, user }
}

#[derive(Debug, Serialize)]
struct SimilarItem<'a> {
    id: &'a str,
    distance: f32,
    metadata: &'a brecho_db::vector::Metadata,
}

/// Text-only fallback analysis from descriptors and similar catalog items.
pub fn fallback_prompt(
    language: &str,
    photo_count: usize,
    descriptors: &[VisualDescriptor],
    neighbors: &[NeighborResult],
    audio_hint: Option<&str>,
) -> Prompt {
    let system = format!(
        "You are an expert at cataloguing clothes for a second-hand store. \
         You receive basic visual measurements of the photos and similar items \
         already in the catalog; use them to infer the piece as well as you can. \
         Return STRICT JSON with the keys: {}. \
         description is 2-3 sentences about the piece, its style, cut and occasions of use. \
         {} Write every value in {}.",
        field_list(),
        GRADE_SCALE,
        language
    );

    let similar: Vec<SimilarItem<'_>> = neighbors
        .iter()
        .map(|n| SimilarItem {
            id: &n.id,
            distance: n.distance,
            metadata: &n.metadata,
        })
        .collect();

    let mut context = json!({
        "instruction": "Use the basic characteristics to classify the piece",
        "photo_count": photo_count,
        "visual_features": descriptors,
        "similar_items": similar,
    });
    if let Some(hint) = audio_hint.filter(|h| !h.trim().is_empty()) {
        context["spoken_description"] = json!(hint.trim());
    }

    Prompt {
        system,
        user: format!("Data to standardize as valid JSON:\n{}", context),
    }
}

/// Price suggestion from the proposal's category, brand and condition.
pub fn price_prompt(language: &str, proposal: &Proposal) -> Prompt {
    let system = format!(
        "You are an expert in pricing for a premium second-hand store. \
         Weigh category, fabric quality, brand, condition and type of piece. \
         The store serves middle and upper-middle class customers. {} \
         Quality knitwear or sweatshirts in good condition start at R$40-80. \
         Return JSON: {{\"range\": \"R$min-R$max\", \"reason\": \"detailed justification\"}}. \
         Write the reason in {}.",
        PRICE_BANDS, language
    );

    let context = json!({
        "category": proposal.category(),
        "brand": proposal.brand(),
        "condition": proposal
            .condition()
            .map(|g| g.to_string())
            .or_else(|| proposal.condition_text()),
    });

    Prompt {
        system,
        user: format!("Pricing context:\n{}", context),
    }
}
