//! Schema-flexible intake proposals.
//!
//! The oracle picks field names per item type, so a [`Proposal`] is a map
//! from field name to a small closed set of value shapes. A handful of
//! well-known keys are read defensively for prompt construction; every
//! other field is passed through untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// ConditionGrade
// ============================================================================

/// Wear grade of a second-hand item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionGrade {
    /// Perfect.
    #[serde(rename = "A")]
    A,
    /// Very good.
    #[serde(rename = "A-")]
    AMinus,
    /// Good, light signs of use.
    #[serde(rename = "B")]
    B,
    /// Visible wear.
    #[serde(rename = "C")]
    C,
}

impl ConditionGrade {
    /// Parse a grade. Accepts the bare letter, optionally followed by a
    /// separator and an explanation ("B - light pilling").
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_uppercase();
        let head: String = s
            .chars()
            .take_while(|c| c.is_ascii_alphabetic() || *c == '-')
            .collect();
        let head = head.trim_end_matches('-');
        let grade = match head {
            "A" if s.starts_with("A-") || s.starts_with("A−") => Self::AMinus,
            "A" => Self::A,
            "B" => Self::B,
            "C" => Self::C,
            _ => return None,
        };
        Some(grade)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::AMinus => "A-",
            Self::B => "B",
            Self::C => "C",
        }
    }
}

impl fmt::Display for ConditionGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ProposalValue
// ============================================================================

/// One field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProposalValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<ProposalValue>),
    /// Only produced for condition fields; serializes as its letter.
    Grade(ConditionGrade),
}

impl ProposalValue {
    /// Convert a decoded JSON value. `null` is treated as absent; nested
    /// objects are kept as compact JSON text.
    fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Flag(b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s)),
            Value::Array(items) => Some(Self::List(
                items.into_iter().filter_map(Self::from_json).collect(),
            )),
            Value::Object(map) => Some(Self::Text(Value::Object(map).to_string())),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable rendering, used in prompts and tables.
    pub fn render(&self) -> String {
        match self {
            Self::Grade(g) => g.to_string(),
            Self::Flag(b) => b.to_string(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
            Self::List(items) => items
                .iter()
                .map(ProposalValue::render)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl From<&str> for ProposalValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ProposalValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for ProposalValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<ConditionGrade> for ProposalValue {
    fn from(g: ConditionGrade) -> Self {
        Self::Grade(g)
    }
}

// ============================================================================
// WellKnownKey
// ============================================================================

/// Fields the pipeline reads when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownKey {
    Category,
    Brand,
    Condition,
    Description,
    Title,
    DetailedReport,
    EstimatedValue,
    PriceRange,
    PriceReason,
}

impl WellKnownKey {
    /// Accepted spellings, lowercase. English first, then Portuguese.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Category => &["category", "categoria"],
            Self::Brand => &["brand", "marca"],
            Self::Condition => &["condition", "condição", "condicao"],
            Self::Description => &["description", "descricaocompleta", "descrição", "descricao"],
            Self::Title => &["title", "tituloig", "titulo"],
            Self::DetailedReport => &["detailedreport", "relatoriodetalhado"],
            Self::EstimatedValue => &["estimatedvalue", "valorestimado"],
            Self::PriceRange => &["range", "faixa"],
            Self::PriceReason => &["reason", "motivo"],
        }
    }

    fn matches(&self, key: &str) -> bool {
        let key = key.trim().to_lowercase();
        self.aliases().contains(&key.as_str())
    }
}

// ============================================================================
// Proposal
// ============================================================================

/// Structured description produced for one intake item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Proposal {
    fields: BTreeMap<String, ProposalValue>,
}

impl Proposal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a decoded JSON object.
    ///
    /// Condition fields holding exactly a grade letter become
    /// [`ProposalValue::Grade`]; `null` fields are dropped.
    pub fn from_json_object(object: Map<String, Value>) -> Self {
        let fields = object
            .into_iter()
            .filter_map(|(key, value)| {
                let value = ProposalValue::from_json(value)?;
                let value = match value {
                    ProposalValue::Text(s) if WellKnownKey::Condition.matches(&key) => {
                        match ConditionGrade::parse(&s) {
                            Some(grade) if grade.as_str() == s.trim().to_uppercase() => {
                                ProposalValue::Grade(grade)
                            }
                            _ => ProposalValue::Text(s),
                        }
                    }
                    other => other,
                };
                Some((key, value))
            })
            .collect();
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Exact-key lookup.
    pub fn get(&self, key: &str) -> Option<&ProposalValue> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ProposalValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProposalValue)> {
        self.fields.iter()
    }

    /// Case-insensitive, alias-aware lookup of a well-known field.
    pub fn known(&self, key: WellKnownKey) -> Option<&ProposalValue> {
        self.fields
            .iter()
            .find(|(k, _)| key.matches(k))
            .map(|(_, v)| v)
    }

    /// Rendered value of a well-known field, absent when missing or blank.
    pub fn known_text(&self, key: WellKnownKey) -> Option<String> {
        self.known(key)
            .map(ProposalValue::render)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn category(&self) -> Option<String> {
        self.known_text(WellKnownKey::Category)
    }

    pub fn brand(&self) -> Option<String> {
        self.known_text(WellKnownKey::Brand)
    }

    pub fn condition(&self) -> Option<ConditionGrade> {
        match self.known(WellKnownKey::Condition)? {
            ProposalValue::Grade(g) => Some(*g),
            ProposalValue::Text(s) => ConditionGrade::parse(s),
            _ => None,
        }
    }

    /// Condition as the oracle wrote it, when it is not a clean grade.
    pub fn condition_text(&self) -> Option<String> {
        self.known_text(WellKnownKey::Condition)
    }

    pub fn description(&self) -> Option<String> {
        self.known_text(WellKnownKey::Description)
    }

    /// Convert back to a JSON object.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl FromIterator<(String, ProposalValue)> for Proposal {
    fn from_iter<I: IntoIterator<Item = (String, ProposalValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
