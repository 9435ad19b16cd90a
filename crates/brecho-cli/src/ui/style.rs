//! Message styling for CLI output.
//!
//! | Prefix | Meaning | Color |
//! |--------|---------|-------|
//! | `[ok]` | Success | Green |
//! | `[err]` | Error | Red |
//! | `[warn]` | Warning | Yellow |
//! | `[info]` | Information | Blue |
//! | `[hint]` | Suggestion | Cyan |

use owo_colors::{AnsiColors, OwoColorize};

use brecho_core::{ConditionGrade, ProposalSource};

use super::color::ColorMode;

/// Message severity/type for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Err,
    Warn,
    Info,
    Hint,
}

impl MessageType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ok => "[ok]",
            Self::Err => "[err]",
            Self::Warn => "[warn]",
            Self::Info => "[info]",
            Self::Hint => "[hint]",
        }
    }
}

/// Main styling interface for CLI output.
#[derive(Debug, Clone)]
pub struct Style {
    color_mode: ColorMode,
}

impl Style {
    pub fn new(color_mode: ColorMode) -> Self {
        Self { color_mode }
    }

    pub fn colors_enabled(&self) -> bool {
        self.color_mode.is_enabled()
    }

    fn tint(&self, text: &str, color: AnsiColors) -> String {
        if self.colors_enabled() {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    /// `[ok] Indexed X1` and friends.
    pub fn message(&self, msg_type: MessageType, text: &str) -> String {
        let color = match msg_type {
            MessageType::Ok => AnsiColors::Green,
            MessageType::Err => AnsiColors::Red,
            MessageType::Warn => AnsiColors::Yellow,
            MessageType::Info => AnsiColors::Blue,
            MessageType::Hint => AnsiColors::Cyan,
        };
        format!("{} {}", self.tint(msg_type.prefix(), color), text)
    }

    /// Indented to line up under a message's text.
    pub fn message_detail(&self, label: &str, value: &str) -> String {
        format!("     {}: {}", label, value)
    }

    pub fn section(&self, title: &str) -> String {
        if self.colors_enabled() {
            title.bold().to_string()
        } else {
            title.to_string()
        }
    }

    pub fn error_with_context(&self, msg: &str, cause: Option<&str>, hint: Option<&str>) -> String {
        let mut lines = vec![self.message(MessageType::Err, msg)];
        lines.extend(cause.map(|c| format!("      Cause: {}", c)));
        lines.extend(hint.map(|h| format!("      Hint: {}", h)));
        lines.join("\n")
    }

    pub fn key_value(&self, key: &str, value: &str) -> String {
        if self.colors_enabled() {
            format!("{}: {}", key.dimmed(), value)
        } else {
            format!("{}: {}", key, value)
        }
    }

    pub fn sku(&self, sku: &str) -> String {
        self.tint(sku, AnsiColors::Yellow)
    }

    /// Green below 0.15, yellow below 0.35, red beyond.
    pub fn distance(&self, value: f32) -> String {
        let color = match value {
            v if v < 0.15 => AnsiColors::Green,
            v if v < 0.35 => AnsiColors::Yellow,
            _ => AnsiColors::Red,
        };
        self.tint(&format!("{:.3}", value), color)
    }

    pub fn grade(&self, grade: ConditionGrade) -> String {
        let color = match grade {
            ConditionGrade::A | ConditionGrade::AMinus => AnsiColors::Green,
            ConditionGrade::B => AnsiColors::Yellow,
            ConditionGrade::C => AnsiColors::Red,
        };
        self.tint(grade.as_str(), color)
    }

    pub fn source(&self, source: ProposalSource) -> String {
        match source {
            ProposalSource::Primary => "primary".to_string(),
            ProposalSource::Fallback => self.tint("fallback", AnsiColors::Yellow),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Style {
        Style::new(ColorMode::Never)
    }

    #[test]
    fn test_message_no_color() {
        assert_eq!(plain().message(MessageType::Ok, "Indexed"), "[ok] Indexed");
        assert_eq!(plain().message(MessageType::Warn, "Slow"), "[warn] Slow");
    }

    #[test]
    fn test_error_with_context() {
        let output = plain().error_with_context(
            "Failed to open index",
            Some("permission denied"),
            Some("Check index.path"),
        );
        assert!(output.starts_with("[err] Failed to open index"));
        assert!(output.contains("Cause: permission denied"));
        assert!(output.contains("Hint: Check index.path"));
    }

    #[test]
    fn test_plain_values() {
        let style = plain();
        assert_eq!(style.distance(0.12345), "0.123");
        assert_eq!(style.grade(ConditionGrade::AMinus), "A-");
        assert_eq!(style.source(ProposalSource::Fallback), "fallback");
        assert_eq!(style.key_value("SKU", "X1"), "SKU: X1");
        assert_eq!(style.message_detail("Photos", "3"), "     Photos: 3");
    }
}
