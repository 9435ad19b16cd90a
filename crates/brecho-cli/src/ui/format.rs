//! Formatting utilities for CLI output.

use brecho_core::MetadataValue;

/// Truncate to at most `max_len` characters, ending in `...` when cut.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        ".".repeat(max_len)
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

/// Milliseconds as `850ms`, `12.4s` or `3m 05s`.
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}m {:02}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}

/// A list price in reais.
pub fn format_price(price: f64) -> String {
    format!("R$ {:.2}", price)
}

/// Metadata value for a table cell; null becomes `-`.
pub fn metadata_cell(value: Option<&MetadataValue>) -> String {
    match value {
        None | Some(MetadataValue::Null) => "-".to_string(),
        Some(MetadataValue::Text(s)) if s.trim().is_empty() => "-".to_string(),
        Some(MetadataValue::Text(s)) => s.clone(),
        Some(MetadataValue::Float(f)) => format!("{}", f),
        Some(MetadataValue::Int(i)) => i.to_string(),
        Some(MetadataValue::Bool(b)) => b.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("vestido", 10), "vestido");
        assert_eq!(truncate_str("vestido midi", 8), "vesti...");
        assert_eq!(truncate_str("camisa", 3), "...");
        assert_eq!(truncate_str("condição ótima", 9), "condiç...");
    }

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(850), "850ms");
        assert_eq!(format_duration_ms(12_400), "12.4s");
        assert_eq!(format_duration_ms(185_000), "3m 05s");
    }

    #[test]
    fn test_metadata_cell() {
        assert_eq!(metadata_cell(None), "-");
        assert_eq!(metadata_cell(Some(&MetadataValue::Null)), "-");
        assert_eq!(metadata_cell(Some(&MetadataValue::from("Farm"))), "Farm");
        assert_eq!(metadata_cell(Some(&MetadataValue::from(89.9))), "89.9");
        assert_eq!(format_price(89.9), "R$ 89.90");
    }
}
