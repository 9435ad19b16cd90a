//! Table rendering for CLI output using comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `brecho search` | `render_neighbors_table()` |
//! | `brecho intake` | `render_neighbors_table()`, `render_proposal_table()`, `render_descriptors_table()` |

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ColumnConstraint, Table, Width};

use brecho_core::{MetadataValue, NeighborResult, Proposal, VisualDescriptor};

use super::format::{format_price, metadata_cell, truncate_str};

/// Render similar catalog items, closest first.
///
/// # Example Output
///
/// ```text
/// #   SKU        DISTANCE   CATEGORY   BRAND   SIZE   PRICE
/// 1   X1            0.004   Vestido    Farm    M      R$ 120.00
/// 2   B7            0.231   Saia       Zara    P      -
/// ```
pub fn render_neighbors_table(neighbors: &[NeighborResult]) -> String {
    if neighbors.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("#"),
        Cell::new("SKU"),
        Cell::new("DISTANCE").set_alignment(CellAlignment::Right),
        Cell::new("CATEGORY"),
        Cell::new("BRAND"),
        Cell::new("SIZE"),
        Cell::new("PRICE").set_alignment(CellAlignment::Right),
    ]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(2)),  // #
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // SKU
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // DISTANCE
    ]);

    for (rank, n) in neighbors.iter().enumerate() {
        let price = match n.metadata.get("list_price") {
            Some(MetadataValue::Float(p)) => format_price(*p),
            Some(MetadataValue::Int(p)) => format_price(*p as f64),
            _ => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(truncate_str(&n.id, 36)),
            Cell::new(format!("{:.3}", n.distance)).set_alignment(CellAlignment::Right),
            Cell::new(truncate_str(&metadata_cell(n.metadata.get("category")), 20)),
            Cell::new(truncate_str(&metadata_cell(n.metadata.get("brand")), 20)),
            Cell::new(metadata_cell(n.metadata.get("size"))),
            Cell::new(price).set_alignment(CellAlignment::Right),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render proposal fields as `FIELD  VALUE` rows, values cut to `max_value`.
pub fn render_proposal_table(proposal: &Proposal, max_value: usize) -> String {
    if proposal.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![Cell::new("FIELD"), Cell::new("VALUE")]);

    for (key, value) in proposal.iter() {
        let text = value.render().replace('\n', " ");
        table.add_row(vec![Cell::new(key), Cell::new(truncate_str(&text, max_value))]);
    }

    table.trim_fmt().to_string()
}

/// Render the per-view visual descriptors of the fallback branch.
pub fn render_descriptors_table(descriptors: &[VisualDescriptor]) -> String {
    if descriptors.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("VIEW"),
        Cell::new("SIZE"),
        Cell::new("ASPECT").set_alignment(CellAlignment::Right),
        Cell::new("BRIGHTNESS"),
        Cell::new("HUE"),
        Cell::new("AVG RGB"),
    ]);

    for d in descriptors {
        let [r, g, b] = d.average_rgb;
        table.add_row(vec![
            Cell::new(&d.view),
            Cell::new(&d.dimensions),
            Cell::new(format!("{:.2}", d.aspect_ratio)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:?}", d.brightness).to_lowercase()),
            Cell::new(format!("{:?}", d.dominant_hue).to_lowercase()),
            Cell::new(format!("({}, {}, {})", r, g, b)),
        ]);
    }

    table.trim_fmt().to_string()
}
