//! Table formatting utilities for structured output.

use comfy_table::{Attribute, Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::pipeline::{IngestReport, QueryMatch};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Table of skipped images with the reason for each.
pub fn create_skipped_table(report: &IngestReport) -> String {
    report
        .skipped
        .iter()
        .fold(
            TableBuilder::new().set_headers(vec!["Image", "Kind", "Reason"]),
            |table, item| {
                table.add_row(vec![
                    item.source.display().to_string(),
                    item.error.kind().to_string(),
                    first_line(&item.error.to_string()),
                ])
            },
        )
        .build()
}

/// Table of query matches, best first.
pub fn create_matches_table(matches: &[QueryMatch], score_label: &str) -> String {
    matches
        .iter()
        .enumerate()
        .fold(
            TableBuilder::new().set_headers(vec!["#", "Id", "Image", score_label, "Description"]),
            |table, (rank, m)| {
                table.add_row(vec![
                    (rank + 1).to_string(),
                    m.id.clone(),
                    m.source.clone(),
                    format!("{:.4}", m.score),
                    m.description.clone(),
                ])
            },
        )
        .build()
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}
