//! Table and JSON rendering for the report commands.

use std::fmt::Display;

use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use flow_analysis::paths::PathSearch;
use flow_analysis::Ranked;
use serde::Serialize;

const NO_ACTIVITY: &str = "  (no activity)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Table,
    Json,
}

impl Output {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "table" => Ok(Output::Table),
            "json" => Ok(Output::Json),
            _ => Err(eyre!(
                "unknown output format '{}'; use 'table' or 'json'",
                value
            )),
        }
    }
}

pub fn json<T: Serialize>(value: &T) -> Result<()> {
    let json_str = serde_json::to_string_pretty(value).wrap_err("failed to serialize JSON")?;
    println!("{}", json_str);
    Ok(())
}

pub fn table<H: Into<comfy_table::Row>>(header: H) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(header);
    table
}

/// Prints a titled table, or the placeholder when it has no rows.
pub fn section(title: &str, table: &Table, rows: usize) {
    println!("► {title}");
    if rows == 0 {
        println!("{NO_ACTIVITY}\n");
    } else {
        println!("{table}\n");
    }
}

pub fn ranked<V: Display>(title: &str, value_header: &str, rows: &[Ranked<V>]) {
    let mut t = table(vec!["#", "Address", value_header]);
    for (i, row) in rows.iter().enumerate() {
        t.add_row(vec![
            (i + 1).to_string(),
            row.address.clone(),
            row.value.to_string(),
        ]);
    }
    section(title, &t, rows.len());
}

/// One address sequence per row, joined with arrows.
pub fn paths(title: &str, search: &PathSearch<Vec<String>>) {
    let mut t = table(vec!["#", "Hops", "Path"]);
    for (i, path) in search.results.iter().enumerate() {
        t.add_row(vec![
            (i + 1).to_string(),
            path.len().saturating_sub(1).to_string(),
            path.join(" → "),
        ]);
    }
    section(title, &t, search.results.len());
    truncation(search.truncated, search.results.len(), search.unsearched_starts);
}

pub fn truncation(truncated: bool, results: usize, unsearched: usize) {
    if truncated {
        println!(
            "More results exist beyond the first {results}; {unsearched} start points were not searched.\n"
        );
    }
}
