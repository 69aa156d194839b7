//! Output formatting utilities for the CLI.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use console::{style, StyledObject};
use serde::Serialize;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to at most `max_len` characters, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Borderless list table with upper-cased headers.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Task and case status coloring.
pub fn colorize_status(status: &str) -> StyledObject<&str> {
    match status {
        "completed" | "passing" => style(status).green().bold(),
        "running" => style(status).yellow(),
        "created" | "uploaded" | "pending" => style(status).blue(),
        "failed" | "failing" => style(status).red().bold(),
        "stopped" => style(status).dim(),
        _ => style(status),
    }
}

pub fn label(name: &str) -> String {
    format!("{}{}", style(name).bold(), style(":").dim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer name", 8), "a lon...");
        assert_eq!(truncate("réentrancy", 6), "rée...");
    }

    #[test]
    fn test_list_table_headers() {
        let mut table = list_table(&["id", "name"]);
        table.add_row(vec!["1", "vault"]);
        let rendered = table.to_string();
        assert!(rendered.contains("ID"));
        assert!(rendered.contains("vault"));
    }
}
