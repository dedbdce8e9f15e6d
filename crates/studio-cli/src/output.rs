//! Terminal output formatting.

use colored::Colorize;
use serde_json::Value as JsonValue;
use studio_core::ParsedResult;
use studio_graph::{ClientInfo, GatewayError, StatementResult};
use unicode_width::UnicodeWidthStr;

const MIN_COLUMN_WIDTH: usize = 6;

/// Print the outcome of one statement.
pub fn print_statement_result(result: &StatementResult) {
    println!("{} {}", ">".dimmed(), result.statement.bold());
    match &result.outcome {
        Ok(parsed) => print_result(parsed),
        Err(err) => print_error(err),
    }
    println!();
}

pub fn print_error(err: &GatewayError) {
    println!("{} {} {}", "✗".red().bold(), err.code().red(), err);
    if err.requires_relogin() {
        println!("  {}", "Log in again to continue.".dimmed());
    }
}

/// Print a decoded result as a table, followed by a summary line.
pub fn print_result(parsed: &ParsedResult) {
    if parsed.headers.is_empty() {
        println!("{}", "Execution succeeded".green());
    } else {
        print_table(parsed);
    }

    let mut summary = format!("{} row(s)", parsed.rows.len());
    if !parsed.vertices.is_empty() || !parsed.edges.is_empty() || !parsed.paths.is_empty() {
        summary.push_str(&format!(
            ", {} vertices, {} edges, {} paths",
            parsed.vertices.len(),
            parsed.edges.len(),
            parsed.paths.len()
        ));
    }
    summary.push_str(&format!(" ({} us)", parsed.time_cost));
    println!("{}", summary.dimmed());
}

fn print_table(parsed: &ParsedResult) {
    let rows: Vec<Vec<String>> = parsed
        .rows
        .iter()
        .map(|row| {
            parsed
                .headers
                .iter()
                .map(|h| row.get(h).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths = column_widths(&parsed.headers, &rows, term_width());

    let border = |left: &str, mid: &str, right: &str| {
        let inner: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("{left}{}{right}", inner.join(mid)).dimmed()
    };

    println!("{}", border("┌", "┬", "┐"));
    let header: Vec<String> = parsed
        .headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| pad_right(&truncate_visual(h, *w), *w).bold().to_string())
        .collect();
    println!("│ {} │", header.join(" │ "));
    println!("{}", border("├", "┼", "┤"));
    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| pad_right(&truncate_visual(cell, *w), *w))
            .collect();
        println!("│ {} │", cells.join(" │ "));
    }
    println!("{}", border("└", "┴", "┘"));
}

pub fn print_clients(clients: &[ClientInfo]) {
    if clients.is_empty() {
        println!("{}", "No clients connected.".dimmed());
        return;
    }

    println!(
        "{:<10} {:<22} {:<12} {:>6} {:>5} {:>7}",
        "ID", "Host", "User", "Idle", "Busy", "Idle(s)"
    );
    println!("{}", "─".repeat(67));
    for client in clients {
        println!(
            "{:<10} {:<22} {:<12} {:>6} {:>5} {:>7}",
            client.client_id.get(..8).unwrap_or(&client.client_id),
            truncate_visual(&client.host, 22),
            truncate_visual(&client.username, 12),
            client.sessions.idle,
            client.sessions.active,
            client.idle_secs
        );
    }
}

fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.replace('\n', "\\n"),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Fit columns to the terminal, shrinking the widest first.
fn column_widths(headers: &[String], rows: &[Vec<String>], available: usize) -> Vec<usize> {
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|h| UnicodeWidthStr::width(h.as_str()))
        .collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(UnicodeWidthStr::width(cell.as_str()));
        }
    }

    // Each column costs its width plus three border characters.
    let budget = available.saturating_sub(1);
    while widths.iter().map(|w| w + 3).sum::<usize>() > budget {
        let Some(widest) = widths.iter_mut().max() else {
            break;
        };
        if *widest <= MIN_COLUMN_WIDTH {
            break;
        }
        *widest -= 1;
    }
    widths
}

/// Get terminal width, defaulting to 120.
fn term_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(120)
}

/// Pad a plain string to a given visual width (right-padded).
fn pad_right(s: &str, width: usize) -> String {
    let visual = UnicodeWidthStr::width(s);
    if visual >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - visual))
    }
}

/// Truncate a string respecting visual width.
fn truncate_visual(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width <= 3 {
        return ".".repeat(max_width);
    }
    let mut result = String::new();
    let mut current_width = 0;
    for ch in s.chars() {
        let ch_width = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if current_width + ch_width > max_width - 2 {
            break;
        }
        result.push(ch);
        current_width += ch_width;
    }
    result.push_str("..");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_visual() {
        assert_eq!(truncate_visual("short", 10), "short");
        assert_eq!(truncate_visual("a long cell value", 8), "a long..");
        assert_eq!(truncate_visual("abcdef", 3), "...");
    }

    #[test]
    fn test_column_widths_shrink_widest() {
        let headers = vec!["id".to_string(), "name".to_string()];
        let rows = vec![vec!["1".to_string(), "x".repeat(100)]];
        let widths = column_widths(&headers, &rows, 40);
        assert_eq!(widths[0], 2);
        assert!(widths.iter().map(|w| w + 3).sum::<usize>() <= 39);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&JsonValue::from("a\nb")), "a\\nb");
        assert_eq!(cell_text(&JsonValue::from(3)), "3");
        assert_eq!(cell_text(&JsonValue::Null), "");
    }
}
