// Output formatting utilities

use crate::engine::AssignOutcome;
use crate::index::{ConservationReport, IndexedLot, StageSummary};
use crate::models::{HistoryEntry, Lot, LotFlags, StageGraph};
use crate::utils::{format_duration, format_timestamp};
use std::collections::HashMap;
use std::io::IsTerminal;

// ANSI escape codes for terminal formatting
const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_RESET: &str = "\x1b[0m";
const ANSI_FG_RED: &str = "\x1b[31m";

/// Narrowest a truncated text column may get
const MIN_TEXT_COLUMN: usize = 8;

/// Check if stdout is a terminal (TTY)
pub fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

/// Get terminal width dynamically
///
/// Uses the `terminal_size` crate for reliable detection, with fallback to
/// COLUMNS environment variable and a sensible default.
pub fn get_terminal_width() -> usize {
    if let Some((terminal_size::Width(w), _)) = terminal_size::terminal_size() {
        if w > 0 {
            return w as usize;
        }
    }

    if let Ok(cols) = std::env::var("COLUMNS") {
        if let Ok(width) = cols.parse::<usize>() {
            if width > 0 && width < 10000 { // Sanity check
                return width;
            }
        }
    }

    120
}

/// Apply bold formatting if in TTY mode
fn bold_if_tty(text: &str, is_tty: bool) -> String {
    if is_tty {
        format!("{}{}{}", ANSI_BOLD, text, ANSI_RESET)
    } else {
        text.to_string()
    }
}

fn red_if_tty(text: &str, is_tty: bool) -> String {
    if is_tty {
        format!("{}{}{}", ANSI_FG_RED, text, ANSI_RESET)
    } else {
        text.to_string()
    }
}

/// Truncate to `width` characters, marking the cut with `~`
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('~');
    out
}

/// Lay out rows as aligned columns.
///
/// Columns listed in `shrinkable` give up width (widest first) until the
/// table fits `max_width`.
fn render_table(headers: &[&str], rows: &[Vec<String>], shrinkable: &[usize], max_width: usize) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let separators = widths.len().saturating_sub(1);
    loop {
        let total: usize = widths.iter().sum::<usize>() + separators;
        if total <= max_width {
            break;
        }
        let widest = shrinkable
            .iter()
            .copied()
            .filter(|&i| widths[i] > MIN_TEXT_COLUMN)
            .max_by_key(|&i| widths[i]);
        match widest {
            Some(i) => widths[i] -= 1,
            None => break,
        }
    }

    let tty = is_tty();
    let mut output = String::new();
    let header_line = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:<width$}", truncate(h, widths[i]), width = widths[i]))
        .collect::<Vec<_>>()
        .join(" ");
    output.push_str(&bold_if_tty(header_line.trim_end(), tty));
    output.push('\n');

    for row in rows {
        let line = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", truncate(cell, widths[i]), width = widths[i]))
            .collect::<Vec<_>>()
            .join(" ");
        output.push_str(line.trim_end());
        output.push('\n');
    }
    output
}

/// Format index rows as a table
pub fn format_lot_table(rows: &[IndexedLot]) -> String {
    let headers = ["ID", "Code", "Stage", "Qty", "Done", "Pending", "Status", "Party", "Product", "Entered", "Flags"];
    let tty = is_tty();

    let table_rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let lot = &row.lot;
            let mut flags = String::new();
            if row.flags.urgent {
                flags.push('!');
            }
            if row.flags.has_remark() {
                flags.push('*');
            }
            if lot.split_id.is_some() {
                flags.push('/');
            }
            vec![
                lot.id.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string()),
                lot.unique_code.clone(),
                lot.stage.as_str().to_string(),
                lot.qty.to_string(),
                lot.qty_executed.to_string(),
                row.qty_pending.to_string(),
                row.status.as_str().to_string(),
                lot.party.clone(),
                lot.product_code.clone(),
                lot.entry_date.clone(),
                flags,
            ]
        })
        .collect();

    let mut output = render_table(&headers, &table_rows, &[1, 7, 8], get_terminal_width());
    let urgent = rows.iter().filter(|row| row.flags.urgent).count();
    output.push_str(&format!("\n{} lot(s)", rows.len()));
    if urgent > 0 {
        output.push_str(&format!(", {}", red_if_tty(&format!("{} urgent", urgent), tty)));
    }
    output.push('\n');
    output
}

/// Format the detailed view of one lot
pub fn format_lot_summary(lot: &Lot, flags: &LotFlags, history: &[HistoryEntry]) -> String {
    let mut output = String::new();
    let now = chrono::Utc::now().timestamp();

    let header = format!(
        "Lot {}: {} at {}",
        lot.id.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string()),
        lot.unique_code,
        lot.stage
    );
    output.push_str(&header);
    output.push('\n');
    output.push_str(&"=".repeat(header.len().max(60)));
    output.push_str("\n\n");

    output.push_str(&format!("Status: {}\n", lot.status().as_str()));
    output.push_str(&format!("Created: {}\n", format_timestamp(lot.created_ts)));
    output.push_str(&format!("Modified: {}\n\n", format_timestamp(lot.modified_ts)));

    output.push_str("Quantity:\n");
    output.push_str(&format!("  Order:       {}\n", lot.parent_order_qty));
    output.push_str(&format!("  This lot:    {}\n", lot.qty));
    output.push_str(&format!("  Executed:    {}\n", lot.qty_executed));
    output.push_str(&format!("  Pending:     {}\n\n", lot.qty_pending()));

    output.push_str("Attributes:\n");
    output.push_str(&format!("  Party:       {}\n", or_none(&lot.party)));
    output.push_str(&format!("  Product:     {}\n", or_none(&lot.product_code)));
    output.push_str(&format!("  Entered:     {}\n", or_none(&lot.entry_date)));
    match lot.parent_lot_id {
        Some(parent) => output.push_str(&format!("  From lot:    {}\n", parent)),
        None => output.push_str("  From lot:    (none)\n"),
    }
    output.push_str(&format!("  Split:       {}\n", lot.split_id.as_deref().unwrap_or("(none)")));
    output.push_str(&format!("  Urgent:      {}\n", if flags.urgent { "yes" } else { "no" }));
    output.push_str(&format!("  Remark:      {}\n", or_none(&flags.remark)));

    if !lot.attrs.is_empty() {
        output.push_str("\nSpecifications:\n");
        let mut keys: Vec<&String> = lot.attrs.keys().collect();
        keys.sort();
        for key in keys {
            output.push_str(&format!("  {}: {}\n", key, lot.attrs[key]));
        }
    }

    let next = StageGraph::successors(lot.stage);
    if !next.is_empty() {
        let slugs: Vec<&str> = next.iter().map(|s| s.as_str()).collect();
        output.push_str(&format!("\nNext stages: {}\n", slugs.join(", ")));
    }

    if let Some(entry) = history.last() {
        output.push_str(&format!(
            "\nAt {} for {}{}\n",
            entry.stage,
            format_duration(entry.duration_secs(now)),
            if entry.is_open() { "" } else { " (closed)" }
        ));
    }

    output
}

fn or_none(value: &str) -> &str {
    if value.trim().is_empty() {
        "(none)"
    } else {
        value
    }
}

/// Format history entries. `codes` maps lot ids to business codes for lineage views.
pub fn format_history_table(entries: &[HistoryEntry], codes: &HashMap<i64, String>) -> String {
    if entries.is_empty() {
        return "No history found.\n".to_string();
    }
    let now = chrono::Utc::now().timestamp();
    let headers = ["Lot", "Code", "Stage", "Entered", "Exited", "Processed", "Duration"];

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            vec![
                entry.lot_id.to_string(),
                codes.get(&entry.lot_id).cloned().unwrap_or_default(),
                entry.stage.as_str().to_string(),
                format_timestamp(entry.entered_ts),
                entry.exited_ts.map(format_timestamp).unwrap_or_else(|| "open".to_string()),
                entry.qty_processed.to_string(),
                format_duration(entry.duration_secs(now)),
            ]
        })
        .collect();
    render_table(&headers, &rows, &[1], get_terminal_width())
}

/// Format the stage graph: slug, label and successors
pub fn format_stage_table() -> String {
    let headers = ["Stage", "Label", "Next"];
    let rows: Vec<Vec<String>> = StageGraph::ordered()
        .iter()
        .map(|&stage| {
            let next = StageGraph::successors(stage);
            let next = if next.is_empty() {
                "(terminal)".to_string()
            } else {
                next.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            };
            vec![stage.as_str().to_string(), stage.label().to_string(), next]
        })
        .collect();
    render_table(&headers, &rows, &[2], get_terminal_width())
}

/// Format the per-stage dashboard
pub fn format_stage_summary(summary: &[StageSummary]) -> String {
    let headers = ["Stage", "Lots", "Qty", "Pending", "Urgent"];
    let rows: Vec<Vec<String>> = summary
        .iter()
        .map(|s| {
            vec![
                s.stage.as_str().to_string(),
                s.lots.to_string(),
                s.total_qty.to_string(),
                s.pending_qty.to_string(),
                if s.urgent > 0 { s.urgent.to_string() } else { String::new() },
            ]
        })
        .collect();

    let mut output = render_table(&headers, &rows, &[], get_terminal_width());
    let lots: usize = summary.iter().map(|s| s.lots).sum();
    let pending: i64 = summary.iter().map(|s| s.pending_qty).sum();
    output.push_str(&format!("\n{} active lot(s), {} pending\n", lots, pending));
    output
}

/// Format a conservation check
pub fn format_conservation(report: &ConservationReport) -> String {
    let tty = is_tty();
    let mut output = String::new();
    output.push_str(&format!("Order line {}\n", report.unique_code));
    output.push_str(&format!("  Order qty:   {}\n", report.parent_order_qty));
    output.push_str(&format!("  In flight:   {}\n", report.in_flight));
    output.push_str(&format!("  Dispatched:  {}\n", report.dispatched));
    output.push_str(&format!("  Records:     {}\n", report.records));
    if report.holds() {
        output.push_str("Quantities balance.\n");
    } else {
        let diff = report.parent_order_qty - report.in_flight - report.dispatched;
        output.push_str(&red_if_tty(&format!("Quantities do not balance: {} unaccounted.", diff), tty));
        output.push('\n');
    }
    output
}

/// One-line confirmation of an assignment
pub fn format_assign_outcome(outcome: &AssignOutcome) -> String {
    let mut output = String::new();
    for lot in &outcome.created {
        output.push_str(&format!(
            "Moved {} of lot {} from {} to {} as lot {}.\n",
            lot.qty,
            outcome.source.id.unwrap_or_default(),
            outcome.from_stage,
            lot.stage,
            lot.id.unwrap_or_default()
        ));
    }
    if outcome.source_closed {
        output.push_str(&format!(
            "Lot {} is complete at {}.\n",
            outcome.source.id.unwrap_or_default(),
            outcome.from_stage
        ));
    } else {
        output.push_str(&format!(
            "Lot {} has {} pending at {}.\n",
            outcome.source.id.unwrap_or_default(),
            outcome.source.qty_pending(),
            outcome.from_stage
        ));
    }
    output
}
