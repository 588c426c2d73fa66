use crate::analysis::ScanReport;
use crate::verdict::SignalVerdict;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

/// Metrics shown as columns when present; the full set goes to the notifier.
const METRIC_COLUMNS: &[&str] = &["Close", "Volume", "PBR", "RSI_9", "RSI_14", "EMA200"];

fn signal_cell(verdict: &SignalVerdict) -> Cell {
    let color = match (verdict.buy, verdict.sell) {
        (true, false) => Color::Green,
        (false, true) => Color::Red,
        (true, true) => Color::Yellow,
        (false, false) => Color::DarkGrey,
    };
    Cell::new(verdict.label())
        .fg(color)
        .add_attribute(Attribute::Bold)
}

/// Table of the flagged symbols of one scan.
pub fn build_table(flagged: &[SignalVerdict]) -> Table {
    let columns: Vec<&str> = METRIC_COLUMNS
        .iter()
        .copied()
        .filter(|key| flagged.iter().any(|v| v.metrics.contains_key(*key)))
        .collect();

    let mut header = vec![
        Cell::new("Code").add_attribute(Attribute::Bold),
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Signal").add_attribute(Attribute::Bold),
    ];
    header.extend(columns.iter().map(|key| {
        Cell::new(key)
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Right)
    }));

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);

    for verdict in flagged {
        let mut row = vec![
            Cell::new(&verdict.symbol).fg(Color::Cyan),
            Cell::new(&verdict.name),
            signal_cell(verdict),
        ];
        row.extend(columns.iter().map(|key| {
            let text = verdict
                .metrics
                .get(*key)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            Cell::new(text)
                .fg(Color::Grey)
                .set_alignment(CellAlignment::Right)
        }));
        table.add_row(row);
    }

    table
}

pub fn print_report(report: &ScanReport) {
    let title = format!(
        "({} {} | {} scanned, {} filtered, {} skipped, {} failed, {:.1}s)",
        report.date.format("%Y-%m-%d"),
        report.strategy,
        report.processed,
        report.filtered.len(),
        report.skipped.len(),
        report.failed.len(),
        report.elapsed.as_secs_f64()
    );

    if report.flagged.is_empty() {
        println!("\n{}\nNo signals.", title);
        return;
    }
    println!("\n{}\n{}", title, build_table(&report.flagged));
}
