use serde::{Deserialize, Serialize};

use super::DATA_MARKER;

/// Lines with fewer values than this end a backward gate scan.
const SHORT_GATE_LINE: usize = 5;

/// How gate offsets are located ahead of the data marker.
///
/// The two layouts seen across file revisions are not interchangeable, so a
/// deployment picks one rather than guessing per file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateVariant {
    /// Walk upward from the marker collecting numeric lines until a line
    /// with fewer than five values has been taken.
    #[default]
    BackwardScan,
    /// The single line right before the marker is the whole gate list.
    PrecedingLine,
}

/// Recovers the time-gate offsets, in the file's native unit.
///
/// Returns an empty list when the marker is absent or no gate line is found.
pub fn extract_time_gates(text: &str, variant: GateVariant, client_marker: &str) -> Vec<f64> {
    let Some(marker) = text.find(DATA_MARKER) else {
        tracing::warn!("no data marker found; continuing without time gates");
        return Vec::new();
    };
    let header = &text[..marker];
    let gates = match variant {
        GateVariant::BackwardScan => backward_scan(header, client_marker),
        GateVariant::PrecedingLine => preceding_line(header),
    };
    tracing::debug!(count = gates.len(), ?variant, "time gates extracted");
    gates
}

fn numeric_line(line: &str) -> Option<Vec<f64>> {
    let values = line
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    (!values.is_empty()).then_some(values)
}

fn backward_scan(header: &str, client_marker: &str) -> Vec<f64> {
    let mut blocks: Vec<Vec<f64>> = Vec::new();
    for line in header.lines().rev() {
        let line = line.trim();
        if line.is_empty()
            || line.starts_with('~')
            || line.starts_with('<')
            || (!client_marker.is_empty() && line.contains(client_marker))
        {
            continue;
        }
        let Some(values) = numeric_line(line) else {
            continue;
        };
        let short = values.len() < SHORT_GATE_LINE;
        blocks.push(values);
        if short {
            break;
        }
    }
    blocks.into_iter().rev().flatten().collect()
}

fn preceding_line(header: &str) -> Vec<f64> {
    let mut lines: Vec<&str> = header.lines().collect();
    // Text sharing the marker's line is not a gate line on its own.
    if !header.ends_with('\n') {
        lines.pop();
    }
    lines
        .last()
        .and_then(|line| numeric_line(line.trim()))
        .unwrap_or_default()
}
