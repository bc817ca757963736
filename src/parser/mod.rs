//! Readers for the Crone STP/PEM text layout.
//!
//! A file is a tagged header (`<FMT>`, `<UNI>`, `<Lnn>`, `<Pnn>`, ...),
//! the time-gate list, a `$` marker, then the station/component data blocks.
//! Every reader here is pure and tolerant: missing sections produce empty
//! results rather than errors.

pub mod format;
pub mod gates;
pub mod geometry;
pub mod header;
pub mod records;

use serde::Serialize;

use crate::domain::FileFormat;

pub use format::detect_format;
pub use gates::{GateVariant, extract_time_gates};
pub use geometry::{Geometry, LoopPoint, MalformedTag, StationPoint, parse_geometry};
pub use header::{Header, HeaderValue, extract_header};
pub use records::{MeasurementCandidate, Parameters, RecordScanner, parse_records};

/// Separates the header/geometry region from the data section.
pub const DATA_MARKER: char = '$';

/// Text before the first data marker, or the whole text without one.
pub fn header_region(text: &str) -> &str {
    match text.find(DATA_MARKER) {
        Some(marker) => &text[..marker],
        None => text,
    }
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub gate_variant: GateVariant,
    pub client_marker: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedFile {
    pub format: FileFormat,
    pub header: Header,
    pub geometry: Geometry,
    pub time_gates: Vec<f64>,
    pub measurements: Vec<MeasurementCandidate>,
    pub has_data_marker: bool,
}

/// Runs every reader over one file's text.
pub fn parse_file(text: &str, options: &ParseOptions) -> ParsedFile {
    let format = detect_format(text);
    let header = extract_header(text, &options.client_marker);
    let geometry = parse_geometry(text);
    let time_gates = extract_time_gates(text, options.gate_variant, &options.client_marker);
    let measurements = parse_records(text);

    tracing::info!(
        %format,
        loops = geometry.loops.len(),
        stations = geometry.stations.len(),
        malformed = geometry.malformed.len(),
        gates = time_gates.len(),
        measurements = measurements.len(),
        "parsed instrument file"
    );

    ParsedFile {
        format,
        header,
        geometry,
        time_gates,
        measurements,
        has_data_marker: text.contains(DATA_MARKER),
    }
}
