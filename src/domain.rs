use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Instrument file generation, keyed on the `<FMT>` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileFormat {
    Stp,
    Pem,
    Unknown,
}

impl FileFormat {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "230" => FileFormat::Stp,
            "210" => FileFormat::Pem,
            _ => FileFormat::Unknown,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Stp => write!(f, "STP"),
            FileFormat::Pem => write!(f, "PEM"),
            FileFormat::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Measurement axis of a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    X,
    Y,
    Z,
    #[serde(rename = "UNK")]
    Unknown,
}

impl Component {
    /// Classifies a receiver code such as `ZR10R` or `XR8`.
    ///
    /// Letters are checked in the order Z, X, Y so a code carrying several
    /// axis letters resolves the same way for every file.
    pub fn classify(receiver_code: &str) -> Self {
        let upper = receiver_code.to_ascii_uppercase();
        if upper.contains('Z') {
            Component::Z
        } else if upper.contains('X') {
            Component::X
        } else if upper.contains('Y') {
            Component::Y
        } else {
            Component::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::X => "X",
            Component::Y => "Y",
            Component::Z => "Z",
            Component::Unknown => "UNK",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "X" => Ok(Component::X),
            "Y" => Ok(Component::Y),
            "Z" => Ok(Component::Z),
            "UNK" | "UNKNOWN" => Ok(Component::Unknown),
            other => Err(IngestError::InvalidConfig(format!(
                "unknown component: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateUnits {
    Metres,
    Feet,
}

impl CoordinateUnits {
    /// Geometry tags carry `0` for metric coordinates; anything else is imperial.
    pub fn from_flag(flag: u8) -> Self {
        if flag == 0 {
            CoordinateUnits::Metres
        } else {
            CoordinateUnits::Feet
        }
    }
}

/// Label for a stored station: distance along profile plus a style suffix,
/// e.g. `25N` or `25m`.
pub fn station_label(distance: f64, suffix: &str) -> String {
    if distance.fract() == 0.0 && distance.abs() < 1e15 {
        format!("{}{suffix}", distance as i64)
    } else {
        format!("{distance}{suffix}")
    }
}

/// One sampled point of a decay curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSample {
    pub channel: u32,
    pub time_offset: f64,
    pub amplitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyRecord {
    pub id: u64,
    pub code: String,
    pub line_id: Option<String>,
    pub format: FileFormat,
    pub data_format: Option<String>,
    pub data_units: Option<String>,
    pub operator: Option<String>,
    pub peak_current: Option<f64>,
    pub loop_size: Option<(f64, f64)>,
    pub client: Option<String>,
    pub source_file: String,
    pub raw_tags: BTreeMap<String, String>,
    pub ingested_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopRecord {
    pub id: u64,
    pub survey_id: u64,
    pub sequence: u32,
    pub easting: f64,
    pub northing: f64,
    pub elevation: f64,
    pub units: CoordinateUnits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub id: u64,
    pub survey_id: u64,
    pub sequence: u32,
    pub label: String,
    pub line_id: Option<String>,
    pub easting: f64,
    pub northing: f64,
    pub elevation: f64,
    pub units: CoordinateUnits,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub id: u64,
    pub survey_id: u64,
    pub station_id: u64,
    pub component: Component,
    pub source_file: String,
    pub station_label: String,
    pub receiver_code: String,
    pub receiver_number: u32,
    pub instrument: String,
    pub angle: f64,
    pub num_samples: Option<u32>,
    pub primary_pulse: f64,
    pub secondary_pulse_1: Option<f64>,
    pub secondary_pulse_2: Option<f64>,
    pub current_on_time: Option<f64>,
    pub apparent_resistance: Option<f64>,
    pub phase_component: Option<f64>,
    pub phase_magnitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: u64,
    pub measurement_id: u64,
    pub channel: u32,
    pub time_offset: f64,
    pub amplitude: f64,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn classify_receiver_codes() {
        assert_eq!(Component::classify("ZR10R"), Component::Z);
        assert_eq!(Component::classify("XR8"), Component::X);
        assert_eq!(Component::classify("YR3"), Component::Y);
        assert_eq!(Component::classify("QR1"), Component::Unknown);
        assert_eq!(Component::classify("zr2"), Component::Z);
    }

    #[test]
    fn parse_component_invalid() {
        let err = "W".parse::<Component>().unwrap_err();
        assert_matches!(err, IngestError::InvalidConfig(_));
    }

    #[test]
    fn format_codes() {
        assert_eq!(FileFormat::from_code("230"), FileFormat::Stp);
        assert_eq!(FileFormat::from_code("210"), FileFormat::Pem);
        assert_eq!(FileFormat::from_code("999"), FileFormat::Unknown);
    }

    #[test]
    fn labels_from_distance() {
        assert_eq!(station_label(25.0, "N"), "25N");
        assert_eq!(station_label(12.5, "m"), "12.5m");
        assert_eq!(station_label(0.0, "N"), "0N");
    }
}
