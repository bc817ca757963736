use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::Component;

use super::DATA_MARKER;

static STATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<label>[A-Za-z]?\d+(?:\.\d+)?[A-Za-z]*)\s+(?P<code>[A-Za-z]+\d+[A-Za-z]*)\s+(?P<rx>\d+)\s+(?P<inst>[A-Za-z])\s+(?P<angle>-?\d+(?:\.\d+)?)(?P<trail>(?:\s+\d+){2,})\b",
    )
    .expect("station line pattern")
});

static PARAMETER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^D(?P<kind>\d+)\b(?P<rest>.*)$").expect("parameter line pattern"));

/// Auxiliary values carried by a `D4` line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Parameters {
    pub current_on_time: f64,
    pub apparent_resistance: f64,
    pub phase_component: f64,
    pub phase_magnitude: f64,
}

/// One station/component decay block read from the data section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementCandidate {
    pub station_label: String,
    pub receiver_code: String,
    pub receiver_number: u32,
    pub instrument: String,
    pub angle: f64,
    pub num_samples: Option<u32>,
    pub component: Component,
    pub parameters: Option<Parameters>,
    pub primary_pulse: f64,
    pub channels: Vec<f64>,
}

/// Fields of a matched station line, before its payload is read.
#[derive(Debug, Clone)]
struct StationLine {
    label: String,
    receiver_code: String,
    receiver_number: u32,
    instrument: String,
    angle: f64,
    num_samples: Option<u32>,
}

fn match_station(line: &str) -> Option<StationLine> {
    let caps = STATION_LINE.captures(line)?;
    let trailing: Vec<u32> = caps["trail"]
        .split_whitespace()
        .filter_map(|value| value.parse().ok())
        .collect();
    Some(StationLine {
        label: caps["label"].to_string(),
        receiver_code: caps["code"].to_string(),
        receiver_number: caps["rx"].parse().ok()?,
        instrument: caps["inst"].to_string(),
        angle: caps["angle"].parse().ok()?,
        num_samples: trailing.get(1).copied(),
    })
}

fn match_parameters(line: &str) -> Option<Option<Parameters>> {
    let caps = PARAMETER_LINE.captures(line)?;
    if &caps["kind"] != "4" {
        return Some(None);
    }
    let values: Vec<f64> = caps["rest"]
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .unwrap_or_default();
    Some(match values.as_slice() {
        [current_on_time, apparent_resistance, phase_component, phase_magnitude, ..] => {
            Some(Parameters {
                current_on_time: *current_on_time,
                apparent_resistance: *apparent_resistance,
                phase_component: *phase_component,
                phase_magnitude: *phase_magnitude,
            })
        }
        _ => None,
    })
}

fn payload_values(line: &str) -> Option<Vec<f64>> {
    let values = line
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    (!values.is_empty()).then_some(values)
}

enum State {
    SeekingStation,
    ReadingPayload(StationLine),
}

/// Walks the data section line by line, yielding one candidate per station
/// block that carries at least one payload value.
pub struct RecordScanner<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> RecordScanner<'a> {
    /// Scanner over the text after the first data marker; empty when the
    /// marker is absent.
    pub fn new(text: &'a str) -> Self {
        let lines = match text.find(DATA_MARKER) {
            Some(marker) => text[marker + DATA_MARKER.len_utf8()..].lines().collect(),
            None => Vec::new(),
        };
        Self { lines, pos: 0 }
    }

    fn read_payload(&mut self, station: StationLine) -> Option<MeasurementCandidate> {
        let mut parameters = None;
        if let Some(line) = self.lines.get(self.pos)
            && let Some(found) = match_parameters(line.trim())
        {
            parameters = found;
            self.pos += 1;
        }

        let mut values = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            let line = line.trim();
            if STATION_LINE.is_match(line) {
                break;
            }
            let Some(row) = payload_values(line) else {
                break;
            };
            values.extend(row);
            self.pos += 1;
        }

        let (&primary_pulse, channels) = values.split_first()?;
        Some(MeasurementCandidate {
            component: Component::classify(&station.receiver_code),
            station_label: station.label,
            receiver_code: station.receiver_code,
            receiver_number: station.receiver_number,
            instrument: station.instrument,
            angle: station.angle,
            num_samples: station.num_samples,
            parameters,
            primary_pulse,
            channels: channels.to_vec(),
        })
    }
}

impl Iterator for RecordScanner<'_> {
    type Item = MeasurementCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = State::SeekingStation;
        loop {
            state = match state {
                State::SeekingStation => {
                    let line = self.lines.get(self.pos)?;
                    self.pos += 1;
                    match match_station(line.trim()) {
                        Some(station) => State::ReadingPayload(station),
                        None => State::SeekingStation,
                    }
                }
                State::ReadingPayload(station) => {
                    let label = station.label.clone();
                    match self.read_payload(station) {
                        Some(candidate) => return Some(candidate),
                        None => {
                            tracing::debug!(station = %label, "station block without payload");
                            State::SeekingStation
                        }
                    }
                }
            };
        }
    }
}

/// All measurement candidates of a file, in source order.
pub fn parse_records(text: &str) -> Vec<MeasurementCandidate> {
    RecordScanner::new(text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_line_fields() {
        let station = match_station("100N ZR10R 3 A 90.0 0 256 1 0").unwrap();
        assert_eq!(station.label, "100N");
        assert_eq!(station.receiver_code, "ZR10R");
        assert_eq!(station.receiver_number, 3);
        assert_eq!(station.instrument, "A");
        assert_eq!(station.angle, 90.0);
        assert_eq!(station.num_samples, Some(256));
    }

    #[test]
    fn rejects_numeric_and_short_lines() {
        assert!(match_station("1.0 2.0 3.0").is_none());
        assert!(match_station("100N ZR10R 3 A 90").is_none());
    }

    #[test]
    fn d4_line_carries_parameters() {
        let params = match_parameters("D4 1.5 20.0 -3.0 4.0").unwrap().unwrap();
        assert_eq!(params.current_on_time, 1.5);
        assert_eq!(params.phase_component, -3.0);
        assert_eq!(match_parameters("D7 1 2 3"), Some(None));
        assert_eq!(match_parameters("1 2 3"), None);
    }

    #[test]
    fn reads_blocks_and_stops_at_next_station() {
        let text = "$\n0N XR8 1 A 90 0 256 1 0\nD4 1 2 3 4\n10.0 1.0 2.0\n3.0\n25N ZR10R 1 A 90 0 256 1 0\n20.0 5.0\n";
        let records = parse_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].component, Component::X);
        assert_eq!(records[0].primary_pulse, 10.0);
        assert_eq!(records[0].channels, vec![1.0, 2.0, 3.0]);
        assert!(records[0].parameters.is_some());
        assert_eq!(records[1].station_label, "25N");
        assert_eq!(records[1].channels, vec![5.0]);
        assert!(records[1].parameters.is_none());
    }

    #[test]
    fn empty_payload_is_discarded() {
        let text = "$\n0N XR8 1 A 90 0 256 1 0\nD7 1 2\n25N YR3 1 A 90 0 256 1 0\n7.0 8.0\n";
        let records = parse_records(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].station_label, "25N");
        assert_eq!(records[0].component, Component::Y);
    }

    #[test]
    fn no_marker_yields_nothing() {
        assert!(parse_records("0N XR8 1 A 90 0 256 1 0\n1 2 3\n").is_empty());
    }
}
