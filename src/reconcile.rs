use std::collections::HashSet;

use crate::domain::{ChannelSample, Component, StationRecord};
use crate::parser::MeasurementCandidate;

/// Default acceptance window for nearest-distance matching.
pub const DEFAULT_MATCH_TOLERANCE: f64 = 50.0;

/// One way of resolving a measurement's station label to stored geometry.
pub trait StationMatcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn try_match<'s>(&self, label: &str, stations: &'s [StationRecord])
    -> Option<&'s StationRecord>;
}

/// Label exactly as written, e.g. `25N`.
pub struct ExactLabel;

/// Leading numeric run of the label equals a stored distance.
pub struct DerivedDistance;

/// Closest stored distance, accepted only below the tolerance.
pub struct NearestDistance {
    pub tolerance: f64,
}

/// Distance encoded at the start of a station label: `25N` and `25m` give 25.
pub fn derived_distance(label: &str) -> Option<f64> {
    let end = label
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(label.len());
    if end == 0 {
        return None;
    }
    label[..end].parse().ok()
}

impl StationMatcher for ExactLabel {
    fn name(&self) -> &'static str {
        "label"
    }

    fn try_match<'s>(
        &self,
        label: &str,
        stations: &'s [StationRecord],
    ) -> Option<&'s StationRecord> {
        stations.iter().find(|station| station.label == label)
    }
}

impl StationMatcher for DerivedDistance {
    fn name(&self) -> &'static str {
        "distance"
    }

    fn try_match<'s>(
        &self,
        label: &str,
        stations: &'s [StationRecord],
    ) -> Option<&'s StationRecord> {
        let distance = derived_distance(label)?;
        stations.iter().find(|station| station.distance == distance)
    }
}

impl StationMatcher for NearestDistance {
    fn name(&self) -> &'static str {
        "nearest"
    }

    fn try_match<'s>(
        &self,
        label: &str,
        stations: &'s [StationRecord],
    ) -> Option<&'s StationRecord> {
        let distance = derived_distance(label)?;
        let mut best: Option<(&StationRecord, f64)> = None;
        for station in stations {
            let gap = (station.distance - distance).abs();
            if !gap.is_finite() {
                continue;
            }
            if best.is_none_or(|(_, closest)| gap < closest) {
                best = Some((station, gap));
            }
        }
        best.filter(|(_, gap)| *gap < self.tolerance)
            .map(|(station, _)| station)
    }
}

/// Pairs each gate with the amplitude at the same position, numbering
/// channels from 1. Whichever list is longer is truncated.
pub fn channel_samples(time_gates: &[f64], amplitudes: &[f64]) -> Vec<ChannelSample> {
    time_gates
        .iter()
        .zip(amplitudes)
        .enumerate()
        .map(|(index, (&time_offset, &amplitude))| ChannelSample {
            channel: index as u32 + 1,
            time_offset,
            amplitude,
        })
        .collect()
}

/// Stations usable for a file on `line_hint`: those stored for that line
/// plus those stored without a line. Stations of other lines never match.
pub fn stations_for_line(
    stations: Vec<StationRecord>,
    line_hint: Option<&str>,
) -> Vec<StationRecord> {
    let Some(hint) = line_hint else {
        return stations;
    };
    stations
        .into_iter()
        .filter(|station| {
            station
                .line_id
                .as_deref()
                .is_none_or(|line_id| line_id == hint)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct MatchedMeasurement {
    pub station_id: u64,
    pub matched_by: &'static str,
    pub candidate: MeasurementCandidate,
    pub channels: Vec<ChannelSample>,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub to_insert: Vec<MatchedMeasurement>,
    pub not_found: Vec<String>,
    pub duplicates: Vec<(String, Component)>,
}

pub struct Reconciler {
    matchers: Vec<Box<dyn StationMatcher>>,
}

impl Reconciler {
    /// Label, then derived distance, then nearest distance within `tolerance`.
    pub fn new(tolerance: f64) -> Self {
        Self::with_matchers(vec![
            Box::new(ExactLabel),
            Box::new(DerivedDistance),
            Box::new(NearestDistance { tolerance }),
        ])
    }

    pub fn with_matchers(matchers: Vec<Box<dyn StationMatcher>>) -> Self {
        Self { matchers }
    }

    /// First matcher to succeed wins.
    pub fn match_station<'s>(
        &self,
        label: &str,
        stations: &'s [StationRecord],
    ) -> Option<(&'static str, &'s StationRecord)> {
        self.matchers.iter().find_map(|matcher| {
            matcher
                .try_match(label, stations)
                .map(|station| (matcher.name(), station))
        })
    }

    /// Splits candidates into new records, unmatched labels and duplicates.
    ///
    /// `exists` reports whether a measurement for (station id, component)
    /// from the current source file is already stored; repeats within the
    /// candidate list are caught as duplicates too.
    pub fn reconcile<F>(
        &self,
        candidates: &[MeasurementCandidate],
        stations: &[StationRecord],
        time_gates: &[f64],
        exists: F,
    ) -> Reconciliation
    where
        F: Fn(u64, Component) -> bool,
    {
        let mut result = Reconciliation::default();
        let mut accepted: HashSet<(u64, Component)> = HashSet::new();

        for candidate in candidates {
            let label = candidate.station_label.as_str();
            let Some((matched_by, station)) = self.match_station(label, stations) else {
                tracing::warn!(station = label, "station not found in survey geometry");
                result.not_found.push(label.to_string());
                continue;
            };
            tracing::debug!(station = label, matched = %station.label, by = matched_by, "matched station");

            let key = (station.id, candidate.component);
            if accepted.contains(&key) || exists(station.id, candidate.component) {
                tracing::debug!(station = label, component = %candidate.component, "skipping duplicate");
                result
                    .duplicates
                    .push((label.to_string(), candidate.component));
                continue;
            }
            accepted.insert(key);

            result.to_insert.push(MatchedMeasurement {
                station_id: station.id,
                matched_by,
                channels: channel_samples(time_gates, &candidate.channels),
                candidate: candidate.clone(),
            });
        }

        result
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_TOLERANCE)
    }
}
