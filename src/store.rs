use std::collections::HashSet;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::domain::{
    ChannelRecord, Component, LoopRecord, MeasurementRecord, StationRecord, SurveyRecord,
    station_label,
};
use crate::error::IngestError;
use crate::parser::{LoopPoint, StationPoint};
use crate::reconcile::MatchedMeasurement;

/// All persisted entities. Ids come from one counter shared by every table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    surveys: Vec<SurveyRecord>,
    #[serde(default)]
    loops: Vec<LoopRecord>,
    #[serde(default)]
    stations: Vec<StationRecord>,
    #[serde(default)]
    measurements: Vec<MeasurementRecord>,
    #[serde(default)]
    channels: Vec<ChannelRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SurveyCounts {
    pub loops: usize,
    pub stations: usize,
    pub measurements: usize,
    pub channels: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyOverview {
    pub id: u64,
    pub code: String,
    pub format: String,
    pub line_id: Option<String>,
    pub counts: SurveyCounts,
}

impl Catalog {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn surveys(&self) -> &[SurveyRecord] {
        &self.surveys
    }

    pub fn find_survey(&self, code: &str) -> Option<&SurveyRecord> {
        self.surveys.iter().find(|survey| survey.code == code)
    }

    /// Stores a survey under a fresh id, which is returned. The `id` field of
    /// the argument is ignored.
    pub fn insert_survey(&mut self, mut survey: SurveyRecord) -> Result<u64, IngestError> {
        if self.find_survey(&survey.code).is_some() {
            return Err(IngestError::Constraint(format!(
                "survey {} already exists",
                survey.code
            )));
        }
        survey.id = self.allocate();
        let id = survey.id;
        self.surveys.push(survey);
        Ok(id)
    }

    pub fn has_geometry(&self, survey_id: u64) -> bool {
        self.loops.iter().any(|point| point.survey_id == survey_id)
            || self
                .stations
                .iter()
                .any(|station| station.survey_id == survey_id)
    }

    pub fn loops(&self, survey_id: u64) -> Vec<LoopRecord> {
        self.loops
            .iter()
            .filter(|point| point.survey_id == survey_id)
            .cloned()
            .collect()
    }

    pub fn stations(&self, survey_id: u64) -> Vec<StationRecord> {
        self.stations
            .iter()
            .filter(|station| station.survey_id == survey_id)
            .cloned()
            .collect()
    }

    pub fn measurements(&self, survey_id: u64) -> Vec<MeasurementRecord> {
        self.measurements
            .iter()
            .filter(|measurement| measurement.survey_id == survey_id)
            .cloned()
            .collect()
    }

    pub fn channels(&self, measurement_id: u64) -> Vec<ChannelRecord> {
        self.channels
            .iter()
            .filter(|channel| channel.measurement_id == measurement_id)
            .cloned()
            .collect()
    }

    pub fn insert_loops(
        &mut self,
        survey_id: u64,
        points: &[LoopPoint],
    ) -> Result<usize, IngestError> {
        for (index, point) in points.iter().enumerate() {
            let taken = self
                .loops
                .iter()
                .any(|stored| stored.survey_id == survey_id && stored.sequence == point.sequence)
                || points[..index]
                    .iter()
                    .any(|earlier| earlier.sequence == point.sequence);
            if taken {
                return Err(IngestError::Constraint(format!(
                    "loop vertex {} repeated in survey {survey_id}",
                    point.sequence
                )));
            }
        }
        for point in points {
            let id = self.allocate();
            self.loops.push(LoopRecord {
                id,
                survey_id,
                sequence: point.sequence,
                easting: point.easting,
                northing: point.northing,
                elevation: point.elevation,
                units: point.units,
            });
        }
        Ok(points.len())
    }

    pub fn insert_stations(
        &mut self,
        survey_id: u64,
        points: &[StationPoint],
        label_suffix: &str,
        line_id: Option<&str>,
    ) -> Result<usize, IngestError> {
        for (index, point) in points.iter().enumerate() {
            let taken = self.stations.iter().any(|stored| {
                stored.survey_id == survey_id && stored.sequence == point.sequence
            }) || points[..index]
                .iter()
                .any(|earlier| earlier.sequence == point.sequence);
            if taken {
                return Err(IngestError::Constraint(format!(
                    "station {} repeated in survey {survey_id}",
                    point.sequence
                )));
            }
        }
        for point in points {
            let id = self.allocate();
            self.stations.push(StationRecord {
                id,
                survey_id,
                sequence: point.sequence,
                label: station_label(point.distance, label_suffix),
                line_id: line_id.map(str::to_string),
                easting: point.easting,
                northing: point.northing,
                elevation: point.elevation,
                units: point.units,
                distance: point.distance,
            });
        }
        Ok(points.len())
    }

    pub fn measurement_exists(
        &self,
        survey_id: u64,
        station_id: u64,
        component: Component,
        source_file: &str,
    ) -> bool {
        self.measurements.iter().any(|measurement| {
            measurement.survey_id == survey_id
                && measurement.station_id == station_id
                && measurement.component == component
                && measurement.source_file == source_file
        })
    }

    /// (station id, component) pairs already stored for one source file.
    pub fn measurement_keys(
        &self,
        survey_id: u64,
        source_file: &str,
    ) -> HashSet<(u64, Component)> {
        self.measurements
            .iter()
            .filter(|measurement| {
                measurement.survey_id == survey_id && measurement.source_file == source_file
            })
            .map(|measurement| (measurement.station_id, measurement.component))
            .collect()
    }

    /// Stores one matched measurement and its channels; returns the
    /// measurement id and the number of channels written.
    pub fn insert_measurement(
        &mut self,
        survey_id: u64,
        source_file: &str,
        matched: &MatchedMeasurement,
    ) -> Result<(u64, usize), IngestError> {
        let candidate = &matched.candidate;
        if self.measurement_exists(
            survey_id,
            matched.station_id,
            candidate.component,
            source_file,
        ) {
            return Err(IngestError::Constraint(format!(
                "measurement {}/{} from {source_file} already stored",
                candidate.station_label, candidate.component
            )));
        }
        if !self
            .stations
            .iter()
            .any(|station| station.id == matched.station_id && station.survey_id == survey_id)
        {
            return Err(IngestError::Constraint(format!(
                "station id {} does not belong to survey {survey_id}",
                matched.station_id
            )));
        }
        for (index, sample) in matched.channels.iter().enumerate() {
            if matched.channels[..index]
                .iter()
                .any(|earlier| earlier.channel == sample.channel)
            {
                return Err(IngestError::Constraint(format!(
                    "channel {} repeated for {}",
                    sample.channel, candidate.station_label
                )));
            }
        }

        let id = self.allocate();
        let parameters = candidate.parameters;
        self.measurements.push(MeasurementRecord {
            id,
            survey_id,
            station_id: matched.station_id,
            component: candidate.component,
            source_file: source_file.to_string(),
            station_label: candidate.station_label.clone(),
            receiver_code: candidate.receiver_code.clone(),
            receiver_number: candidate.receiver_number,
            instrument: candidate.instrument.clone(),
            angle: candidate.angle,
            num_samples: candidate.num_samples,
            primary_pulse: candidate.primary_pulse,
            secondary_pulse_1: None,
            secondary_pulse_2: None,
            current_on_time: parameters.map(|p| p.current_on_time),
            apparent_resistance: parameters.map(|p| p.apparent_resistance),
            phase_component: parameters.map(|p| p.phase_component),
            phase_magnitude: parameters.map(|p| p.phase_magnitude),
        });
        for sample in &matched.channels {
            let channel_id = self.allocate();
            self.channels.push(ChannelRecord {
                id: channel_id,
                measurement_id: id,
                channel: sample.channel,
                time_offset: sample.time_offset,
                amplitude: sample.amplitude,
            });
        }
        Ok((id, matched.channels.len()))
    }

    fn measurement_ids(&self, survey_id: u64) -> HashSet<u64> {
        self.measurements
            .iter()
            .filter(|measurement| measurement.survey_id == survey_id)
            .map(|measurement| measurement.id)
            .collect()
    }

    pub fn counts(&self, survey_id: u64) -> SurveyCounts {
        let measurement_ids = self.measurement_ids(survey_id);
        SurveyCounts {
            loops: self
                .loops
                .iter()
                .filter(|point| point.survey_id == survey_id)
                .count(),
            stations: self
                .stations
                .iter()
                .filter(|station| station.survey_id == survey_id)
                .count(),
            measurements: measurement_ids.len(),
            channels: self
                .channels
                .iter()
                .filter(|channel| measurement_ids.contains(&channel.measurement_id))
                .count(),
        }
    }

    pub fn overview(&self) -> Vec<SurveyOverview> {
        self.surveys
            .iter()
            .map(|survey| SurveyOverview {
                id: survey.id,
                code: survey.code.clone(),
                format: survey.format.to_string(),
                line_id: survey.line_id.clone(),
                counts: self.counts(survey.id),
            })
            .collect()
    }

    /// Deletes a survey and everything it owns; returns what was removed.
    pub fn remove_survey(&mut self, code: &str) -> Result<SurveyCounts, IngestError> {
        let survey_id = self
            .find_survey(code)
            .map(|survey| survey.id)
            .ok_or_else(|| IngestError::SurveyNotFound(code.to_string()))?;
        let removed = self.counts(survey_id);
        let measurement_ids = self.measurement_ids(survey_id);
        self.channels
            .retain(|channel| !measurement_ids.contains(&channel.measurement_id));
        self.measurements
            .retain(|measurement| measurement.survey_id != survey_id);
        self.stations.retain(|station| station.survey_id != survey_id);
        self.loops.retain(|point| point.survey_id != survey_id);
        self.surveys.retain(|survey| survey.id != survey_id);
        Ok(removed)
    }

    pub fn clear(&mut self) {
        *self = Catalog::default();
    }
}

/// Persistence seam for the coordinator.
///
/// Writes happen only inside [`Repository::transaction`]: the closure works
/// on a copy of the catalog that is committed when it returns `Ok` and
/// dropped when it returns `Err`.
pub trait Repository {
    fn catalog(&self) -> &Catalog;

    fn transaction<T, F>(&mut self, f: F) -> Result<T, IngestError>
    where
        F: FnOnce(&mut Catalog) -> Result<T, IngestError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    catalog: Catalog,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for MemoryRepository {
    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T, IngestError>
    where
        F: FnOnce(&mut Catalog) -> Result<T, IngestError>,
    {
        let mut working = self.catalog.clone();
        let value = f(&mut working)?;
        self.catalog = working;
        Ok(value)
    }
}

/// Catalog kept as one JSON document, replaced atomically on every commit.
#[derive(Debug, Clone)]
pub struct FileRepository {
    path: Utf8PathBuf,
    catalog: Catalog,
}

impl FileRepository {
    pub fn default_path() -> Result<Utf8PathBuf, IngestError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("crone-ingest").join("catalog.json"))
                    .ok()
            })
            .ok_or_else(|| IngestError::Filesystem("unable to resolve data directory".to_string()))
    }

    /// Opens the catalog at `path`; a missing file is an empty catalog.
    pub fn open(path: Utf8PathBuf) -> Result<Self, IngestError> {
        let catalog = if path.as_std_path().exists() {
            let content = fs::read_to_string(path.as_std_path())
                .map_err(|err| IngestError::StoreRead(format!("{path}: {err}")))?;
            serde_json::from_str(&content)
                .map_err(|err| IngestError::StoreRead(format!("{path}: {err}")))?
        } else {
            Catalog::default()
        };
        Ok(Self { path, catalog })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn write_atomic(path: &Utf8Path, catalog: &Catalog) -> Result<(), IngestError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| IngestError::StoreWrite(err.to_string()))?;
        let content = serde_json::to_vec_pretty(catalog)
            .map_err(|err| IngestError::StoreWrite(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("crone-ingest-catalog")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| IngestError::StoreWrite(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| IngestError::StoreWrite(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| IngestError::StoreWrite(err.to_string()))?;
        Ok(())
    }
}

impl Repository for FileRepository {
    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T, IngestError>
    where
        F: FnOnce(&mut Catalog) -> Result<T, IngestError>,
    {
        let mut working = self.catalog.clone();
        let value = f(&mut working)?;
        Self::write_atomic(&self.path, &working)?;
        self.catalog = working;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::CoordinateUnits;

    fn point(sequence: u32, distance: f64) -> StationPoint {
        StationPoint {
            sequence,
            easting: 1.0,
            northing: 2.0,
            elevation: 3.0,
            units: CoordinateUnits::Metres,
            distance,
        }
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let mut repo = MemoryRepository::new();
        let result: Result<(), IngestError> = repo.transaction(|catalog| {
            catalog.insert_stations(7, &[point(0, 0.0)], "N", None)?;
            Err(IngestError::Constraint("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(repo.catalog().stations(7).is_empty());
    }

    #[test]
    fn repeated_station_sequence_is_rejected() {
        let mut catalog = Catalog::default();
        let err = catalog
            .insert_stations(1, &[point(0, 0.0), point(0, 25.0)], "N", None)
            .unwrap_err();
        assert_matches!(err, IngestError::Constraint(_));
        assert!(catalog.stations(1).is_empty());
    }

    #[test]
    fn station_labels_follow_suffix() {
        let mut catalog = Catalog::default();
        catalog
            .insert_stations(1, &[point(0, 0.0), point(1, 25.0)], "m", Some("100E"))
            .unwrap();
        let stations = catalog.stations(1);
        assert_eq!(stations[1].label, "25m");
        assert_eq!(stations[1].line_id.as_deref(), Some("100E"));
    }
}
