use std::fs;
use std::ops::AddAssign;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::IngestConfig;
use crate::domain::{FileFormat, LoopRecord, StationRecord, SurveyRecord};
use crate::error::IngestError;
use crate::fs_util;
use crate::parser::{ParsedFile, parse_file};
use crate::reconcile::{Reconciler, stations_for_line};
use crate::store::{Repository, SurveyCounts, SurveyOverview};

/// Outcome of ingesting one instrument file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub file: String,
    pub survey_id: String,
    pub new_survey: bool,
    pub format_detected: FileFormat,
    pub loops_new: usize,
    pub stations_new: usize,
    pub measurements_new: usize,
    pub channels_new: usize,
    pub duplicates_skipped: usize,
    pub stations_not_found: usize,
    pub malformed_geometry: usize,
    pub time_gates: usize,
    pub measurements_parsed: usize,
}

impl FileSummary {
    fn new(file: &str, survey_id: &str, parsed: &ParsedFile) -> Self {
        Self {
            file: file.to_string(),
            survey_id: survey_id.to_string(),
            new_survey: false,
            format_detected: parsed.format,
            loops_new: 0,
            stations_new: 0,
            measurements_new: 0,
            channels_new: 0,
            duplicates_skipped: 0,
            stations_not_found: 0,
            malformed_geometry: parsed.geometry.malformed.len(),
            time_gates: parsed.time_gates.len(),
            measurements_parsed: parsed.measurements.len(),
        }
    }
}

/// Field-wise sums across files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub surveys_new: usize,
    pub loops_new: usize,
    pub stations_new: usize,
    pub measurements_new: usize,
    pub channels_new: usize,
    pub duplicates_skipped: usize,
    pub stations_not_found: usize,
    pub malformed_geometry: usize,
}

impl AddAssign<&FileSummary> for Totals {
    fn add_assign(&mut self, file: &FileSummary) {
        self.surveys_new += usize::from(file.new_survey);
        self.loops_new += file.loops_new;
        self.stations_new += file.stations_new;
        self.measurements_new += file.measurements_new;
        self.channels_new += file.channels_new;
        self.duplicates_skipped += file.duplicates_skipped;
        self.stations_not_found += file.stations_not_found;
        self.malformed_geometry += file.malformed_geometry;
    }
}

impl AddAssign<&Totals> for Totals {
    fn add_assign(&mut self, other: &Totals) {
        self.surveys_new += other.surveys_new;
        self.loops_new += other.loops_new;
        self.stations_new += other.stations_new;
        self.measurements_new += other.measurements_new;
        self.channels_new += other.channels_new;
        self.duplicates_skipped += other.duplicates_skipped;
        self.stations_not_found += other.stations_not_found;
        self.malformed_geometry += other.malformed_geometry;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub name: String,
    pub error: String,
}

impl Failure {
    fn new(name: impl Into<String>, error: &IngestError) -> Self {
        Self {
            name: name.into(),
            error: error.describe(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub directory: String,
    pub files_processed: usize,
    pub totals: Totals,
    pub file_results: Vec<FileSummary>,
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveSummary {
    pub archive: String,
    pub folders_total: usize,
    pub folders_completed: usize,
    pub totals: Totals,
    pub folder_results: Vec<BatchSummary>,
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IngestOutcome {
    File(FileSummary),
    Directory(BatchSummary),
    Archive(ArchiveSummary),
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub surveys: Vec<SurveyOverview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub survey: SurveyRecord,
    pub counts: SurveyCounts,
    pub loops: Vec<LoopRecord>,
    pub stations: Vec<StationRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveResult {
    pub survey_id: String,
    pub removed: SurveyCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetResult {
    pub cleared: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn phase(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

fn file_stem(source_name: &str) -> String {
    Path::new(source_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| source_name.to_string())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub struct App<R: Repository> {
    repo: R,
    config: IngestConfig,
    reconciler: Reconciler,
}

impl<R: Repository> App<R> {
    pub fn new(repo: R, config: IngestConfig) -> Self {
        let reconciler = Reconciler::new(config.match_tolerance);
        Self {
            repo,
            config,
            reconciler,
        }
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingests one file's text. All writes for the file happen in a single
    /// transaction; on error nothing from this file is kept.
    pub fn ingest_text(
        &mut self,
        text: &str,
        source_name: &str,
        line_hint: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<FileSummary, IngestError> {
        let start = Instant::now();
        phase(sink, format!("phase=Parse; {source_name}"));
        let parsed = parse_file(text, &self.config.parse_options());
        if !parsed.has_data_marker {
            tracing::warn!(file = source_name, "no data marker; no measurements will be read");
        }

        let code = parsed
            .header
            .survey_id
            .clone()
            .unwrap_or_else(|| file_stem(source_name));

        phase(sink, format!("phase=Store; survey {code}"));
        let config = &self.config;
        let reconciler = &self.reconciler;
        let summary = self
            .repo
            .transaction(|catalog| {
                let mut summary = FileSummary::new(source_name, &code, &parsed);

                let existing = catalog.find_survey(&code).map(|survey| survey.id);
                let survey_id = match existing {
                    Some(id) => {
                        tracing::info!(survey = %code, id, "survey already exists");
                        if config.skip_if_survey_exists {
                            return Ok(summary);
                        }
                        id
                    }
                    None => {
                        summary.new_survey = true;
                        let record = survey_record(&code, source_name, line_hint, &parsed);
                        catalog.insert_survey(record)?
                    }
                };

                if catalog.has_geometry(survey_id) {
                    tracing::info!(survey = %code, "geometry already stored; skipping");
                } else {
                    summary.loops_new = catalog.insert_loops(survey_id, &parsed.geometry.loops)?;
                    summary.stations_new = catalog.insert_stations(
                        survey_id,
                        &parsed.geometry.stations,
                        &config.station_label_suffix,
                        line_hint,
                    )?;
                }

                let stations = stations_for_line(catalog.stations(survey_id), line_hint);
                let stored = catalog.measurement_keys(survey_id, source_name);
                let reconciliation = reconciler.reconcile(
                    &parsed.measurements,
                    &stations,
                    &parsed.time_gates,
                    |station_id, component| stored.contains(&(station_id, component)),
                );
                summary.duplicates_skipped = reconciliation.duplicates.len();
                summary.stations_not_found = reconciliation.not_found.len();

                for matched in &reconciliation.to_insert {
                    let (_, channels) = catalog.insert_measurement(survey_id, source_name, matched)?;
                    summary.measurements_new += 1;
                    summary.channels_new += channels;
                }
                Ok(summary)
            })
            .map_err(|err| IngestError::for_file(source_name, err))?;

        tracing::info!(
            file = source_name,
            survey = %summary.survey_id,
            new_survey = summary.new_survey,
            loops = summary.loops_new,
            stations = summary.stations_new,
            measurements = summary.measurements_new,
            channels = summary.channels_new,
            duplicates = summary.duplicates_skipped,
            not_found = summary.stations_not_found,
            "file ingestion complete"
        );
        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; {source_name} measurements={} channels={} duplicates={} not_found={}",
                summary.measurements_new,
                summary.channels_new,
                summary.duplicates_skipped,
                summary.stations_not_found
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(summary)
    }

    pub fn ingest_file(
        &mut self,
        path: &Path,
        line_hint: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<FileSummary, IngestError> {
        let name = file_name(path);
        let bytes = fs::read(path).map_err(|err| {
            IngestError::for_file(
                name.clone(),
                IngestError::SourceRead {
                    path: path.display().to_string(),
                    message: err.to_string(),
                },
            )
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let derived = match line_hint {
            Some(_) => None,
            None => self.config.line_hint_for(&name),
        };
        self.ingest_text(&text, &name, line_hint.or(derived.as_deref()), sink)
    }

    /// Ingests every instrument file of one folder; a failing file is
    /// recorded and the remaining files still run.
    pub fn ingest_dir(
        &mut self,
        dir: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<BatchSummary, IngestError> {
        let files = fs_util::instrument_files(dir)?;
        if files.is_empty() {
            return Err(IngestError::NoInstrumentFiles(dir.display().to_string()));
        }
        tracing::info!(directory = %dir.display(), files = files.len(), "ingesting directory");
        phase(sink, format!("phase=Resolve; {} files in {}", files.len(), dir.display()));

        let mut batch = BatchSummary {
            directory: dir.display().to_string(),
            files_processed: 0,
            totals: Totals::default(),
            file_results: Vec::new(),
            failures: Vec::new(),
        };
        for file in &files {
            match self.ingest_file(file, None, sink) {
                Ok(summary) => {
                    batch.totals += &summary;
                    batch.file_results.push(summary);
                }
                Err(err) => {
                    tracing::error!(file = %file.display(), error = %err.describe(), "file failed");
                    batch.failures.push(Failure::new(file_name(file), &err));
                }
            }
            batch.files_processed += 1;
        }
        Ok(batch)
    }

    /// Treats each sub-folder of `path` as one survey folder. A `.zip`
    /// archive is extracted to a temporary directory first.
    pub fn ingest_archive(
        &mut self,
        path: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<ArchiveSummary, IngestError> {
        if fs_util::is_zip(path) {
            let temp_dir = tempfile::Builder::new()
                .prefix("crone-ingest-archive")
                .tempdir()
                .map_err(|err| IngestError::Filesystem(err.to_string()))?;
            phase(sink, format!("phase=Prepare; extracting {}", path.display()));
            fs_util::extract_zip(path, temp_dir.path())?;
            let root = fs_util::archive_root(temp_dir.path())?;
            let mut summary = self.ingest_folders(&root, sink)?;
            summary.archive = path.display().to_string();
            return Ok(summary);
        }
        self.ingest_folders(path, sink)
    }

    fn ingest_folders(
        &mut self,
        root: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<ArchiveSummary, IngestError> {
        let folders = fs_util::survey_folders(root)?;
        if folders.is_empty() {
            return Err(IngestError::NoSurveyFolders(root.display().to_string()));
        }
        tracing::info!(archive = %root.display(), folders = folders.len(), "ingesting survey folders");

        let mut summary = ArchiveSummary {
            archive: root.display().to_string(),
            folders_total: folders.len(),
            folders_completed: 0,
            totals: Totals::default(),
            folder_results: Vec::new(),
            failures: Vec::new(),
        };
        for folder in &folders {
            match self.ingest_dir(folder, sink) {
                Ok(batch) => {
                    summary.totals += &batch.totals;
                    summary.folders_completed += 1;
                    summary.folder_results.push(batch);
                }
                Err(err) => {
                    tracing::error!(folder = %folder.display(), error = %err.describe(), "folder failed");
                    summary.failures.push(Failure::new(file_name(folder), &err));
                }
            }
        }
        Ok(summary)
    }

    /// Dispatches on what `path` is: a zip archive, a single file, a folder
    /// of instrument files, or a folder of survey folders.
    pub fn ingest_path(
        &mut self,
        path: &Path,
        line_hint: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<IngestOutcome, IngestError> {
        if fs_util::is_zip(path) {
            return self.ingest_archive(path, sink).map(IngestOutcome::Archive);
        }
        if path.is_file() {
            return self
                .ingest_file(path, line_hint, sink)
                .map(IngestOutcome::File);
        }
        if !fs_util::instrument_files(path)?.is_empty() {
            return self.ingest_dir(path, sink).map(IngestOutcome::Directory);
        }
        self.ingest_archive(path, sink).map(IngestOutcome::Archive)
    }

    pub fn list(&self) -> ListResult {
        ListResult {
            surveys: self.repo.catalog().overview(),
        }
    }

    pub fn info(&self, code: &str) -> Result<InfoResult, IngestError> {
        let catalog = self.repo.catalog();
        let survey = catalog
            .find_survey(code)
            .cloned()
            .ok_or_else(|| IngestError::SurveyNotFound(code.to_string()))?;
        Ok(InfoResult {
            counts: catalog.counts(survey.id),
            loops: catalog.loops(survey.id),
            stations: catalog.stations(survey.id),
            survey,
        })
    }

    pub fn remove(&mut self, code: &str) -> Result<RemoveResult, IngestError> {
        let removed = self.repo.transaction(|catalog| catalog.remove_survey(code))?;
        tracing::info!(survey = code, measurements = removed.measurements, "survey removed");
        Ok(RemoveResult {
            survey_id: code.to_string(),
            removed,
        })
    }

    pub fn reset(&mut self) -> Result<ResetResult, IngestError> {
        self.repo.transaction(|catalog| {
            catalog.clear();
            Ok(())
        })?;
        Ok(ResetResult { cleared: true })
    }
}

fn survey_record(
    code: &str,
    source_name: &str,
    line_hint: Option<&str>,
    parsed: &ParsedFile,
) -> SurveyRecord {
    let header = &parsed.header;
    SurveyRecord {
        id: 0,
        code: code.to_string(),
        line_id: line_hint.map(str::to_string),
        format: parsed.format,
        data_format: header.format_code().map(str::to_string),
        data_units: header.units().map(str::to_string),
        operator: header.operator().map(str::to_string),
        peak_current: header.peak_current(),
        loop_size: header.loop_size(),
        client: header.client.clone(),
        source_file: source_name.to_string(),
        raw_tags: header.raw_tags.clone(),
        ingested_at: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_falls_back_to_name() {
        assert_eq!(file_stem("100EAV.STP"), "100EAV");
        assert_eq!(file_stem("noext"), "noext");
    }

    #[test]
    fn totals_sum_field_wise() {
        let mut totals = Totals::default();
        let other = Totals {
            surveys_new: 1,
            measurements_new: 3,
            ..Totals::default()
        };
        totals += &other;
        totals += &other;
        assert_eq!(totals.surveys_new, 2);
        assert_eq!(totals.measurements_new, 6);
    }
}
