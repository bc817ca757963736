use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    ArchiveSummary, BatchSummary, FileSummary, IngestOutcome, InfoResult, ListResult,
    ProgressEvent, ProgressSink, RemoveResult, ResetResult, Totals,
};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_ingest(result: &IngestOutcome) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_remove(result: &RemoveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_reset(result: &ResetResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr for interactive runs.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub fn render_totals(totals: &Totals) -> Vec<String> {
    vec![
        format!("surveys: {} new", totals.surveys_new),
        format!("loops: {} new", totals.loops_new),
        format!("stations: {} new", totals.stations_new),
        format!("measurements: {} new", totals.measurements_new),
        format!("channels: {} new", totals.channels_new),
        format!("duplicates skipped: {}", totals.duplicates_skipped),
        format!("stations not found: {}", totals.stations_not_found),
        format!("malformed geometry tags: {}", totals.malformed_geometry),
    ]
}

fn print_file(summary: &FileSummary) {
    let survey_state = if summary.new_survey { "new" } else { "existing" };
    println!(
        "{CYAN}{} [{}] survey {} ({survey_state}){RESET}",
        summary.file, summary.format_detected, summary.survey_id
    );
    let mut totals = Totals::default();
    totals += summary;
    for line in render_totals(&totals).iter().skip(1) {
        println!("{GREEN}   {line}{RESET}");
    }
}

fn print_batch(batch: &BatchSummary) {
    println!(
        "{CYAN}{}: {} files{RESET}",
        batch.directory, batch.files_processed
    );
    for line in render_totals(&batch.totals) {
        println!("{GREEN}   {line}{RESET}");
    }
    for failure in &batch.failures {
        println!("{RED}   failed {}: {}{RESET}", failure.name, failure.error);
    }
}

fn print_archive(archive: &ArchiveSummary) {
    println!(
        "{CYAN}{}: {}/{} survey folders completed{RESET}",
        archive.archive, archive.folders_completed, archive.folders_total
    );
    for batch in &archive.folder_results {
        print_batch(batch);
    }
    println!("{CYAN}archive totals{RESET}");
    for line in render_totals(&archive.totals) {
        println!("{GREEN}   {line}{RESET}");
    }
    for failure in &archive.failures {
        println!("{RED}   failed {}: {}{RESET}", failure.name, failure.error);
    }
}

pub fn print_ingest_summary(outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::File(summary) => print_file(summary),
        IngestOutcome::Directory(batch) => print_batch(batch),
        IngestOutcome::Archive(archive) => print_archive(archive),
    }
}

pub fn print_info_summary(result: &InfoResult) {
    let survey = &result.survey;
    println!(
        "{CYAN}{}{RESET} [{}] from {} at {}",
        survey.code, survey.format, survey.source_file, survey.ingested_at
    );
    for line in render_info(result) {
        println!("{GREEN}   {line}{RESET}");
    }
}

pub fn render_info(result: &InfoResult) -> Vec<String> {
    let survey = &result.survey;
    let mut lines = vec![
        format!("line: {}", survey.line_id.as_deref().unwrap_or("-")),
        format!("client: {}", survey.client.as_deref().unwrap_or("-")),
        format!("operator: {}", survey.operator.as_deref().unwrap_or("-")),
    ];
    if let Some(current) = survey.peak_current {
        lines.push(format!("peak current: {current}"));
    }
    if let Some((x, y)) = survey.loop_size {
        lines.push(format!("loop size: {x} x {y}"));
    }
    lines.push(format!(
        "loops={} stations={} measurements={} channels={}",
        result.counts.loops,
        result.counts.stations,
        result.counts.measurements,
        result.counts.channels
    ));
    lines
}

pub fn print_list_summary(result: &ListResult) {
    if result.surveys.is_empty() {
        println!("{YELLOW}catalog is empty{RESET}");
        return;
    }
    for survey in &result.surveys {
        println!(
            "{CYAN}{}{RESET} [{}] line={} loops={} stations={} measurements={} channels={}",
            survey.code,
            survey.format,
            survey.line_id.as_deref().unwrap_or("-"),
            survey.counts.loops,
            survey.counts.stations,
            survey.counts.measurements,
            survey.counts.channels
        );
    }
}
