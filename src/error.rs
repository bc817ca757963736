use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read instrument file {path}: {message}")]
    SourceRead { path: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("no .STP or .PEM files in {0}")]
    NoInstrumentFiles(String),

    #[error("no survey folders in {0}")]
    NoSurveyFolders(String),

    #[error("failed to load catalog: {0}")]
    StoreRead(String),

    #[error("failed to write catalog: {0}")]
    StoreWrite(String),

    #[error("unique constraint violated: {0}")]
    Constraint(String),

    #[error("survey not found: {0}")]
    SurveyNotFound(String),

    #[error("ingestion of {file} failed")]
    #[diagnostic(help("writes for this file were rolled back"))]
    File {
        file: String,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    pub fn for_file(file: impl Into<String>, source: IngestError) -> Self {
        match source {
            already @ IngestError::File { .. } => already,
            other => IngestError::File {
                file: file.into(),
                source: Box::new(other),
            },
        }
    }

    /// Error text including the wrapped cause, for failure listings.
    pub fn describe(&self) -> String {
        match self {
            IngestError::File { source, .. } => format!("{self}: {}", source.describe()),
            other => other.to_string(),
        }
    }
}
