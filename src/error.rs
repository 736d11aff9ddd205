//! Error types for the importer.

use thiserror::Error;

/// Errors raised outside of the per-document pipeline: reading files,
/// extracting PDF text, loading configuration.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid PDF: {0}")]
    InvalidPdf(String),

    #[error("failed to extract text from PDF: {0}")]
    PdfExtraction(String),

    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration file: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    #[error("unknown time zone: {0}")]
    TimeZone(String),
}

/// Failure of a single broker parser on a single document.
///
/// The orchestrator turns this into a failure status for the document;
/// it never aborts a batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("{broker}: required section '{section}' not found")]
    MissingSection { broker: String, section: String },

    #[error("{broker}: unexpected layout: {detail}")]
    Layout { broker: String, detail: String },

    #[error("{broker}: parser panicked: {message}")]
    Panicked { broker: String, message: String },
}

pub type Result<T> = std::result::Result<T, ImportError>;
