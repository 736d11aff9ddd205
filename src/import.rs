//! Document import orchestration.
//!
//! Classifies a document against every registered parser, runs the single
//! match and reports the outcome as a status code. Nothing in here returns
//! an error for a document: failures become statuses.

use crate::brokers::{find_implementations, get_parsers, BrokerParser, Page, ParseContext};
use crate::clock::Clock;
use crate::config::ImportConfig;
use crate::document::load_file;
use crate::error::{ExtractError, ImportError, Result};
use crate::models::{DocumentResult, Extension, ExtractorResult, ParseStatus};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// Parse an already extracted document.
///
/// `extension` is the raw file extension (`"pdf"`, `"csv"`); anything else
/// yields status 4.
pub fn parse_document(pages: &[Page], extension: &str, config: &ImportConfig, clock: &dyn Clock) -> ExtractorResult {
    let extension = match extension.parse::<Extension>() {
        Ok(extension) => extension,
        Err(e) => {
            log::warn!("{}", e);
            return ExtractorResult::failed(ParseStatus::UnsupportedExtension);
        }
    };

    let parsers = get_parsers();
    let matches = find_implementations(&parsers, pages, extension);

    match matches.as_slice() {
        [] => {
            log::info!("No parser recognized the {} document", extension.as_str());
            ExtractorResult::failed(ParseStatus::Unrecognized)
        }
        [parser] => run_parser(*parser, pages, config, clock),
        several => {
            let ids: Vec<&str> = several.iter().map(|parser| parser.id()).collect();
            log::warn!("Document claimed by several parsers: {}", ids.join(", "));
            ExtractorResult::failed(ParseStatus::Ambiguous)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_parser(parser: &dyn BrokerParser, pages: &[Page], config: &ImportConfig, clock: &dyn Clock) -> ExtractorResult {
    log::debug!("Parsing document with {}", parser.id());
    let mut ctx = ParseContext::new(config, clock);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| parser.parse(pages, &mut ctx)))
        .unwrap_or_else(|payload| {
            Err(ExtractError::Panicked {
                broker: parser.id().to_string(),
                message: panic_message(payload.as_ref()),
            })
        });

    let mut result = match outcome {
        Ok(result) => result,
        Err(e) => {
            log::error!("{}", e);
            ExtractorResult::failed(ParseStatus::ExtractorFailed)
        }
    };

    let rejections = ctx.into_rejections();
    if !rejections.is_empty() {
        log::info!("{}: {} candidate(s) rejected", parser.id(), rejections.len());
    }
    result.rejections.extend(rejections);
    result
}

/// Parse an extracted document and wrap the outcome for `file`
pub fn import_pages(
    file: &str,
    pages: &[Page],
    extension: &str,
    config: &ImportConfig,
    clock: &dyn Clock,
) -> DocumentResult {
    DocumentResult::new(file, parse_document(pages, extension, config, clock))
}

/// Load and parse one file.
///
/// Unknown extensions are reported as status 4; I/O and PDF extraction
/// failures are errors.
pub fn import_file(path: &Path, config: &ImportConfig, clock: &dyn Clock) -> Result<DocumentResult> {
    let file = path.display().to_string();
    let document = match load_file(path) {
        Ok(document) => document,
        Err(ImportError::UnsupportedExtension(_)) => {
            log::warn!("Skipping {}: unsupported file extension", file);
            return Ok(DocumentResult::new(
                &file,
                ExtractorResult::failed(ParseStatus::UnsupportedExtension),
            ));
        }
        Err(e) => return Err(e),
    };

    let result = import_pages(&document.file, &document.pages, document.extension.as_str(), config, clock);
    log::info!("{}: status {}", file, result.status);
    Ok(result)
}

/// Import several files independently; a failing file does not stop the batch
pub fn import_files<P: AsRef<Path>>(paths: &[P], config: &ImportConfig, clock: &dyn Clock) -> Vec<DocumentResult> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            import_file(path, config, clock).unwrap_or_else(|e| {
                log::error!("Failed to import {}: {}", path.display(), e);
                DocumentResult::new(
                    &path.display().to_string(),
                    ExtractorResult::failed(ParseStatus::ExtractorFailed),
                )
            })
        })
        .collect()
}
