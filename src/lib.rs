//! Broker statement import.
//!
//! Recognizes which institution produced a PDF statement or CSV export and
//! extracts normalized, validated activities (buys, sells, dividends) from
//! it.

pub mod brokers;
pub mod clock;
pub mod config;
pub mod document;
pub mod error;
pub mod import;
pub mod models;
pub mod scanner;
pub mod text;
pub mod validation;

pub use brokers::{find_implementations, get_parsers, supported_brokers, BrokerInfo, BrokerParser, Page, ParseContext};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ImportConfig;
pub use document::{load_file, Document};
pub use error::{ExtractError, ImportError};
pub use import::{import_file, import_files, import_pages, parse_document};
pub use models::{Activity, ActivityType, DocumentResult, Extension, ExtractorResult, ParseStatus};
pub use validation::{Rejection, RejectionReason, Validator};
