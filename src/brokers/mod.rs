//! Broker Statement Parsers
//!
//! Every supported institution implements [`BrokerParser`]: a pure
//! recognizer over the document's lines and an extractor that turns the
//! document into validated activities.

pub mod comdirect;
pub mod degiro;
pub mod deutschebank;
pub mod dkb;
pub mod ebase;
pub mod erstebank;
pub mod flatex;
pub mod ing;
pub mod interactive_brokers;
pub mod lynx;
pub mod mintos;
pub mod onvista;
pub mod scalable;
pub mod smartbroker;
pub mod trade_republic;
pub mod union_investment;

use crate::clock::Clock;
use crate::config::ImportConfig;
use crate::error::ExtractError;
use crate::models::{Activity, ActivityCandidate, Extension, ExtractorResult};
use crate::text::combine_date_and_time;
use crate::validation::{Rejection, Validator};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One page of a document: trimmed, non-empty lines in reading order
pub type Page = Vec<String>;

/// Broker parser trait
pub trait BrokerParser: Send + Sync {
    /// Identifier written into every activity's `broker` field
    fn id(&self) -> &'static str;

    /// Human readable institution name
    fn name(&self) -> &'static str;

    /// Formats this parser understands
    fn formats(&self) -> &'static [Extension] {
        &[Extension::Pdf]
    }

    /// Check if this parser recognizes the document. Must not panic and
    /// must decide from content alone.
    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool;

    /// Extract activities. Only called after `can_parse` returned true.
    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError>;
}

/// All available broker parsers
pub fn get_parsers() -> Vec<Box<dyn BrokerParser>> {
    vec![
        Box::new(comdirect::ComdirectParser),
        Box::new(degiro::DegiroParser),
        Box::new(deutschebank::DeutscheBankParser),
        Box::new(dkb::DkbParser),
        Box::new(ebase::EbaseParser),
        Box::new(erstebank::ErsteBankParser),
        Box::new(flatex::FlatexParser),
        Box::new(ing::IngParser),
        Box::new(interactive_brokers::InteractiveBrokersParser),
        Box::new(lynx::LynxParser),
        Box::new(mintos::MintosParser),
        Box::new(onvista::OnvistaParser),
        Box::new(scalable::ScalableParser),
        Box::new(smartbroker::SmartbrokerParser),
        Box::new(trade_republic::TradeRepublicParser),
        Box::new(union_investment::UnionInvestmentParser),
    ]
}

/// Every parser that claims the document.
///
/// A pure filter: all parsers are asked, so overlapping recognizers show
/// up as more than one match instead of being hidden by ordering.
pub fn find_implementations<'p>(
    parsers: &'p [Box<dyn BrokerParser>],
    pages: &[Page],
    extension: Extension,
) -> Vec<&'p dyn BrokerParser> {
    parsers
        .iter()
        .map(|parser| parser.as_ref())
        .filter(|parser| parser.can_parse(pages, extension))
        .collect()
}

/// Registered institution, as listed by the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerInfo {
    pub id: String,
    pub name: String,
    pub formats: Vec<Extension>,
}

pub fn supported_brokers() -> Vec<BrokerInfo> {
    get_parsers()
        .iter()
        .map(|parser| BrokerInfo {
            id: parser.id().to_string(),
            name: parser.name().to_string(),
            formats: parser.formats().to_vec(),
        })
        .collect()
}

/// Per-document parsing state: the reference clock and zone, the
/// validator, and every rejection collected along the way.
pub struct ParseContext<'a> {
    clock: &'a dyn Clock,
    zone: Tz,
    validator: Validator<'a>,
    rejections: Vec<Rejection>,
}

impl<'a> ParseContext<'a> {
    pub fn new(config: &ImportConfig, clock: &'a dyn Clock) -> Self {
        Self {
            clock,
            zone: config.zone(),
            validator: Validator::new(config, clock),
            rejections: Vec::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Combine a document date and optional time in the reference zone
    pub fn date_time(
        &self,
        date: &str,
        time: Option<&str>,
        date_format: &str,
        datetime_format: &str,
    ) -> Option<(NaiveDate, DateTime<Utc>)> {
        combine_date_and_time(date, time, date_format, datetime_format, self.zone, self.now())
    }

    /// Shorthand for `dd.mm.yyyy` dates with optional `hh:mm[:ss]` times
    pub fn german_date_time(&self, date: &str, time: Option<&str>) -> Option<(NaiveDate, DateTime<Utc>)> {
        self.date_time(date, time, "%d.%m.%Y", "%d.%m.%Y %H:%M:%S")
    }

    /// Validate a candidate; rejected candidates are recorded and dropped
    pub fn accept(&mut self, candidate: ActivityCandidate) -> Option<Activity> {
        self.admit(candidate, false)
    }

    /// Like [`accept`](Self::accept), but the company name alone may identify the security
    pub fn accept_with_company(&mut self, candidate: ActivityCandidate) -> Option<Activity> {
        self.admit(candidate, true)
    }

    fn admit(&mut self, candidate: ActivityCandidate, allow_company: bool) -> Option<Activity> {
        match self.validator.validate(&candidate, allow_company) {
            Ok(activity) => Some(activity),
            Err(rejection) => {
                self.rejections.push(rejection);
                None
            }
        }
    }

    pub fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }

    pub fn into_rejections(self) -> Vec<Rejection> {
        self.rejections
    }
}

/// First page, or nothing for an empty document
pub(crate) fn first_page(pages: &[Page]) -> &[String] {
    pages.first().map(Vec::as_slice).unwrap_or(&[])
}

/// All pages as one line sequence
pub(crate) fn flatten(pages: &[Page]) -> Vec<String> {
    pages.iter().flatten().cloned().collect()
}

pub(crate) fn contains_any(lines: &[String], needles: &[&str]) -> bool {
    lines
        .iter()
        .any(|line| needles.iter().any(|needle| line.contains(needle)))
}

pub(crate) fn has_line(lines: &[String], exact: &str) -> bool {
    lines.iter().any(|line| line == exact)
}
