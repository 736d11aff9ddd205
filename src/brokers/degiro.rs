//! DEGIRO PDF Parser
//!
//! Three document types share the same letterhead:
//! - transaction logs ("Transaktionsübersicht von ..."): one table row per trade
//! - depot overviews ("Portfolioübersicht per ..."): positions imported as transfers
//! - account statements ("Kontoauszug von ..."): recognized, carry no activities

use super::{first_page, flatten, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{ActivityCandidate, Extension, ExtractorResult, TransactionKind};
use crate::scanner::{line_at, scan_entries, Step};
use crate::text::{find_first_isin_index, parse_locale_number};
use once_cell::sync::Lazy;
use regex::Regex;

const DOMAINS: &[&str] = &[
    "www.degiro.de",
    "www.degiro.es",
    "www.degiro.ie",
    "www.degiro.gr",
    "www.degiro.it",
    "www.degiro.pt",
    "www.degiro.fr",
    "www.degiro.nl",
    "www.degiro.at",
    "www.degiro.fi",
];

static ENTRY_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}-\d{2}-\d{4}$").unwrap());

const DATE_FORMAT: &str = "%d-%m-%Y";
const DATETIME_FORMAT: &str = "%d-%m-%Y %H:%M";

/// A trade row without exchange rate spans at least this many lines
const MIN_ENTRY_LINES: usize = 15;
const ENTRY_STRIDE: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentType {
    AccountStatement,
    TransactionLog,
    DepotOverview,
}

fn document_type(pages: &[Page]) -> Option<DocumentType> {
    let content = first_page(pages);
    let starts = |prefix: &str| content.iter().any(|line| line.starts_with(prefix));

    if starts("Kontoauszug von") {
        Some(DocumentType::AccountStatement)
    } else if starts("Transaktionsübersicht von") {
        Some(DocumentType::TransactionLog)
    } else if starts("Portfolioübersicht") {
        Some(DocumentType::DepotOverview)
    } else {
        None
    }
}

fn number(lines: &[String], idx: usize) -> Option<f64> {
    line_at(lines, idx).map(parse_locale_number)
}

/// One trade row starting at the date line `idx`
fn parse_trade(
    broker: &str,
    lines: &[String],
    idx: usize,
    offset: usize,
    ctx: &ParseContext,
) -> Option<ActivityCandidate> {
    let isin_idx = find_first_isin_index(lines, idx)?;
    let company = lines
        .get(idx + 2..isin_idx)
        .map(|names| names.join(" "))
        .filter(|name| !name.is_empty());

    let shares = number(lines, isin_idx + 2 + offset)?;
    if shares == 0.0 {
        log::debug!("{}: skipping trade without shares at line {}", broker, idx);
        return None;
    }

    let amount = number(lines, isin_idx + 8).map(f64::abs);
    let currency = line_at(lines, isin_idx + 3 + offset * 2);
    let base_currency = line_at(lines, isin_idx + 7 + offset * 2);

    // Foreign currency rows carry an extra exchange rate line
    let (fx_rate, foreign_currency, shift) = match (currency, base_currency) {
        (Some(currency), Some(base)) if currency != base => (
            number(lines, isin_idx + 9 + offset),
            Some(currency.to_string()),
            1,
        ),
        _ => (None, None, 0),
    };

    let kind = if shares > 0.0 {
        TransactionKind::Buy
    } else {
        TransactionKind::Sell
    };
    let charge = number(lines, isin_idx + shift + 10).map(f64::abs);
    let (fee, tax) = match kind {
        TransactionKind::Buy => (charge, Some(0.0)),
        _ => (Some(0.0), charge),
    };

    let stamp = line_at(lines, idx).and_then(|date| {
        ctx.date_time(date, line_at(lines, idx + 1), DATE_FORMAT, DATETIME_FORMAT)
    });

    Some(
        ActivityCandidate {
            isin: line_at(lines, isin_idx).map(str::to_string),
            company,
            shares: Some(shares.abs()),
            price: amount.map(|amount| amount / shares.abs()),
            amount,
            fee,
            tax,
            ..ActivityCandidate::new(broker, kind)
        }
        .with_timestamp(stamp)
        .with_fx(fx_rate, foreign_currency),
    )
}

fn parse_transaction_log(broker: &str, pages: &[Page], ctx: &mut ParseContext) -> ExtractorResult {
    // A reference exchange column shifts the row by one line
    let offset = usize::from(pages.iter().flatten().any(|line| line == "Ausführungso"));
    let mut activities = Vec::new();

    for content in pages {
        let Some(header) = content.iter().position(|line| line == "Gesamt") else {
            continue;
        };

        let candidates = scan_entries(content, header + 1, |idx| {
            if content.len() - idx <= MIN_ENTRY_LINES {
                return Step::Done;
            }
            if !ENTRY_DATE_RE.is_match(&content[idx]) {
                return Step::Skip { next: idx + 1 };
            }
            match parse_trade(broker, content, idx, offset, ctx) {
                Some(candidate) => Step::Entry {
                    item: candidate,
                    next: idx + ENTRY_STRIDE,
                },
                None => Step::Skip {
                    next: idx + ENTRY_STRIDE,
                },
            }
        });

        for candidate in candidates {
            activities.extend(ctx.accept(candidate));
        }
    }

    ExtractorResult::parsed(activities)
}

fn parse_depot_overview(
    broker: &str,
    pages: &[Page],
    ctx: &mut ParseContext,
) -> Result<ExtractorResult, ExtractError> {
    let lines = flatten(pages);
    let date = lines
        .iter()
        .find(|line| line.starts_with("Portfolioübersicht per "))
        .and_then(|line| line.split_whitespace().nth(2))
        .ok_or_else(|| ExtractError::MissingSection {
            broker: broker.to_string(),
            section: "Portfolioübersicht per".to_string(),
        })?;
    let stamp = ctx.date_time(date, None, DATE_FORMAT, DATETIME_FORMAT);

    let mut activities = Vec::new();
    let mut next = find_first_isin_index(&lines, 0);
    while let Some(isin_idx) = next {
        let candidate = ActivityCandidate {
            isin: line_at(&lines, isin_idx).map(str::to_string),
            company: isin_idx
                .checked_sub(1)
                .and_then(|idx| line_at(&lines, idx))
                .map(str::to_string),
            shares: number(&lines, isin_idx + 1),
            price: number(&lines, isin_idx + 2),
            amount: number(&lines, isin_idx + 4),
            fee: Some(0.0),
            tax: Some(0.0),
            ..ActivityCandidate::new(broker, TransactionKind::TransferIn)
        }
        .with_timestamp(stamp);

        activities.extend(ctx.accept(candidate));
        next = find_first_isin_index(&lines, isin_idx + 1);
    }

    Ok(ExtractorResult::parsed(activities))
}

pub struct DegiroParser;

impl BrokerParser for DegiroParser {
    fn id(&self) -> &'static str {
        "degiro"
    }

    fn name(&self) -> &'static str {
        "DEGIRO"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        extension == Extension::Pdf
            && first_page(pages)
                .iter()
                .any(|line| DOMAINS.contains(&line.as_str()))
            && document_type(pages).is_some()
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        match document_type(pages) {
            // Dividends in account statements lack the share count
            Some(DocumentType::AccountStatement) => Ok(ExtractorResult::no_activities()),
            Some(DocumentType::TransactionLog) => Ok(parse_transaction_log(self.id(), pages, ctx)),
            Some(DocumentType::DepotOverview) => parse_depot_overview(self.id(), pages, ctx),
            None => Err(ExtractError::Layout {
                broker: self.id().to_string(),
                detail: "unknown document type".to_string(),
            }),
        }
    }
}
