//! ebase PDF Parser
//!
//! Fund account statements list one transaction block per action
//! ("Ansparplan", "Verkauf", ...). Every block has the same shape:
//! action, fund name, ISIN, a unit column, shares, price, date, amount.

use super::{contains_any, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{ActivityCandidate, Extension, ExtractorResult, TransactionKind};
use crate::scanner::{line_at, scan_entries, Step};
use crate::text::parse_locale_number;

const IDENTIFICATION: &str = "Fondsertrag / Vorabpauschale";

/// Block header; `span` counts the lines the block occupies
enum Action {
    Trade { kind: TransactionKind, span: usize },
    Ignored { span: usize },
}

fn action(line: &str) -> Option<Action> {
    let action = match line {
        "Ansparplan" => Action::Trade { kind: TransactionKind::Buy, span: 7 },
        // Reinvested payouts are booked against the fund position
        "Wiederanlage Fondsertrag" => Action::Trade { kind: TransactionKind::Sell, span: 7 },
        "Entgelt Verkauf" | "Verkauf" => Action::Trade { kind: TransactionKind::Sell, span: 9 },
        // Payout and advance lump sum rows carry no figures
        "Fondsertrag (Ausschüttung)" | "Vorabpauschale" => Action::Ignored { span: 4 },
        _ => return None,
    };
    Some(action)
}

/// Absolute value of the leading number of a line
fn absolute(lines: &[String], idx: usize) -> Option<f64> {
    line_at(lines, idx)
        .and_then(|line| line.split_whitespace().next())
        .map(|value| parse_locale_number(value).abs())
}

fn parse_block(
    broker: &str,
    lines: &[String],
    idx: usize,
    kind: TransactionKind,
    ctx: &ParseContext,
) -> ActivityCandidate {
    let stamp = line_at(lines, idx + 6).and_then(|date| ctx.german_date_time(date, None));

    ActivityCandidate {
        company: line_at(lines, idx + 1).map(str::to_string),
        isin: line_at(lines, idx + 2).map(str::to_string),
        shares: absolute(lines, idx + 4),
        price: absolute(lines, idx + 5),
        amount: absolute(lines, idx + 7),
        fee: Some(0.0),
        tax: Some(0.0),
        ..ActivityCandidate::new(broker, kind)
    }
    .with_timestamp(stamp)
}

pub struct EbaseParser;

impl BrokerParser for EbaseParser {
    fn id(&self) -> &'static str {
        "ebase"
    }

    fn name(&self) -> &'static str {
        "ebase"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        extension == Extension::Pdf && pages.iter().any(|content| contains_any(content, &[IDENTIFICATION]))
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let mut activities = Vec::new();

        for content in pages {
            let candidates = scan_entries(content, 0, |idx| match action(&content[idx]) {
                Some(Action::Trade { kind, span }) => Step::Entry {
                    item: parse_block(self.id(), content, idx, kind, ctx),
                    next: idx + span,
                },
                Some(Action::Ignored { span }) => Step::Skip { next: idx + span },
                None => Step::Skip { next: idx + 1 },
            });

            for candidate in candidates {
                activities.extend(ctx.accept(candidate));
            }
        }

        Ok(ExtractorResult::parsed(activities))
    }
}
