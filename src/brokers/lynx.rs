//! Lynx PDF Parser
//!
//! Lynx activity statements are Interactive Brokers reports rendered as
//! PDF. Text extraction yields one table cell per line, so trades are read
//! as runs of twelve cells below the "Trades" heading, and ISINs are looked
//! up by symbol in the "Financial Instrument Information" table.

use super::{contains_any, flatten, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{ActivityCandidate, Extension, ExtractorResult, TransactionKind};
use crate::scanner::{line_at, scan_entries, Step};
use crate::text::parse_plain_number;
use std::collections::HashMap;

const IDENTIFICATION: &[&str] = &["Lynx b.v.", "Activity Statement", "Trades", "Financial Instrument Information"];

/// Symbol, date, time, quantity, trade price, close price, proceeds, fee,
/// basis, realized P/L, mark-to-market P/L, code
const TRADE_CELLS: usize = 12;

#[derive(Debug, Clone, PartialEq)]
struct Instrument {
    description: String,
    isin: String,
}

fn position(lines: &[String], from: usize, needle: &str) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, line)| line.as_str() == needle)
        .map(|(idx, _)| idx)
}

/// Rows of symbol, description (one or more cells), contract id, ISIN and
/// three trailing cells
fn instrument_table(lines: &[String]) -> HashMap<String, Instrument> {
    let mut instruments = HashMap::new();
    let Some(table) = position(lines, 0, "Financial Instrument Information") else {
        log::warn!("lynx: no financial instrument table found");
        return instruments;
    };
    let Some(stocks) = position(lines, table, "Stocks") else {
        return instruments;
    };

    let mut idx = stocks + 1;
    while let Some(symbol) = line_at(lines, idx).filter(|line| *line != "Symbol" && *line != "Codes") {
        idx += 1;
        let mut description = Vec::new();
        while let Some(cell) = line_at(lines, idx).filter(|cell| !cell.chars().all(|c| c.is_ascii_digit())) {
            description.push(cell);
            idx += 1;
        }
        // Skip the contract id
        idx += 1;
        let Some(isin) = line_at(lines, idx) else {
            break;
        };

        instruments.insert(
            symbol.to_string(),
            Instrument {
                description: description.join(" "),
                isin: isin.to_string(),
            },
        );
        idx += 4;
    }

    instruments
}

/// Cursor position after the summary rows that may follow a trade
fn skip_totals(lines: &[String], mut idx: usize, symbol: &str) -> usize {
    if line_at(lines, idx) == Some(format!("Total {}", symbol).as_str()) {
        idx += 7;
    }
    if line_at(lines, idx) == Some("Total") {
        idx += 6;
    }
    if line_at(lines, idx).is_some_and(|line| line.starts_with("Total in ")) {
        idx += 6;
    }
    if line_at(lines, idx) == Some("Transfers") {
        return lines.len();
    }
    idx
}

fn parse_trade(
    broker: &str,
    cells: &[String],
    instruments: &HashMap<String, Instrument>,
    ctx: &ParseContext,
) -> ActivityCandidate {
    let symbol = cells[0].as_str();
    // Dates carry the separator to the time cell: `2020-01-02,`
    let date = cells[1].trim_end_matches(',');
    let stamp = ctx.date_time(date, Some(&cells[2]), "%Y-%m-%d", "%Y-%m-%d %H:%M:%S");

    let kind = if cells[11].eq_ignore_ascii_case("o") {
        TransactionKind::Buy
    } else {
        TransactionKind::Sell
    };

    let instrument = instruments.get(symbol);
    if instrument.is_none() {
        log::warn!("lynx: no ISIN for symbol '{}', CFDs do not expose their underlying", symbol);
    }

    ActivityCandidate {
        isin: instrument.map(|info| info.isin.clone()),
        company: Some(
            instrument
                .map(|info| info.description.clone())
                .filter(|description| !description.is_empty())
                .unwrap_or_else(|| symbol.to_string()),
        ),
        shares: Some(parse_plain_number(&cells[3]).abs()),
        price: Some(parse_plain_number(&cells[4])),
        amount: Some(parse_plain_number(&cells[6]).abs()),
        fee: Some(parse_plain_number(&cells[7]).abs()),
        tax: Some(0.0),
        ..ActivityCandidate::new(broker, kind)
    }
    .with_timestamp(stamp)
}

pub struct LynxParser;

impl BrokerParser for LynxParser {
    fn id(&self) -> &'static str {
        "lynx"
    }

    fn name(&self) -> &'static str {
        "Lynx"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        let lines = flatten(pages);
        extension == Extension::Pdf && IDENTIFICATION.iter().all(|needle| contains_any(&lines, &[*needle]))
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let lines = flatten(pages);
        let instruments = instrument_table(&lines);

        let Some(trades) = position(&lines, 1, "Trades") else {
            return Ok(ExtractorResult::parsed(Vec::new()));
        };

        let candidates = scan_entries(&lines, trades + 1, |idx| {
            let mut start = idx;
            // Column headers precede each asset class; the cell after the
            // class name is the currency
            if lines[idx] == "Symbol" {
                let section = ["Stocks", "CFDs"]
                    .iter()
                    .filter_map(|name| position(&lines, idx, name))
                    .min();
                match section {
                    Some(section) => start = section + 2,
                    None => return Step::Done,
                }
            }

            let Some(cells) = lines.get(start..start + TRADE_CELLS) else {
                log::warn!("lynx: trade at line {} is truncated", start);
                return Step::Done;
            };
            Step::Entry {
                item: parse_trade(self.id(), cells, &instruments, ctx),
                next: skip_totals(&lines, start + TRADE_CELLS, &cells[0]),
            }
        });

        let mut activities = Vec::new();
        for candidate in candidates {
            activities.extend(ctx.accept(candidate));
        }
        Ok(ExtractorResult::parsed(activities))
    }
}
