//! Interactive Brokers CSV Parser
//!
//! Activity statements are exported as one CSV file holding several
//! sections. Every row starts with the section name and the row kind:
//! `Transaktionen,Data,Order,Aktien,USD,AAPL,"2020-01-02, 10:00:00",10,...`
//!
//! Trades only carry the symbol; name and ISIN come from the
//! financial instrument section.

use super::{first_page, flatten, has_line, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{ActivityCandidate, Extension, ExtractorResult, TransactionKind};
use crate::text::{parse_plain_number, split_quoted};
use std::collections::HashMap;

const BROKER_LINE: &str = "Statement,Data,BrokerName,Interactive Brokers";
const ACTIVITY_TITLES: &[&str] = &[
    "Statement,Data,Title,Umsatzübersicht",
    "Statement,Data,Title,Activity Statement",
];

const INSTRUMENT_PREFIX: &str = "Informationen zum Finanzinstrument,Data,";
const TRADE_HEADER_PREFIX: &str = "Transaktionen,Header,DataDiscriminator,";
const TRADE_PREFIX: &str = "Transaktionen,Data,";
const BASE_CURRENCY: &str = "EUR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentType {
    ActivityStatement,
    Unsupported,
}

fn document_type(lines: &[String]) -> DocumentType {
    if ACTIVITY_TITLES.iter().any(|title| has_line(lines, title)) {
        DocumentType::ActivityStatement
    } else {
        DocumentType::Unsupported
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Instrument {
    name: String,
    isin: String,
}

/// Symbol -> instrument, from the financial instrument section
fn instruments(lines: &[String]) -> HashMap<String, Instrument> {
    lines
        .iter()
        .filter(|line| line.starts_with(INSTRUMENT_PREFIX))
        .filter_map(|line| {
            let values = split_quoted(line, ',');
            let symbol = values.get(3)?.clone();
            let instrument = Instrument {
                name: values.get(4)?.clone(),
                isin: values.get(6)?.clone(),
            };
            Some((symbol, instrument))
        })
        .collect()
}

fn parse_trade(
    broker: &str,
    line: &str,
    instruments: &HashMap<String, Instrument>,
    offset: usize,
    ctx: &ParseContext,
) -> Option<ActivityCandidate> {
    let values = split_quoted(line, ',');
    let field = |idx: usize| values.get(idx + offset).map(String::as_str).unwrap_or("");

    let Some(instrument) = instruments.get(field(5)) else {
        log::debug!("{}: no instrument information for symbol '{}', skipping trade", broker, field(5));
        return None;
    };

    let shares = parse_plain_number(field(7));
    let kind = if shares > 0.0 { TransactionKind::Buy } else { TransactionKind::Sell };

    let mut moment = field(6).split(", ");
    let stamp = moment
        .next()
        .and_then(|date| ctx.date_time(date, moment.next(), "%Y-%m-%d", "%Y-%m-%d %H:%M:%S"));

    let candidate = ActivityCandidate {
        isin: Some(instrument.isin.clone()),
        company: Some(instrument.name.clone()),
        shares: Some(shares.abs()),
        price: Some(parse_plain_number(field(8))),
        amount: Some(parse_plain_number(field(10)).abs()),
        fee: Some(-parse_plain_number(field(11))),
        tax: Some(0.0),
        ..ActivityCandidate::new(broker, kind)
    };

    // Foreign trades stay in the instrument currency; the export carries no rate
    let currency = Some(field(4))
        .filter(|currency| !currency.is_empty() && *currency != BASE_CURRENCY)
        .map(str::to_string);
    let fx_rate = currency.as_ref().map(|_| 1.0);
    Some(candidate.with_timestamp(stamp).with_fx(fx_rate, currency))
}

pub struct InteractiveBrokersParser;

impl BrokerParser for InteractiveBrokersParser {
    fn id(&self) -> &'static str {
        "interactivebrokers"
    }

    fn name(&self) -> &'static str {
        "Interactive Brokers"
    }

    fn formats(&self) -> &'static [Extension] {
        &[Extension::Csv]
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        extension == Extension::Csv && has_line(first_page(pages), BROKER_LINE)
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let lines = flatten(pages);
        if document_type(&lines) == DocumentType::Unsupported {
            log::info!("{}: statement is not an activity statement, skipping", self.id());
            return Ok(ExtractorResult::unsupported());
        }

        let instruments = instruments(&lines);

        // Multi-account reports add an `Account` column in front of the currency
        let offset = lines
            .iter()
            .find(|line| line.starts_with(TRADE_HEADER_PREFIX))
            .map_or(0, |header| usize::from(header.contains("Account")));

        let trades: Vec<&String> = lines.iter().filter(|line| line.starts_with(TRADE_PREFIX)).collect();
        if trades.is_empty() {
            return Ok(ExtractorResult::no_activities());
        }

        let mut activities = Vec::new();
        for trade in trades {
            if let Some(candidate) = parse_trade(self.id(), trade, &instruments, offset, ctx) {
                activities.extend(ctx.accept(candidate));
            }
        }

        Ok(ExtractorResult::parsed(activities))
    }
}
