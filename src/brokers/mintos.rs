//! Mintos CSV Parser
//!
//! Account statements of the P2P lending platform. Loan investments and
//! repayments are transfers of the platform "security", interest is a
//! dividend. Cash movements are not imported.

use super::{first_page, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{ActivityCandidate, Extension, ExtractorResult, TransactionKind};
use crate::text::{delimited_records, parse_plain_number, CsvRecord};

const COMPANY: &str = "Mintos";
const HEADER_COLUMNS: &[&str] = &["Date", "Transaction ID:", "Details", "Turnover", "Balance", "Currency"];

fn transaction_kind(details: &str) -> Option<TransactionKind> {
    if details.contains("repurchased") || details.contains("principal") {
        Some(TransactionKind::TransferOut)
    } else if details.contains("investment") {
        Some(TransactionKind::TransferIn)
    } else if details.contains("interest") {
        Some(TransactionKind::Dividend)
    } else {
        None
    }
}

fn parse_record(broker: &str, record: &CsvRecord, ctx: &ParseContext) -> Option<ActivityCandidate> {
    let field = |key: &str| record.get(key).map(String::as_str).unwrap_or("");

    let Some(kind) = transaction_kind(field("Details")) else {
        log::debug!("mintos: skipping cash movement '{}'", field("Details"));
        return None;
    };

    // `2020-03-30 14:09:00`
    let moment = field("Date");
    let stamp = moment
        .get(..10)
        .and_then(|date| ctx.date_time(date, moment.get(11..16), "%Y-%m-%d", "%Y-%m-%d %H:%M"));

    let amount = parse_plain_number(field("Turnover")).abs();
    let candidate = ActivityCandidate {
        company: Some(COMPANY.to_string()),
        shares: Some(1.0),
        price: Some(amount),
        amount: Some(amount),
        fee: Some(0.0),
        tax: Some(0.0),
        foreign_currency: Some(field("Currency").to_string()).filter(|currency| !currency.is_empty()),
        ..ActivityCandidate::new(broker, kind)
    };
    Some(candidate.with_timestamp(stamp))
}

pub struct MintosParser;

impl BrokerParser for MintosParser {
    fn id(&self) -> &'static str {
        "mintos"
    }

    fn name(&self) -> &'static str {
        "Mintos"
    }

    fn formats(&self) -> &'static [Extension] {
        &[Extension::Csv]
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        extension == Extension::Csv
            && first_page(pages)
                .iter()
                .any(|line| HEADER_COLUMNS.iter().all(|column| line.contains(column)))
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let lines = first_page(pages);
        let delimiter = match lines.first() {
            Some(header) if header.contains(';') => ';',
            _ => ',',
        };

        let records = delimited_records(lines, delimiter);
        if records.is_empty() {
            return Ok(ExtractorResult::no_activities());
        }

        let mut activities = Vec::new();
        for record in &records {
            if let Some(candidate) = parse_record(self.id(), record, ctx) {
                // The platform itself is the only security
                activities.extend(ctx.accept_with_company(candidate));
            }
        }
        Ok(ExtractorResult::parsed(activities))
    }
}
