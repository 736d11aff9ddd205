//! Deutsche Bank PDF Parser
//!
//! Only dividend credits are imported. Settlement notes for buys come out
//! of text extraction garbled ("_itte überprüfen") and are reported as
//! unsupported.

use super::{flatten, has_line, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{ActivityCandidate, Extension, ExtractorResult, TransactionKind};
use crate::scanner::{line_at, Anchor, FieldRule, Transform};
use crate::text::find_first_isin_index;

const DOMAIN: &str = "www.deutsche-bank.de";
const GARBLED_SETTLEMENT: &str = "_itte überprüfen";

const SHARES: FieldRule = FieldRule::line(Anchor::Equals("Stück"), 1);
const PAYOUT_DATE: FieldRule = FieldRule::line(Anchor::Equals("Gutschrift"), -1);
const FX_RATE: FieldRule = FieldRule::line(Anchor::Equals("Umrechnungskurs"), -1);
const FX_CURRENCY: FieldRule = FieldRule::new(Anchor::Equals("Umrechnungskurs"), 1, Transform::Token(0));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentType {
    Dividend,
    Unsupported,
}

fn document_type(lines: &[String]) -> Option<DocumentType> {
    if has_line(lines, "Dividendengutschrift") || has_line(lines, "Ertragsgutschrift") {
        Some(DocumentType::Dividend)
    } else if has_line(lines, GARBLED_SETTLEMENT) {
        Some(DocumentType::Unsupported)
    } else {
        None
    }
}

/// Security name between the share count block and "Zahlbar"
fn find_company(lines: &[String]) -> Option<String> {
    let start = lines.iter().position(|line| line == "Stück")? + 4;
    let end = lines.iter().position(|line| line == "Zahlbar")?.checked_sub(1)?;
    lines
        .get(start..end)
        .map(|names| names.join(" "))
        .filter(|name| !name.is_empty())
}

/// Amounts sit above their labels; the exchange rate block adds one line
fn tax_rules(offset: isize) -> [FieldRule; 3] {
    [
        FieldRule::new(Anchor::Equals("% Ausländische"), -offset - 1, Transform::Token(1)),
        FieldRule::new(Anchor::Equals("Solidaritätszuschlag"), -offset, Transform::Token(1)),
        FieldRule::new(Anchor::Equals("Kapitalertragsteuer"), -offset, Transform::Token(1)),
    ]
}

fn parse_dividend(broker: &str, lines: &[String], ctx: &ParseContext) -> ActivityCandidate {
    let fx_rate = FX_RATE.number(lines);
    let currency = FX_CURRENCY.text(lines);
    let offset = if fx_rate.is_some() { 2 } else { 1 };

    let isin_idx = lines
        .iter()
        .position(|line| line == "ISIN")
        .and_then(|anchor| find_first_isin_index(lines, anchor));

    let shares = SHARES.number(lines);
    let amount = FieldRule::new(Anchor::Equals("Bruttoertrag"), -offset, Transform::Token(0)).number(lines);
    let price = match (amount, shares) {
        (Some(amount), Some(shares)) => Some(amount / shares),
        _ => None,
    };
    let stamp = PAYOUT_DATE
        .text(lines)
        .and_then(|date| ctx.german_date_time(&date, None));

    ActivityCandidate {
        isin: isin_idx.and_then(|idx| line_at(lines, idx)).map(str::to_string),
        wkn: isin_idx.and_then(|idx| line_at(lines, idx + 1)).map(str::to_string),
        company: find_company(lines),
        shares,
        price,
        amount,
        fee: Some(0.0),
        tax: Some(tax_rules(offset).iter().filter_map(|rule| rule.number(lines)).sum()),
        ..ActivityCandidate::new(broker, TransactionKind::Dividend)
    }
    .with_timestamp(stamp)
    .with_fx(fx_rate, currency)
}

pub struct DeutscheBankParser;

impl BrokerParser for DeutscheBankParser {
    fn id(&self) -> &'static str {
        "deutschebank"
    }

    fn name(&self) -> &'static str {
        "Deutsche Bank"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        let lines = flatten(pages);
        // The garbled settlement layout lost its letterhead in extraction
        extension == Extension::Pdf
            && ((has_line(&lines, DOMAIN) && document_type(&lines).is_some())
                || has_line(&lines, GARBLED_SETTLEMENT))
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let lines = flatten(pages);
        match document_type(&lines) {
            Some(DocumentType::Dividend) => {
                let candidate = parse_dividend(self.id(), &lines, ctx);
                Ok(ExtractorResult::parsed(ctx.accept(candidate).into_iter().collect()))
            }
            Some(DocumentType::Unsupported) => {
                log::info!("deutschebank: settlement note text is unreadable, skipping");
                Ok(ExtractorResult::unsupported())
            }
            None => Ok(ExtractorResult::no_activities()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::models::{ActivityType, ParseStatus};

    fn dividend_lines(fx: bool) -> Vec<&'static str> {
        let mut lines = vec![
            "www.deutsche-bank.de",
            "Dividendengutschrift",
            "Stück",
            "40",
            "WKN",
            "ISIN",
            "Apple Inc.",
            "Registered Shares",
            "Zahlbar",
            "US0378331005",
            "865985",
            "14.05.2020",
            "Gutschrift",
        ];
        if fx {
            lines.extend([
                "32,80 USD",
                "1,0850",
                "Umrechnungskurs",
                "USD zu EUR",
                "30,23 EUR",
                "0,00",
                "Bruttoertrag",
                "EUR 4,53",
                "0,00",
                "15 % Ausländische",
                "% Ausländische",
            ]);
        } else {
            lines.extend(["30,23 EUR", "Bruttoertrag", "EUR 5,00", "Kapitalertragsteuer"]);
        }
        lines
    }

    pub(crate) fn samples() -> Vec<Sample> {
        vec![
            pdf("deutschebank", &[&dividend_lines(false)]),
            pdf("deutschebank", &[&dividend_lines(true)]),
            pdf("deutschebank", &[&["_itte überprüfen"]]),
        ]
    }

    #[test]
    fn test_detect() {
        assert!(DeutscheBankParser.can_parse(&pages(&[&dividend_lines(false)]), Extension::Pdf));
        assert!(DeutscheBankParser.can_parse(&pages(&[&["_itte überprüfen"]]), Extension::Pdf));
        assert!(!DeutscheBankParser.can_parse(&pages(&[&["www.deutsche-bank.de", "Depotauszug"]]), Extension::Pdf));
    }

    #[test]
    fn test_dividend() {
        let activities = activities(&DeutscheBankParser, &pages(&[&dividend_lines(false)]));
        let dividend = &activities[0];
        assert_eq!(dividend.activity_type, ActivityType::Dividend);
        assert_eq!(dividend.isin.as_deref(), Some("US0378331005"));
        assert_eq!(dividend.wkn.as_deref(), Some("865985"));
        assert_eq!(dividend.company.as_deref(), Some("Apple Inc."));
        assert_eq!(dividend.date, date(2020, 5, 14));
        assert_eq!(dividend.shares, 40.0);
        assert_eq!(dividend.amount, 30.23);
        assert_eq!(dividend.tax, 5.0);
        assert_eq!(dividend.fx_rate, None);
    }

    #[test]
    fn test_foreign_dividend() {
        let activities = activities(&DeutscheBankParser, &pages(&[&dividend_lines(true)]));
        let dividend = &activities[0];
        assert_eq!(dividend.fx_rate, Some(1.085));
        assert_eq!(dividend.foreign_currency.as_deref(), Some("USD"));
        assert_eq!(dividend.amount, 30.23);
        assert_eq!(dividend.tax, 4.53);
    }

    #[test]
    fn test_garbled_settlement_is_unsupported() {
        let (result, _) = run(&DeutscheBankParser, &pages(&[&["_itte überprüfen"]]));
        assert_eq!(result.status, ParseStatus::Unsupported);
    }
}
