//! Union Investment PDF Parser
//!
//! Depot statements list every fund of a sub-depot with its ISIN at the
//! top, then the turnover of the period. Figures are split over two
//! lines, integer part and decimals: `25` / `,00`.
//!
//! Later turnover rows name the fund without its ISIN, so the ISIN is
//! looked up by fund name.

use super::{BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{ActivityCandidate, Extension, ExtractorResult, TransactionKind};
use crate::scanner::line_at;
use crate::text::parse_locale_number;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const IDENTIFICATION: &str = "Union Investment Service Bank AG · 60621 Frankfurt am Main";

const SUB_DEPOT: &str = "Unterdepot-Nr.:";
// Last token of "p. a." in the interest column; the next fund name follows it
const PER_ANNUM: &str = "a.";
const ISIN_LABEL: &str = "ISIN:";

const BUY: &str = "Anlage";
const PAYOUT: &str = "Ausschüttung";
const REINVESTMENT: &str = "Wiederanlage";
const CHURCH_TAX: &str = "abgeführte Kirchensteuer";
const CAPITAL_GAINS_TAX: &str = "abgeführte Kapitalertragsteuer";
const SOLIDARITY_SURCHARGE: &str = "inklusive Solidaritätszuschlag";

static DECIMALS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",[0-9]{2,}").unwrap());
static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]{2}\.[0-9]{2}\.[0-9]{4}").unwrap());

/// Closest line before `idx`, not looking above `floor`
fn prior(lines: &[String], floor: usize, idx: usize, matches: impl Fn(&str) -> bool) -> Option<usize> {
    (floor..idx.min(lines.len())).rev().find(|&i| matches(&lines[i]))
}

fn next_exact(lines: &[String], from: usize, exact: &str) -> Option<usize> {
    (from..lines.len()).find(|&i| lines[i] == exact)
}

fn joined(lines: &[String], start: usize, end: usize) -> Option<String> {
    lines
        .get(start..end)
        .map(|parts| parts.join(" "))
        .filter(|name| !name.is_empty())
}

/// A number split over two lines
fn split_number(lines: &[String], idx: usize) -> Option<f64> {
    let integer = line_at(lines, idx)?;
    let decimals = line_at(lines, idx + 1)?;
    Some(parse_locale_number(&format!("{}{}", integer, decimals)))
}

/// Fund name -> ISIN for every fund listed on the page.
///
/// The first fund of a sub-depot follows the sub-depot header, further
/// funds follow the interest column of the previous one.
fn fund_isins(lines: &[String]) -> HashMap<String, String> {
    let mut funds = HashMap::new();
    let mut last_isin: Option<usize> = None;

    for isin_idx in (0..lines.len()).filter(|&i| lines[i] == ISIN_LABEL) {
        let after_last = |i: &usize| last_isin.map_or(true, |last| *i >= last);
        let company = if let Some(start) = prior(lines, 0, isin_idx, |line| line == SUB_DEPOT).filter(after_last) {
            joined(lines, start + 4, isin_idx)
        } else if let Some(start) = prior(lines, 0, isin_idx, |line| line == PER_ANNUM).filter(after_last) {
            joined(lines, start + 1, isin_idx)
        } else {
            None
        };

        match (company, line_at(lines, isin_idx + 1)) {
            (Some(company), Some(isin)) => {
                funds.insert(company, isin.to_string());
            }
            _ => log::error!("unioninvest: ISIN at line {} without fund name", isin_idx),
        }
        last_isin = Some(isin_idx);
    }

    funds
}

/// Fund name of the turnover row at `idx` whose date sits at `date_idx`.
///
/// A sub-depot holding a single fund only names it in the header; the
/// line above the date is then a figure of the header block.
fn transaction_company(lines: &[String], floor: usize, idx: usize, date_idx: usize) -> Option<String> {
    let above_date = date_idx.checked_sub(1).and_then(|i| line_at(lines, i))?;

    if DECIMALS_RE.is_match(above_date) {
        let isin_idx = prior(lines, floor, idx, |line| line == ISIN_LABEL)?;
        let sub_depot = prior(lines, floor, isin_idx, |line| line == SUB_DEPOT);
        let per_annum = prior(lines, floor, isin_idx, |line| line == PER_ANNUM);
        match (sub_depot, per_annum) {
            (Some(start), None) => joined(lines, start + 4, isin_idx),
            (Some(start), Some(other)) if start > other => joined(lines, start + 4, isin_idx),
            (_, Some(start)) => joined(lines, start + 1, isin_idx),
            (None, None) => None,
        }
    } else {
        // The name follows the last figure of the previous row
        let start = prior(lines, floor, idx, |line| DECIMALS_RE.is_match(line)).map_or(floor, |i| i + 1);
        joined(lines, start, date_idx)
    }
}

/// Amount, price and shares of an order row starting at `idx`
fn order(broker: &str, lines: &[String], idx: usize) -> ActivityCandidate {
    ActivityCandidate {
        amount: split_number(lines, idx + 1),
        price: split_number(lines, idx + 5),
        shares: split_number(lines, idx + 7),
        fee: Some(0.0),
        tax: Some(0.0),
        ..ActivityCandidate::new(broker, TransactionKind::Buy)
    }
}

/// Tax rows count only when their second line carries decimals
fn tax_at(lines: &[String], idx: Option<usize>) -> f64 {
    idx.filter(|&i| line_at(lines, i + 2).is_some_and(|line| line.contains(',')))
        .and_then(|i| split_number(lines, i + 1))
        .unwrap_or(0.0)
}

struct Statement<'a> {
    broker: &'a str,
    lines: &'a [String],
    funds: HashMap<String, String>,
}

impl Statement<'_> {
    fn with_fund(&self, candidate: ActivityCandidate, company: Option<String>) -> ActivityCandidate {
        ActivityCandidate {
            isin: company.as_ref().and_then(|name| self.funds.get(name)).cloned(),
            company,
            ..candidate
        }
    }

    fn buy(&self, floor: usize, idx: usize, ctx: &ParseContext) -> Option<ActivityCandidate> {
        // Booking date above the value date
        let date_idx = prior(self.lines, floor, idx, |line| DATE_RE.is_match(line))?.checked_sub(1)?;
        let company = transaction_company(self.lines, floor, idx, date_idx);
        // Statements carry no order time
        let stamp = ctx.german_date_time(&self.lines[date_idx], None);

        Some(self.with_fund(order(self.broker, self.lines, idx), company).with_timestamp(stamp))
    }

    fn payout(&self, floor: usize, idx: usize, ctx: &ParseContext) -> Vec<ActivityCandidate> {
        let lines = self.lines;
        let Some(church_tax) = next_exact(lines, idx, CHURCH_TAX) else {
            log::debug!("unioninvest: payout at line {} without tax block", idx);
            return Vec::new();
        };

        let date_idx = if line_at(lines, church_tax + 2).is_some_and(|line| line.contains(',')) {
            church_tax + 3
        } else {
            church_tax + 1
        };
        let stamp = line_at(lines, date_idx).and_then(|date| ctx.german_date_time(date, None));
        let company = transaction_company(lines, floor, idx, date_idx);

        let amount = split_number(lines, idx + 3);
        let shares = idx.checked_sub(2).and_then(|i| split_number(lines, i));
        let price = match (amount, shares) {
            (Some(amount), Some(shares)) => Some(amount / shares),
            _ => None,
        };
        let tax = tax_at(lines, next_exact(lines, idx, CAPITAL_GAINS_TAX))
            + tax_at(lines, next_exact(lines, idx, SOLIDARITY_SURCHARGE))
            + tax_at(lines, Some(church_tax));

        let dividend = ActivityCandidate {
            amount,
            shares,
            price,
            fee: Some(0.0),
            tax: Some(tax.abs()),
            ..ActivityCandidate::new(self.broker, TransactionKind::Dividend)
        };
        let mut candidates = vec![self.with_fund(dividend, company.clone()).with_timestamp(stamp)];

        // Reinvested payouts buy new fund shares on the payout date
        if let Some(reinvest) = next_exact(lines, church_tax, REINVESTMENT).filter(|&i| i - church_tax < 6) {
            candidates.push(self.with_fund(order(self.broker, lines, reinvest), company).with_timestamp(stamp));
        }
        candidates
    }

    fn candidates(&self, ctx: &ParseContext) -> Vec<ActivityCandidate> {
        let mut candidates = Vec::new();
        let mut floor = 0;

        for idx in 1..self.lines.len() {
            let line = self.lines[idx].as_str();
            if line == BUY {
                candidates.extend(self.buy(floor, idx, ctx));
            } else if line == PAYOUT && line_at(self.lines, idx + 1) != Some("sind") {
                candidates.extend(self.payout(floor, idx, ctx));
            } else {
                continue;
            }
            // Lookups for the next row stay below this one
            floor = idx + 1;
        }
        candidates
    }
}

pub struct UnionInvestmentParser;

impl BrokerParser for UnionInvestmentParser {
    fn id(&self) -> &'static str {
        "unioninvest"
    }

    fn name(&self) -> &'static str {
        "Union Investment"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        extension == Extension::Pdf
            && pages
                .iter()
                .any(|content| content.iter().any(|line| line.contains(IDENTIFICATION)))
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let mut activities = Vec::new();

        for content in pages {
            let page = Statement {
                broker: self.id(),
                lines: content,
                funds: fund_isins(content),
            };
            for candidate in page.candidates(ctx) {
                activities.extend(ctx.accept(candidate));
            }
        }

        Ok(ExtractorResult::parsed(activities))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::models::ActivityType;

    fn savings_plan() -> Vec<&'static str> {
        vec![
            IDENTIFICATION,
            "Unterdepot-Nr.:",
            "001",
            "Max Mustermann",
            "Anteilbestand",
            "PrivatFonds: Nachhaltig",
            "ISIN:",
            "LU1900195949",
            "Zinsen p.",
            "a.",
            "UniFavorit: Aktien -net-",
            "ISIN:",
            "DE0008007519",
            "Bestand 1,234",
            "PrivatFonds: Nachhaltig",
            "12.06.2019",
            "12.06.2019",
            "Anlage",
            "25",
            ",00",
            "EUR",
            "Ausgabepreis",
            "51",
            ",88",
            "0",
            ",482",
            "UniFavorit: Aktien -net-",
            "12.06.2019",
            "12.06.2019",
            "Anlage",
            "25",
            ",00",
            "EUR",
            "Ausgabepreis",
            "93",
            ",28",
            "0",
            ",268",
        ]
    }

    pub(crate) fn samples() -> Vec<Sample> {
        vec![pdf("unioninvest", &[&savings_plan()])]
    }

    #[test]
    fn test_detect() {
        assert!(UnionInvestmentParser.can_parse(&pages(&[&savings_plan()]), Extension::Pdf));
        assert!(!UnionInvestmentParser.can_parse(&pages(&[&savings_plan()]), Extension::Csv));
        assert!(!UnionInvestmentParser.can_parse(&pages(&[&["Union Investment"]]), Extension::Pdf));
    }

    #[test]
    fn test_fund_isins() {
        let funds = fund_isins(&lines(&savings_plan()));
        assert_eq!(funds.len(), 2);
        assert_eq!(funds["PrivatFonds: Nachhaltig"], "LU1900195949");
        assert_eq!(funds["UniFavorit: Aktien -net-"], "DE0008007519");
    }

    #[test]
    fn test_savings_plan_buys() {
        let activities = activities(&UnionInvestmentParser, &pages(&[&savings_plan()]));
        assert_eq!(activities.len(), 2);

        let first = &activities[0];
        assert_eq!(first.broker, "unioninvest");
        assert_eq!(first.activity_type, ActivityType::Buy);
        assert_eq!(first.company.as_deref(), Some("PrivatFonds: Nachhaltig"));
        assert_eq!(first.isin.as_deref(), Some("LU1900195949"));
        assert_eq!(first.date, date(2019, 6, 12));
        assert_eq!(first.amount, 25.0);
        assert_eq!(first.price, 51.88);
        assert_eq!(first.shares, 0.482);

        let second = &activities[1];
        assert_eq!(second.company.as_deref(), Some("UniFavorit: Aktien -net-"));
        assert_eq!(second.isin.as_deref(), Some("DE0008007519"));
        assert_eq!(second.price, 93.28);
        assert_eq!(second.shares, 0.268);
    }

    #[test]
    fn test_reinvested_payout() {
        let doc = pages(&[&[
            IDENTIFICATION,
            "Unterdepot-Nr.:",
            "002",
            "Max Mustermann",
            "Anteilbestand",
            "UniGlobal",
            "ISIN:",
            "DE0008491051",
            "10",
            ",000",
            "Ausschüttung",
            "pro Anteil",
            "0",
            "12",
            ",50",
            "abgeführte Kapitalertragsteuer",
            "-1",
            ",25",
            "inklusive Solidaritätszuschlag",
            "-0",
            ",07",
            "abgeführte Kirchensteuer",
            "-0",
            ",10",
            "20.11.2019",
            "Wiederanlage",
            "11",
            ",08",
            "EUR",
            "Ausgabepreis",
            "110",
            ",80",
            "0",
            ",100",
        ]]);

        let activities = activities(&UnionInvestmentParser, &doc);
        assert_eq!(activities.len(), 2);

        let dividend = &activities[0];
        assert_eq!(dividend.activity_type, ActivityType::Dividend);
        assert_eq!(dividend.company.as_deref(), Some("UniGlobal"));
        assert_eq!(dividend.isin.as_deref(), Some("DE0008491051"));
        assert_eq!(dividend.date, date(2019, 11, 20));
        assert_eq!(dividend.shares, 10.0);
        assert_eq!(dividend.amount, 12.5);
        assert_eq!(dividend.price, 1.25);
        assert!((dividend.tax - 1.42).abs() < 1e-9);

        let reinvestment = &activities[1];
        assert_eq!(reinvestment.activity_type, ActivityType::Buy);
        assert_eq!(reinvestment.isin.as_deref(), Some("DE0008491051"));
        assert_eq!(reinvestment.date, date(2019, 11, 20));
        assert_eq!(reinvestment.amount, 11.08);
        assert_eq!(reinvestment.price, 110.8);
        assert_eq!(reinvestment.shares, 0.1);
    }

    #[test]
    fn test_payout_notice_is_skipped() {
        let mut doc = savings_plan();
        doc.extend(["Ausschüttung", "sind", "steuerfrei"]);
        assert_eq!(activities(&UnionInvestmentParser, &pages(&[&doc])).len(), 2);
    }
}
