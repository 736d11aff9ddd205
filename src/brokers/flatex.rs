//! flatex PDF and CSV Parser
//!
//! PDF settlement notes hold one or more order tables. Each table starts
//! with a header line such as
//! `Nr.60797017/1  Kauf   BASF SE NA O.N. (DE000BASF111/BASF11)` and is
//! followed by key/value rows:
//! `Kurswert       :          207,83 EUR` (current layout) or
//! `Kurswert       EUR             62,50` (layout before 2019).
//!
//! CSV exports of the depot turnover list one booking per row.

use super::{contains_any, first_page, flatten, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{ActivityCandidate, Extension, ExtractorResult, TransactionKind};
use crate::text::{csv_lines_to_records, extract_isin, parse_locale_number, CsvRecord};
use once_cell::sync::Lazy;
use regex::Regex;

const BANK_NAMES: &[&str] = &["flatex Bank AG", "flatexDEGIRO Bank AG", "FinTech Group Bank AG", "biw AG"];
const DOCUMENT_MARKERS: &[&str] = &["Kauf", "Verkauf", "Dividendengutschrift", "Ertragsmitteilung"];
const DIVIDEND_MARKERS: &[&str] = &["Dividendengutschrift", "Ertragsmitteilung"];

const CSV_HEADER: &str = "Nummer;Buchtag;Valuta;ISIN;Bezeichnung;Nominal;;Buchungsinformationen;TA-Nr.;Kurs;";

static TABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Nr\.\d+(/\d)?").unwrap());
static COMPANY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Nr\.\d+(?:/\d)?\s+(?:Kauf|Verkauf)?(.*)\s+\(").unwrap());
static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]{3}").unwrap());
static DECIMAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+,\d+").unwrap());
static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{2}\.\d{2}\.\d{4}").unwrap());
static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}:\d{2}(:\d{2})?").unwrap());
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

/// Confirmations and savings plan setups carry no executed trade
fn is_ignored_document(lines: &[String]) -> bool {
    lines.iter().any(|line| {
        let lower = line.to_lowercase();
        lower.contains("auftragsbestätigung") || lower.contains("einrichtung sparplan nr")
    })
}

/// Key/value rows below one table header
struct Table<'a> {
    lines: &'a [String],
    start: usize,
}

impl<'a> Table<'a> {
    /// Both columns following `key` on the first row after the header
    /// that has one. Column 1 is the value, column 2 the remainder.
    fn columns(&self, key: &str) -> Option<(String, String)> {
        let key = regex::escape(key);
        let label = Regex::new(&format!(r"{}[\s+:]+\s+", key)).ok()?;
        let columns = Regex::new(&format!(r"^.*{}[\s+:]+\s+(.+?)\s+(.+)$", key)).ok()?;

        let row = self.lines.iter().skip(self.start + 1).find(|line| label.is_match(line))?;
        let caps = columns.captures(row)?;
        Some((caps[1].to_string(), caps[2].to_string()))
    }

    fn value(&self, key: &str) -> Option<String> {
        self.columns(key).map(|(value, _)| value)
    }

    fn second(&self, key: &str) -> Option<String> {
        self.columns(key).map(|(_, second)| second)
    }

    /// Value column of either layout; the old one puts the currency first
    fn amount(&self, key: &str) -> Option<f64> {
        let (value, second) = self.columns(key)?;
        let value = if CURRENCY_RE.is_match(&value) { second } else { value };
        value.split_whitespace().next().map(parse_locale_number)
    }

    fn sum(&self, keys: &[&str]) -> f64 {
        keys.iter().filter_map(|key| self.amount(key)).sum()
    }

    fn line(&self) -> &str {
        self.lines.get(self.start).map(String::as_str).unwrap_or("")
    }

    fn line_above(&self, distance: usize) -> &str {
        self.start
            .checked_sub(distance)
            .and_then(|idx| self.lines.get(idx))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Header field above the tables: `Handelstag   03.02.2020`
    fn header(&self, key: &str) -> Option<String> {
        let pattern = Regex::new(&format!(r"{}\s\s+(.+)", regex::escape(key))).ok()?;
        let needle = format!("{} ", key);
        let row = self.lines.iter().find(|line| line.contains(&needle))?;
        pattern.captures(row).map(|caps| caps[1].to_string())
    }

    fn company(&self) -> Option<String> {
        COMPANY_RE
            .captures(self.line())
            .map(|caps| SPACES_RE.replace_all(caps[1].trim(), " ").into_owned())
            .filter(|name| !name.is_empty())
    }

    fn shares(&self) -> Option<f64> {
        let executed = ["davon ausgef.", "Ordervolumen", "Ausgeführt"]
            .iter()
            .find_map(|key| self.value(key));
        if let Some(executed) = executed {
            return Some(parse_locale_number(&executed));
        }

        // Payout tables; documents from 2015 leave the first column empty
        let (value, second) = self.columns("St.")?;
        let value = if value.trim().is_empty() { second } else { value };
        Some(parse_locale_number(&value))
    }

    fn price(&self) -> Option<f64> {
        self.value("Kurs").map(|price| parse_locale_number(&price))
    }

    fn price_currency(&self) -> Option<String> {
        self.second("Kurs")
            .and_then(|rest| rest.split_whitespace().next().map(str::to_string))
            .filter(|currency| CURRENCY_RE.is_match(currency))
    }

    fn trade_date(&self) -> Option<String> {
        if let Some(closing) = self.value("Schlusstag") {
            return closing.split(',').next().map(str::to_string);
        }
        if let Some(day) = self.header("Handelstag") {
            return Some(day);
        }

        // Old layout: the date sits above all tables
        let row = self
            .lines
            .iter()
            .find(|line| line.starts_with("Schlusstag"))
            .or_else(|| self.lines.iter().find(|line| line.starts_with("Handelstag")))?;
        row.split_whitespace().nth(1).map(str::to_string)
    }

    fn order_time(&self) -> Option<String> {
        let time = self
            .second("Schlusstag")
            .filter(|time| TIME_RE.is_match(time))
            .or_else(|| self.header("Ausführungszeit").filter(|time| TIME_RE.is_match(time)))?;
        time.split_whitespace().next().map(str::to_string)
    }

    fn payout_date(&self) -> Option<String> {
        let (value, second) = self.columns("Valuta")?;
        Some(if DATE_RE.is_match(&value) { value } else { second })
    }

    /// Gross payout: the amount column, or the currency column when `amount` is false
    fn gross(&self, amount: bool) -> Option<String> {
        ["Bruttodividende", "Bruttoausschüttung", "grundlage"]
            .iter()
            .find_map(|key| self.columns(key))
            .map(|(value, second)| if amount { value } else { second })
    }

    /// Exchange rate with the foreign and base currency, if any applies
    fn foreign(&self) -> Option<(f64, Option<String>, Option<String>)> {
        let (value, second) = self.columns("Devisenkurs")?;
        // `Devisenkurs     :        1,113700` has the rate in column 2
        let rate = if value.trim().is_empty() { second } else { value };
        // Documents without conversion leave the field empty
        if !DECIMAL_RE.is_match(&rate) {
            return None;
        }

        let base = self.second("Endbetrag");
        let foreign = self
            .gross(false)
            .filter(|currency| Some(currency) != base.as_ref())
            .or_else(|| self.price_currency());
        Some((parse_locale_number(&rate), foreign, base))
    }
}

fn parse_table(broker: &str, table: &Table, ctx: &ParseContext) -> Result<Option<ActivityCandidate>, ExtractError> {
    let foreign = table.foreign();
    let shares = table.shares();
    let mut price = table.price();
    let header = table.line();

    let kind = if header.contains("Kauf") {
        TransactionKind::Buy
    } else if header.contains("Verkauf") {
        TransactionKind::Sell
    } else if contains_marker(table.line_above(3)) {
        TransactionKind::Dividend
    } else {
        return Ok(None);
    };

    let mut candidate = ActivityCandidate {
        isin: extract_isin(header),
        company: table.company(),
        shares,
        ..ActivityCandidate::new(broker, kind)
    };

    let stamp = match kind {
        TransactionKind::Dividend => {
            let mut gross = table.gross(true).map(|amount| parse_locale_number(&amount));
            if let Some((rate, Some(currency), _)) = &foreign {
                let payout_currency = table.gross(false);
                if payout_currency.as_ref() != Some(currency) {
                    return Err(ExtractError::Layout {
                        broker: broker.to_string(),
                        detail: format!(
                            "payout currency {} cannot be converted with the {} exchange rate",
                            payout_currency.unwrap_or_default(),
                            currency
                        ),
                    });
                }
                gross = gross.map(|amount| amount / rate);
            }

            let net = table.value("Endbetrag").map(|amount| parse_locale_number(&amount));
            let tax = match (gross, net) {
                // Conversion rounding can leave a tiny remainder
                (Some(gross), Some(net)) if (gross - net).abs() >= 0.01 => gross - net,
                _ => 0.0,
            };

            price = match (gross, shares) {
                (Some(gross), Some(shares)) => Some(gross / shares),
                _ => None,
            };
            candidate.amount = gross;
            candidate.fee = Some(0.0);
            candidate.tax = Some(tax);
            table.payout_date().and_then(|date| ctx.german_date_time(&date, None))
        }
        _ => {
            candidate.amount = table.amount("Kurswert");
            candidate.fee = Some(table.sum(&["Provision", "Eigene Spesen", "Fremde Spesen"]));
            candidate.tax = Some(if kind == TransactionKind::Sell {
                table.sum(&["Einbeh. Steuer", "Einbeh. KESt"])
            } else {
                0.0
            });
            let time = table.order_time();
            table
                .trade_date()
                .and_then(|date| ctx.german_date_time(&date, time.as_deref()))
        }
    };

    if let Some((rate, Some(currency), base)) = foreign {
        if Some(&currency) != base.as_ref() {
            if kind != TransactionKind::Dividend && table.price_currency().is_some() {
                price = price.map(|price| price / rate);
            }
            candidate = candidate.with_fx(Some(rate), Some(currency));
        }
    }

    candidate.price = price;
    Ok(Some(candidate.with_timestamp(stamp)))
}

fn contains_marker(line: &str) -> bool {
    DIVIDEND_MARKERS.iter().any(|marker| line.contains(marker))
}

fn csv_kind(booking: &str) -> TransactionKind {
    if booking.contains("Verkauf") {
        TransactionKind::Sell
    } else if booking.contains("Kauf") {
        TransactionKind::Buy
    } else if booking.contains("WP-Eingang") {
        TransactionKind::TransferIn
    } else {
        TransactionKind::Unknown
    }
}

fn parse_csv_record(broker: &str, record: &CsvRecord, ctx: &ParseContext) -> ActivityCandidate {
    let field = |key: &str| record.get(key).map(String::as_str).unwrap_or("");
    let shares = parse_locale_number(field("Nominal"));
    let price = parse_locale_number(field("Kurs"));
    let stamp = ctx.german_date_time(field("Buchtag"), None);

    ActivityCandidate {
        isin: Some(field("ISIN").to_string()).filter(|isin| !isin.is_empty()),
        company: Some(field("Bezeichnung").to_string()).filter(|name| !name.is_empty()),
        shares: Some(shares),
        price: Some(price),
        amount: Some(price * shares),
        fee: Some(0.0),
        tax: Some(0.0),
        ..ActivityCandidate::new(broker, csv_kind(field("Buchungsinformationen")))
    }
    .with_timestamp(stamp)
}

pub struct FlatexParser;

impl FlatexParser {
    fn parse_csv(&self, pages: &[Page], ctx: &mut ParseContext) -> ExtractorResult {
        let records = csv_lines_to_records(first_page(pages));
        let mut activities = Vec::new();
        for record in &records {
            let candidate = parse_csv_record(self.id(), record, ctx);
            activities.extend(ctx.accept(candidate));
        }
        ExtractorResult::parsed(activities)
    }
}

impl BrokerParser for FlatexParser {
    fn id(&self) -> &'static str {
        "flatex"
    }

    fn name(&self) -> &'static str {
        "flatex"
    }

    fn formats(&self) -> &'static [Extension] {
        &[Extension::Pdf, Extension::Csv]
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        let content = first_page(pages);
        match extension {
            Extension::Csv => content.first().is_some_and(|header| header.contains(CSV_HEADER)),
            Extension::Pdf => {
                contains_any(content, BANK_NAMES)
                    && (contains_any(content, DOCUMENT_MARKERS) || is_ignored_document(content))
            }
        }
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        if first_page(pages).first().is_some_and(|header| header.contains(CSV_HEADER)) {
            return Ok(self.parse_csv(pages, ctx));
        }

        if is_ignored_document(&flatten(pages)) {
            log::info!("flatex: order confirmation without execution, skipping");
            return Ok(ExtractorResult::unsupported());
        }

        let mut activities = Vec::new();
        for content in pages {
            let starts = content
                .iter()
                .enumerate()
                .filter(|(_, line)| TABLE_RE.is_match(line))
                .map(|(idx, _)| idx);

            for start in starts {
                let table = Table { lines: content, start };
                if let Some(candidate) = parse_table(self.id(), &table, ctx)? {
                    activities.extend(ctx.accept(candidate));
                }
            }
        }

        Ok(ExtractorResult::parsed(activities))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::models::{format_datetime, ActivityType, ParseStatus};

    fn buy_page() -> Vec<&'static str> {
        vec![
            "flatex Bank AG · Rotfeder-Ring 7 · 60327 Frankfurt am Main",
            "Sammelabrechnung (Wertpapierkauf/-verkauf)",
            "Nr.60797017/1  Kauf            BASF SE NA O.N.  (DE000BASF111/BASF11)",
            "Börse          :  Tradegate AG        Kurswert       :         1.299,00 EUR",
            "Ordervolumen   :  20,00               Provision      :            5,90 EUR",
            "Kurs           :  64,950000 EUR       Devisenkurs",
            "Schlusstag     :  03.02.2020, 10:32 Uhr",
            "Valuta         :  05.02.2020          Endbetrag      :        -1.304,90 EUR",
        ]
    }

    fn csv_export() -> Vec<&'static str> {
        vec![
            "Nummer;Buchtag;Valuta;ISIN;Bezeichnung;Nominal;;Buchungsinformationen;TA-Nr.;Kurs;Währung",
            "1;03.02.2020;05.02.2020;DE000BASF111;BASF SE;20,00;STK;Kauf BASF SE;123;64,95;EUR",
            "2;04.02.2020;06.02.2020;DE0007164600;SAP SE;5,00;STK;WP-Eingang;124;100,00;EUR",
        ]
    }

    pub(crate) fn samples() -> Vec<Sample> {
        vec![
            pdf("flatex", &[&buy_page()]),
            pdf("flatex", &[&dividend_page()]),
            csv("flatex", &csv_export()),
        ]
    }

    #[test]
    fn test_detect() {
        assert!(FlatexParser.can_parse(&pages(&[&buy_page()]), Extension::Pdf));
        assert!(!FlatexParser.can_parse(&pages(&[&["flatex Bank AG", "Depotauszug"]]), Extension::Pdf));
        assert!(FlatexParser.can_parse(
            &pages(&[&["flatex Bank AG", "Auftragsbestätigung"]]),
            Extension::Pdf
        ));
    }

    #[test]
    fn test_buy() {
        let activities = activities(&FlatexParser, &pages(&[&buy_page()]));
        assert_eq!(activities.len(), 1);
        let buy = &activities[0];
        assert_eq!(buy.activity_type, ActivityType::Buy);
        assert_eq!(buy.isin.as_deref(), Some("DE000BASF111"));
        assert_eq!(buy.company.as_deref(), Some("BASF SE NA O.N."));
        assert_eq!(buy.shares, 20.0);
        assert_eq!(buy.price, 64.95);
        assert_eq!(buy.amount, 1299.0);
        assert_eq!(buy.fee, 5.9);
        assert_eq!(buy.tax, 0.0);
        assert_eq!(buy.date, date(2020, 2, 3));
        assert_eq!(format_datetime(&buy.datetime), "2020-02-03T09:32:00.000Z");
        assert_eq!(buy.fx_rate, None);
    }

    #[test]
    fn test_sell_in_old_layout() {
        let doc = pages(&[&[
            "FinTech Group Bank AG",
            "Schlusstag 12.06.2018",
            "Nr.7654321  Verkauf   SAP SE (DE0007164600/716460)",
            "Ausgeführt     :        10 St.        Kurswert       EUR           1.000,00",
            "Kurs           :       100,00 EUR     Provision      EUR               5,90",
            "Einbeh. Steuer         EUR      12,50",
        ]]);
        let activities = activities(&FlatexParser, &doc);
        let sell = &activities[0];
        assert_eq!(sell.activity_type, ActivityType::Sell);
        assert_eq!(sell.shares, 10.0);
        assert_eq!(sell.amount, 1000.0);
        assert_eq!(sell.fee, 5.9);
        assert_eq!(sell.tax, 12.5);
        assert_eq!(sell.date, date(2018, 6, 12));
    }

    fn dividend_page() -> Vec<&'static str> {
        vec![
            "flatex Bank AG",
            "Dividendengutschrift",
            "Depotinhaber Max Mustermann",
            "Depot-Nr. 1234567",
            "Nr.123456789  Apple Inc. (US0378331005/865985)",
            "St.            :            40        Bruttodividende:            32,80 USD",
            "Devisenkurs    :      1,093333        *Einbeh. Steuer:             4,50 EUR",
            "Valuta         :    14.05.2020        Endbetrag      :            25,50 EUR",
        ]
    }

    #[test]
    fn test_foreign_dividend() {
        let activities = activities(&FlatexParser, &pages(&[&dividend_page()]));
        let dividend = &activities[0];
        assert_eq!(dividend.activity_type, ActivityType::Dividend);
        assert_eq!(dividend.company.as_deref(), Some("Apple Inc."));
        assert_eq!(dividend.shares, 40.0);
        assert!((dividend.amount - 30.0).abs() < 1e-4);
        assert!((dividend.tax - 4.5).abs() < 1e-4);
        assert_eq!(dividend.fx_rate, Some(1.093333));
        assert_eq!(dividend.foreign_currency.as_deref(), Some("USD"));
        assert_eq!(dividend.date, date(2020, 5, 14));
    }

    #[test]
    fn test_payout_currency_mismatch_fails() {
        // Gross stated in the base currency, exchange rate quoted for CAD
        let mut page = dividend_page();
        page[5] = "St.            :            40        Bruttodividende:            32,80 EUR";
        page.insert(5, "Kurs           :       12,00 CAD");
        let doc = pages(&[&page]);

        let config = crate::config::ImportConfig::default();
        let clock = clock();
        let mut ctx = ParseContext::new(&config, &clock);
        let err = FlatexParser.parse(&doc, &mut ctx).unwrap_err();
        assert!(matches!(err, ExtractError::Layout { .. }));
    }

    #[test]
    fn test_order_confirmation_is_unsupported() {
        let doc = pages(&[&["flatex Bank AG", "Auftragsbestätigung", "Nr.1234  Kauf  SAP SE (DE0007164600)"]]);
        let (result, _) = run(&FlatexParser, &doc);
        assert_eq!(result.status, ParseStatus::Unsupported);
        assert_eq!(result.activities, Some(vec![]));
    }

    #[test]
    fn test_csv_export() {
        let doc = pages(&[&csv_export()]);
        assert!(FlatexParser.can_parse(&doc, Extension::Csv));
        assert!(!FlatexParser.can_parse(&doc, Extension::Pdf));

        let activities = activities(&FlatexParser, &doc);
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].activity_type, ActivityType::Buy);
        assert_eq!(activities[0].price, 64.95);
        assert!((activities[0].amount - 1299.0).abs() < 1e-9);
        assert_eq!(activities[0].date, date(2020, 2, 3));
        // Deliveries into the depot count as buys
        assert_eq!(activities[1].activity_type, ActivityType::Buy);
        assert_eq!(activities[1].amount, 500.0);
    }
}
