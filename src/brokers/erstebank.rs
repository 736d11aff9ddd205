//! Erste Bank / Sparkassen PDF Parser
//!
//! Fund orders and payouts. ISIN and fund name share one line below the
//! order number header:
//! `AT0000707674                 ESPA BEST OF WORLD`

use super::{first_page, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{Extension, ExtractorResult, TransactionKind};
use crate::scanner::{all_present, ActivityLayout, Anchor, DateRule, FieldRule, Num, Transform};
use once_cell::sync::Lazy;
use regex::Regex;

const IDENTIFICATION: &[Anchor] = &[Anchor::Contains("ERSTE"), Anchor::Contains("SPARKASSEN")];

static EX_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Extag\s+(\d{2}\.\d{2}\.\d{4})").unwrap());

const ORDER_NUMBER: Anchor = Anchor::Contains("Auftragsnummer");

const fn isin(span: isize) -> FieldRule {
    FieldRule::new(ORDER_NUMBER, span, Transform::Token(0))
}

const fn company(span: isize) -> FieldRule {
    FieldRule::new(ORDER_NUMBER, span, Transform::After(" "))
}

const TRADE_DATE: DateRule =
    DateRule::german(&[FieldRule::new(Anchor::Contains("Schlusstag"), 0, Transform::Date)], None);
const TRADE_SHARES: Num = Num::Field(FieldRule::new(Anchor::Contains("Nennwert"), 1, Transform::Token(1)));

const MARKET_VALUE: FieldRule = FieldRule::new(Anchor::Contains("Kurswert"), 0, Transform::AfterLast("EUR"));
const TOTAL: FieldRule = FieldRule::new(Anchor::Contains("Zu Ihren"), 1, Transform::AfterLast("EUR"));

static LAYOUTS: [ActivityLayout; 3] = [
    ActivityLayout {
        kind: TransactionKind::Buy,
        markers: &[
            Anchor::Contains("Kauf aus Wertpapierliste"),
            Anchor::Contains("uf Marktplatz"),
        ],
        isin: Some(isin(1)),
        wkn: None,
        company: Some(company(1)),
        shares: TRADE_SHARES,
        date: TRADE_DATE,
        price: Num::Derived,
        amount: Num::Field(MARKET_VALUE),
        fee: Num::Difference { total: TOTAL, net: MARKET_VALUE },
        tax: Num::Zero,
        fx: None,
    },
    ActivityLayout {
        kind: TransactionKind::Sell,
        // Sell notes flag the redemption price with an asterisk
        markers: &[Anchor::Contains("*")],
        isin: Some(isin(2)),
        wkn: None,
        company: Some(company(1)),
        shares: TRADE_SHARES,
        date: TRADE_DATE,
        price: Num::Derived,
        amount: Num::Field(MARKET_VALUE),
        fee: Num::Difference { total: TOTAL, net: MARKET_VALUE },
        tax: Num::Zero,
        fx: None,
    },
    ActivityLayout {
        kind: TransactionKind::Dividend,
        markers: &[Anchor::Contains("Ausschüttung")],
        isin: Some(isin(1)),
        wkn: None,
        company: Some(company(2)),
        shares: Num::Field(FieldRule::new(Anchor::Contains("STK"), 0, Transform::Token(1))),
        date: DateRule::german(
            &[FieldRule::new(Anchor::Contains("Extag"), 0, Transform::Capture(&EX_DATE_RE))],
            None,
        ),
        price: Num::Derived,
        amount: Num::Field(FieldRule::new(Anchor::Contains("Gunsten"), 1, Transform::AfterLast("EUR"))),
        fee: Num::Zero,
        tax: Num::Zero,
        fx: None,
    },
];

pub struct ErsteBankParser;

impl BrokerParser for ErsteBankParser {
    fn id(&self) -> &'static str {
        "erstebank"
    }

    fn name(&self) -> &'static str {
        "Erste Bank"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        let content = first_page(pages);
        extension == Extension::Pdf
            && all_present(IDENTIFICATION, content)
            && LAYOUTS.iter().any(|layout| layout.matches(content))
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        // Only the first page carries activity data
        let content = first_page(pages);
        let layout = ActivityLayout::select(&LAYOUTS, content).ok_or_else(|| ExtractError::Layout {
            broker: self.id().to_string(),
            detail: "no order or payout marker".to_string(),
        })?;

        let candidate = layout.extract(self.id(), content, ctx);
        Ok(ExtractorResult::parsed(ctx.accept(candidate).into_iter().collect()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::models::ActivityType;

    fn buy_page() -> Vec<&'static str> {
        vec![
            "ERSTE BANK DER OESTERREICHISCHEN SPARKASSEN AG",
            "Kauf aus Wertpapierliste",
            "Auftragsnummer                Wertpapier",
            "AT0000707674                 ESPA BEST OF WORLD",
            "Schlusstag: 03.02.2020 Ausführungsplatz: KAG",
            "Nennwert",
            "STK  12,34",
            "Kurswert   EUR 1.234,00",
            "Zu Ihren Lasten",
            "Valuta 05.02.2020   EUR 1.250,00",
        ]
    }

    fn dividend_page() -> Vec<&'static str> {
        vec![
            "ERSTE BANK DER OESTERREICHISCHEN SPARKASSEN AG",
            "Ausschüttung",
            "Auftragsnummer",
            "AT0000A05HR3",
            "Wertpapier  ERSTE BOND EMERGING MARKETS CORPOR.",
            "Zahltag 02.03.2020 Extag 28.02.2020",
            "STK 40,000",
            "Zu Ihren Gunsten",
            "Valuta 02.03.2020   EUR 12,00",
        ]
    }

    pub(crate) fn samples() -> Vec<Sample> {
        vec![pdf("erstebank", &[&buy_page()]), pdf("erstebank", &[&dividend_page()])]
    }

    #[test]
    fn test_buy() {
        let doc = pages(&[&buy_page()]);
        assert!(ErsteBankParser.can_parse(&doc, Extension::Pdf));

        let activities = activities(&ErsteBankParser, &doc);
        let buy = &activities[0];
        assert_eq!(buy.activity_type, ActivityType::Buy);
        assert_eq!(buy.isin.as_deref(), Some("AT0000707674"));
        assert_eq!(buy.company.as_deref(), Some("ESPA BEST OF WORLD"));
        assert_eq!(buy.date, date(2020, 2, 3));
        assert_eq!(buy.shares, 12.34);
        assert_eq!(buy.amount, 1234.0);
        assert!((buy.price - 100.0).abs() < 1e-9);
        assert_eq!(buy.fee, 16.0);
    }

    #[test]
    fn test_dividend() {
        let activities = activities(&ErsteBankParser, &pages(&[&dividend_page()]));
        let dividend = &activities[0];
        assert_eq!(dividend.activity_type, ActivityType::Dividend);
        assert_eq!(dividend.isin.as_deref(), Some("AT0000A05HR3"));
        assert_eq!(dividend.company.as_deref(), Some("ERSTE BOND EMERGING MARKETS CORPOR."));
        assert_eq!(dividend.date, date(2020, 2, 28));
        assert_eq!(dividend.amount, 12.0);
        assert_eq!(dividend.price, 0.3);
    }

    #[test]
    fn test_requires_both_identifiers() {
        let doc = pages(&[&["ERSTE BANK", "Kauf aus Wertpapierliste"]]);
        assert!(!ErsteBankParser.can_parse(&doc, Extension::Pdf));
    }
}
