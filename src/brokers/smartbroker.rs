//! Smartbroker PDF Parser
//!
//! Settlement notes come from onvista's back office; only the
//! identification line, foreign currency handling and taxes differ.

use super::onvista::{
    BUY_FEES, BUY_MARKERS, COMPANY, DIVIDEND_MARKERS, ISIN, MARKET_VALUE, PAYOUT_DATE, SELL_MARKERS,
    SHARES, SMARTBROKER_IDENTIFICATION, TRADE_DATE,
};
use super::{first_page, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{Extension, ExtractorResult, TransactionKind};
use crate::scanner::{any_present, ActivityLayout, Anchor, FieldRule, FxRule, Num, Transform};
use once_cell::sync::Lazy;
use regex::Regex;

/// `EUR/USD 1,1821`, either on the "Devisenkurs" line or the one below it
static FX_RATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]/[A-Z]{3} ([0-9,]+)").unwrap());
static FX_CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]/([A-Z]{3}) [0-9,]+").unwrap());

const TAXES: Num = Num::Sum(&[
    FieldRule::line(Anchor::Contains("Kapitalertragsteuer"), 2),
    FieldRule::line(Anchor::Contains("Solidaritätszuschlag"), 2),
    FieldRule::line(Anchor::StartsWith("Kirchensteuer"), 2),
]);

/// Stated in the foreign currency
const WITHHOLDING_TAX: Num = Num::FirstOf(&[
    FieldRule::line(Anchor::Contains("-Quellensteuer"), 2),
    FieldRule::line(Anchor::Contains("ausländische Quellensteuer"), 2),
]);

const DIVIDEND_PER_SHARE: Num = Num::FirstOf(&[
    FieldRule::new(Anchor::Equals("Dividenden-Betrag pro Stück"), 1, Transform::Token(1)),
    FieldRule::new(Anchor::Equals("Ausschüttungsbetrag pro Stück"), 1, Transform::Token(1)),
]);

static LAYOUTS: [ActivityLayout; 3] = [
    ActivityLayout {
        kind: TransactionKind::Buy,
        markers: BUY_MARKERS,
        isin: Some(ISIN),
        wkn: None,
        company: Some(COMPANY),
        shares: SHARES,
        date: TRADE_DATE,
        price: Num::Derived,
        amount: MARKET_VALUE,
        fee: BUY_FEES,
        tax: Num::Zero,
        fx: Some(FxRule {
            rate: FieldRule::new(Anchor::Matches(&FX_RATE_RE), 0, Transform::Capture(&FX_RATE_RE)),
            currency: FieldRule::new(Anchor::Matches(&FX_CURRENCY_RE), 0, Transform::Capture(&FX_CURRENCY_RE)),
            convert: false,
        }),
    },
    ActivityLayout {
        kind: TransactionKind::Sell,
        markers: SELL_MARKERS,
        isin: Some(ISIN),
        wkn: None,
        company: Some(COMPANY),
        shares: SHARES,
        date: TRADE_DATE,
        price: Num::Derived,
        amount: MARKET_VALUE,
        fee: Num::Zero,
        tax: TAXES,
        fx: Some(FxRule {
            rate: FieldRule::new(Anchor::Matches(&FX_RATE_RE), 0, Transform::Capture(&FX_RATE_RE)),
            currency: FieldRule::new(Anchor::Matches(&FX_CURRENCY_RE), 0, Transform::Capture(&FX_CURRENCY_RE)),
            convert: false,
        }),
    },
    ActivityLayout {
        kind: TransactionKind::Dividend,
        markers: DIVIDEND_MARKERS,
        isin: Some(ISIN),
        wkn: None,
        company: Some(COMPANY),
        shares: SHARES,
        date: PAYOUT_DATE,
        price: DIVIDEND_PER_SHARE,
        amount: Num::Derived,
        fee: Num::Zero,
        tax: TAXES,
        fx: Some(FxRule {
            rate: FieldRule::new(Anchor::Matches(&FX_RATE_RE), 0, Transform::Capture(&FX_RATE_RE)),
            currency: FieldRule::new(Anchor::Matches(&FX_CURRENCY_RE), 0, Transform::Capture(&FX_CURRENCY_RE)),
            convert: true,
        }),
    },
];

pub struct SmartbrokerParser;

impl BrokerParser for SmartbrokerParser {
    fn id(&self) -> &'static str {
        "smartbroker"
    }

    fn name(&self) -> &'static str {
        "Smartbroker"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        let content = first_page(pages);
        extension == Extension::Pdf
            && SMARTBROKER_IDENTIFICATION.is_present(content)
            && LAYOUTS.iter().any(|layout| any_present(layout.markers, content))
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let mut activities = Vec::new();

        for content in pages {
            let Some(layout) = ActivityLayout::select(&LAYOUTS, content) else {
                continue;
            };
            let mut candidate = layout.extract(self.id(), content, ctx);

            if layout.kind != TransactionKind::Buy {
                if let Some(withheld) = WITHHOLDING_TAX.read(content, 0) {
                    let withheld = match candidate.fx_rate {
                        Some(rate) if rate > 0.0 => withheld / rate,
                        _ => withheld,
                    };
                    candidate.tax = Some(candidate.tax.unwrap_or(0.0) + withheld);
                }
            }

            activities.extend(ctx.accept(candidate));
        }

        Ok(ExtractorResult::parsed(activities))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::models::ActivityType;

    fn sell_page() -> Vec<&'static str> {
        vec![
            "DAB BNP Paribas, Landsberger Straße 300, 80687 München",
            "Wir haben für Sie verkauft",
            "Nel ASA Navne-Aksjer NK -,20",
            "ISIN",
            "NO0010081235",
            "STK 100,000",
            "Handelstag",
            "04.02.2020",
            "Handelszeit",
            "09:08*",
            "Kurs",
            "Kurswert EUR 200,00",
            "Kapitalertragsteuer",
            "EUR",
            "10,00",
            "Solidaritätszuschlag",
            "EUR",
            "0,55",
        ]
    }

    fn dividend_page() -> Vec<&'static str> {
        vec![
            "DAB BNP Paribas, Landsberger Straße 300, 80687 München",
            "Dividendengutschrift",
            "Apple Inc.",
            "ISIN",
            "US0378331005",
            "STK 10,000",
            "Zahltag",
            "14.05.2020",
            "Dividenden-Betrag pro Stück",
            "USD 0,82",
            "Devisenkurs: EUR/USD 1,0250",
            "15 % ausländische Quellensteuer",
            "USD",
            "1,23",
        ]
    }

    pub(crate) fn samples() -> Vec<Sample> {
        vec![pdf("smartbroker", &[&sell_page()]), pdf("smartbroker", &[&dividend_page()])]
    }

    #[test]
    fn test_detect() {
        let doc = pages(&[&["Landsberger Straße 300", "Wir haben für Sie gekauft"]]);
        assert!(SmartbrokerParser.can_parse(&doc, Extension::Pdf));
        assert!(!SmartbrokerParser.can_parse(&pages(&[&["BELEGDRUCK=J", "Wir haben für Sie gekauft"]]), Extension::Pdf));
    }

    #[test]
    fn test_sell_with_taxes() {
        let activities = activities(&SmartbrokerParser, &pages(&[&sell_page()]));
        let sell = &activities[0];
        assert_eq!(sell.activity_type, ActivityType::Sell);
        assert_eq!(sell.amount, 200.0);
        assert_eq!(sell.price, 2.0);
        assert_eq!(sell.fee, 0.0);
        assert!((sell.tax - 10.55).abs() < 1e-9);
        assert_eq!(sell.fx_rate, None);
    }

    #[test]
    fn test_dividend_in_foreign_currency() {
        let activities = activities(&SmartbrokerParser, &pages(&[&dividend_page()]));
        let dividend = &activities[0];
        assert_eq!(dividend.activity_type, ActivityType::Dividend);
        assert_eq!(dividend.fx_rate, Some(1.025));
        assert_eq!(dividend.foreign_currency.as_deref(), Some("USD"));
        assert!((dividend.price - 0.8).abs() < 1e-9);
        assert!((dividend.amount - 8.0).abs() < 1e-9);
        assert!((dividend.tax - 1.2).abs() < 1e-9);
        assert_eq!(dividend.date, date(2020, 5, 14));
    }
}
