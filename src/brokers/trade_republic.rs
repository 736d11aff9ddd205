//! Trade Republic PDF Parser
//!
//! Parses settlement notes and dividend credits from Trade Republic.

use super::{first_page, contains_any, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{Extension, ExtractorResult, TransactionKind};
use crate::scanner::{ActivityLayout, Anchor, DateRule, FieldRule, FxRule, Num, Transform};
use once_cell::sync::Lazy;
use regex::Regex;

const DETECT_PATTERNS: &[&str] = &["Trade Republic Bank GmbH", "TRADE REPUBLIC BANK GMBH"];

/// `1,1079 EUR/USD` on the subtotal line of foreign dividends
static FX_CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"EUR/([A-Z]{3})").unwrap());

/// "Market-Order Kauf am 24.02.2020, um 14:42 Uhr an der ..."
const ORDER_DATE: DateRule = DateRule {
    date: &[FieldRule::new(Anchor::Contains(" am "), 0, Transform::Date)],
    time: Some(FieldRule::new(Anchor::Contains(" am "), 0, Transform::Time)),
    date_format: "%d.%m.%Y",
    datetime_format: "%d.%m.%Y %H:%M",
};

const COMPANY: FieldRule = FieldRule::line(Anchor::Contains("POSITION"), 1);
const ISIN: FieldRule = FieldRule::new(Anchor::HasIsin, 0, Transform::Isin);

const POSITION: Anchor = Anchor::Contains(" Stk.");
const SHARES: Num = Num::Field(FieldRule::new(POSITION, 0, Transform::Token(0)));
const PRICE: Num = Num::Field(FieldRule::new(POSITION, 1, Transform::Token(0)));
const AMOUNT: Num = Num::Field(FieldRule::new(POSITION, 2, Transform::Token(0)));

const FEES: Num = Num::Sum(&[FieldRule::new(Anchor::Contains("Fremdkostenzuschlag"), 0, Transform::Amount)]);

const WITHHOLDING_TAX: FieldRule = FieldRule::new(Anchor::Contains("Quellensteuer"), 0, Transform::Amount);

const TAXES: Num = Num::Sum(&[
    FieldRule::new(Anchor::Contains("Kapitalertragsteuer"), 0, Transform::Amount),
    FieldRule::new(Anchor::Contains("Solidaritätszuschlag"), 0, Transform::Amount),
    FieldRule::new(Anchor::Contains("Kirchensteuer"), 0, Transform::Amount),
]);

static LAYOUTS: [ActivityLayout; 3] = [
    ActivityLayout {
        kind: TransactionKind::Sell,
        markers: &[Anchor::Contains("Verkauf am")],
        isin: Some(ISIN),
        wkn: None,
        company: Some(COMPANY),
        shares: SHARES,
        date: ORDER_DATE,
        price: PRICE,
        amount: AMOUNT,
        fee: FEES,
        tax: TAXES,
        fx: None,
    },
    ActivityLayout {
        kind: TransactionKind::Buy,
        markers: &[Anchor::Contains("Kauf am"), Anchor::Contains("Sparplanausführung")],
        isin: Some(ISIN),
        wkn: None,
        company: Some(COMPANY),
        shares: SHARES,
        date: ORDER_DATE,
        price: PRICE,
        amount: AMOUNT,
        fee: FEES,
        tax: Num::Sum(&[FieldRule::new(Anchor::Contains("Finanztransaktionssteuer"), 0, Transform::Amount)]),
        fx: None,
    },
    ActivityLayout {
        kind: TransactionKind::Dividend,
        markers: &[Anchor::Equals("DIVIDENDE"), Anchor::Contains("AUSSCHÜTTUNG")],
        isin: Some(ISIN),
        wkn: None,
        company: Some(COMPANY),
        shares: SHARES,
        date: DateRule::german(&[FieldRule::new(Anchor::Contains("VALUTA"), 1, Transform::Date)], None),
        price: PRICE,
        amount: AMOUNT,
        fee: Num::Zero,
        tax: TAXES,
        fx: Some(FxRule {
            rate: FieldRule::new(Anchor::Contains("Zwischensumme"), 0, Transform::Amount),
            currency: FieldRule::new(Anchor::Contains("Zwischensumme"), 0, Transform::Capture(&FX_CURRENCY_RE)),
            convert: true,
        }),
    },
];

pub struct TradeRepublicParser;

impl BrokerParser for TradeRepublicParser {
    fn id(&self) -> &'static str {
        "traderepublic"
    }

    fn name(&self) -> &'static str {
        "Trade Republic"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        let content = first_page(pages);
        extension == Extension::Pdf
            && contains_any(content, DETECT_PATTERNS)
            && LAYOUTS.iter().any(|layout| layout.matches(content))
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let content = first_page(pages);
        let layout = ActivityLayout::select(&LAYOUTS, content).ok_or_else(|| ExtractError::Layout {
            broker: self.id().to_string(),
            detail: "no order or dividend marker".to_string(),
        })?;

        let mut candidate = layout.extract(self.id(), content, ctx);

        // Withholding tax is stated in the payout currency
        if layout.kind == TransactionKind::Dividend {
            if let Some(withheld) = WITHHOLDING_TAX.number(content) {
                let withheld = match candidate.fx_rate {
                    Some(rate) if rate > 0.0 => withheld / rate,
                    _ => withheld,
                };
                candidate.tax = Some(candidate.tax.unwrap_or(0.0) + withheld);
            }
        }

        Ok(ExtractorResult::parsed(ctx.accept(candidate).into_iter().collect()))
    }
}
