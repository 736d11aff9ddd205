//! ING PDF Parser

use super::{first_page, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{Extension, ExtractorResult, TransactionKind};
use crate::scanner::{ActivityLayout, Anchor, DateRule, FieldRule, FxRule, Num, Transform};
use crate::text::parse_locale_number;
use once_cell::sync::Lazy;
use regex::Regex;

const BIC: Anchor = Anchor::Contains("BIC: INGDDEFFXX");

/// `(1,1020)` on the line after "Umg. z. Dev.-Kurs"
static EXCHANGE_RATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([\d,]+)\)").unwrap());

/// Withholding tax converted by the bank: `qust 15,00 % (eur 0,41)`
static CONVERTED_WITHHOLDING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r".+?\(.+?([\d,]+)\)").unwrap());

const ISIN: FieldRule = FieldRule::new(Anchor::Contains("ISIN"), 1, Transform::Token(0));
const COMPANY: FieldRule = FieldRule::new(Anchor::Contains("Wertpapierbezeichnung"), 1, Transform::Before(" -"));

const TRADE_DATE: DateRule = DateRule::german(
    &[
        FieldRule::new(Anchor::Pair("Ausführungstag", "/ -zeit"), 1, Transform::Date),
        FieldRule::new(Anchor::Contains("Ausführungstag"), 1, Transform::Date),
    ],
    Some(FieldRule::new(Anchor::Pair("Ausführungstag", "/ -zeit"), 2, Transform::Token(1))),
);

const TRADE_SHARES: Num = Num::Field(FieldRule::line(Anchor::Contains("Stück"), 1));
const PRICE: Num = Num::Field(FieldRule::line(Anchor::Contains("Kurs"), 2));
const MARKET_VALUE: Num = Num::Field(FieldRule::line(Anchor::Contains("Kurswert"), 2));
const FEES: Num = Num::Sum(&[FieldRule::line(Anchor::Contains("Provision"), 2)]);

const BUY: ActivityLayout = ActivityLayout {
    kind: TransactionKind::Buy,
    markers: &[Anchor::Contains("Kauf")],
    isin: Some(ISIN),
    wkn: None,
    company: Some(COMPANY),
    shares: TRADE_SHARES,
    date: TRADE_DATE,
    price: PRICE,
    amount: MARKET_VALUE,
    fee: FEES,
    tax: Num::Zero,
    fx: None,
};

const SELL: ActivityLayout = ActivityLayout {
    kind: TransactionKind::Sell,
    markers: &[Anchor::Contains("Verkauf")],
    ..BUY
};

static DIVIDEND: ActivityLayout = ActivityLayout {
    kind: TransactionKind::Dividend,
    markers: &[
        Anchor::Contains("Dividendengutschrift"),
        Anchor::Contains("Ertragsgutschrift"),
    ],
    isin: Some(ISIN),
    wkn: None,
    company: Some(COMPANY),
    shares: Num::Field(FieldRule::new(Anchor::Contains("Nominale"), 1, Transform::Token(0))),
    date: DateRule::german(&[FieldRule::new(Anchor::Contains("Zahltag"), 1, Transform::Date)], None),
    price: Num::FirstOf(&[
        FieldRule::new(Anchor::Contains("Zins-/Dividendensatz"), 1, Transform::Token(0)),
        FieldRule::new(Anchor::Contains("Ertragsausschüttung per Stück"), 1, Transform::Token(0)),
    ]),
    amount: Num::Field(FieldRule::line(Anchor::Equals("Brutto"), 2)),
    fee: Num::Zero,
    tax: Num::Zero,
    fx: Some(FxRule {
        rate: FieldRule::new(Anchor::Contains("Umg. z. Dev.-Kurs"), 1, Transform::Capture(&EXCHANGE_RATE_RE)),
        currency: FieldRule::new(Anchor::Equals("Brutto"), 1, Transform::Token(0)),
        convert: true,
    }),
};

fn is_settlement(content: &[String]) -> bool {
    Anchor::Contains("Wertpapierabrechnung").is_present(content)
}

/// Sell is checked first: "Verkauf" notes may also mention "Kauf"
fn layout_for(content: &[String]) -> Option<&'static ActivityLayout> {
    if is_settlement(content) && SELL.matches(content) {
        Some(&SELL)
    } else if is_settlement(content) && BUY.matches(content) {
        Some(&BUY)
    } else if DIVIDEND.matches(content) {
        Some(&DIVIDEND)
    } else {
        None
    }
}

/// Sum of withholding, capital gains, solidarity and church taxes
fn find_taxes(content: &[String]) -> f64 {
    let mut total = 0.0;
    let mut idx = 0;

    while idx < content.len() {
        let line = content[idx].to_lowercase();

        if line.contains("qust") {
            if let Some(caps) = CONVERTED_WITHHOLDING_RE.captures(&line) {
                total += parse_locale_number(&caps[1]);
                idx += 1;
            } else {
                total += content.get(idx + 2).map(|v| parse_locale_number(v)).unwrap_or(0.0);
                idx += 3;
            }
            continue;
        }

        if line.contains("steuer ") || line.contains("zuschlag ") {
            let offset = if line.ends_with('%') { 2 } else { 3 };
            match content.get(idx + offset) {
                Some(value) if value.contains(',') => total += parse_locale_number(value),
                _ => {
                    idx += offset;
                    continue;
                }
            }
        }

        idx += 1;
    }

    total
}

pub struct IngParser;

impl BrokerParser for IngParser {
    fn id(&self) -> &'static str {
        "ing"
    }

    fn name(&self) -> &'static str {
        "ING"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        let content = first_page(pages);
        extension == Extension::Pdf && BIC.is_present(content) && layout_for(content).is_some()
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let content = first_page(pages);
        let layout = layout_for(content).ok_or_else(|| ExtractError::Layout {
            broker: self.id().to_string(),
            detail: "no settlement or dividend marker".to_string(),
        })?;

        let mut candidate = layout.extract(self.id(), content, ctx);
        if layout.kind != TransactionKind::Buy {
            candidate.tax = Some(find_taxes(content));
        }

        Ok(ExtractorResult::parsed(ctx.accept(candidate).into_iter().collect()))
    }
}
