//! DKB (Deutsche Kreditbank) PDF Parser
//!
//! One settlement note per document: buy, sell or dividend.

use super::{first_page, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{Extension, ExtractorResult, TransactionKind};
use crate::scanner::{any_present, ActivityLayout, Anchor, DateRule, FieldRule, Num, Transform};

const BIC: Anchor = Anchor::Contains("BIC BYLADEM1001");

const TABLE: Anchor = Anchor::Contains("Stück");

const SHARES: Num = Num::Field(FieldRule::new(TABLE, 0, Transform::Token(1)));
const COMPANY: FieldRule = FieldRule::line(TABLE, 1);
const ISIN: FieldRule = FieldRule::new(TABLE, 3, Transform::Isin);

const TRADE_DATE: DateRule = DateRule::german(
    &[FieldRule::new(Anchor::Contains("Schlusstag"), 1, Transform::Token(0))],
    Some(FieldRule::new(Anchor::Contains("Schlusstag"), 1, Transform::Token(1))),
);

const FEES: Num = Num::Sum(&[FieldRule::new(Anchor::Contains("Provision"), 1, Transform::Token(0))]);

const TAXES: Num = Num::Sum(&[
    FieldRule::new(Anchor::Contains("Kapitalertragsteuer"), 1, Transform::Token(0)),
    FieldRule::new(Anchor::Contains("Solidaritätszuschlag"), 1, Transform::Token(0)),
    FieldRule::new(Anchor::Contains("Kirchensteuer"), 1, Transform::Token(0)),
]);

const PRICE: Num = Num::Field(FieldRule::new(Anchor::Contains("Ausführungskurs"), 1, Transform::Token(0)));
const MARKET_VALUE: Num = Num::Field(FieldRule::new(Anchor::Contains("Kurswert"), 1, Transform::Token(0)));

static LAYOUTS: [ActivityLayout; 3] = [
    ActivityLayout {
        kind: TransactionKind::Buy,
        markers: &[
            Anchor::Contains("Wertpapier Abrechnung Kauf"),
            Anchor::Contains("Wertpapier Abrechnung Ausgabe Investmentfonds"),
        ],
        isin: Some(ISIN),
        wkn: None,
        company: Some(COMPANY),
        shares: SHARES,
        date: TRADE_DATE,
        price: PRICE,
        amount: MARKET_VALUE,
        fee: FEES,
        tax: Num::Zero,
        fx: None,
    },
    ActivityLayout {
        kind: TransactionKind::Sell,
        markers: &[Anchor::Contains("Wertpapier Abrechnung Verkauf")],
        isin: Some(ISIN),
        wkn: None,
        company: Some(COMPANY),
        shares: SHARES,
        date: TRADE_DATE,
        price: PRICE,
        amount: MARKET_VALUE,
        fee: FEES,
        tax: TAXES,
        fx: None,
    },
    ActivityLayout {
        kind: TransactionKind::Dividend,
        markers: &[
            Anchor::Contains("Dividendengutschrift"),
            Anchor::Contains("Ausschüttung Investmentfonds"),
        ],
        isin: Some(ISIN),
        wkn: None,
        company: Some(COMPANY),
        shares: SHARES,
        date: DateRule::german(
            &[FieldRule::new(Anchor::Contains("Zahlbarkeitstag"), 1, Transform::Token(0))],
            None,
        ),
        price: Num::Derived,
        amount: Num::Field(FieldRule::new(Anchor::Contains("Ausmachender Betrag"), 1, Transform::Token(0))),
        fee: Num::Zero,
        tax: TAXES,
        fx: None,
    },
];

pub struct DkbParser;

impl BrokerParser for DkbParser {
    fn id(&self) -> &'static str {
        "dkb"
    }

    fn name(&self) -> &'static str {
        "DKB"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        let content = first_page(pages);
        extension == Extension::Pdf
            && any_present(&[BIC], content)
            && LAYOUTS.iter().any(|layout| layout.matches(content))
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        // The first page carries the whole settlement
        let content = first_page(pages);
        let layout = ActivityLayout::select(&LAYOUTS, content).ok_or_else(|| ExtractError::Layout {
            broker: self.id().to_string(),
            detail: "no transaction marker on the first page".to_string(),
        })?;

        let candidate = layout.extract(self.id(), content, ctx);
        Ok(ExtractorResult::parsed(ctx.accept(candidate).into_iter().collect()))
    }
}
