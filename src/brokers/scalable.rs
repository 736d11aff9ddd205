//! Scalable Capital PDF Parser
//!
//! Collective statements carry one settlement per page.

use super::{BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{Extension, ExtractorResult, TransactionKind};
use crate::scanner::{any_present, ActivityLayout, Anchor, DateRule, FieldRule, Num, Transform};

const IDENTIFICATION: Anchor = Anchor::Contains("Scalable Capital Vermögensverwaltung GmbH");

const ISIN: FieldRule = FieldRule::new(Anchor::StartsWith("ISIN: "), 0, Transform::After("ISIN: "));
const ORDER_COMPANY: FieldRule = FieldRule::line(Anchor::Contains("Auftragszeit:"), 5);
const ORDER_SHARES: Num = Num::Field(FieldRule::new(Anchor::Pair("Nominale", "STK"), 0, Transform::Token(1)));

/// Market orders print the date below a split "Handels-/datum" header,
/// savings plans next to "Handelsdatum"
const ORDER_DATE: DateRule = DateRule::german(
    &[
        FieldRule::line(Anchor::Pair("Handels-", "datum"), 5),
        FieldRule::line(Anchor::Contains("Handelsdatum"), 2),
    ],
    None,
);

static LAYOUTS: [ActivityLayout; 3] = [
    ActivityLayout {
        kind: TransactionKind::Buy,
        markers: &[Anchor::Contains("Wertpapierabrechnung: Kauf")],
        isin: Some(ISIN),
        wkn: None,
        company: Some(ORDER_COMPANY),
        shares: ORDER_SHARES,
        date: ORDER_DATE,
        price: Num::Derived,
        amount: Num::Field(FieldRule::line(Anchor::Pair("Zu Lasten Konto", "EUR"), 1)),
        fee: Num::Zero,
        tax: Num::Zero,
        fx: None,
    },
    ActivityLayout {
        kind: TransactionKind::Sell,
        markers: &[Anchor::Contains("Wertpapierabrechnung: Verkauf")],
        isin: Some(ISIN),
        wkn: None,
        company: Some(ORDER_COMPANY),
        shares: ORDER_SHARES,
        date: ORDER_DATE,
        price: Num::Derived,
        amount: Num::Field(FieldRule::line(Anchor::Pair("Zu Gunsten Konto", "EUR"), 1)),
        fee: Num::Zero,
        tax: Num::Zero,
        fx: None,
    },
    ActivityLayout {
        kind: TransactionKind::Dividend,
        markers: &[Anchor::Contains("Fondsausschüttung")],
        isin: Some(ISIN),
        wkn: None,
        company: Some(FieldRule::line(Anchor::Contains("Zahltag:"), -4)),
        shares: Num::Field(FieldRule::new(Anchor::Contains("Fondsausschüttung"), 1, Transform::Token(1))),
        date: DateRule::german(&[FieldRule::line(Anchor::Contains("Zahltag"), 1)], None),
        price: Num::Derived,
        amount: Num::Field(FieldRule::line(Anchor::Pair("Bruttobetrag", "EUR"), 1)),
        fee: Num::Zero,
        tax: Num::Zero,
        fx: None,
    },
];

pub struct ScalableParser;

impl BrokerParser for ScalableParser {
    fn id(&self) -> &'static str {
        "scalablecapital"
    }

    fn name(&self) -> &'static str {
        "Scalable Capital"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        extension == Extension::Pdf
            && pages.iter().any(|content| {
                IDENTIFICATION.is_present(content)
                    && LAYOUTS.iter().any(|layout| any_present(layout.markers, content))
            })
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let mut activities = Vec::new();

        for (number, content) in pages.iter().enumerate() {
            match ActivityLayout::select(&LAYOUTS, content) {
                Some(layout) => {
                    let candidate = layout.extract(self.id(), content, ctx);
                    activities.extend(ctx.accept(candidate));
                }
                None => log::debug!("scalablecapital: unknown page type on page {}", number + 1),
            }
        }

        Ok(ExtractorResult::parsed(activities))
    }
}
