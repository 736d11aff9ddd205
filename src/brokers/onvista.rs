//! onvista bank PDF Parser
//!
//! Smartbroker settles through onvista and prints the same layout, so the
//! field rules here are shared with [`super::smartbroker`].

use super::{first_page, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{Extension, ExtractorResult, TransactionKind};
use crate::scanner::{any_present, ActivityLayout, Anchor, DateRule, FieldRule, Num, Transform};

pub(crate) const DOCUMENT_MARKER: Anchor = Anchor::Contains("BELEGDRUCK=J");
pub(crate) const SMARTBROKER_IDENTIFICATION: Anchor = Anchor::Contains("Landsberger Straße 300");

pub(crate) const BUY_MARKERS: &[Anchor] = &[Anchor::Contains("Wir haben für Sie gekauft")];
pub(crate) const SELL_MARKERS: &[Anchor] = &[Anchor::Contains("Wir haben für Sie verkauft")];
pub(crate) const DIVIDEND_MARKERS: &[Anchor] = &[
    Anchor::Contains("Erträgnisgutschrift"),
    Anchor::Contains("Dividendengutschrift"),
];

pub(crate) const ISIN: FieldRule = FieldRule::new(Anchor::Contains("ISIN"), 1, Transform::Isin);
pub(crate) const COMPANY: FieldRule = FieldRule::line(Anchor::Contains("ISIN"), -1);
pub(crate) const SHARES: Num = Num::Field(FieldRule::new(Anchor::Contains("STK"), 0, Transform::Token(1)));

pub(crate) const TRADE_DATE: DateRule = DateRule::german(
    &[FieldRule::new(Anchor::Contains("Handelstag"), 1, Transform::Date)],
    Some(FieldRule::new(Anchor::Contains("Handelszeit"), 1, Transform::Time)),
);
pub(crate) const PAYOUT_DATE: DateRule =
    DateRule::german(&[FieldRule::new(Anchor::Contains("Zahltag"), 1, Transform::Date)], None);

pub(crate) const MARKET_VALUE: Num = Num::Field(FieldRule::new(Anchor::Contains("Kurs"), 1, Transform::After("EUR")));

const TRADED: FieldRule = FieldRule::line(Anchor::Equals("Kurswert"), 2);
const CHARGED: FieldRule = FieldRule::line(Anchor::Contains("Betrag zu Ihren Lasten"), 2);
const CREDITED: FieldRule = FieldRule::line(Anchor::Contains("Betrag zu Ihren Gunsten"), 2);

/// Everything charged on top of the market value
pub(crate) const BUY_FEES: Num = Num::Difference { total: CHARGED, net: TRADED };
const SELL_FEES: Num = Num::Difference { total: TRADED, net: CREDITED };

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
        fx: None,
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
        fee: SELL_FEES,
        tax: Num::Zero,
        fx: None,
    },
    ActivityLayout {
        kind: TransactionKind::Dividend,
        markers: DIVIDEND_MARKERS,
        isin: Some(ISIN),
        wkn: None,
        company: Some(COMPANY),
        shares: SHARES,
        date: PAYOUT_DATE,
        price: Num::Derived,
        amount: Num::Field(CREDITED),
        fee: Num::Zero,
        tax: Num::Zero,
        fx: None,
    },
];

pub struct OnvistaParser;

impl BrokerParser for OnvistaParser {
    fn id(&self) -> &'static str {
        "onvista"
    }

    fn name(&self) -> &'static str {
        "onvista bank"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        let content = first_page(pages);
        extension == Extension::Pdf
            && DOCUMENT_MARKER.is_present(content)
            && !SMARTBROKER_IDENTIFICATION.is_present(content)
            && LAYOUTS.iter().any(|layout| any_present(layout.markers, content))
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let mut activities = Vec::new();
        for content in pages {
            if let Some(layout) = ActivityLayout::select(&LAYOUTS, content) {
                let candidate = layout.extract(self.id(), content, ctx);
                activities.extend(ctx.accept(candidate));
            }
        }
        Ok(ExtractorResult::parsed(activities))
    }
}
