//! comdirect bank PDF Parser

use super::{first_page, BrokerParser, Page, ParseContext};
use crate::error::ExtractError;
use crate::models::{Extension, ExtractorResult, TransactionKind};
use crate::scanner::{ActivityLayout, Anchor, DateRule, FieldRule, Num, Transform};

const IDENTIFICATION: &str = "comdirect bank";

const ISIN: FieldRule = FieldRule::new(Anchor::HasIsin, 0, Transform::Isin);
const WKN: FieldRule = FieldRule::new(Anchor::Equals("WKN"), 1, Transform::Token(0));
const COMPANY: FieldRule = FieldRule::line(Anchor::Contains("Wertpapier-Bezeichnung"), 1);
const SHARES: Num = Num::Field(FieldRule::new(Anchor::StartsWith("St. "), 0, Transform::Token(1)));

const FEES: Num = Num::Sum(&[
    FieldRule::new(Anchor::Contains("Provision"), 0, Transform::Amount),
    FieldRule::new(Anchor::Contains("Börsenplatzabhängiges Entgelt"), 0, Transform::Amount),
    FieldRule::new(Anchor::Contains("Fremde Spesen"), 0, Transform::Amount),
]);

const TAXES: Num = Num::Sum(&[
    FieldRule::new(Anchor::Contains("Kapitalertragsteuer"), 0, Transform::Amount),
    FieldRule::new(Anchor::Contains("Solidaritätszuschlag"), 0, Transform::Amount),
    FieldRule::new(Anchor::Contains("Kirchensteuer"), 0, Transform::Amount),
]);

const TRADE_DATE: DateRule = DateRule::german(
    &[FieldRule::new(Anchor::Contains("Geschäftstag"), 0, Transform::Date)],
    Some(FieldRule::new(Anchor::Contains("Handelszeit"), 0, Transform::Time)),
);

const PRICE: Num = Num::Field(FieldRule::new(Anchor::Contains("Zum Kurs von"), 0, Transform::After("EUR")));
const MARKET_VALUE: Num = Num::Field(FieldRule::new(Anchor::Contains("Kurswert"), 0, Transform::After("EUR")));

static LAYOUTS: [ActivityLayout; 3] = [
    ActivityLayout {
        kind: TransactionKind::Buy,
        markers: &[Anchor::Contains("Wertpapierkauf")],
        isin: Some(ISIN),
        wkn: Some(WKN),
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
        markers: &[Anchor::Contains("Wertpapierverkauf")],
        isin: Some(ISIN),
        wkn: Some(WKN),
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
            Anchor::Contains("Ertragsgutschrift"),
        ],
        isin: Some(ISIN),
        wkn: Some(WKN),
        company: Some(COMPANY),
        shares: SHARES,
        date: DateRule::german(
            &[FieldRule::new(Anchor::Contains("zahlbar ab"), 0, Transform::Date)],
            None,
        ),
        price: Num::Derived,
        amount: Num::Field(FieldRule::new(Anchor::Contains("Bruttobetrag"), 0, Transform::Amount)),
        fee: Num::Zero,
        tax: TAXES,
        fx: None,
    },
];

pub struct ComdirectParser;

impl BrokerParser for ComdirectParser {
    fn id(&self) -> &'static str {
        "comdirect"
    }

    fn name(&self) -> &'static str {
        "comdirect"
    }

    fn can_parse(&self, pages: &[Page], extension: Extension) -> bool {
        let content = first_page(pages);
        extension == Extension::Pdf
            && content
                .iter()
                .any(|line| line.to_lowercase().contains(IDENTIFICATION))
            && LAYOUTS.iter().any(|layout| layout.matches(content))
    }

    fn parse(&self, pages: &[Page], ctx: &mut ParseContext) -> Result<ExtractorResult, ExtractError> {
        let mut activities = Vec::new();

        // Collective statements put one settlement on each page
        for content in pages {
            let Some(layout) = ActivityLayout::select(&LAYOUTS, content) else {
                log::debug!("comdirect: page without transaction marker skipped");
                continue;
            };
            let candidate = layout.extract(self.id(), content, ctx);
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

    fn buy_page() -> Vec<&'static str> {
        vec![
            "comdirect bank",
            "Wertpapierkauf",
            "Geschäftstag : 03.02.2020 Ausführungsplatz : XETRA",
            "Handelszeit : 09:15 Uhr (MEZ/MESZ)",
            "Wertpapier-Bezeichnung",
            "Leifheit AG",
            "WKN",
            "646450",
            "ISIN DE0006464506",
            "St. 20",
            "Zum Kurs von EUR 20,30",
            "Kurswert : EUR 406,00",
            "Provision : EUR 4,90",
            "Börsenplatzabhängiges Entgelt : EUR 1,50",
        ]
    }

    pub(crate) fn samples() -> Vec<Sample> {
        vec![pdf("comdirect", &[&buy_page()])]
    }

    #[test]
    fn test_detect() {
        let parser = ComdirectParser;
        assert!(parser.can_parse(&pages(&[&buy_page()]), Extension::Pdf));
        assert!(parser.can_parse(&pages(&[&["Comdirect Bank AG", "Dividendengutschrift"]]), Extension::Pdf));
        assert!(!parser.can_parse(&pages(&[&["comdirect bank", "Depotübersicht"]]), Extension::Pdf));
    }

    #[test]
    fn test_buy() {
        let activities = activities(&ComdirectParser, &pages(&[&buy_page()]));
        assert_eq!(activities.len(), 1);
        let buy = &activities[0];
        assert_eq!(buy.activity_type, ActivityType::Buy);
        assert_eq!(buy.isin.as_deref(), Some("DE0006464506"));
        assert_eq!(buy.wkn.as_deref(), Some("646450"));
        assert_eq!(buy.company.as_deref(), Some("Leifheit AG"));
        assert_eq!(buy.date, date(2020, 2, 3));
        assert_eq!(crate::models::format_datetime(&buy.datetime), "2020-02-03T08:15:00.000Z");
        assert_eq!(buy.shares, 20.0);
        assert_eq!(buy.price, 20.3);
        assert_eq!(buy.amount, 406.0);
        assert!((buy.fee - 6.4).abs() < 1e-9);
    }

    #[test]
    fn test_dividend() {
        let doc = pages(&[&[
            "comdirect bank",
            "Dividendengutschrift",
            "Wertpapier-Bezeichnung",
            "Coca-Cola Co., The",
            "WKN",
            "850663",
            "ISIN US1912161007",
            "St. 50",
            "zahlbar ab 01.04.2020",
            "Bruttobetrag: USD 20,50",
            "Kapitalertragsteuer EUR -3,00",
        ]]);
        let activities = activities(&ComdirectParser, &doc);
        let dividend = &activities[0];
        assert_eq!(dividend.activity_type, ActivityType::Dividend);
        assert_eq!(dividend.date, date(2020, 4, 1));
        assert_eq!(dividend.amount, 20.5);
        assert_eq!(dividend.price, 0.41);
        assert_eq!(dividend.tax, 3.0);
    }
}
