use activity_import::models::format_datetime;
use activity_import::{
    import_pages, parse_document, ActivityType, FixedClock, ImportConfig, Page, ParseStatus,
};
use chrono::{NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2021, 1, 10, 9, 0, 0).unwrap())
}

fn document(lines: &[&str]) -> Vec<Page> {
    vec![lines.iter().map(|line| line.to_string()).collect()]
}

fn dkb_buy() -> Vec<Page> {
    document(&[
        "BIC BYLADEM1001",
        "Wertpapier Abrechnung Kauf",
        "Nominale Wertpapierbezeichnung ISIN (WKN)",
        "Stück 4",
        "APPLE INC.",
        "REGISTERED SHARES O.N.",
        "US0378331005",
        "Schlusstag/-Zeit",
        "16.05.2019 09:04:48",
        "Ausführungskurs",
        "170,00 EUR",
        "Kurswert",
        "680,00",
        "Provision",
        "10,00 EUR",
    ])
}

#[test]
fn buy_document_end_to_end() {
    let result = import_pages("buy.pdf", &dkb_buy(), "pdf", &ImportConfig::default(), &clock());

    assert_eq!(result.file, "buy.pdf");
    assert_eq!(result.status, ParseStatus::Success);
    assert!(result.successful);
    assert!(result.rejections.is_empty());

    let activities = result.activities.unwrap();
    assert_eq!(activities.len(), 1);
    let buy = &activities[0];
    assert_eq!(buy.broker, "dkb");
    assert_eq!(buy.activity_type, ActivityType::Buy);
    assert_eq!(buy.shares, 4.0);
    assert_eq!(buy.price, 170.0);
    assert_eq!(buy.amount, buy.price * buy.shares);
    assert_eq!(buy.date, NaiveDate::from_ymd_opt(2019, 5, 16).unwrap());
    assert_eq!(format_datetime(&buy.datetime), "2019-05-16T07:04:48.000Z");
}

#[test]
fn document_result_serializes_as_wire_format() {
    let result = import_pages("buy.pdf", &dkb_buy(), "pdf", &ImportConfig::default(), &clock());
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["status"], 0);
    assert_eq!(json["successful"], true);
    assert_eq!(json["activities"][0]["type"], "Buy");
    assert_eq!(json["activities"][0]["date"], "2019-05-16");
    assert_eq!(json["activities"][0]["datetime"], "2019-05-16T07:04:48.000Z");
}

#[test]
fn unrecognized_document() {
    let result = import_pages(
        "letter.pdf",
        &document(&["Sehr geehrte Damen und Herren", "mit freundlichen Grüßen"]),
        "pdf",
        &ImportConfig::default(),
        &clock(),
    );
    assert_eq!(result.status, ParseStatus::Unrecognized);
    assert_eq!(result.activities, None);
    assert!(!result.successful);
}

#[test]
fn document_claimed_twice_is_ambiguous() {
    let pages = document(&["BIC BYLADEM1001", "Dividendengutschrift", "comdirect bank"]);
    let result = parse_document(&pages, "pdf", &ImportConfig::default(), &clock());
    assert_eq!(result.status, ParseStatus::Ambiguous);
    assert_eq!(result.activities, None);
}

#[test]
fn unsupported_extension() {
    let result = import_pages("buy.docx", &dkb_buy(), "docx", &ImportConfig::default(), &clock());
    assert_eq!(result.status, ParseStatus::UnsupportedExtension);
    assert!(!result.successful);
}

#[test]
fn extension_is_case_insensitive() {
    let result = parse_document(&dkb_buy(), "PDF", &ImportConfig::default(), &clock());
    assert_eq!(result.status, ParseStatus::Success);
}

#[test]
fn known_unsupported_layout() {
    let pages = document(&["_itte überprüfen"]);
    let result = import_pages("settlement.pdf", &pages, "pdf", &ImportConfig::default(), &clock());
    assert_eq!(result.status, ParseStatus::Unsupported);
    assert_eq!(result.activities, Some(vec![]));
    assert!(!result.successful);
}

#[test]
fn rejected_candidates_are_reported() {
    let pages = document(&["BIC BYLADEM1001", "Wertpapier Abrechnung Kauf", "Stück 0"]);
    let result = import_pages("empty.pdf", &pages, "pdf", &ImportConfig::default(), &clock());
    assert_eq!(result.status, ParseStatus::Success);
    assert_eq!(result.activities, Some(vec![]));
    assert!(result.successful);
    assert_eq!(result.rejections.len(), 1);
    assert_eq!(result.rejections[0].broker, "dkb");
}

#[test]
fn earliest_date_is_configurable() {
    let config = ImportConfig {
        earliest_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        ..ImportConfig::default()
    };
    let result = parse_document(&dkb_buy(), "pdf", &config, &clock());
    assert_eq!(result.activities, Some(vec![]));
    assert_eq!(result.rejections.len(), 1);
}
