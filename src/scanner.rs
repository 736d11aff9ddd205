//! Declarative line scanner.
//!
//! Broker documents arrive as ordered lines of text. A field is located by
//! an [`Anchor`] (a fixed string or regex), a relative line offset from the
//! anchor, and a [`Transform`] that cuts the value out of the target line.
//! Single-activity documents are described by static [`ActivityLayout`]
//! tables; multi-entry documents walk an always-advancing cursor through
//! [`scan_entries`].

use crate::brokers::ParseContext;
use crate::models::{ActivityCandidate, TransactionKind};
use crate::text::{extract_isin, parse_locale_number, ISIN_TOKEN_RE};
use once_cell::sync::Lazy;
use regex::Regex;

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d[\d.]*,\d+)").unwrap());
static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{2}\.\d{2}\.\d{4})").unwrap());
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}:\d{2}(?::\d{2})?)").unwrap());

/// Locates a line
#[derive(Debug, Clone, Copy)]
pub enum Anchor {
    Contains(&'static str),
    Equals(&'static str),
    StartsWith(&'static str),
    /// A line containing the first text directly followed by a line
    /// containing the second. Resolves to the second line.
    Pair(&'static str, &'static str),
    /// A line carrying an ISIN-shaped token
    HasIsin,
    Matches(&'static Lazy<Regex>),
}

impl Anchor {
    fn matches_line(&self, line: &str) -> bool {
        match self {
            Self::Contains(needle) => line.contains(needle),
            Self::Equals(needle) => line == *needle,
            Self::StartsWith(prefix) => line.starts_with(prefix),
            Self::Pair(first, _) => line.contains(first),
            Self::HasIsin => ISIN_TOKEN_RE.is_match(line),
            Self::Matches(regex) => regex.is_match(line),
        }
    }

    /// Index of the first matching line at or after `from`
    pub fn find(&self, lines: &[String], from: usize) -> Option<usize> {
        match self {
            Self::Pair(_, second) => (from..lines.len().saturating_sub(1))
                .find(|&idx| self.matches_line(&lines[idx]) && lines[idx + 1].contains(second))
                .map(|idx| idx + 1),
            _ => lines
                .iter()
                .enumerate()
                .skip(from)
                .find(|(_, line)| self.matches_line(line))
                .map(|(idx, _)| idx),
        }
    }

    pub fn is_present(&self, lines: &[String]) -> bool {
        self.find(lines, 0).is_some()
    }
}

/// True if any of the anchors is present
pub fn any_present(anchors: &[Anchor], lines: &[String]) -> bool {
    anchors.iter().any(|anchor| anchor.is_present(lines))
}

/// True if all of the anchors are present
pub fn all_present(anchors: &[Anchor], lines: &[String]) -> bool {
    anchors.iter().all(|anchor| anchor.is_present(lines))
}

/// Cuts a value out of a located line
#[derive(Debug, Clone, Copy)]
pub enum Transform {
    /// The whole trimmed line
    Text,
    /// n-th whitespace separated token
    Token(usize),
    /// Text before the first occurrence of the separator
    Before(&'static str),
    /// Text after the first occurrence of the marker
    After(&'static str),
    /// Text after the last occurrence of the marker
    AfterLast(&'static str),
    /// First ISIN found in the line
    Isin,
    /// First German decimal in the line, sign dropped (`-1,00 EUR` -> `1,00`)
    Amount,
    /// First `dd.mm.yyyy` date in the line
    Date,
    /// First `hh:mm[:ss]` time in the line
    Time,
    /// First capture group of the regex
    Capture(&'static Lazy<Regex>),
}

impl Transform {
    pub fn apply(&self, line: &str) -> Option<String> {
        let value = match self {
            Self::Text => Some(line.to_string()),
            Self::Token(n) => line.split_whitespace().nth(*n).map(str::to_string),
            Self::Before(sep) => line.split(sep).next().map(str::to_string),
            Self::After(marker) => line.split_once(marker).map(|(_, rest)| rest.to_string()),
            Self::AfterLast(marker) => line.rsplit_once(marker).map(|(_, rest)| rest.to_string()),
            Self::Isin => extract_isin(line),
            Self::Amount => first_capture(&AMOUNT_RE, line),
            Self::Date => first_capture(&DATE_RE, line),
            Self::Time => first_capture(&TIME_RE, line),
            Self::Capture(regex) => first_capture(regex, line),
        }?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

fn first_capture(regex: &Regex, line: &str) -> Option<String> {
    regex
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Anchor, relative offset and transform of one field
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub anchor: Anchor,
    pub offset: isize,
    pub transform: Transform,
}

impl FieldRule {
    pub const fn new(anchor: Anchor, offset: isize, transform: Transform) -> Self {
        Self { anchor, offset, transform }
    }

    /// Whole line at `offset` from the anchor
    pub const fn line(anchor: Anchor, offset: isize) -> Self {
        Self::new(anchor, offset, Transform::Text)
    }

    /// Index of the target line, if the anchor is found and the offset stays in bounds
    pub fn locate(&self, lines: &[String], from: usize) -> Option<usize> {
        let idx = self.anchor.find(lines, from)?;
        shift(idx, self.offset).filter(|&target| target < lines.len())
    }

    pub fn text_from(&self, lines: &[String], from: usize) -> Option<String> {
        let idx = self.locate(lines, from)?;
        self.transform.apply(&lines[idx])
    }

    pub fn text(&self, lines: &[String]) -> Option<String> {
        self.text_from(lines, 0)
    }

    pub fn number_from(&self, lines: &[String], from: usize) -> Option<f64> {
        self.text_from(lines, from).map(|value| parse_locale_number(&value))
    }

    pub fn number(&self, lines: &[String]) -> Option<f64> {
        self.number_from(lines, 0)
    }
}

/// `idx + offset` without wrapping below zero
pub fn shift(idx: usize, offset: isize) -> Option<usize> {
    idx.checked_add_signed(offset)
}

/// Trimmed line at `idx`, if it exists
pub fn line_at(lines: &[String], idx: usize) -> Option<&str> {
    lines.get(idx).map(|line| line.trim())
}

/// How a numeric field is obtained
#[derive(Debug, Clone, Copy)]
pub enum Num {
    Zero,
    Field(FieldRule),
    /// First rule that resolves
    FirstOf(&'static [FieldRule]),
    /// Sum of every rule that resolves; missing ones count as zero. A value
    /// that resolves but does not parse makes the sum NaN.
    Sum(&'static [FieldRule]),
    /// Absolute difference of two reported totals
    Difference { total: FieldRule, net: FieldRule },
    /// Price from amount / shares, or amount from price * shares
    Derived,
}

impl Num {
    pub fn read(&self, lines: &[String], from: usize) -> Option<f64> {
        match self {
            Self::Zero => Some(0.0),
            Self::Field(rule) => rule.number_from(lines, from),
            Self::FirstOf(rules) => rules.iter().find_map(|rule| rule.number_from(lines, from)),
            Self::Sum(rules) => Some(
                rules
                    .iter()
                    .filter_map(|rule| rule.number_from(lines, from))
                    .sum(),
            ),
            Self::Difference { total, net } => {
                let total = total.number_from(lines, from)?;
                let net = net.number_from(lines, from)?;
                Some((total - net).abs())
            }
            Self::Derived => None,
        }
    }
}

/// Date and optional time of an activity
#[derive(Debug, Clone, Copy)]
pub struct DateRule {
    /// Alternatives, first hit wins
    pub date: &'static [FieldRule],
    pub time: Option<FieldRule>,
    pub date_format: &'static str,
    pub datetime_format: &'static str,
}

impl DateRule {
    pub const fn german(date: &'static [FieldRule], time: Option<FieldRule>) -> Self {
        Self {
            date,
            time,
            date_format: "%d.%m.%Y",
            datetime_format: "%d.%m.%Y %H:%M:%S",
        }
    }
}

/// Foreign currency conversion
#[derive(Debug, Clone, Copy)]
pub struct FxRule {
    pub rate: FieldRule,
    pub currency: FieldRule,
    /// Price and amount are stated in the foreign currency and get divided by the rate
    pub convert: bool,
}

/// Extraction table for one transaction kind of one broker
#[derive(Debug)]
pub struct ActivityLayout {
    pub kind: TransactionKind,
    /// The layout applies when any of these is present
    pub markers: &'static [Anchor],
    pub isin: Option<FieldRule>,
    pub wkn: Option<FieldRule>,
    pub company: Option<FieldRule>,
    pub shares: Num,
    pub date: DateRule,
    pub price: Num,
    pub amount: Num,
    pub fee: Num,
    pub tax: Num,
    pub fx: Option<FxRule>,
}

impl ActivityLayout {
    pub fn matches(&self, lines: &[String]) -> bool {
        any_present(self.markers, lines)
    }

    /// First layout whose markers are present
    pub fn select<'l>(layouts: &'l [ActivityLayout], lines: &[String]) -> Option<&'l ActivityLayout> {
        layouts.iter().find(|layout| layout.matches(lines))
    }

    pub fn extract(&self, broker: &str, lines: &[String], ctx: &ParseContext) -> ActivityCandidate {
        self.extract_from(broker, lines, 0, ctx)
    }

    /// Read every field, searching anchors at or after `from`
    pub fn extract_from(
        &self,
        broker: &str,
        lines: &[String],
        from: usize,
        ctx: &ParseContext,
    ) -> ActivityCandidate {
        let text = |rule: &Option<FieldRule>| rule.and_then(|rule| rule.text_from(lines, from));

        let shares = self.shares.read(lines, from).map(f64::abs);
        let mut price = self.price.read(lines, from);
        let mut amount = self.amount.read(lines, from);

        let mut fx_rate = None;
        let mut currency = None;
        if let Some(fx) = &self.fx {
            if let (Some(rate), Some(code)) =
                (fx.rate.number_from(lines, from), fx.currency.text_from(lines, from))
            {
                if fx.convert && rate > 0.0 {
                    price = price.map(|p| p / rate);
                    amount = amount.map(|a| a / rate);
                }
                fx_rate = Some(rate);
                currency = Some(code);
            }
        }

        match (price, amount, shares) {
            (None, Some(a), Some(s)) => price = Some(a / s),
            (Some(p), None, Some(s)) => amount = Some(p * s),
            _ => {}
        }

        let date = self
            .date
            .date
            .iter()
            .find_map(|rule| rule.text_from(lines, from));
        let time = text(&self.date.time);
        let stamp = date.and_then(|date| {
            ctx.date_time(
                &date,
                time.as_deref(),
                self.date.date_format,
                self.date.datetime_format,
            )
        });

        ActivityCandidate {
            isin: text(&self.isin),
            wkn: text(&self.wkn),
            company: text(&self.company),
            shares,
            price,
            amount,
            fee: self.fee.read(lines, from),
            tax: self.tax.read(lines, from),
            ..ActivityCandidate::new(broker, self.kind)
        }
        .with_timestamp(stamp)
        .with_fx(fx_rate, currency)
    }
}

/// Outcome of one cursor step
#[derive(Debug)]
pub enum Step<T> {
    /// An entry was read; continue at `next`
    Entry { item: T, next: usize },
    /// Nothing usable here; continue at `next`
    Skip { next: usize },
    /// No further entries
    Done,
}

/// Walk the lines with a cursor that always moves forward.
///
/// `step` receives the current cursor. A `next` at or before the cursor
/// is bumped to `cursor + 1`, so a misbehaving step cannot stall the scan.
pub fn scan_entries<T>(
    lines: &[String],
    start: usize,
    mut step: impl FnMut(usize) -> Step<T>,
) -> Vec<T> {
    let mut items = Vec::new();
    let mut cursor = start;

    while cursor < lines.len() {
        match step(cursor) {
            Step::Entry { item, next } => {
                items.push(item);
                cursor = next.max(cursor + 1);
            }
            Step::Skip { next } => cursor = next.max(cursor + 1),
            Step::Done => break,
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::ImportConfig;
    use chrono::{NaiveDate, TimeZone, Utc};

    static BETRAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Betrag:\s*([\d.,]+)").unwrap());

    static BUY: ActivityLayout = ActivityLayout {
        kind: TransactionKind::Buy,
        markers: &[Anchor::Contains("Kauf")],
        isin: Some(FieldRule::new(Anchor::Contains("ISIN"), 0, Transform::Isin)),
        wkn: None,
        company: Some(FieldRule::line(Anchor::Contains("ISIN"), -1)),
        shares: Num::Field(FieldRule::new(Anchor::StartsWith("Stück"), 0, Transform::Token(1))),
        date: DateRule::german(&[FieldRule::line(Anchor::Equals("Schlusstag"), 1)], None),
        price: Num::Field(FieldRule::line(Anchor::Pair("Ausführungs-", "kurs"), 1)),
        amount: Num::Derived,
        fee: Num::Sum(&[
            FieldRule::new(Anchor::Contains("Provision"), 0, Transform::Amount),
            FieldRule::new(Anchor::Contains("Spesen"), 0, Transform::Amount),
        ]),
        tax: Num::Zero,
        fx: None,
    };

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn with_ctx<T>(f: impl FnOnce(&ParseContext) -> T) -> T {
        let config = ImportConfig::default();
        let clock = FixedClock(Utc.with_ymd_and_hms(2021, 1, 10, 9, 0, 0).unwrap());
        let ctx = ParseContext::new(&config, &clock);
        f(&ctx)
    }

    #[test]
    fn test_anchor_kinds() {
        let content = lines(&["Handels-", "datum", "Kurs 12,00", "Stück 4"]);
        assert_eq!(Anchor::Contains("Kurs").find(&content, 0), Some(2));
        assert_eq!(Anchor::Equals("Kurs").find(&content, 0), None);
        assert_eq!(Anchor::StartsWith("Stück").find(&content, 0), Some(3));
        assert_eq!(Anchor::Pair("Handels-", "datum").find(&content, 0), Some(1));
        assert_eq!(Anchor::Matches(&AMOUNT_RE).find(&content, 0), Some(2));
        assert_eq!(Anchor::HasIsin.find(&content, 0), None);
        assert_eq!(Anchor::Contains("Kurs").find(&content, 3), None);
    }

    #[test]
    fn test_transforms() {
        assert_eq!(Transform::Token(1).apply("Stück 4"), Some("4".to_string()));
        assert_eq!(Transform::Before(" -").apply("Apple Inc. - Registered"), Some("Apple Inc.".to_string()));
        assert_eq!(Transform::After("EUR").apply("Kurs EUR 170,00"), Some("170,00".to_string()));
        assert_eq!(Transform::AfterLast("EUR").apply("EUR 1 EUR 2"), Some("2".to_string()));
        assert_eq!(Transform::Capture(&BETRAG_RE).apply("Betrag: 1.000,00"), Some("1.000,00".to_string()));
        assert_eq!(Transform::Amount.apply("Fremdkostenzuschlag -1,00 EUR"), Some("1,00".to_string()));
        assert_eq!(Transform::Date.apply("Schlusstag: 16.05.2019 Ort"), Some("16.05.2019".to_string()));
        assert_eq!(Transform::Time.apply("Handelszeit 17:33*"), Some("17:33".to_string()));
        assert_eq!(Transform::Token(5).apply("Stück 4"), None);
        assert_eq!(Transform::After("EUR").apply("Kurs EUR"), None);
    }

    #[test]
    fn test_field_rule_offsets_stay_in_bounds() {
        let content = lines(&["Schlusstag"]);
        assert_eq!(FieldRule::line(Anchor::Equals("Schlusstag"), 1).text(&content), None);
        assert_eq!(FieldRule::line(Anchor::Equals("Schlusstag"), -1).text(&content), None);
        assert_eq!(FieldRule::line(Anchor::Equals("Schlusstag"), 0).text(&content), Some("Schlusstag".to_string()));
    }

    #[test]
    fn test_layout_derives_amount() {
        let content = lines(&[
            "Wertpapier Abrechnung Kauf",
            "Stück 4",
            "Apple Inc.",
            "ISIN US0378331005",
            "Schlusstag",
            "16.05.2019",
            "Ausführungs-",
            "kurs",
            "170,00 EUR",
            "Provision 1,50 EUR",
            "Fremde Spesen 0,50 EUR",
        ]);

        let candidate = with_ctx(|ctx| BUY.extract("dkb", &content, ctx));
        assert_eq!(candidate.kind, Some(TransactionKind::Buy));
        assert_eq!(candidate.isin.as_deref(), Some("US0378331005"));
        assert_eq!(candidate.company.as_deref(), Some("Apple Inc."));
        assert_eq!(candidate.shares, Some(4.0));
        assert_eq!(candidate.price, Some(170.0));
        assert_eq!(candidate.amount, Some(680.0));
        assert_eq!(candidate.fee, Some(2.0));
        assert_eq!(candidate.tax, Some(0.0));
        assert_eq!(candidate.date, NaiveDate::from_ymd_opt(2019, 5, 16));
    }

    #[test]
    fn test_sum_with_malformed_value_is_nan() {
        static FEES: &[FieldRule] = &[
            FieldRule::new(Anchor::Contains("Provision"), 0, Transform::Amount),
            FieldRule::new(Anchor::Contains("Spesen"), 0, Transform::Token(1)),
        ];
        let content = lines(&["Provision 1,50 EUR", "Fremde Spesen 0,50 EUR"]);
        assert!(Num::Sum(FEES).read(&content, 0).is_some_and(f64::is_nan));

        let content = lines(&["Provision 1,50 EUR"]);
        assert_eq!(Num::Sum(FEES).read(&content, 0), Some(1.5));
    }

    #[test]
    fn test_layout_missing_anchor_leaves_field_empty() {
        let content = lines(&["Wertpapier Abrechnung Kauf", "Stück 4"]);
        let candidate = with_ctx(|ctx| BUY.extract("dkb", &content, ctx));
        assert_eq!(candidate.price, None);
        assert_eq!(candidate.date, None);
        assert_eq!(candidate.fee, Some(0.0));
    }

    #[test]
    fn test_select_layout() {
        let content = lines(&["Wertpapier Kauf"]);
        assert!(ActivityLayout::select(std::slice::from_ref(&BUY), &content).is_some());
        let content = lines(&["Dividende"]);
        assert!(ActivityLayout::select(std::slice::from_ref(&BUY), &content).is_none());
    }

    #[test]
    fn test_scan_entries_always_advances() {
        let content = lines(&["a", "b", "c", "d"]);
        let mut calls = 0;
        let items = scan_entries(&content, 0, |cursor| {
            calls += 1;
            if cursor % 2 == 0 {
                Step::Entry { item: cursor, next: cursor }
            } else {
                Step::Skip { next: 0 }
            }
        });
        assert_eq!(items, vec![0, 2]);
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_scan_entries_done() {
        let content = lines(&["a", "b", "c"]);
        let items: Vec<usize> = scan_entries(&content, 0, |_| Step::Done);
        assert!(items.is_empty());
    }
}
