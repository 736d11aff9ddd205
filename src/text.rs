//! Text normalization helpers shared by all broker parsers.
//!
//! Number parsing follows the German convention (`1.234,56`), dates are
//! combined with an optional time in the reference zone, and security
//! identifiers are checked by shape only.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static ISIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}[A-Z0-9]{9}[0-9]$").unwrap());
static WKN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{6}$").unwrap());
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}:\d{2}(:\d{2})?$").unwrap());
static NUMBER_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d*(\.\d*)?").unwrap());

/// ISIN-shaped token anywhere in a line
pub static ISIN_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{2}[A-Z0-9]{9}[0-9]\b").unwrap());

/// ISO 3166 alpha-2 codes, plus XS (international) and EU
const ISIN_COUNTRIES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX", "AZ",
    "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS",
    "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN",
    "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE",
    "EG", "EH", "ER", "ES", "ET", "EU", "FI", "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE",
    "GF", "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK",
    "HM", "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE",
    "JM", "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA", "LB",
    "LC", "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH",
    "MK", "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ",
    "NA", "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF",
    "PG", "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU",
    "RW", "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR",
    "SS", "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN",
    "TO", "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG",
    "VI", "VN", "VU", "WF", "WS", "XS", "YE", "YT", "ZA", "ZM", "ZW",
];

/// Parse a German formatted number (`1.234,56` -> `1234.56`).
///
/// Empty input yields `0.0`, malformed input `NaN`. Only the first comma
/// becomes the decimal point and parsing stops at the first character that
/// cannot continue the number, so `99,495,00` reads as `99.495`. A leading
/// or trailing sign is honored.
pub fn parse_locale_number(input: &str) -> f64 {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let (negative, body) = split_sign(trimmed);
    let normalized = body.trim().replace('.', "").replacen(',', ".", 1);

    let prefix = NUMBER_PREFIX_RE
        .find(&normalized)
        .map(|m| m.as_str())
        .unwrap_or("");
    if !prefix.chars().any(|c| c.is_ascii_digit()) {
        return f64::NAN;
    }

    match prefix.parse::<f64>() {
        Ok(value) if negative => -value,
        Ok(value) => value,
        Err(_) => f64::NAN,
    }
}

fn split_sign(s: &str) -> (bool, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else if let Some(rest) = s.strip_suffix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_suffix('+') {
        (false, rest)
    } else {
        (false, s)
    }
}

/// Parse a number in plain English notation (`1,234.56`), as found in
/// exports of international brokers. Same failure semantics as
/// [`parse_locale_number`].
pub fn parse_plain_number(input: &str) -> f64 {
    let cleaned = input.trim().trim_matches('"').replace(',', "");
    if cleaned.is_empty() {
        return 0.0;
    }
    cleaned.parse::<f64>().unwrap_or(f64::NAN)
}

pub fn is_valid_isin(s: &str) -> bool {
    ISIN_RE.is_match(s) && ISIN_COUNTRIES.contains(&&s[..2])
}

pub fn is_valid_wkn(s: &str) -> bool {
    WKN_RE.is_match(s)
}

/// Combine a document date with an optional time of day.
///
/// `date_format` and `datetime_format` are chrono format strings
/// (`%d.%m.%Y`, `%d.%m.%Y %H:%M`). When `time` is missing or not an
/// `HH:mm[:ss]` value, the wall-clock time of `now` in `zone` is used so
/// that same-day imports keep their relative order. Returns `None` only if
/// the date itself cannot be parsed.
pub fn combine_date_and_time(
    date: &str,
    time: Option<&str>,
    date_format: &str,
    datetime_format: &str,
    zone: Tz,
    now: DateTime<Utc>,
) -> Option<(NaiveDate, DateTime<Utc>)> {
    let date_str = date.trim();
    let day = NaiveDate::parse_from_str(date_str, date_format).ok()?;

    let local = time
        .map(str::trim)
        .filter(|t| TIME_RE.is_match(t))
        .and_then(|t| {
            NaiveDateTime::parse_from_str(&format!("{} {}", date_str, t), datetime_format)
                .ok()
                .or_else(|| parse_time(t).map(|time| day.and_time(time)))
        })
        .unwrap_or_else(|| day.and_time(now.with_timezone(&zone).time()));

    Some((day, local_to_utc(&local, zone)))
}

fn parse_time(time: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .ok()
}

/// Resolve a local wall-clock time in `zone`; times inside a DST gap are
/// taken as UTC.
pub fn local_to_utc(local: &NaiveDateTime, zone: Tz) -> DateTime<Utc> {
    zone.from_local_datetime(local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(local))
}

/// First line at or after `offset` matching `regex`
pub fn find_first_match_index(lines: &[String], regex: &Regex, offset: usize) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(offset)
        .find(|(_, line)| regex.is_match(line))
        .map(|(idx, _)| idx)
}

/// First line at or after `offset` that is exactly an ISIN
pub fn find_first_isin_index(lines: &[String], offset: usize) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(offset)
        .find(|(_, line)| is_valid_isin(line.trim()))
        .map(|(idx, _)| idx)
}

/// Extract the first ISIN-shaped token from a line
pub fn extract_isin(text: &str) -> Option<String> {
    ISIN_TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|candidate| is_valid_isin(candidate))
        .map(str::to_string)
}

/// One CSV data row keyed by header
pub type CsvRecord = HashMap<String, String>;

/// Turn `;`-delimited CSV lines into header-keyed records.
///
/// Values wrapped in double quotes are unwrapped and trimmed. Rows shorter
/// than the header are padded with empty values.
pub fn csv_lines_to_records(lines: &[String]) -> Vec<CsvRecord> {
    delimited_records(lines, ';')
}

/// Header-keyed records for any delimiter
pub fn delimited_records(lines: &[String], delimiter: char) -> Vec<CsvRecord> {
    let Some(header_line) = lines.first() else {
        return Vec::new();
    };
    let headers: Vec<String> = split_quoted(header_line, delimiter)
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let values = split_quoted(line, delimiter);
            headers
                .iter()
                .enumerate()
                .map(|(idx, header)| {
                    let value = values.get(idx).map(|v| v.trim().to_string()).unwrap_or_default();
                    (header.clone(), value)
                })
                .collect()
        })
        .collect()
}

/// Split one delimited line, keeping delimiters inside quotes
pub fn split_quoted(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c == delimiter && !quoted => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}
