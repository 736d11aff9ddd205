//! Activity Data Model
//!
//! The canonical activity record produced by every broker parser, the
//! raw candidate it is built from, and the status codes reported for a
//! whole document.

use crate::validation::Rejection;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Activity type accepted by the importer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityType {
    Buy,
    Sell,
    Dividend,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
            Self::Dividend => "Dividend",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction kind as recognized in the source document.
///
/// Transfers only exist on the parsing side: they are mapped onto
/// `Buy`/`Sell` before an activity is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Buy,
    Sell,
    Dividend,
    TransferIn,
    TransferOut,
    Unknown,
}

impl TransactionKind {
    /// Map the parsed kind onto the closed activity enumeration
    pub fn activity_type(&self) -> Option<ActivityType> {
        match self {
            Self::Buy | Self::TransferIn => Some(ActivityType::Buy),
            Self::Sell | Self::TransferOut => Some(ActivityType::Sell),
            Self::Dividend => Some(ActivityType::Dividend),
            Self::Unknown => None,
        }
    }
}

impl From<ActivityType> for TransactionKind {
    fn from(value: ActivityType) -> Self {
        match value {
            ActivityType::Buy => Self::Buy,
            ActivityType::Sell => Self::Sell,
            ActivityType::Dividend => Self::Dividend,
        }
    }
}

/// A validated activity. Immutable once returned by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub broker: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub date: NaiveDate,
    #[serde(with = "utc_millis")]
    pub datetime: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub shares: f64,
    pub price: f64,
    pub amount: f64,
    pub fee: f64,
    pub tax: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_currency: Option<String>,
}

/// Raw record assembled by a parser before validation.
///
/// Every field may be missing; the validator decides whether the
/// candidate becomes an [`Activity`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityCandidate {
    pub broker: String,
    pub kind: Option<TransactionKind>,
    pub date: Option<NaiveDate>,
    pub datetime: Option<DateTime<Utc>>,
    pub isin: Option<String>,
    pub wkn: Option<String>,
    pub company: Option<String>,
    pub shares: Option<f64>,
    pub price: Option<f64>,
    pub amount: Option<f64>,
    pub fee: Option<f64>,
    pub tax: Option<f64>,
    pub fx_rate: Option<f64>,
    pub foreign_currency: Option<String>,
}

impl ActivityCandidate {
    pub fn new(broker: &str, kind: TransactionKind) -> Self {
        Self {
            broker: broker.to_string(),
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn with_timestamp(mut self, stamp: Option<(NaiveDate, DateTime<Utc>)>) -> Self {
        if let Some((date, datetime)) = stamp {
            self.date = Some(date);
            self.datetime = Some(datetime);
        }
        self
    }

    /// Attach a foreign currency conversion
    pub fn with_fx(mut self, fx_rate: Option<f64>, currency: Option<String>) -> Self {
        if let (Some(rate), Some(currency)) = (fx_rate, currency) {
            self.fx_rate = Some(rate);
            self.foreign_currency = Some(currency);
        }
        self
    }
}

impl From<Activity> for ActivityCandidate {
    fn from(activity: Activity) -> Self {
        Self {
            broker: activity.broker,
            kind: Some(activity.activity_type.into()),
            date: Some(activity.date),
            datetime: Some(activity.datetime),
            isin: activity.isin,
            wkn: activity.wkn,
            company: activity.company,
            shares: Some(activity.shares),
            price: Some(activity.price),
            amount: Some(activity.amount),
            fee: Some(activity.fee),
            tax: Some(activity.tax),
            fx_rate: activity.fx_rate,
            foreign_currency: activity.foreign_currency,
        }
    }
}

/// Document format, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extension {
    Pdf,
    Csv,
}

impl Extension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Csv => "csv",
        }
    }

    /// Derive the extension from a file name (`statement.PDF` -> `Pdf`)
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        ext.parse().ok()
    }
}

impl FromStr for Extension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "csv" => Ok(Self::Csv),
            other => Err(format!("Unsupported file extension: {}", other)),
        }
    }
}

/// Status code reported for a parsed document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseStatus {
    /// Parsed, possibly without activities
    Success,
    /// No parser recognized the document
    Unrecognized,
    /// More than one parser claimed the document
    Ambiguous,
    /// The selected parser failed on this document
    ExtractorFailed,
    /// File extension is neither pdf nor csv
    UnsupportedExtension,
    /// Recognized document type that carries no activities
    NoActivities,
    /// Recognized but deliberately unsupported document variant
    Unsupported,
}

impl ParseStatus {
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Unrecognized => 1,
            Self::Ambiguous => 2,
            Self::ExtractorFailed => 3,
            Self::UnsupportedExtension => 4,
            Self::NoActivities => 5,
            Self::Unsupported => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Unrecognized),
            2 => Some(Self::Ambiguous),
            3 => Some(Self::ExtractorFailed),
            4 => Some(Self::UnsupportedExtension),
            5 => Some(Self::NoActivities),
            7 => Some(Self::Unsupported),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Unrecognized => "no parser recognized the document",
            Self::Ambiguous => "more than one parser claimed the document",
            Self::ExtractorFailed => "the parser failed on this document",
            Self::UnsupportedExtension => "unsupported file extension",
            Self::NoActivities => "document type carries no activities",
            Self::Unsupported => "document variant is not supported",
        }
    }
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

impl Serialize for ParseStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ParseStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown status code {}", code)))
    }
}

/// Result of a parser's top-level entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorResult {
    pub activities: Option<Vec<Activity>>,
    pub status: ParseStatus,
    /// Candidates dropped by the validator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<Rejection>,
}

impl ExtractorResult {
    pub fn parsed(activities: Vec<Activity>) -> Self {
        Self {
            activities: Some(activities),
            status: ParseStatus::Success,
            rejections: Vec::new(),
        }
    }

    /// Recognized document that legitimately contains no activities
    pub fn no_activities() -> Self {
        Self {
            activities: Some(Vec::new()),
            status: ParseStatus::NoActivities,
            rejections: Vec::new(),
        }
    }

    /// Recognized layout that is deliberately not supported
    pub fn unsupported() -> Self {
        Self {
            activities: Some(Vec::new()),
            status: ParseStatus::Unsupported,
            rejections: Vec::new(),
        }
    }

    pub fn failed(status: ParseStatus) -> Self {
        Self {
            activities: None,
            status,
            rejections: Vec::new(),
        }
    }
}

/// Outcome for one imported file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResult {
    pub file: String,
    pub activities: Option<Vec<Activity>>,
    pub status: ParseStatus,
    pub successful: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<Rejection>,
}

impl DocumentResult {
    pub fn new(file: &str, result: ExtractorResult) -> Self {
        let successful = result.activities.is_some() && result.status == ParseStatus::Success;
        Self {
            file: file.to_string(),
            activities: result.activities,
            status: result.status,
            successful,
            rejections: result.rejections,
        }
    }
}

/// Serialize UTC timestamps as `2020-03-30T14:09:00.000Z`
mod utc_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Render a timestamp the way it appears in the wire format
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
