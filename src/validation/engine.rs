//! Validation Engine
//!
//! Turns an [`ActivityCandidate`] into an [`Activity`] or a [`Rejection`].
//!
//! Check order:
//! 1. type, shares, price, amount, fee and tax are present
//! 2. date and datetime are present
//! 3. date and datetime lie within `[earliest_date, today + tolerance]`
//! 4. shares > 0
//! 5. price >= 0
//! 6. amount >= 0
//! 7. fee is finite
//! 8. tax is finite
//! 9. ISIN, WKN or (if allowed) company is present
//! 10. ISIN and WKN have a valid shape
//! 11. type maps onto Buy, Sell or Dividend

use super::types::*;
use crate::clock::Clock;
use crate::config::ImportConfig;
use crate::models::{Activity, ActivityCandidate};
use crate::text::{is_valid_isin, is_valid_wkn};
use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;

pub struct Validator<'a> {
    clock: &'a dyn Clock,
    zone: Tz,
    earliest: NaiveDate,
    future_tolerance_days: i64,
}

impl<'a> Validator<'a> {
    pub fn new(config: &ImportConfig, clock: &'a dyn Clock) -> Self {
        Self {
            clock,
            zone: config.zone(),
            earliest: config.earliest_date,
            future_tolerance_days: config.future_tolerance_days,
        }
    }

    /// Validate a candidate, logging the reason when it is rejected
    pub fn validate(
        &self,
        candidate: &ActivityCandidate,
        allow_company_as_identifier: bool,
    ) -> Result<Activity, Rejection> {
        self.check(candidate, allow_company_as_identifier)
            .map_err(|reason| {
                let rejection = Rejection {
                    broker: candidate.broker.clone(),
                    reason,
                };
                log::warn!("{}", rejection);
                log::debug!("Rejected candidate: {:?}", candidate);
                rejection
            })
    }

    /// Latest accepted day in the reference zone
    pub fn latest_date(&self) -> NaiveDate {
        let today = self.clock.now().with_timezone(&self.zone).date_naive();
        today + Duration::days(self.future_tolerance_days)
    }

    fn check(
        &self,
        candidate: &ActivityCandidate,
        allow_company: bool,
    ) -> Result<Activity, RejectionReason> {
        let kind = required(candidate.kind, ActivityField::Type)?;
        let shares = required(candidate.shares, ActivityField::Shares)?;
        let price = required(candidate.price, ActivityField::Price)?;
        let amount = required(candidate.amount, ActivityField::Amount)?;
        let fee = required(candidate.fee, ActivityField::Fee)?;
        let tax = required(candidate.tax, ActivityField::Tax)?;

        let date = required(candidate.date, ActivityField::Date)?;
        let datetime = required(candidate.datetime, ActivityField::Datetime)?;

        let latest = self.latest_date();
        if date < self.earliest || date > latest {
            return Err(RejectionReason::DateOutOfRange {
                field: ActivityField::Date,
                value: date.to_string(),
            });
        }
        let local_day = datetime.with_timezone(&self.zone).date_naive();
        if local_day < self.earliest || local_day > latest {
            return Err(RejectionReason::DateOutOfRange {
                field: ActivityField::Datetime,
                value: datetime.to_rfc3339(),
            });
        }

        // NaN fails every comparison below
        if !(shares > 0.0) || !shares.is_finite() {
            return Err(RejectionReason::InvalidShares { value: shares });
        }
        if !(price >= 0.0) || !price.is_finite() {
            return Err(RejectionReason::InvalidPrice { value: price });
        }
        if !(amount >= 0.0) || !amount.is_finite() {
            return Err(RejectionReason::InvalidAmount { value: amount });
        }
        if !fee.is_finite() {
            return Err(RejectionReason::InvalidFee { value: fee });
        }
        if !tax.is_finite() {
            return Err(RejectionReason::InvalidTax { value: tax });
        }

        let isin = non_blank(&candidate.isin);
        let wkn = non_blank(&candidate.wkn);
        let company = non_blank(&candidate.company);
        if isin.is_none() && wkn.is_none() && !(allow_company && company.is_some()) {
            return Err(RejectionReason::MissingIdentifier {
                company_allowed: allow_company,
            });
        }

        if let Some(isin) = &isin {
            if !is_valid_isin(isin) {
                return Err(RejectionReason::InvalidIsin { value: isin.clone() });
            }
        }
        if let Some(wkn) = &wkn {
            if !is_valid_wkn(wkn) {
                return Err(RejectionReason::InvalidWkn { value: wkn.clone() });
            }
        }

        let activity_type = kind.activity_type().ok_or(RejectionReason::UnknownType)?;

        Ok(Activity {
            broker: candidate.broker.clone(),
            activity_type,
            date,
            datetime,
            isin,
            wkn,
            company,
            shares,
            price,
            amount,
            fee,
            tax,
            fx_rate: candidate.fx_rate,
            foreign_currency: non_blank(&candidate.foreign_currency),
        })
    }
}

fn required<T>(value: Option<T>, field: ActivityField) -> Result<T, RejectionReason> {
    value.ok_or(RejectionReason::EmptyField { field })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{ActivityType, TransactionKind};
    use chrono::{TimeZone, Utc};

    fn clock() -> FixedClock {
        // 2021-06-15 12:00 Berlin
        FixedClock(Utc.with_ymd_and_hms(2021, 6, 15, 10, 0, 0).unwrap())
    }

    fn on(date: NaiveDate) -> ActivityCandidate {
        let datetime = Utc.from_utc_datetime(&date.and_hms_opt(10, 0, 0).unwrap());
        ActivityCandidate {
            broker: "dkb".to_string(),
            kind: Some(TransactionKind::Buy),
            date: Some(date),
            datetime: Some(datetime),
            isin: Some("US0378331005".to_string()),
            wkn: None,
            company: Some("Apple Inc.".to_string()),
            shares: Some(4.0),
            price: Some(170.0),
            amount: Some(680.0),
            fee: Some(1.0),
            tax: Some(0.0),
            fx_rate: None,
            foreign_currency: None,
        }
    }

    fn valid() -> ActivityCandidate {
        on(NaiveDate::from_ymd_opt(2019, 5, 16).unwrap())
    }

    fn reason(candidate: &ActivityCandidate, allow_company: bool) -> RejectionReason {
        let config = ImportConfig::default();
        let clock = clock();
        Validator::new(&config, &clock)
            .validate(candidate, allow_company)
            .unwrap_err()
            .reason
    }

    fn accepts(candidate: &ActivityCandidate) -> bool {
        let config = ImportConfig::default();
        let clock = clock();
        Validator::new(&config, &clock).validate(candidate, false).is_ok()
    }

    #[test]
    fn test_valid_candidate() {
        let config = ImportConfig::default();
        let clock = clock();
        let activity = Validator::new(&config, &clock).validate(&valid(), false).unwrap();
        assert_eq!(activity.activity_type, ActivityType::Buy);
        assert_eq!(activity.shares, 4.0);
        assert_eq!(activity.isin.as_deref(), Some("US0378331005"));
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let config = ImportConfig::default();
        let clock = clock();
        let validator = Validator::new(&config, &clock);
        let first = validator.validate(&valid(), false).unwrap();
        let second = validator.validate(&first.clone().into(), false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejection_is_stable() {
        let mut candidate = valid();
        candidate.shares = Some(0.0);
        assert_eq!(reason(&candidate, false), reason(&candidate, false));
    }

    #[test]
    fn test_missing_fields() {
        let mut candidate = valid();
        candidate.fee = None;
        assert_eq!(
            reason(&candidate, false),
            RejectionReason::EmptyField { field: ActivityField::Fee }
        );

        let mut candidate = valid();
        candidate.datetime = None;
        assert_eq!(
            reason(&candidate, false),
            RejectionReason::EmptyField { field: ActivityField::Datetime }
        );
    }

    #[test]
    fn test_zero_values_are_defined() {
        let mut candidate = valid();
        candidate.fee = Some(0.0);
        candidate.tax = Some(0.0);
        candidate.price = Some(0.0);
        candidate.amount = Some(0.0);
        assert!(accepts(&candidate));
    }

    #[test]
    fn test_shares_boundary() {
        let mut candidate = valid();
        candidate.shares = Some(0.0);
        assert_eq!(reason(&candidate, false), RejectionReason::InvalidShares { value: 0.0 });

        candidate.shares = Some(0.0001);
        assert!(accepts(&candidate));

        candidate.shares = Some(f64::NAN);
        assert!(matches!(reason(&candidate, false), RejectionReason::InvalidShares { .. }));
    }

    #[test]
    fn test_earliest_date_boundary() {
        assert!(accepts(&on(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap())));
        assert!(matches!(
            reason(&on(NaiveDate::from_ymd_opt(1989, 12, 31).unwrap()), false),
            RejectionReason::DateOutOfRange { field: ActivityField::Date, .. }
        ));
    }

    #[test]
    fn test_future_date_boundary() {
        assert!(accepts(&on(NaiveDate::from_ymd_opt(2021, 6, 16).unwrap())));
        assert!(matches!(
            reason(&on(NaiveDate::from_ymd_opt(2021, 6, 17).unwrap()), false),
            RejectionReason::DateOutOfRange { .. }
        ));
    }

    #[test]
    fn test_datetime_checked_separately() {
        let mut candidate = valid();
        candidate.datetime = Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        assert!(matches!(
            reason(&candidate, false),
            RejectionReason::DateOutOfRange { field: ActivityField::Datetime, .. }
        ));
    }

    #[test]
    fn test_negative_price_and_amount() {
        let mut candidate = valid();
        candidate.price = Some(-1.0);
        assert_eq!(reason(&candidate, false), RejectionReason::InvalidPrice { value: -1.0 });

        let mut candidate = valid();
        candidate.amount = Some(-0.01);
        assert_eq!(reason(&candidate, false), RejectionReason::InvalidAmount { value: -0.01 });
    }

    #[test]
    fn test_fee_and_tax_any_sign_but_finite() {
        let mut candidate = valid();
        candidate.fee = Some(-2.5);
        candidate.tax = Some(-10.0);
        assert!(accepts(&candidate));

        candidate.tax = Some(f64::NAN);
        assert!(matches!(reason(&candidate, false), RejectionReason::InvalidTax { .. }));

        let mut candidate = valid();
        candidate.fee = Some(f64::INFINITY);
        assert!(matches!(reason(&candidate, false), RejectionReason::InvalidFee { .. }));
    }

    #[test]
    fn test_identifier_requirements() {
        let mut candidate = valid();
        candidate.isin = None;
        assert_eq!(
            reason(&candidate, false),
            RejectionReason::MissingIdentifier { company_allowed: false }
        );

        let config = ImportConfig::default();
        let clock = clock();
        assert!(Validator::new(&config, &clock).validate(&candidate, true).is_ok());

        candidate.company = Some("  ".to_string());
        assert_eq!(
            reason(&candidate, true),
            RejectionReason::MissingIdentifier { company_allowed: true }
        );

        let mut candidate = valid();
        candidate.isin = None;
        candidate.wkn = Some("865985".to_string());
        assert!(accepts(&candidate));
    }

    #[test]
    fn test_identifier_shapes() {
        let mut candidate = valid();
        candidate.isin = Some("US037833100".to_string());
        assert_eq!(
            reason(&candidate, false),
            RejectionReason::InvalidIsin { value: "US037833100".to_string() }
        );

        let mut candidate = valid();
        candidate.wkn = Some("86598".to_string());
        assert!(matches!(reason(&candidate, false), RejectionReason::InvalidWkn { .. }));
    }

    #[test]
    fn test_unknown_type() {
        let mut candidate = valid();
        candidate.kind = Some(TransactionKind::Unknown);
        assert_eq!(reason(&candidate, false), RejectionReason::UnknownType);

        candidate.kind = Some(TransactionKind::TransferOut);
        let config = ImportConfig::default();
        let clock = clock();
        let activity = Validator::new(&config, &clock).validate(&candidate, false).unwrap();
        assert_eq!(activity.activity_type, ActivityType::Sell);
    }

    #[test]
    fn test_rejection_names_broker() {
        let mut candidate = valid();
        candidate.shares = None;
        let config = ImportConfig::default();
        let clock = clock();
        let rejection = Validator::new(&config, &clock).validate(&candidate, false).unwrap_err();
        assert_eq!(rejection.broker, "dkb");
        assert!(rejection.to_string().contains("dkb"));
    }
}
