use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use tracing::warn;

use ufb_types::api::{Claims, CountByDateResponse, DateCount, StatisticsQuery};
use ufb_types::models::{Permission, StatisticsInterval};
use ufb_types::timezone::TimezoneOffset;

use crate::error::ApiError;
use crate::permissions::authorize;
use crate::service::service_offset;
use crate::state::AppState;

pub const MAX_RANGE_DAYS: i64 = 366;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// UTC instant at which `date` begins in the given offset. Dates at the
/// edge of the representable range are rejected.
pub fn local_day_start(date: NaiveDate, tz: TimezoneOffset) -> Result<DateTime<Utc>, ApiError> {
    date.and_time(NaiveTime::MIN)
        .and_utc()
        .checked_sub_signed(Duration::minutes(tz.minutes() as i64))
        .ok_or_else(|| ApiError::bad_request(format!("date {} is out of range", date)))
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Start dates of every bucket in `[from, to]`, in order.
pub fn bucket_starts(from: NaiveDate, to: NaiveDate, interval: StatisticsInterval) -> Vec<NaiveDate> {
    let mut starts = Vec::new();
    let mut current = Some(from);
    while let Some(start) = current.filter(|d| *d <= to) {
        starts.push(start);
        current = match interval {
            StatisticsInterval::Day => start.succ_opt(),
            StatisticsInterval::Week => start.checked_add_signed(Duration::days(7)),
            StatisticsInterval::Month => first_of_next_month(start),
        };
    }
    starts
}

/// Roll per-day counts up into buckets. Every bucket in the range is
/// present, zero counts included; days outside the range are ignored.
pub fn bucket_counts(
    from: NaiveDate,
    to: NaiveDate,
    interval: StatisticsInterval,
    daily: &[(String, i64)],
) -> Vec<DateCount> {
    let starts = bucket_starts(from, to, interval);
    let mut totals: HashMap<NaiveDate, i64> = HashMap::new();

    for (day, count) in daily {
        let Ok(day) = NaiveDate::parse_from_str(day, DATE_FORMAT) else {
            warn!("Skipping unparseable statistics day '{}'", day);
            continue;
        };
        if day < from || day > to {
            continue;
        }
        // Last bucket starting on or before `day`.
        let idx = starts.partition_point(|start| *start <= day);
        if let Some(start) = idx.checked_sub(1).and_then(|i| starts.get(i)) {
            *totals.entry(*start).or_default() += count;
        }
    }

    starts
        .into_iter()
        .map(|start| DateCount {
            date: start.format(DATE_FORMAT).to_string(),
            count: totals.get(&start).copied().unwrap_or(0),
        })
        .collect()
}

pub fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<(), ApiError> {
    if to < from {
        return Err(ApiError::bad_request("'to' must not be before 'from'"));
    }
    if (to - from).num_days() >= MAX_RANGE_DAYS {
        return Err(ApiError::bad_request(format!(
            "range must not exceed {} days",
            MAX_RANGE_DAYS
        )));
    }
    Ok(())
}

/// Response counts over `[from, to]` in the service's timezone.
pub async fn feedback_responses(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<StatisticsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ReadFeedbacks).await?;
    validate_range(query.from, query.to)?;

    let StatisticsQuery {
        from,
        to,
        interval,
        feedback_id,
    } = query;
    let statistics = state
        .with_db(move |db| {
            if let Some(id) = feedback_id {
                if db.get_feedback(id)?.is_none() {
                    return Err(ApiError::not_found(format!("feedback {} not found", id)));
                }
            }

            let tz = service_offset(db)?;
            let end = to
                .succ_opt()
                .ok_or_else(|| ApiError::bad_request("'to' is out of range"))?;
            let daily = db.count_responses_by_day(
                feedback_id,
                &ufb_db::time::format(local_day_start(from, tz)?),
                &ufb_db::time::format(local_day_start(end, tz)?),
                &tz.sqlite_modifier(),
            )?;
            Ok(bucket_counts(from, to, interval, &daily))
        })
        .await?;

    Ok(Json(CountByDateResponse { statistics }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn daily(entries: &[(&str, i64)]) -> Vec<(String, i64)> {
        entries.iter().map(|(d, c)| (d.to_string(), *c)).collect()
    }

    #[test]
    fn day_buckets_fill_gaps() {
        let out = bucket_counts(
            d("2023-11-20"),
            d("2023-11-23"),
            StatisticsInterval::Day,
            &daily(&[("2023-11-21", 3), ("2023-11-23", 1)]),
        );
        let pairs: Vec<_> = out.iter().map(|c| (c.date.as_str(), c.count)).collect();
        assert_eq!(
            pairs,
            vec![("2023-11-20", 0), ("2023-11-21", 3), ("2023-11-22", 0), ("2023-11-23", 1)]
        );
    }

    #[test]
    fn week_buckets_anchor_at_from() {
        let out = bucket_counts(
            d("2023-11-01"),
            d("2023-11-20"),
            StatisticsInterval::Week,
            &daily(&[("2023-11-01", 1), ("2023-11-07", 2), ("2023-11-08", 4), ("2023-11-20", 8)]),
        );
        let pairs: Vec<_> = out.iter().map(|c| (c.date.as_str(), c.count)).collect();
        assert_eq!(pairs, vec![("2023-11-01", 3), ("2023-11-08", 4), ("2023-11-15", 8)]);
    }

    #[test]
    fn month_buckets_are_clipped() {
        let out = bucket_counts(
            d("2023-11-15"),
            d("2024-01-10"),
            StatisticsInterval::Month,
            &daily(&[("2023-11-30", 1), ("2023-12-01", 2), ("2023-12-31", 3), ("2024-01-10", 4), ("2024-01-11", 99)]),
        );
        let pairs: Vec<_> = out.iter().map(|c| (c.date.as_str(), c.count)).collect();
        assert_eq!(pairs, vec![("2023-11-15", 1), ("2023-12-01", 5), ("2024-01-01", 4)]);
    }

    #[test]
    fn single_day_range() {
        let out = bucket_counts(d("2024-02-29"), d("2024-02-29"), StatisticsInterval::Month, &[]);
        assert_eq!(out, vec![DateCount { date: "2024-02-29".into(), count: 0 }]);
    }

    #[test]
    fn range_limits() {
        assert!(validate_range(d("2023-01-02"), d("2023-01-01")).is_err());
        assert!(validate_range(d("2023-01-01"), d("2023-01-01")).is_ok());
        assert!(validate_range(d("2024-01-01"), d("2024-12-31")).is_ok());
        assert!(validate_range(d("2023-01-01"), d("2024-01-02")).is_err());
    }

    #[test]
    fn local_day_start_shifts_by_offset() {
        let tz: TimezoneOffset = "+09:00".parse().unwrap();
        assert_eq!(
            ufb_db::time::format(local_day_start(d("2023-11-24"), tz).unwrap()),
            "2023-11-23 15:00:00"
        );
        let tz: TimezoneOffset = "-05:30".parse().unwrap();
        assert_eq!(
            ufb_db::time::format(local_day_start(d("2023-11-24"), tz).unwrap()),
            "2023-11-24 05:30:00"
        );
    }

    #[test]
    fn local_day_start_rejects_unrepresentable_dates() {
        let tz: TimezoneOffset = "+09:00".parse().unwrap();
        let err = local_day_start(NaiveDate::MIN, tz).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let tz: TimezoneOffset = "-05:00".parse().unwrap();
        assert!(local_day_start(NaiveDate::MIN, tz).is_ok());
    }
}
