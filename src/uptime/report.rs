//! Downtime reconstruction and report building.
//!
//! Samples are sparse and may arrive out of order, so downtime inside a
//! bucket is reconstructed by forward-fill: sort the samples, charge each
//! gap to the *earlier* sample's value, and extend the last sample's value
//! to `min(now, bucket_end)`. A bucket with no samples at all is `NO_DATA`
//! and carries a full bucket of downtime, which keeps it visibly distinct
//! from a clean `UP` bucket while staying out of the service aggregate.

use chrono::{DateTime, Datelike, Days, Months, NaiveTime, TimeDelta, Timelike, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

use crate::errors::Error;
use crate::uptime::{RangeSeries, Sample};

/// Calendar bucket granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    Hour,
    Day,
    Week,
    Month,
}

impl FromStr for BucketKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(BucketKind::Hour),
            "day" => Ok(BucketKind::Day),
            "week" => Ok(BucketKind::Week),
            "month" => Ok(BucketKind::Month),
            other => Err(Error::BadRequest {
                message: format!("unknown bucket kind '{other}', expected hour, day, week or month"),
            }),
        }
    }
}

impl BucketKind {
    /// Start of the bucket containing `t`. Weeks start on Monday, months on
    /// the 1st; all alignment is in UTC.
    pub fn align(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let date = t.date_naive();
        let aligned = match self {
            BucketKind::Hour => date.and_time(NaiveTime::MIN) + TimeDelta::hours(t.hour() as i64),
            BucketKind::Day => date.and_time(NaiveTime::MIN),
            BucketKind::Week => {
                let monday = date
                    .checked_sub_days(Days::new(t.weekday().num_days_from_monday() as u64))
                    .unwrap_or(date);
                monday.and_time(NaiveTime::MIN)
            }
            BucketKind::Month => date.with_day(1).unwrap_or(date).and_time(NaiveTime::MIN),
        };
        aligned.and_utc()
    }

    /// Start of the bucket after the one starting at `start`.
    pub fn next(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            BucketKind::Hour => start + TimeDelta::hours(1),
            BucketKind::Day => start + TimeDelta::days(1),
            BucketKind::Week => start + TimeDelta::days(7),
            BucketKind::Month => {
                let date = start.date_naive();
                date.checked_add_months(Months::new(1))
                    .unwrap_or(date)
                    .and_time(NaiveTime::MIN)
                    .and_utc()
            }
        }
    }

    /// Start of the bucket before the one starting at `start`.
    pub fn prev(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            BucketKind::Hour => start - TimeDelta::hours(1),
            BucketKind::Day => start - TimeDelta::days(1),
            BucketKind::Week => start - TimeDelta::days(7),
            BucketKind::Month => {
                let date = start.date_naive();
                date.checked_sub_months(Months::new(1))
                    .unwrap_or(date)
                    .and_time(NaiveTime::MIN)
                    .and_utc()
            }
        }
    }

    /// Length of the bucket starting at `start`, in minutes. Months vary
    /// with the calendar; the rest are fixed.
    pub fn minutes(&self, start: DateTime<Utc>) -> f64 {
        (self.next(start) - start).num_minutes() as f64
    }

    /// Window size served when the request does not specify a count.
    pub fn default_count(&self) -> usize {
        match self {
            BucketKind::Hour => 24,
            BucketKind::Day => 30,
            BucketKind::Week => 12,
            BucketKind::Month => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BucketStatus {
    NoData,
    Up,
    Partial,
    Down,
}

/// Minutes of downtime within one bucket, reconstructed from its samples.
///
/// Gaps between consecutive samples are charged to the earlier sample's
/// value; the last sample's value extends to `min(now, bucket_end)`. The
/// result is clamped to the bucket length and a bucket with no samples is
/// all downtime.
pub fn downtime_minutes(
    samples: &[Sample],
    bucket_start: DateTime<Utc>,
    bucket_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let bucket_minutes = ((bucket_end - bucket_start).num_seconds() as f64 / 60.0).max(0.0);
    if samples.is_empty() {
        return bucket_minutes;
    }

    let mut sorted: Vec<&Sample> = samples.iter().collect();
    sorted.sort_by_key(|s| s.timestamp);

    let mut downtime = 0.0;
    for pair in sorted.windows(2) {
        if !pair[0].up {
            downtime += (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64 / 60.0;
        }
    }

    // Trailing edge: the last known value holds until the bucket closes or
    // the present moment, whichever comes first
    if let Some(last) = sorted.last()
        && !last.up
    {
        let horizon = bucket_end.min(now);
        if horizon > last.timestamp {
            downtime += (horizon - last.timestamp).num_seconds() as f64 / 60.0;
        }
    }

    downtime.clamp(0.0, bucket_minutes)
}

pub fn classify_status(downtime_minutes: f64, sample_count: usize, threshold_minutes: f64) -> BucketStatus {
    if sample_count == 0 {
        BucketStatus::NoData
    } else if downtime_minutes >= threshold_minutes {
        BucketStatus::Down
    } else if downtime_minutes > 0.0 {
        BucketStatus::Partial
    } else {
        BucketStatus::Up
    }
}

pub fn uptime_percentage(downtime_minutes: f64, bucket_minutes: f64) -> f64 {
    if bucket_minutes <= 0.0 {
        return 0.0;
    }
    (((bucket_minutes - downtime_minutes) / bucket_minutes) * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketStat {
    pub start: DateTime<Utc>,
    pub downtime_minutes: f64,
    pub uptime_percentage: f64,
    pub status: BucketStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceUptime {
    pub name: String,
    pub group: String,
    pub url: String,
    /// Mean of per-bucket uptime over buckets that actually have data
    pub uptime_percentage: f64,
    pub buckets: Vec<BucketStat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UptimeReport {
    pub bucket: BucketKind,
    pub generated_at: DateTime<Utc>,
    pub services: Vec<ServiceUptime>,
}

/// Earliest bucket start for a window of `count` buckets ending now.
pub fn window_start(kind: BucketKind, count: usize, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut start = kind.align(now);
    for _ in 1..count.max(1) {
        start = kind.prev(start);
    }
    start
}

/// Build the aggregated report for every series in the query result.
pub fn build_report(
    series: &[RangeSeries],
    kind: BucketKind,
    count: usize,
    now: DateTime<Utc>,
    threshold_minutes: f64,
) -> UptimeReport {
    let count = count.max(1);
    let mut starts = Vec::with_capacity(count);
    let mut start = window_start(kind, count, now);
    for _ in 0..count {
        starts.push(start);
        start = kind.next(start);
    }

    let mut services: Vec<ServiceUptime> = series
        .iter()
        .map(|s| {
            // Partition this series' samples by bucket
            let mut by_bucket: HashMap<DateTime<Utc>, Vec<Sample>> = HashMap::new();
            for sample in s.samples() {
                by_bucket.entry(kind.align(sample.timestamp)).or_default().push(sample);
            }

            let buckets: Vec<BucketStat> = starts
                .iter()
                .map(|&bucket_start| {
                    let bucket_end = kind.next(bucket_start);
                    let samples = by_bucket.get(&bucket_start).map(Vec::as_slice).unwrap_or(&[]);
                    let downtime = downtime_minutes(samples, bucket_start, bucket_end, now);
                    let bucket_minutes = kind.minutes(bucket_start);
                    let status = classify_status(downtime, samples.len(), threshold_minutes);
                    BucketStat {
                        start: bucket_start,
                        downtime_minutes: downtime,
                        uptime_percentage: match status {
                            BucketStatus::NoData => 0.0,
                            _ => uptime_percentage(downtime, bucket_minutes),
                        },
                        status,
                    }
                })
                .collect();

            let with_data: Vec<&BucketStat> =
                buckets.iter().filter(|b| b.status != BucketStatus::NoData).collect();
            let overall = if with_data.is_empty() {
                0.0
            } else {
                with_data.iter().map(|b| b.uptime_percentage).sum::<f64>() / with_data.len() as f64
            };

            ServiceUptime {
                name: s.label("service_name").to_string(),
                group: s.label("group").to_string(),
                url: s.label("url").to_string(),
                uptime_percentage: overall,
                buckets,
            }
        })
        .collect();

    services.sort_by(|a, b| (a.group.as_str(), a.name.as_str()).cmp(&(b.group.as_str(), b.name.as_str())));

    UptimeReport {
        bucket: kind,
        generated_at: now,
        services,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(spec: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(spec).unwrap().with_timezone(&Utc)
    }

    fn sample(spec: &str, up: bool) -> Sample {
        Sample {
            timestamp: at(spec),
            up,
        }
    }

    const DAY: f64 = 1440.0;

    #[test]
    fn alignment_per_kind() {
        let t = at("2026-08-19T14:37:12Z"); // a Wednesday
        assert_eq!(BucketKind::Hour.align(t), at("2026-08-19T14:00:00Z"));
        assert_eq!(BucketKind::Day.align(t), at("2026-08-19T00:00:00Z"));
        assert_eq!(BucketKind::Week.align(t), at("2026-08-17T00:00:00Z"));
        assert_eq!(BucketKind::Month.align(t), at("2026-08-01T00:00:00Z"));
    }

    #[test]
    fn month_lengths_follow_the_calendar() {
        let feb = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        assert_eq!(BucketKind::Month.minutes(feb), 28.0 * DAY);
        let aug = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        assert_eq!(BucketKind::Month.minutes(aug), 31.0 * DAY);
    }

    #[test]
    fn no_samples_is_a_full_bucket_of_downtime() {
        let start = at("2026-08-19T00:00:00Z");
        let end = at("2026-08-20T00:00:00Z");
        assert_eq!(downtime_minutes(&[], start, end, at("2026-08-21T00:00:00Z")), DAY);
    }

    #[test]
    fn all_up_is_zero_downtime() {
        let start = at("2026-08-19T00:00:00Z");
        let end = at("2026-08-20T00:00:00Z");
        let samples = vec![
            sample("2026-08-19T00:00:00Z", true),
            sample("2026-08-19T12:00:00Z", true),
            sample("2026-08-19T23:55:00Z", true),
        ];
        assert_eq!(downtime_minutes(&samples, start, end, at("2026-08-21T00:00:00Z")), 0.0);
    }

    #[test]
    fn gap_is_charged_to_the_earlier_sample() {
        let start = at("2026-08-19T00:00:00Z");
        let end = at("2026-08-20T00:00:00Z");
        // Down at 10:00, back up at 10:20
        let samples = vec![
            sample("2026-08-19T09:55:00Z", true),
            sample("2026-08-19T10:00:00Z", false),
            sample("2026-08-19T10:20:00Z", true),
        ];
        assert_eq!(downtime_minutes(&samples, start, end, end), 20.0);
    }

    #[test]
    fn result_is_order_independent() {
        let start = at("2026-08-19T00:00:00Z");
        let end = at("2026-08-20T00:00:00Z");
        let ordered = vec![
            sample("2026-08-19T09:00:00Z", true),
            sample("2026-08-19T10:00:00Z", false),
            sample("2026-08-19T10:30:00Z", true),
        ];
        let shuffled = vec![ordered[1], ordered[2], ordered[0]];
        assert_eq!(
            downtime_minutes(&ordered, start, end, end),
            downtime_minutes(&shuffled, start, end, end),
        );
    }

    #[test]
    fn extra_down_sample_never_decreases_downtime() {
        let start = at("2026-08-19T00:00:00Z");
        let end = at("2026-08-20T00:00:00Z");
        let base = vec![
            sample("2026-08-19T08:00:00Z", true),
            sample("2026-08-19T10:00:00Z", false),
            sample("2026-08-19T10:30:00Z", true),
            sample("2026-08-19T20:00:00Z", true),
        ];
        let baseline = downtime_minutes(&base, start, end, end);

        // Leading, interior (inside and outside the outage) and trailing
        // insertion points
        for extra_ts in [
            "2026-08-19T06:00:00Z",
            "2026-08-19T10:15:00Z",
            "2026-08-19T15:00:00Z",
            "2026-08-19T22:00:00Z",
        ] {
            let mut samples = base.clone();
            samples.push(sample(extra_ts, false));
            let with_extra = downtime_minutes(&samples, start, end, end);
            assert!(
                with_extra >= baseline,
                "down sample at {extra_ts} decreased downtime: {with_extra} < {baseline}"
            );
        }
    }

    #[test]
    fn trailing_down_extends_to_bucket_end() {
        let start = at("2026-08-19T00:00:00Z");
        let end = at("2026-08-20T00:00:00Z");
        let samples = vec![
            sample("2026-08-19T11:00:00Z", true),
            sample("2026-08-19T12:00:00Z", false),
        ];
        // Now is far past the bucket, so the edge stops at bucket end
        assert_eq!(downtime_minutes(&samples, start, end, at("2026-08-22T00:00:00Z")), 720.0);
    }

    #[test]
    fn trailing_down_stops_at_now_for_the_open_bucket() {
        let start = at("2026-08-19T00:00:00Z");
        let end = at("2026-08-20T00:00:00Z");
        let samples = vec![sample("2026-08-19T12:00:00Z", false)];
        let now = at("2026-08-19T12:30:00Z");
        assert_eq!(downtime_minutes(&samples, start, end, now), 30.0);
    }

    #[test]
    fn downtime_never_exceeds_bucket_length() {
        let start = at("2026-08-19T00:00:00Z");
        let end = at("2026-08-20T00:00:00Z");
        // Sample from before the bucket start dragged in by a sloppy caller
        let samples = vec![sample("2026-08-17T00:00:00Z", false)];
        assert_eq!(downtime_minutes(&samples, start, end, at("2026-08-22T00:00:00Z")), DAY);
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify_status(0.0, 100, 9.0), BucketStatus::Up);
        assert_eq!(classify_status(5.0, 100, 9.0), BucketStatus::Partial);
        assert_eq!(classify_status(9.0, 100, 9.0), BucketStatus::Down);
        assert_eq!(classify_status(25.0, 100, 9.0), BucketStatus::Down);
        assert_eq!(classify_status(DAY, 0, 9.0), BucketStatus::NoData);
    }

    #[test]
    fn uptime_percentage_bounds() {
        assert_eq!(uptime_percentage(0.0, DAY), 100.0);
        assert_eq!(uptime_percentage(DAY, DAY), 0.0);
        assert_eq!(uptime_percentage(360.0, DAY), 75.0);
    }

    #[test]
    fn flapping_day_accumulates_each_episode() {
        // Five separate 5-minute outages over one day: 25 minutes total,
        // which crosses the DOWN threshold even though each episode alone
        // would only be PARTIAL
        let start = at("2026-08-19T00:00:00Z");
        let end = at("2026-08-20T00:00:00Z");
        let mut samples = vec![sample("2026-08-19T00:00:00Z", true)];
        for hour in [2, 6, 10, 14, 18] {
            samples.push(sample(&format!("2026-08-19T{hour:02}:00:00Z"), false));
            samples.push(sample(&format!("2026-08-19T{hour:02}:05:00Z"), true));
        }
        let downtime = downtime_minutes(&samples, start, end, end);
        assert_eq!(downtime, 25.0);
        assert_eq!(classify_status(downtime, samples.len(), 9.0), BucketStatus::Down);
        let pct = uptime_percentage(downtime, DAY);
        assert!((pct - 98.26).abs() < 0.01, "got {pct}");
    }

    fn series(values: Vec<(i64, &str)>) -> RangeSeries {
        RangeSeries {
            metric: HashMap::from([
                ("service_name".to_string(), "rpc-1".to_string()),
                ("group".to_string(), "RPC".to_string()),
                ("url".to_string(), "https://rpc1.example.com".to_string()),
            ]),
            values: values.into_iter().map(|(ts, v)| (ts as f64, v.to_string())).collect(),
        }
    }

    #[test]
    fn report_marks_empty_buckets_no_data_and_excludes_them_from_aggregate() {
        let now = at("2026-08-19T12:00:00Z");
        // Samples only on the 18th and 19th: up all of the 18th, one hour
        // down on the 19th
        let mut values = vec![];
        values.push((at("2026-08-18T00:00:00Z").timestamp(), "1"));
        values.push((at("2026-08-18T23:00:00Z").timestamp(), "1"));
        values.push((at("2026-08-19T00:00:00Z").timestamp(), "1"));
        values.push((at("2026-08-19T08:00:00Z").timestamp(), "0"));
        values.push((at("2026-08-19T09:00:00Z").timestamp(), "1"));

        let report = build_report(&[series(values)], BucketKind::Day, 30, now, 9.0);
        assert_eq!(report.services.len(), 1);
        let service = &report.services[0];
        assert_eq!(service.buckets.len(), 30);

        let no_data = service.buckets.iter().filter(|b| b.status == BucketStatus::NoData).count();
        assert_eq!(no_data, 28);

        let day_18 = service.buckets.iter().find(|b| b.start == at("2026-08-18T00:00:00Z")).unwrap();
        assert_eq!(day_18.status, BucketStatus::Up);
        assert_eq!(day_18.uptime_percentage, 100.0);

        let day_19 = service.buckets.iter().find(|b| b.start == at("2026-08-19T00:00:00Z")).unwrap();
        assert_eq!(day_19.status, BucketStatus::Down);
        assert_eq!(day_19.downtime_minutes, 60.0);

        // Aggregate averages the two buckets with data only
        let expected = (100.0 + uptime_percentage(60.0, DAY)) / 2.0;
        assert!((service.uptime_percentage - expected).abs() < 1e-9);
    }

    #[test]
    fn report_with_no_series_is_empty() {
        let report = build_report(&[], BucketKind::Hour, 24, Utc::now(), 9.0);
        assert!(report.services.is_empty());
    }

    #[test]
    fn window_start_spans_count_buckets() {
        let now = at("2026-08-19T12:34:00Z");
        assert_eq!(window_start(BucketKind::Hour, 24, now), at("2026-08-18T13:00:00Z"));
        assert_eq!(window_start(BucketKind::Day, 30, now), at("2026-07-21T00:00:00Z"));
    }

    #[test]
    fn bucket_kind_parses() {
        assert_eq!("day".parse::<BucketKind>().unwrap(), BucketKind::Day);
        assert!("fortnight".parse::<BucketKind>().is_err());
    }
}
