//! Online-count curve for one day.
//!
//! Raw reports are reduced to the peak per server per minute, summed across
//! servers per minute, then folded into fixed-width buckets keeping the
//! highest per-minute total. All arithmetic is relative to a UTC day start.

use gamelog_db::OnlineSample;
use serde::Serialize;
use std::collections::HashMap;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Bucket width in minutes; always divides a day evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketWidth(u32);

impl BucketWidth {
    pub const FIVE_MINUTES: BucketWidth = BucketWidth(5);

    pub fn new(minutes: u32) -> Option<Self> {
        (minutes > 0 && MINUTES_PER_DAY % minutes == 0).then_some(Self(minutes))
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn buckets_per_day(self) -> usize {
        (MINUTES_PER_DAY / self.0) as usize
    }
}

impl Default for BucketWidth {
    fn default() -> Self {
        Self::FIVE_MINUTES
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnlineBucket {
    /// Unix timestamp of the bucket start
    pub minute: i64,
    /// `HH:MM` of the bucket start
    pub label: String,
    /// Highest per-minute total within the bucket
    pub online_num: i64,
}

/// Build the full-day curve starting at `day_start`.
///
/// Samples outside the day, or from other servers when `server_id` is set,
/// are ignored. Every bucket is present; empty ones report zero.
pub fn bucketize(
    samples: &[OnlineSample],
    width: BucketWidth,
    day_start: i64,
    server_id: Option<i64>,
) -> Vec<OnlineBucket> {
    // (minute of day, server) -> peak count within that minute
    let mut per_server_minute: HashMap<(u32, i64), i64> = HashMap::new();
    for sample in samples {
        if server_id.is_some_and(|id| id != sample.server_id) {
            continue;
        }
        let offset = sample.observed_at - day_start;
        if !(0..i64::from(MINUTES_PER_DAY) * 60).contains(&offset) {
            continue;
        }
        let minute = (offset / 60) as u32;
        per_server_minute
            .entry((minute, sample.server_id))
            .and_modify(|peak| *peak = (*peak).max(sample.count))
            .or_insert(sample.count);
    }

    let mut per_minute: HashMap<u32, i64> = HashMap::new();
    for ((minute, _), peak) in per_server_minute {
        let total = per_minute.entry(minute).or_insert(0);
        *total = total.saturating_add(peak);
    }

    let mut peaks = vec![0i64; width.buckets_per_day()];
    for (minute, total) in per_minute {
        let slot = &mut peaks[(minute / width.minutes()) as usize];
        *slot = (*slot).max(total);
    }

    peaks
        .into_iter()
        .enumerate()
        .map(|(i, online_num)| {
            let offset_minutes = i as u32 * width.minutes();
            OnlineBucket {
                minute: day_start + i64::from(offset_minutes) * 60,
                label: format!("{:02}:{:02}", offset_minutes / 60, offset_minutes % 60),
                online_num,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-11-14T00:00:00Z
    const DAY_START: i64 = 1699920000;

    fn at(hour: i64, minute: i64, second: i64) -> i64 {
        DAY_START + hour * 3600 + minute * 60 + second
    }

    fn sample(server_id: i64, count: i64, observed_at: i64) -> OnlineSample {
        OnlineSample {
            server_id,
            count,
            observed_at,
        }
    }

    #[test]
    fn test_width_must_divide_day() {
        assert!(BucketWidth::new(5).is_some());
        assert!(BucketWidth::new(60).is_some());
        assert!(BucketWidth::new(1440).is_some());
        assert!(BucketWidth::new(0).is_none());
        assert!(BucketWidth::new(7).is_none());
        assert!(BucketWidth::new(2880).is_none());
    }

    #[test]
    fn test_empty_day_yields_every_bucket_at_zero() {
        let buckets = bucketize(&[], BucketWidth::FIVE_MINUTES, DAY_START, None);

        assert_eq!(buckets.len(), 288);
        assert!(buckets.iter().all(|b| b.online_num == 0));
        assert_eq!(buckets[0].minute, DAY_START);
        assert_eq!(buckets[0].label, "00:00");
        assert_eq!(buckets[287].minute, at(23, 55, 0));
        assert_eq!(buckets[287].label, "23:55");
        assert!(buckets.windows(2).all(|w| w[1].minute - w[0].minute == 300));
    }

    #[test]
    fn test_peak_of_per_minute_sums() {
        let samples = vec![
            sample(1, 10, at(0, 2, 0)),
            sample(1, 15, at(0, 4, 0)),
            sample(2, 5, at(0, 3, 0)),
        ];
        let buckets = bucketize(&samples, BucketWidth::FIVE_MINUTES, DAY_START, None);
        assert_eq!(buckets[0].online_num, 15);
        assert_eq!(buckets[1].online_num, 0);
    }

    #[test]
    fn test_repeated_reports_in_a_minute_take_the_max_then_sum_servers() {
        let samples = vec![
            sample(1, 10, at(1, 7, 5)),
            sample(1, 30, at(1, 7, 40)),
            sample(1, 20, at(1, 7, 59)),
            sample(2, 8, at(1, 7, 10)),
            sample(2, 4, at(1, 8, 0)),
        ];
        let buckets = bucketize(&samples, BucketWidth::FIVE_MINUTES, DAY_START, None);

        // Minute 07 truncates into the 01:05 bucket
        let bucket = buckets.iter().find(|b| b.label == "01:05").unwrap();
        assert_eq!(bucket.online_num, 38);
    }

    #[test]
    fn test_server_filter() {
        let samples = vec![
            sample(1, 10, at(0, 2, 0)),
            sample(2, 50, at(0, 2, 0)),
        ];
        let buckets = bucketize(&samples, BucketWidth::FIVE_MINUTES, DAY_START, Some(1));
        assert_eq!(buckets[0].online_num, 10);
    }

    #[test]
    fn test_samples_outside_day_are_ignored() {
        let samples = vec![
            sample(1, 10, DAY_START - 1),
            sample(1, 20, DAY_START + 86400),
            sample(1, 5, at(23, 59, 59)),
        ];
        let buckets = bucketize(&samples, BucketWidth::FIVE_MINUTES, DAY_START, None);
        assert_eq!(buckets[0].online_num, 0);
        assert_eq!(buckets[287].online_num, 5);
        assert_eq!(buckets.iter().map(|b| b.online_num).sum::<i64>(), 5);
    }

    #[test]
    fn test_huge_counts_saturate_instead_of_overflowing() {
        let samples = vec![
            sample(1, i64::MAX, at(0, 1, 0)),
            sample(2, i64::MAX, at(0, 1, 30)),
            sample(3, 5, at(0, 1, 45)),
        ];
        let buckets = bucketize(&samples, BucketWidth::FIVE_MINUTES, DAY_START, None);
        assert_eq!(buckets[0].online_num, i64::MAX);
    }

    #[test]
    fn test_hourly_width() {
        let samples = vec![sample(1, 3, at(13, 45, 0)), sample(1, 9, at(13, 5, 0))];
        let buckets = bucketize(&samples, BucketWidth::new(60).unwrap(), DAY_START, None);
        assert_eq!(buckets.len(), 24);
        assert_eq!(buckets[13].label, "13:00");
        assert_eq!(buckets[13].online_num, 9);
    }
}
