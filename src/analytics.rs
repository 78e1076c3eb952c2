use std::collections::HashMap;

use serde::Serialize;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

pub const WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyEngagement {
    /// UTC calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub likes: i64,
    pub saves: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<i64>,
}

pub fn window_start(today: Date, days: i64) -> OffsetDateTime {
    (today - Duration::days(days.max(1) - 1))
        .midnight()
        .assume_utc()
}

fn count_by_day(events: &[OffsetDateTime]) -> HashMap<Date, i64> {
    let mut counts = HashMap::new();
    for ts in events {
        *counts.entry(ts.to_offset(UtcOffset::UTC).date()).or_insert(0) += 1;
    }
    counts
}

/// Zero-filled, oldest-first daily totals for the `days` ending on `today`.
/// Events outside the window are ignored. `views` is `None` when the chart
/// does not track views.
pub fn daily_series(
    today: Date,
    days: i64,
    likes: &[OffsetDateTime],
    saves: &[OffsetDateTime],
    views: Option<&[OffsetDateTime]>,
) -> Vec<DailyEngagement> {
    let likes = count_by_day(likes);
    let saves = count_by_day(saves);
    let views = views.map(count_by_day);

    (0..days.max(1))
        .rev()
        .map(|back| {
            let day = today - Duration::days(back);
            DailyEngagement {
                date: day.to_string(),
                likes: likes.get(&day).copied().unwrap_or(0),
                saves: saves.get(&day).copied().unwrap_or(0),
                views: views
                    .as_ref()
                    .map(|v| v.get(&day).copied().unwrap_or(0)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn fills_every_day_oldest_first() {
        let series = daily_series(date!(2024 - 03 - 10), 30, &[], &[], None);
        assert_eq!(series.len(), 30);
        assert_eq!(series.first().unwrap().date, "2024-02-10");
        assert_eq!(series.last().unwrap().date, "2024-03-10");
        assert!(series.iter().all(|d| d.likes == 0 && d.saves == 0 && d.views.is_none()));
    }

    #[test]
    fn buckets_by_utc_day_and_drops_out_of_window() {
        let likes = [
            datetime!(2024-03-10 08:00 UTC),
            datetime!(2024-03-10 23:30 UTC),
            // 2024-03-10 01:00 in UTC
            datetime!(2024-03-09 20:00 -5),
            datetime!(2023-12-01 12:00 UTC),
        ];
        let saves = [datetime!(2024-03-09 12:00 UTC)];
        let views = [datetime!(2024-03-08 12:00 UTC)];
        let series = daily_series(date!(2024 - 03 - 10), 3, &likes, &saves, Some(&views));

        assert_eq!(
            series,
            vec![
                DailyEngagement { date: "2024-03-08".into(), likes: 0, saves: 0, views: Some(1) },
                DailyEngagement { date: "2024-03-09".into(), likes: 0, saves: 1, views: Some(0) },
                DailyEngagement { date: "2024-03-10".into(), likes: 3, saves: 0, views: Some(0) },
            ]
        );
    }

    #[test]
    fn window_start_is_midnight_of_first_day() {
        assert_eq!(
            window_start(date!(2024 - 03 - 10), 30),
            datetime!(2024-02-10 00:00 UTC)
        );
    }
}
