use serde::Serialize;

use crate::analytics::DailyEngagement;

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub saved: bool,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub days: Vec<DailyEngagement>,
    pub total_likes: i64,
    pub total_saves: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_views: Option<i64>,
}

impl AnalyticsResponse {
    pub fn from_days(days: Vec<DailyEngagement>) -> Self {
        let total_likes = days.iter().map(|d| d.likes).sum();
        let total_saves = days.iter().map(|d| d.saves).sum();
        let total_views = days
            .iter()
            .map(|d| d.views)
            .sum::<Option<i64>>();
        Self {
            days,
            total_likes,
            total_saves,
            total_views,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::daily_series;
    use time::macros::{date, datetime};

    #[test]
    fn totals_sum_the_window() {
        let likes = [datetime!(2024-03-10 08:00 UTC), datetime!(2024-03-09 08:00 UTC)];
        let views = [datetime!(2024-03-10 09:00 UTC)];
        let days = daily_series(date!(2024 - 03 - 10), 30, &likes, &[], Some(&views));
        let res = AnalyticsResponse::from_days(days);
        assert_eq!(res.total_likes, 2);
        assert_eq!(res.total_saves, 0);
        assert_eq!(res.total_views, Some(1));
    }

    #[test]
    fn views_total_absent_when_not_tracked() {
        let days = daily_series(date!(2024 - 03 - 10), 7, &[], &[], None);
        let json = serde_json::to_value(AnalyticsResponse::from_days(days)).unwrap();
        assert!(json.get("total_views").is_none());
        assert_eq!(json["days"].as_array().unwrap().len(), 7);
    }
}
