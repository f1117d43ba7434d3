use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc};
use domain::{Actor, Listing, ListingStatus, Timestamp, UserSnapshot};
use serde::Serialize;

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{DailyActivity, DashboardRepository, MonthlyCount},
};

use super::ensure_privileged;

const GROWTH_MONTHS: i32 = 6;
const ACTIVITY_DAYS: i64 = 7;
const RECENT_LIMIT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: u64,
    pub active_listings: u64,
    pub new_users_this_week: u64,
    pub user_growth: Vec<MonthlyCount>,
    pub listing_activity: Vec<DailyActivity>,
    pub recent_users: Vec<UserSnapshot>,
    pub recent_listings: Vec<Listing>,
}

pub struct DashboardServiceDependencies {
    pub dashboard_repository: Arc<dyn DashboardRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct DashboardService {
    deps: DashboardServiceDependencies,
}

/// 从 `now` 所在月份往前数 `count` 个月（含当月），按时间升序。
fn trailing_months(now: Timestamp, count: i32) -> Vec<(i32, u32)> {
    let current = now.year() * 12 + now.month0() as i32;
    (0..count)
        .rev()
        .map(|back| {
            let index = current - back;
            (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
        })
        .collect()
}

fn trailing_days(now: Timestamp, count: i64) -> Vec<NaiveDate> {
    let today = now.date_naive();
    (0..count)
        .rev()
        .map(|back| today - Duration::days(back))
        .collect()
}

impl DashboardService {
    pub fn new(deps: DashboardServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn stats(&self, actor: &Actor) -> Result<DashboardStats, ApplicationError> {
        ensure_privileged(actor)?;
        let repo = &self.deps.dashboard_repository;
        let now = self.deps.clock.now();

        let months = trailing_months(now, GROWTH_MONTHS);
        let growth_start = months
            .first()
            .and_then(|(year, month)| {
                Utc.with_ymd_and_hms(*year, *month, 1, 0, 0, 0).single()
            })
            .unwrap_or(now);
        let signups = repo.monthly_user_signups(growth_start).await?;
        let user_growth = months
            .into_iter()
            .map(|(year, month)| MonthlyCount {
                year,
                month,
                count: signups
                    .iter()
                    .find(|m| m.year == year && m.month == month)
                    .map_or(0, |m| m.count),
            })
            .collect();

        let days = trailing_days(now, ACTIVITY_DAYS);
        let activity_start = days
            .first()
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or(now);
        let activity = repo.daily_listing_activity(activity_start).await?;
        let listing_activity = days
            .into_iter()
            .map(|date| {
                activity
                    .iter()
                    .find(|a| a.date == date)
                    .cloned()
                    .unwrap_or(DailyActivity {
                        date,
                        active: 0,
                        inactive: 0,
                    })
            })
            .collect();

        Ok(DashboardStats {
            total_users: repo.count_users(None).await?,
            active_listings: repo
                .count_listings_with_status(ListingStatus::Published)
                .await?,
            new_users_this_week: repo.count_users(Some(now - Duration::days(7))).await?,
            user_growth,
            listing_activity,
            recent_users: repo
                .recent_users(RECENT_LIMIT)
                .await?
                .iter()
                .map(|u| u.snapshot())
                .collect(),
            recent_listings: repo.recent_listings(RECENT_LIMIT).await?,
        })
    }
}
