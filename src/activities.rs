// src/activities.rs
//
// Append-only record of user actions against plants, written as a side
// effect of every successful Plant Store mutation.
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{doc, to_bson, Document};

use crate::auth::AuthUser;
use crate::models::{Activity, ActivityAction, ActivityQuery};
use crate::{AppError, AppState};

/// Best-effort post-commit append: the primary mutation already succeeded,
/// so a failed append is logged and never surfaced to the caller.
pub async fn log_activity(
    state: &AppState,
    owner: &str,
    action: ActivityAction,
    plant_id: Option<&str>,
    plant_name: Option<&str>,
    extra: Option<Document>,
) {
    let entry = Activity {
        id: None,
        owner: owner.to_owned(),
        action,
        plant_id: plant_id.map(str::to_owned),
        plant_name: plant_name.map(str::to_owned),
        at: Utc::now(),
        extra,
    };

    if let Err(e) = state.activities().insert_one(entry).await {
        tracing::warn!("activity append failed: {}", e);
    }
}

/// `[day 00:00, day+1 00:00)` in UTC for an ISO calendar date.
pub fn day_window(raw: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let date: NaiveDate = raw.trim().parse().ok()?;
    let start = date.and_hms_opt(0, 0, 0)?.and_utc();
    Some((start, start + Duration::days(1)))
}

// GET /api/activities?plant_id=&day=
pub async fn list_activities_handler(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<Activity>>, AppError> {
    let mut filter = doc! { "owner": &user.id };

    if let Some(plant_id) = query
        .plant_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        filter.insert("plant_id", plant_id);
    }

    // An unparsable day means the filter is skipped, not a rejected request.
    if let Some((start, end)) = query.day.as_deref().and_then(day_window) {
        filter.insert("at", doc! { "$gte": to_bson(&start)?, "$lt": to_bson(&end)? });
    }

    let mut cursor = state
        .activities()
        .find(filter)
        .sort(doc! { "at": -1 })
        .await?;

    let mut entries = Vec::new();
    while let Some(entry) = cursor.try_next().await? {
        entries.push(entry);
    }

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_window_spans_one_utc_day() {
        let (start, end) = day_window("2026-08-07").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 7, 0, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn day_window_tolerates_surrounding_whitespace() {
        assert!(day_window(" 2026-01-31 ").is_some());
    }

    #[test]
    fn unparsable_day_yields_no_window() {
        assert!(day_window("not-a-day").is_none());
        assert!(day_window("2026-13-07").is_none());
        assert!(day_window("").is_none());
    }
}
