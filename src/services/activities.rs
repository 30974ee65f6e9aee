// SPDX-License-Identifier: MIT

//! Activity history reconciliation.
//!
//! The activity list is account-wide, paginated, and sorted newest-first.
//! Reconciliation turns it into per-bike usage statistics exactly once per
//! activity: a persisted cursor (the newest folded activity id) bounds the
//! cheap per-tick fetch, and the stats' processed-id set absorbs any
//! re-reads when the cursor has to be rebuilt from a full walk.

use std::collections::HashSet;

use chrono::Utc;

use crate::error::AppError;
use crate::models::Activity;
use crate::services::flow::{FlowSession, ACTIVITY_PAGE_SIZE};
use crate::store::StateStore;
use crate::time_utils::format_utc_rfc3339;

/// What the recent page tells us relative to the persisted cursor.
#[derive(Debug)]
enum ReconcileWindow {
    /// The cursor is still the newest activity, nothing to do.
    UpToDate,
    /// These activities (newest-first) appeared after the cursor.
    New(Vec<Activity>),
    /// The cursor fell off the recent page; a full walk is required.
    CursorLost,
}

/// Fetch the most recent activity page for one bike.
pub async fn fetch_recent(
    session: &FlowSession,
    bike_id: &str,
) -> Result<Vec<Activity>, AppError> {
    let page = session.activities(0, ACTIVITY_PAGE_SIZE).await?;
    let mut activities = Vec::new();
    let mut seen = HashSet::new();
    collect_page(&mut activities, &mut seen, page.data, bike_id);
    Ok(activities)
}

/// Fetch the complete activity history for one bike by walking all pages.
///
/// Terminates because `current_page` strictly increases towards the finite
/// `total_pages` reported by the page metadata; an empty page ends the walk
/// early even if the metadata claims more.
pub async fn fetch_complete(
    session: &FlowSession,
    bike_id: &str,
) -> Result<Vec<Activity>, AppError> {
    let mut activities = Vec::new();
    let mut seen = HashSet::new();

    let mut current_page: u32 = 0;
    let mut total_pages: u32 = 1; // Start with 1 to enter the loop

    while current_page < total_pages {
        tracing::debug!(bike_id, page = current_page, "Fetching activity page");
        let page = session.activities(current_page, ACTIVITY_PAGE_SIZE).await?;

        if page.data.is_empty() {
            break;
        }

        collect_page(&mut activities, &mut seen, page.data, bike_id);

        total_pages = page.meta.pages;
        current_page += 1;
        tracing::debug!(
            bike_id,
            progress = format!("{}/{}", current_page, total_pages),
            "Activity pages collected"
        );
    }

    Ok(activities)
}

/// Append one page's activities, skipping duplicates and foreign bikes.
fn collect_page(
    activities: &mut Vec<Activity>,
    seen: &mut HashSet<String>,
    page_items: Vec<Activity>,
    bike_id: &str,
) {
    for item in page_items {
        if !seen.insert(item.id.clone()) {
            tracing::warn!(activity_id = %item.id, "Duplicate activity ID found, skipping it");
            continue;
        }
        if item.belongs_to(bike_id) {
            activities.push(item);
        }
    }
}

/// Scan the recent page (newest-first) for the cursor.
fn window_since(recent: Vec<Activity>, last_activity_id: &str) -> ReconcileWindow {
    if recent.is_empty() {
        return ReconcileWindow::UpToDate;
    }

    match recent.iter().position(|a| a.id == last_activity_id) {
        Some(0) => ReconcileWindow::UpToDate,
        Some(idx) => ReconcileWindow::New(recent.into_iter().take(idx).collect()),
        None => ReconcileWindow::CursorLost,
    }
}

/// Reconcile the activity history of one bike into its usage statistics.
///
/// Returns the number of newly counted activities. The cursor and the stats
/// are committed together, and only after the fold, so an interrupted tick
/// replays the same window next time without double counting.
pub async fn reconcile(
    session: &FlowSession,
    store: &StateStore,
    bike_id: &str,
) -> Result<u32, AppError> {
    let persisted = store.bike(bike_id).await.unwrap_or_default();
    let mut stats = persisted.stats;

    let new_activities = match &persisted.last_activity_id {
        None => {
            tracing::info!(bike_id, "No activity cursor yet, importing the complete history");
            fetch_complete(session, bike_id).await?
        }
        Some(last_id) => {
            let recent = fetch_recent(session, bike_id).await?;
            match window_since(recent, last_id) {
                ReconcileWindow::UpToDate => {
                    tracing::debug!(bike_id, "Activity history is up to date");
                    return Ok(0);
                }
                ReconcileWindow::New(new) => new,
                ReconcileWindow::CursorLost => {
                    tracing::info!(
                        bike_id,
                        last_activity_id = %last_id,
                        "Cursor not on the recent page, re-walking the history"
                    );
                    fetch_complete(session, bike_id).await?
                }
            }
        }
    };

    if new_activities.is_empty() {
        return Ok(0);
    }

    // The API returns newest-first; fold oldest-first so the time-series
    // aggregates grow in ride order.
    let now = format_utc_rfc3339(Utc::now());
    let mut folded = 0;
    for activity in new_activities.iter().rev() {
        if stats.record_activity(activity, &now) {
            folded += 1;
        }
    }

    let cursor = new_activities
        .first()
        .map(|a| a.id.clone())
        .or(persisted.last_activity_id);
    store
        .commit_activity_progress(bike_id, cursor, &stats)
        .await?;

    if folded > 0 {
        tracing::info!(bike_id, new_activities = folded, "Usage statistics updated");
    }
    Ok(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::activity::ActivityAttributes;

    fn activity(id: &str, bike_id: &str) -> Activity {
        Activity {
            id: id.to_string(),
            attributes: ActivityAttributes {
                bike_id: Some(bike_id.to_string()),
                start_time: Some("2025-06-01T10:00:00Z".to_string()),
                total_distance: Some(1000.0),
                ..Default::default()
            },
        }
    }

    #[test]
    fn collect_skips_duplicates_and_foreign_bikes() {
        let mut activities = Vec::new();
        let mut seen = HashSet::new();

        collect_page(
            &mut activities,
            &mut seen,
            vec![
                activity("a1", "bike-1"),
                activity("a2", "bike-2"),
                activity("a1", "bike-1"), // duplicate
                activity("a3", "bike-1"),
            ],
            "bike-1",
        );

        let ids: Vec<&str> = activities.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a3"]);
    }

    #[test]
    fn window_up_to_date_when_cursor_is_newest() {
        let recent = vec![activity("a3", "b"), activity("a2", "b"), activity("a1", "b")];
        assert!(matches!(
            window_since(recent, "a3"),
            ReconcileWindow::UpToDate
        ));
    }

    #[test]
    fn window_returns_only_newer_entries() {
        let recent = vec![activity("a4", "b"), activity("a3", "b"), activity("a2", "b")];
        match window_since(recent, "a2") {
            ReconcileWindow::New(new) => {
                let ids: Vec<&str> = new.iter().map(|a| a.id.as_str()).collect();
                assert_eq!(ids, vec!["a4", "a3"]);
            }
            other => panic!("expected New, got {:?}", other),
        }
    }

    #[test]
    fn window_detects_lost_cursor() {
        let recent = vec![activity("a9", "b"), activity("a8", "b")];
        assert!(matches!(
            window_since(recent, "a1"),
            ReconcileWindow::CursorLost
        ));
    }

    #[test]
    fn window_empty_page_means_up_to_date() {
        assert!(matches!(
            window_since(Vec::new(), "a1"),
            ReconcileWindow::UpToDate
        ));
    }
}
