//! Weekly attendance tallies against a configurable goal.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{Sqlite, Transaction};

use gympulse_core::{AppError, EnginePolicy};
use gympulse_storage::models::Frequency;
use gympulse_storage::repos;

use crate::calendar;

/// A weekly tally row together with what this attendance did to it.
#[derive(Debug, Clone, Serialize)]
pub struct FrequencySnapshot {
    pub frequency: Frequency,
    /// Whether this attendance added a new distinct day.
    pub counted: bool,
    /// Whether this attendance was the one that met the goal.
    pub goal_just_met: bool,
}

/// Load or create the tally row for the ISO week containing `date`.
///
/// A new row snapshots the user's configured goal at creation time;
/// later goal changes only affect later weeks.
pub async fn ensure_week(
    tx: &mut Transaction<'_, Sqlite>,
    policy: &EnginePolicy,
    user_id: i64,
    date: NaiveDate,
) -> Result<Frequency, AppError> {
    let week = calendar::iso_week_of(date);

    if let Some(existing) = repos::get_frequency(&mut **tx, user_id, week.year, week.week).await? {
        return Ok(existing);
    }

    let profile = repos::get_user_profile(&mut **tx, user_id)
        .await?
        .ok_or(AppError::UserNotFound { user_id })?;
    let goal = if profile.weekly_goal >= 1 {
        profile.weekly_goal
    } else {
        policy.default_weekly_goal
    };

    let id = repos::insert_frequency(&mut **tx, user_id, week.year, week.week, week.week_start, goal)
        .await?;

    Ok(Frequency {
        id,
        user_id,
        year: week.year,
        week_number: week.week,
        week_start_date: week.week_start,
        goal,
        assist_count: 0,
        days_mask: 0,
        achieved_goal: false,
    })
}

/// Record an attendance in the week's tally.
///
/// The count moves at most once per distinct calendar day, tracked in
/// the weekday bitmap. `achieved_goal` latches: once the goal is met
/// it stays met for that week.
pub async fn record_attendance(
    tx: &mut Transaction<'_, Sqlite>,
    policy: &EnginePolicy,
    user_id: i64,
    date: NaiveDate,
) -> Result<FrequencySnapshot, AppError> {
    let mut row = ensure_week(tx, policy, user_id, date).await?;

    let bit = calendar::day_bit(date);
    if row.days_mask & bit != 0 {
        return Ok(FrequencySnapshot {
            frequency: row,
            counted: false,
            goal_just_met: false,
        });
    }

    row.days_mask |= bit;
    row.assist_count += 1;
    let goal_just_met = !row.achieved_goal && row.assist_count >= row.goal;
    if goal_just_met {
        row.achieved_goal = true;
    }

    repos::update_frequency_counts(&mut **tx, row.id, row.assist_count, row.days_mask, row.achieved_goal)
        .await?;

    if goal_just_met {
        tracing::info!(
            user_id,
            week = row.week_number,
            goal = row.goal,
            "weekly goal met"
        );
    }

    Ok(FrequencySnapshot {
        frequency: row,
        counted: true,
        goal_just_met,
    })
}
