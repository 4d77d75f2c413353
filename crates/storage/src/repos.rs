use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};

use crate::models::*;

// ─── User Profile Queries ───────────────────────────────────────────────────

/// Insert a new user profile (ignore if already exists).
pub async fn insert_user_profile<'e, E>(
    executor: E,
    profile: &UserProfile,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO user_profiles (id, display_name, weekly_goal, token_balance, current_streak_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(profile.id)
    .bind(&profile.display_name)
    .bind(profile.weekly_goal)
    .bind(profile.token_balance)
    .bind(profile.current_streak_id)
    .bind(profile.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Get a single user profile by id.
pub async fn get_user_profile<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Option<UserProfile>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, UserProfile>("SELECT * FROM user_profiles WHERE id = ?")
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

/// Update a user's configured weekly attendance goal.
pub async fn update_weekly_goal(
    pool: &SqlitePool,
    user_id: i64,
    weekly_goal: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE user_profiles SET weekly_goal = ? WHERE id = ?")
        .bind(weekly_goal)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Overwrite the cached token balance.
pub async fn update_token_balance<'e, E>(
    executor: E,
    user_id: i64,
    balance: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE user_profiles SET token_balance = ? WHERE id = ?")
        .bind(balance)
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Point the profile at its current streak row.
pub async fn set_current_streak<'e, E>(
    executor: E,
    user_id: i64,
    streak_id: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE user_profiles SET current_streak_id = ? WHERE id = ?")
        .bind(streak_id)
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

// ─── Gym & Geofence Queries ─────────────────────────────────────────────────

/// Insert a gym (ignore if already exists).
pub async fn insert_gym<'e, E>(executor: E, gym: &Gym) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO gyms (id, name, lat, lon)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(gym.id)
    .bind(&gym.name)
    .bind(gym.lat)
    .bind(gym.lon)
    .execute(executor)
    .await?;
    Ok(())
}

/// Get a single gym by id.
pub async fn get_gym<'e, E>(executor: E, gym_id: i64) -> Result<Option<Gym>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Gym>("SELECT * FROM gyms WHERE id = ?")
        .bind(gym_id)
        .fetch_optional(executor)
        .await
}

/// Create or replace a gym's geofence configuration.
pub async fn upsert_geofence<'e, E>(executor: E, fence: &GymGeofence) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO gym_geofences (gym_id, radius_m, enabled, min_stay_minutes)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (gym_id) DO UPDATE SET
            radius_m = excluded.radius_m,
            enabled = excluded.enabled,
            min_stay_minutes = excluded.min_stay_minutes
        "#,
    )
    .bind(fence.gym_id)
    .bind(fence.radius_m)
    .bind(fence.enabled)
    .bind(fence.min_stay_minutes)
    .execute(executor)
    .await?;
    Ok(())
}

/// Get the geofence configuration for a gym.
pub async fn get_geofence<'e, E>(
    executor: E,
    gym_id: i64,
) -> Result<Option<GymGeofence>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, GymGeofence>("SELECT * FROM gym_geofences WHERE gym_id = ?")
        .bind(gym_id)
        .fetch_optional(executor)
        .await
}

// ─── Assistance Queries ─────────────────────────────────────────────────────

/// Insert a new visit and return its row id.
pub async fn insert_assistance<'e, E>(
    executor: E,
    visit: &NewAssistance,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO assistances (user_id, gym_id, date, check_in_at, auto_checkin, distance_m, verified)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(visit.user_id)
    .bind(visit.gym_id)
    .bind(visit.date)
    .bind(visit.check_in_at)
    .bind(visit.auto_checkin)
    .bind(visit.distance_m)
    .bind(visit.verified)
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Get a single visit by id.
pub async fn get_assistance<'e, E>(
    executor: E,
    assistance_id: i64,
) -> Result<Option<Assistance>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Assistance>("SELECT * FROM assistances WHERE id = ?")
        .bind(assistance_id)
        .fetch_optional(executor)
        .await
}

/// Find the user's open visit (checked in, not yet out) for a date.
pub async fn find_open_assistance<'e, E>(
    executor: E,
    user_id: i64,
    date: NaiveDate,
) -> Result<Option<Assistance>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Assistance>(
        "SELECT * FROM assistances WHERE user_id = ? AND date = ? AND check_out_at IS NULL",
    )
    .bind(user_id)
    .bind(date)
    .fetch_optional(executor)
    .await
}

/// Write the single permitted check-out mutation.
pub async fn close_assistance<'e, E>(
    executor: E,
    assistance_id: i64,
    check_out_at: DateTime<Utc>,
    duration_minutes: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE assistances SET check_out_at = ?, duration_minutes = ? WHERE id = ?",
    )
    .bind(check_out_at)
    .bind(duration_minutes)
    .bind(assistance_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// List open visits whose check-in happened before the cutoff.
pub async fn get_open_assistances_before<'e, E>(
    executor: E,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Assistance>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Assistance>(
        r#"
        SELECT * FROM assistances
        WHERE check_out_at IS NULL AND check_in_at < ?
        ORDER BY check_in_at
        "#,
    )
    .bind(cutoff)
    .fetch_all(executor)
    .await
}

/// Total visit count for a user.
pub async fn count_assistances<'e, E>(executor: E, user_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assistances WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(executor)
        .await?;
    Ok(row.0)
}

/// Count of distinct calendar days with at least one visit.
pub async fn count_assistance_days<'e, E>(executor: E, user_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(DISTINCT date) FROM assistances WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(executor)
            .await?;
    Ok(row.0)
}

/// Count of distinct gyms the user has visited.
pub async fn count_distinct_gyms<'e, E>(executor: E, user_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(DISTINCT gym_id) FROM assistances WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(executor)
            .await?;
    Ok(row.0)
}

/// Get the most recent visits for a user.
pub async fn get_recent_assistances(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<Assistance>, sqlx::Error> {
    sqlx::query_as::<_, Assistance>(
        "SELECT * FROM assistances WHERE user_id = ? ORDER BY check_in_at DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

// ─── Streak Queries ─────────────────────────────────────────────────────────

/// Get a user's streak row.
pub async fn get_streak<'e, E>(executor: E, user_id: i64) -> Result<Option<Streak>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Streak>("SELECT * FROM streaks WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

/// Create a fresh streak row seeded at zero and return its id.
pub async fn insert_streak<'e, E>(
    executor: E,
    user_id: i64,
    frequency_id: Option<i64>,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO streaks (user_id, value, last_value, max_value, recovery_items, frequency_id)
        VALUES (?, 0, 0, 0, 0, ?)
        "#,
    )
    .bind(user_id)
    .bind(frequency_id)
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Persist the mutable streak fields.
pub async fn update_streak<'e, E>(executor: E, streak: &Streak) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE streaks SET
            value = ?,
            last_value = ?,
            max_value = ?,
            recovery_items = ?,
            last_assistance_date = ?,
            frequency_id = ?
        WHERE id = ?
        "#,
    )
    .bind(streak.value)
    .bind(streak.last_value)
    .bind(streak.max_value)
    .bind(streak.recovery_items)
    .bind(streak.last_assistance_date)
    .bind(streak.frequency_id)
    .bind(streak.id)
    .execute(executor)
    .await?;
    Ok(())
}

// ─── Frequency Queries ──────────────────────────────────────────────────────

/// Get the weekly tally row for (user, ISO year, ISO week).
pub async fn get_frequency<'e, E>(
    executor: E,
    user_id: i64,
    year: i64,
    week_number: i64,
) -> Result<Option<Frequency>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Frequency>(
        "SELECT * FROM frequencies WHERE user_id = ? AND year = ? AND week_number = ?",
    )
    .bind(user_id)
    .bind(year)
    .bind(week_number)
    .fetch_optional(executor)
    .await
}

/// Create a weekly tally row and return its id.
pub async fn insert_frequency<'e, E>(
    executor: E,
    user_id: i64,
    year: i64,
    week_number: i64,
    week_start_date: NaiveDate,
    goal: i64,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO frequencies (user_id, year, week_number, week_start_date, goal, assist_count, days_mask, achieved_goal)
        VALUES (?, ?, ?, ?, ?, 0, 0, 0)
        "#,
    )
    .bind(user_id)
    .bind(year)
    .bind(week_number)
    .bind(week_start_date)
    .bind(goal)
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Persist the counters of a weekly tally row.
pub async fn update_frequency_counts<'e, E>(
    executor: E,
    frequency_id: i64,
    assist_count: i64,
    days_mask: i64,
    achieved_goal: bool,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE frequencies SET assist_count = ?, days_mask = ?, achieved_goal = ? WHERE id = ?",
    )
    .bind(assist_count)
    .bind(days_mask)
    .bind(achieved_goal)
    .bind(frequency_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Number of weeks in which the user met their goal.
pub async fn count_weeks_goal_met<'e, E>(executor: E, user_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM frequencies WHERE user_id = ? AND achieved_goal = 1",
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;
    Ok(row.0)
}

/// Get recent weekly tallies for a user, newest first.
pub async fn get_recent_frequencies(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<Frequency>, sqlx::Error> {
    sqlx::query_as::<_, Frequency>(
        "SELECT * FROM frequencies WHERE user_id = ? ORDER BY week_start_date DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

// ─── Token Ledger Queries ───────────────────────────────────────────────────

/// Find an existing entry for (user, ref_type, ref_id).
/// This is the read half of the ledger idempotency check.
pub async fn find_ledger_entry_by_ref<'e, E>(
    executor: E,
    user_id: i64,
    ref_type: &str,
    ref_id: &str,
) -> Result<Option<LedgerEntry>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, LedgerEntry>(
        "SELECT * FROM token_ledger WHERE user_id = ? AND ref_type = ? AND ref_id = ?",
    )
    .bind(user_id)
    .bind(ref_type)
    .bind(ref_id)
    .fetch_optional(executor)
    .await
}

/// Append a ledger entry and return the stored row.
pub async fn insert_ledger_entry<'e, E>(
    executor: E,
    entry: &NewLedgerEntry,
) -> Result<LedgerEntry, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO token_ledger (user_id, amount, reason, ref_type, ref_id, metadata, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.amount)
    .bind(&entry.reason)
    .bind(&entry.ref_type)
    .bind(&entry.ref_id)
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .execute(executor)
    .await?;

    Ok(LedgerEntry {
        id: result.last_insert_rowid(),
        user_id: entry.user_id,
        amount: entry.amount,
        reason: entry.reason.clone(),
        ref_type: entry.ref_type.clone(),
        ref_id: entry.ref_id.clone(),
        metadata: entry.metadata.clone(),
        created_at: entry.created_at,
    })
}

/// Sum of all entries for a user, which is the authoritative balance.
pub async fn sum_ledger<'e, E>(executor: E, user_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(amount), 0) FROM token_ledger WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(executor)
            .await?;
    Ok(row.0)
}

/// Sum of positive entries only, counting lifetime tokens earned.
pub async fn sum_ledger_credits<'e, E>(executor: E, user_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM token_ledger WHERE user_id = ? AND amount > 0",
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;
    Ok(row.0)
}

/// Get the most recent ledger entries for a user.
pub async fn get_recent_ledger_entries(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    sqlx::query_as::<_, LedgerEntry>(
        "SELECT * FROM token_ledger WHERE user_id = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

// ─── Achievement Queries ────────────────────────────────────────────────────

/// Insert a catalog entry (ignore if the code already exists).
pub async fn insert_achievement_definition<'e, E>(
    executor: E,
    definition: &NewAchievementDefinition,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO achievement_definitions (code, category, metric_type, target_value, is_active, metadata)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (code) DO NOTHING
        "#,
    )
    .bind(&definition.code)
    .bind(&definition.category)
    .bind(&definition.metric_type)
    .bind(definition.target_value)
    .bind(definition.is_active)
    .bind(&definition.metadata)
    .execute(executor)
    .await?;
    Ok(())
}

/// Get a catalog entry by its stable code.
pub async fn get_achievement_definition<'e, E>(
    executor: E,
    code: &str,
) -> Result<Option<AchievementDefinition>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, AchievementDefinition>(
        "SELECT * FROM achievement_definitions WHERE code = ?",
    )
    .bind(code)
    .fetch_optional(executor)
    .await
}

/// All active catalog entries, in stable code order.
pub async fn get_active_definitions<'e, E>(
    executor: E,
) -> Result<Vec<AchievementDefinition>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, AchievementDefinition>(
        "SELECT * FROM achievement_definitions WHERE is_active = 1 ORDER BY code",
    )
    .fetch_all(executor)
    .await
}

/// Get a user's progress row for one definition.
pub async fn get_user_achievement<'e, E>(
    executor: E,
    user_id: i64,
    definition_id: i64,
) -> Result<Option<UserAchievement>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, UserAchievement>(
        "SELECT * FROM user_achievements WHERE user_id = ? AND definition_id = ?",
    )
    .bind(user_id)
    .bind(definition_id)
    .fetch_optional(executor)
    .await
}

/// Create a progress row and return its id.
pub async fn insert_user_achievement<'e, E>(
    executor: E,
    user_id: i64,
    definition_id: i64,
    current_value: i64,
    target_value: i64,
    progress: f64,
    last_source_type: Option<&str>,
    last_source_id: Option<&str>,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO user_achievements (user_id, definition_id, current_value, target_value, progress, unlocked, last_source_type, last_source_id)
        VALUES (?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(definition_id)
    .bind(current_value)
    .bind(target_value)
    .bind(progress)
    .bind(last_source_type)
    .bind(last_source_id)
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Update the progress fields of a locked (not yet unlocked) row.
pub async fn update_user_achievement<'e, E>(
    executor: E,
    user_achievement_id: i64,
    current_value: i64,
    target_value: i64,
    progress: f64,
    last_source_type: Option<&str>,
    last_source_id: Option<&str>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE user_achievements SET
            current_value = ?,
            target_value = ?,
            progress = ?,
            last_source_type = ?,
            last_source_id = ?
        WHERE id = ? AND unlocked = 0
        "#,
    )
    .bind(current_value)
    .bind(target_value)
    .bind(progress)
    .bind(last_source_type)
    .bind(last_source_id)
    .bind(user_achievement_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Transition a row to unlocked. The `unlocked = 0` guard makes the
/// write a no-op when the row is already frozen.
pub async fn unlock_user_achievement<'e, E>(
    executor: E,
    user_achievement_id: i64,
    unlocked_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE user_achievements SET unlocked = 1, unlocked_at = ? WHERE id = ? AND unlocked = 0",
    )
    .bind(unlocked_at)
    .bind(user_achievement_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Joined catalog + progress listing for one user. Definitions the
/// user has not touched yet appear with zero progress.
pub async fn get_achievement_status(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<AchievementStatus>, sqlx::Error> {
    sqlx::query_as::<_, AchievementStatus>(
        r#"
        SELECT d.code, d.category, d.metric_type, d.target_value,
               COALESCE(ua.current_value, 0) AS current_value,
               COALESCE(ua.progress, 0.0) AS progress,
               COALESCE(ua.unlocked, 0) AS unlocked,
               ua.unlocked_at
        FROM achievement_definitions d
        LEFT JOIN user_achievements ua
            ON ua.definition_id = d.id AND ua.user_id = ?
        WHERE d.is_active = 1
        ORDER BY d.category, d.code
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}
