use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ─── UserProfile ────────────────────────────────────────────────────────────

/// A member profile with its cached token balance.
///
/// `token_balance` is a read optimization only; the ledger sum is the
/// source of truth and the cache is reconciled after every ledger write.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: i64,
    pub display_name: String,
    pub weekly_goal: i64,
    pub token_balance: i64,
    pub current_streak_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// ─── Gym & Geofence ─────────────────────────────────────────────────────────

/// A gym location with its stored coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Gym {
    pub id: i64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Per-gym geofence configuration.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GymGeofence {
    pub gym_id: i64,
    pub radius_m: f64,
    pub enabled: bool,
    pub min_stay_minutes: i64,
}

// ─── Assistance ─────────────────────────────────────────────────────────────

/// An immutable record of one gym visit. The only permitted mutation
/// after insert is the single check-out write.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assistance {
    pub id: i64,
    pub user_id: i64,
    pub gym_id: i64,
    pub date: NaiveDate,
    pub check_in_at: DateTime<Utc>,
    pub check_out_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub auto_checkin: bool,
    pub distance_m: f64,
    pub verified: bool,
}

/// Insert-ready visit (no `id` or check-out fields).
#[derive(Debug, Clone)]
pub struct NewAssistance {
    pub user_id: i64,
    pub gym_id: i64,
    pub date: NaiveDate,
    pub check_in_at: DateTime<Utc>,
    pub auto_checkin: bool,
    pub distance_m: f64,
    pub verified: bool,
}

// ─── Streak ─────────────────────────────────────────────────────────────────

/// Consecutive-day attendance state for one user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Streak {
    pub id: i64,
    pub user_id: i64,
    pub value: i64,
    pub last_value: i64,
    pub max_value: i64,
    pub recovery_items: i64,
    pub last_assistance_date: Option<NaiveDate>,
    pub frequency_id: Option<i64>,
}

// ─── Frequency ──────────────────────────────────────────────────────────────

/// Weekly attendance tally, one row per (user, ISO week).
/// `days_mask` tracks counted weekdays as bits, Monday = bit 0.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Frequency {
    pub id: i64,
    pub user_id: i64,
    pub year: i64,
    pub week_number: i64,
    pub week_start_date: NaiveDate,
    pub goal: i64,
    pub assist_count: i64,
    pub days_mask: i64,
    pub achieved_goal: bool,
}

// ─── Token Ledger ───────────────────────────────────────────────────────────

/// An append-only token movement. Credits are positive, debits negative.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub reason: String,
    pub ref_type: String,
    pub ref_id: Option<String>,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
}

/// Insert-ready ledger entry (no `id`).
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: i64,
    pub amount: i64,
    pub reason: String,
    pub ref_type: String,
    pub ref_id: Option<String>,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
}

// ─── Achievements ───────────────────────────────────────────────────────────

/// Catalog entry describing one unlockable achievement.
/// `metadata` is a JSON document carrying `token_reward` and an
/// optional unlock message template.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AchievementDefinition {
    pub id: i64,
    pub code: String,
    pub category: String,
    pub metric_type: String,
    pub target_value: i64,
    pub is_active: bool,
    pub metadata: String,
}

/// Insert-ready achievement definition (no `id`).
#[derive(Debug, Clone)]
pub struct NewAchievementDefinition {
    pub code: String,
    pub category: String,
    pub metric_type: String,
    pub target_value: i64,
    pub is_active: bool,
    pub metadata: String,
}

/// Per-user progress toward one achievement definition.
/// Frozen once `unlocked` is set.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAchievement {
    pub id: i64,
    pub user_id: i64,
    pub definition_id: i64,
    pub current_value: i64,
    pub target_value: i64,
    pub progress: f64,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub last_source_type: Option<String>,
    pub last_source_id: Option<String>,
}

/// Joined catalog + progress row for user-facing listings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AchievementStatus {
    pub code: String,
    pub category: String,
    pub metric_type: String,
    pub target_value: i64,
    pub current_value: i64,
    pub progress: f64,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}
