//! Consecutive-day attendance streaks.
//!
//! The broken-vs-continued decision is a pure function of the stored
//! last attendance date, the incoming attendance date and the stock of
//! recovery items; persistence happens around it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::{Sqlite, SqlitePool, Transaction};

use gympulse_core::{AppError, EnginePolicy};
use gympulse_storage::models::{LedgerEntry, Streak};
use gympulse_storage::repos;

use crate::frequency;
use crate::ledger;

/// How an attendance moved the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakTransition {
    /// First recorded attendance ever.
    Started,
    /// Attendance on the day after the last one.
    Extended,
    /// A single missed day covered by consuming one recovery item.
    Recovered,
    /// The gap was too large; the streak restarts at 1.
    Reset,
    /// Same-day duplicate or out-of-order date; nothing moved.
    Unchanged,
}

/// Decide how an attendance on `date` affects a streak.
///
/// A gap of exactly one missed day can be absorbed by a recovery item;
/// anything longer always breaks the streak. Dates at or before the
/// last recorded attendance leave the streak untouched, so replayed or
/// reordered events cannot shrink it.
pub fn advance(
    last_assistance_date: Option<NaiveDate>,
    date: NaiveDate,
    recovery_items: i64,
) -> StreakTransition {
    let Some(last) = last_assistance_date else {
        return StreakTransition::Started;
    };

    match (date - last).num_days() {
        d if d <= 0 => StreakTransition::Unchanged,
        1 => StreakTransition::Extended,
        2 if recovery_items > 0 => StreakTransition::Recovered,
        _ => StreakTransition::Reset,
    }
}

/// A streak row together with the transition that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct StreakSnapshot {
    pub streak: Streak,
    pub transition: StreakTransition,
}

/// Purchase receipt: the debit entry and the new recovery item count.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryPurchase {
    pub entry: LedgerEntry,
    pub recovery_items: i64,
}

/// Record an attendance against the user's streak.
///
/// Creates the streak row on first use, seeded at zero and bound to
/// the current week's frequency row. Must run inside the caller's
/// check-in transaction.
pub async fn record_attendance(
    tx: &mut Transaction<'_, Sqlite>,
    policy: &EnginePolicy,
    user_id: i64,
    date: NaiveDate,
) -> Result<StreakSnapshot, AppError> {
    let week = frequency::ensure_week(tx, policy, user_id, date).await?;

    let mut streak = match repos::get_streak(&mut **tx, user_id).await? {
        Some(streak) => streak,
        None => {
            let id = repos::insert_streak(&mut **tx, user_id, Some(week.id)).await?;
            repos::set_current_streak(&mut **tx, user_id, id).await?;
            Streak {
                id,
                user_id,
                value: 0,
                last_value: 0,
                max_value: 0,
                recovery_items: 0,
                last_assistance_date: None,
                frequency_id: Some(week.id),
            }
        }
    };

    let transition = advance(streak.last_assistance_date, date, streak.recovery_items);

    match transition {
        StreakTransition::Unchanged => {
            return Ok(StreakSnapshot { streak, transition });
        }
        StreakTransition::Started | StreakTransition::Extended => {
            streak.value += 1;
        }
        StreakTransition::Recovered => {
            streak.recovery_items -= 1;
            streak.value += 1;
        }
        StreakTransition::Reset => {
            streak.last_value = streak.value;
            streak.value = 1;
        }
    }

    streak.max_value = streak.max_value.max(streak.value);
    streak.last_assistance_date = Some(date);
    streak.frequency_id = Some(week.id);
    repos::update_streak(&mut **tx, &streak).await?;

    tracing::debug!(
        user_id,
        value = streak.value,
        ?transition,
        "streak advanced"
    );

    Ok(StreakSnapshot { streak, transition })
}

/// Buy one recovery item with tokens.
///
/// The debit and the item grant commit together; an insufficient
/// balance leaves both untouched.
pub async fn purchase_recovery(
    pool: &SqlitePool,
    policy: &EnginePolicy,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<RecoveryPurchase, AppError> {
    let mut tx = pool.begin().await?;

    let entry = ledger::debit(
        &mut tx,
        user_id,
        policy.recovery_item_cost,
        "recovery_purchase",
        "recovery_item",
        None,
        &json!({}),
        now,
    )
    .await?;

    let mut streak = match repos::get_streak(&mut *tx, user_id).await? {
        Some(streak) => streak,
        None => {
            let id = repos::insert_streak(&mut *tx, user_id, None).await?;
            repos::set_current_streak(&mut *tx, user_id, id).await?;
            Streak {
                id,
                user_id,
                value: 0,
                last_value: 0,
                max_value: 0,
                recovery_items: 0,
                last_assistance_date: None,
                frequency_id: None,
            }
        }
    };
    streak.recovery_items += 1;
    repos::update_streak(&mut *tx, &streak).await?;

    tx.commit().await?;

    tracing::info!(
        user_id,
        recovery_items = streak.recovery_items,
        cost = policy.recovery_item_cost,
        "recovery item purchased"
    );

    Ok(RecoveryPurchase {
        entry,
        recovery_items: streak.recovery_items,
    })
}
