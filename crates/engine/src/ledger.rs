//! Append-only token ledger.
//!
//! Balances are the sum of a user's entries; the profile cache is
//! overwritten from that sum after every write in the same
//! transaction. Reference idempotency makes event retries safe: a
//! (user, ref_type, ref_id) triple is credited or debited at most
//! once.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use gympulse_core::AppError;
use gympulse_storage::models::{LedgerEntry, NewLedgerEntry};
use gympulse_storage::repos;

/// Result of a credit: either a fresh entry or the previously stored
/// one when the reference was already credited.
#[derive(Debug, Clone)]
pub enum CreditOutcome {
    Created(LedgerEntry),
    Duplicate(LedgerEntry),
}

impl CreditOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            Self::Created(entry) | Self::Duplicate(entry) => entry,
        }
    }

    pub fn into_entry(self) -> LedgerEntry {
        match self {
            Self::Created(entry) | Self::Duplicate(entry) => entry,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Append a positive entry.
///
/// When `ref_id` is set and an entry for (user, ref_type, ref_id)
/// already exists, nothing is written and the stored entry is
/// returned as [`CreditOutcome::Duplicate`].
pub async fn credit(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    amount: i64,
    reason: &str,
    ref_type: &str,
    ref_id: Option<&str>,
    metadata: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<CreditOutcome, AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount { amount });
    }

    if let Some(ref_id) = ref_id {
        if let Some(existing) =
            repos::find_ledger_entry_by_ref(&mut **tx, user_id, ref_type, ref_id).await?
        {
            tracing::debug!(user_id, ref_type, ref_id, "duplicate credit suppressed");
            return Ok(CreditOutcome::Duplicate(existing));
        }
    }

    let entry = repos::insert_ledger_entry(
        &mut **tx,
        &NewLedgerEntry {
            user_id,
            amount,
            reason: reason.to_string(),
            ref_type: ref_type.to_string(),
            ref_id: ref_id.map(str::to_string),
            metadata: metadata.to_string(),
            created_at: now,
        },
    )
    .await?;

    reconcile_balance(tx, user_id).await?;
    Ok(CreditOutcome::Created(entry))
}

/// Append a negative entry after verifying the balance covers it.
///
/// The balance check runs inside the caller's transaction, so two
/// racing debits cannot both pass it. Retries with the same reference
/// return the stored entry without writing again.
pub async fn debit(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    amount: i64,
    reason: &str,
    ref_type: &str,
    ref_id: Option<&str>,
    metadata: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<LedgerEntry, AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount { amount });
    }

    if let Some(ref_id) = ref_id {
        if let Some(existing) =
            repos::find_ledger_entry_by_ref(&mut **tx, user_id, ref_type, ref_id).await?
        {
            tracing::debug!(user_id, ref_type, ref_id, "duplicate debit suppressed");
            return Ok(existing);
        }
    }

    let balance = repos::sum_ledger(&mut **tx, user_id).await?;
    if balance < amount {
        return Err(AppError::InsufficientBalance {
            balance,
            required: amount,
        });
    }

    let entry = repos::insert_ledger_entry(
        &mut **tx,
        &NewLedgerEntry {
            user_id,
            amount: -amount,
            reason: reason.to_string(),
            ref_type: ref_type.to_string(),
            ref_id: ref_id.map(str::to_string),
            metadata: metadata.to_string(),
            created_at: now,
        },
    )
    .await?;

    reconcile_balance(tx, user_id).await?;
    Ok(entry)
}

/// Authoritative balance: the sum of the user's entries.
pub async fn balance_of(pool: &SqlitePool, user_id: i64) -> Result<i64, AppError> {
    Ok(repos::sum_ledger(pool, user_id).await?)
}

/// Overwrite the cached profile balance with the ledger sum.
async fn reconcile_balance(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
) -> Result<(), AppError> {
    let balance = repos::sum_ledger(&mut **tx, user_id).await?;
    repos::update_token_balance(&mut **tx, user_id, balance).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gympulse_storage::models::UserProfile;
    use serde_json::json;

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap()
    }

    async fn test_pool() -> SqlitePool {
        let pool = gympulse_storage::connect_memory().await.unwrap();
        gympulse_storage::migrate(&pool).await.unwrap();
        repos::insert_user_profile(
            &pool,
            &UserProfile {
                id: 1,
                display_name: "tester".into(),
                weekly_goal: 3,
                token_balance: 0,
                current_streak_id: None,
                created_at: test_now(),
            },
        )
        .await
        .unwrap();
        pool
    }

    async fn credit_once(
        pool: &SqlitePool,
        amount: i64,
        ref_id: Option<&str>,
    ) -> Result<CreditOutcome, AppError> {
        let mut tx = pool.begin().await.unwrap();
        let result = credit(&mut tx, 1, amount, "test_credit", "test", ref_id, &json!({}), test_now()).await;
        tx.commit().await.unwrap();
        result
    }

    async fn debit_once(
        pool: &SqlitePool,
        amount: i64,
        ref_id: Option<&str>,
    ) -> Result<LedgerEntry, AppError> {
        let mut tx = pool.begin().await.unwrap();
        let result = debit(&mut tx, 1, amount, "test_debit", "test", ref_id, &json!({}), test_now()).await;
        tx.commit().await.unwrap();
        result
    }

    async fn cached_balance(pool: &SqlitePool) -> i64 {
        repos::get_user_profile(pool, 1).await.unwrap().unwrap().token_balance
    }

    #[tokio::test]
    async fn test_credit_updates_balance_and_cache() {
        let pool = test_pool().await;

        let outcome = credit_once(&pool, 10, Some("evt-1")).await.unwrap();
        assert!(!outcome.is_duplicate());
        assert_eq!(outcome.entry().amount, 10);

        assert_eq!(balance_of(&pool, 1).await.unwrap(), 10);
        assert_eq!(cached_balance(&pool).await, 10);
    }

    #[tokio::test]
    async fn test_credit_same_reference_writes_once() {
        let pool = test_pool().await;

        let first = credit_once(&pool, 10, Some("evt-1")).await.unwrap();
        let second = credit_once(&pool, 10, Some("evt-1")).await.unwrap();

        assert!(second.is_duplicate());
        assert_eq!(second.entry().id, first.entry().id);
        assert_eq!(balance_of(&pool, 1).await.unwrap(), 10);

        let entries = repos::get_recent_ledger_entries(&pool, 1, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_credit_without_reference_is_not_deduplicated() {
        let pool = test_pool().await;

        credit_once(&pool, 5, None).await.unwrap();
        credit_once(&pool, 5, None).await.unwrap();

        assert_eq!(balance_of(&pool, 1).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_debit_within_balance() {
        let pool = test_pool().await;

        credit_once(&pool, 100, Some("evt-1")).await.unwrap();
        let entry = debit_once(&pool, 30, None).await.unwrap();

        assert_eq!(entry.amount, -30);
        assert_eq!(balance_of(&pool, 1).await.unwrap(), 70);
        assert_eq!(cached_balance(&pool).await, 70);
    }

    #[tokio::test]
    async fn test_debit_over_balance_is_rejected_without_writes() {
        let pool = test_pool().await;

        credit_once(&pool, 20, Some("evt-1")).await.unwrap();
        let err = debit_once(&pool, 50, None).await.unwrap_err();

        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
        assert_eq!(balance_of(&pool, 1).await.unwrap(), 20);
        let entries = repos::get_recent_ledger_entries(&pool, 1, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_debit_same_reference_writes_once() {
        let pool = test_pool().await;

        credit_once(&pool, 100, Some("evt-1")).await.unwrap();
        let first = debit_once(&pool, 30, Some("buy-1")).await.unwrap();
        let second = debit_once(&pool, 30, Some("buy-1")).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(balance_of(&pool, 1).await.unwrap(), 70);
    }

    #[tokio::test]
    async fn test_non_positive_amounts_are_rejected() {
        let pool = test_pool().await;

        let err = credit_once(&pool, 0, None).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");
        let err = credit_once(&pool, -5, None).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");
        let err = debit_once(&pool, 0, None).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");
    }

    #[tokio::test]
    async fn test_balance_of_unknown_user_is_zero() {
        let pool = test_pool().await;
        assert_eq!(balance_of(&pool, 999).await.unwrap(), 0);
    }
}
