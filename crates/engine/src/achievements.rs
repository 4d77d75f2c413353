//! Achievement evaluation.
//!
//! Definitions live in a catalog keyed by a stable code; each carries
//! a metric type resolved against the user's aggregates. Evaluation
//! updates per-user progress rows and reports the definitions that
//! transitioned to unlocked, so the caller can notify exactly once.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Executor, Sqlite, SqlitePool, Transaction};

use gympulse_core::AppError;
use gympulse_storage::models::AchievementStatus;
use gympulse_storage::repos;

use crate::ledger;

// ─── Metric Resolvers ───────────────────────────────────────────────────────

/// The closed set of metrics achievements can target.
///
/// `metric_type` strings in the catalog map onto these; a definition
/// with an unknown string is skipped, never a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Distinct calendar days with at least one visit.
    AssistanceDays,
    /// Total visits, counting same-day repeats.
    TotalVisits,
    /// Distinct gyms visited.
    DistinctGyms,
    /// Current consecutive-day streak.
    CurrentStreak,
    /// Highest streak ever reached.
    MaxStreak,
    /// Weeks in which the attendance goal was met.
    WeeksGoalMet,
    /// Lifetime tokens earned (credits only).
    LifetimeTokens,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::AssistanceDays,
        MetricKind::TotalVisits,
        MetricKind::DistinctGyms,
        MetricKind::CurrentStreak,
        MetricKind::MaxStreak,
        MetricKind::WeeksGoalMet,
        MetricKind::LifetimeTokens,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::AssistanceDays => "assistance_days",
            MetricKind::TotalVisits => "total_visits",
            MetricKind::DistinctGyms => "distinct_gyms",
            MetricKind::CurrentStreak => "current_streak",
            MetricKind::MaxStreak => "max_streak",
            MetricKind::WeeksGoalMet => "weeks_goal_met",
            MetricKind::LifetimeTokens => "lifetime_tokens",
        }
    }

    pub fn parse(s: &str) -> Option<MetricKind> {
        match s {
            "assistance_days" => Some(MetricKind::AssistanceDays),
            "total_visits" => Some(MetricKind::TotalVisits),
            "distinct_gyms" => Some(MetricKind::DistinctGyms),
            "current_streak" => Some(MetricKind::CurrentStreak),
            "max_streak" => Some(MetricKind::MaxStreak),
            "weeks_goal_met" => Some(MetricKind::WeeksGoalMet),
            "lifetime_tokens" => Some(MetricKind::LifetimeTokens),
            _ => None,
        }
    }

    /// Read the current raw value of this metric for a user.
    pub async fn resolve<'e, E>(self, executor: E, user_id: i64) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let value = match self {
            MetricKind::AssistanceDays => repos::count_assistance_days(executor, user_id).await?,
            MetricKind::TotalVisits => repos::count_assistances(executor, user_id).await?,
            MetricKind::DistinctGyms => repos::count_distinct_gyms(executor, user_id).await?,
            MetricKind::CurrentStreak => repos::get_streak(executor, user_id)
                .await?
                .map_or(0, |s| s.value),
            MetricKind::MaxStreak => repos::get_streak(executor, user_id)
                .await?
                .map_or(0, |s| s.max_value),
            MetricKind::WeeksGoalMet => repos::count_weeks_goal_met(executor, user_id).await?,
            MetricKind::LifetimeTokens => repos::sum_ledger_credits(executor, user_id).await?,
        };
        Ok(value)
    }
}

// ─── Definition Metadata ────────────────────────────────────────────────────

/// Typed view of a definition's JSON metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefinitionMeta {
    #[serde(default)]
    pub token_reward: i64,
    #[serde(default)]
    pub message: Option<String>,
}

impl DefinitionMeta {
    /// Parse catalog metadata, treating malformed JSON as empty so one
    /// bad definition cannot poison evaluation of the others.
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    /// Render the unlock message, substituting `{value}` and
    /// `{target}` placeholders.
    pub fn render_message(&self, code: &str, value: i64, target: i64) -> String {
        match &self.message {
            Some(template) => template
                .replace("{value}", &value.to_string())
                .replace("{target}", &target.to_string()),
            None => format!("Achievement {code} unlocked"),
        }
    }
}

// ─── Evaluation ─────────────────────────────────────────────────────────────

/// An achievement that transitioned to unlocked during one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockResult {
    pub code: String,
    pub category: String,
    pub metric: MetricKind,
    pub value: i64,
    pub target: i64,
    pub token_reward: i64,
    pub message: String,
    pub unlocked_at: DateTime<Utc>,
}

/// Evaluate the active catalog for one user inside an open transaction.
///
/// `metrics` restricts evaluation to definitions on those kinds; pass
/// `None` to evaluate everything. Already-unlocked rows are frozen and
/// skipped. Unlock rewards are credited through the ledger with the
/// definition id as reference, so replaying an evaluation never pays
/// twice.
pub async fn evaluate(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    metrics: Option<&[MetricKind]>,
    source_type: &str,
    source_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<UnlockResult>, AppError> {
    let definitions = repos::get_active_definitions(&mut **tx).await?;

    let mut resolved: HashMap<MetricKind, i64> = HashMap::new();
    let mut unlocked = Vec::new();

    for def in definitions {
        let Some(kind) = MetricKind::parse(&def.metric_type) else {
            tracing::warn!(
                code = %def.code,
                metric_type = %def.metric_type,
                "skipping achievement with unknown metric type"
            );
            continue;
        };
        if let Some(wanted) = metrics {
            if !wanted.contains(&kind) {
                continue;
            }
        }

        let existing = repos::get_user_achievement(&mut **tx, user_id, def.id).await?;
        if existing.as_ref().is_some_and(|ua| ua.unlocked) {
            continue;
        }

        let value = match resolved.get(&kind) {
            Some(value) => *value,
            None => {
                let value = kind.resolve(&mut **tx, user_id).await?;
                resolved.insert(kind, value);
                value
            }
        };
        let target = def.target_value.max(1);
        let progress = ((value as f64) / (target as f64)).min(1.0);

        let row_id = match existing {
            Some(ua) => {
                repos::update_user_achievement(
                    &mut **tx,
                    ua.id,
                    value,
                    target,
                    progress,
                    Some(source_type),
                    source_id,
                )
                .await?;
                ua.id
            }
            None => {
                repos::insert_user_achievement(
                    &mut **tx,
                    user_id,
                    def.id,
                    value,
                    target,
                    progress,
                    Some(source_type),
                    source_id,
                )
                .await?
            }
        };

        if progress >= 1.0 && repos::unlock_user_achievement(&mut **tx, row_id, now).await? {
            let meta = DefinitionMeta::parse(&def.metadata);
            if meta.token_reward > 0 {
                ledger::credit(
                    tx,
                    user_id,
                    meta.token_reward,
                    "achievement_unlock",
                    "achievement",
                    Some(&def.id.to_string()),
                    &json!({ "code": def.code.as_str() }),
                    now,
                )
                .await?;
            }

            tracing::info!(
                user_id,
                code = %def.code,
                token_reward = meta.token_reward,
                "achievement unlocked"
            );

            unlocked.push(UnlockResult {
                message: meta.render_message(&def.code, value, target),
                code: def.code,
                category: def.category,
                metric: kind,
                value,
                target,
                token_reward: meta.token_reward,
                unlocked_at: now,
            });
        }
    }

    Ok(unlocked)
}

/// Evaluate in a standalone transaction (batch jobs, backfills).
pub async fn evaluate_user(
    pool: &SqlitePool,
    user_id: i64,
    metrics: Option<&[MetricKind]>,
    now: DateTime<Utc>,
) -> Result<Vec<UnlockResult>, AppError> {
    let mut tx = pool.begin().await?;
    let unlocked = evaluate(&mut tx, user_id, metrics, "evaluation", None, now).await?;
    tx.commit().await?;
    Ok(unlocked)
}

// ─── Listings ───────────────────────────────────────────────────────────────

/// Narrowing options for [`get_user_achievements`].
#[derive(Debug, Clone, Default)]
pub struct AchievementFilter {
    pub category: Option<String>,
    pub unlocked_only: bool,
}

/// Catalog-plus-progress listing for one user. Untouched definitions
/// appear with zero progress.
pub async fn get_user_achievements(
    pool: &SqlitePool,
    user_id: i64,
    filter: &AchievementFilter,
) -> Result<Vec<AchievementStatus>, AppError> {
    let rows = repos::get_achievement_status(pool, user_id).await?;

    Ok(rows
        .into_iter()
        .filter(|row| match &filter.category {
            Some(category) => &row.category == category,
            None => true,
        })
        .filter(|row| !filter.unlocked_only || row.unlocked)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_round_trips_through_strings() {
        for kind in MetricKind::ALL {
            assert_eq!(MetricKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_metric_kind_rejects_unknown_strings() {
        assert_eq!(MetricKind::parse("bench_press_total"), None);
        assert_eq!(MetricKind::parse(""), None);
        assert_eq!(MetricKind::parse("CURRENT_STREAK"), None);
    }

    #[test]
    fn test_definition_meta_full() {
        let meta = DefinitionMeta::parse(r#"{"token_reward": 50, "message": "Hit {value}/{target}!"}"#);
        assert_eq!(meta.token_reward, 50);
        assert_eq!(meta.render_message("STREAK_7", 7, 7), "Hit 7/7!");
    }

    #[test]
    fn test_definition_meta_defaults_missing_fields() {
        let meta = DefinitionMeta::parse(r#"{"message": "Done"}"#);
        assert_eq!(meta.token_reward, 0);

        let meta = DefinitionMeta::parse(r#"{"token_reward": 25}"#);
        assert_eq!(meta.token_reward, 25);
        assert_eq!(meta.render_message("VISITS_10", 10, 10), "Achievement VISITS_10 unlocked");
    }

    #[test]
    fn test_definition_meta_tolerates_malformed_json() {
        let meta = DefinitionMeta::parse("not json at all");
        assert_eq!(meta.token_reward, 0);
        assert!(meta.message.is_none());

        let meta = DefinitionMeta::parse("{}");
        assert_eq!(meta.token_reward, 0);
    }
}
