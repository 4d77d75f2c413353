//! Geofenced check-in and check-out.
//!
//! A check-in is one atomic event: the visit row, the streak advance,
//! the weekly tally, the base reward and the achievement evaluation
//! either all commit or none do.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;

use gympulse_core::{AppError, EnginePolicy};
use gympulse_storage::models::{Assistance, LedgerEntry, NewAssistance};
use gympulse_storage::repos;

use crate::achievements::{self, UnlockResult};
use crate::frequency::{self, FrequencySnapshot};
use crate::geofence;
use crate::ledger;
use crate::streak::{self, StreakSnapshot};

/// An incoming check-in attempt with the reported position.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckInRequest {
    pub user_id: i64,
    pub gym_id: i64,
    pub lat: f64,
    pub lon: f64,
    pub accuracy_m: f64,
    /// True for background check-ins fired by geofence entry, false
    /// for user-initiated ones.
    pub auto: bool,
}

/// Everything one check-in produced.
#[derive(Debug, Clone, Serialize)]
pub struct CheckInOutcome {
    pub assistance: Assistance,
    pub streak: StreakSnapshot,
    pub frequency: FrequencySnapshot,
    /// Base reward entry; absent when the configured reward is zero.
    pub reward: Option<LedgerEntry>,
    pub unlocked: Vec<UnlockResult>,
}

/// Validate and persist a check-in.
///
/// Precondition order: coordinates and accuracy, fence configuration,
/// distance, then the open-visit guard. Downstream effects run inside
/// the same transaction; any failure rolls the whole event back.
pub async fn check_in(
    pool: &SqlitePool,
    policy: &EnginePolicy,
    request: &CheckInRequest,
    now: DateTime<Utc>,
) -> Result<CheckInOutcome, AppError> {
    let mut tx = pool.begin().await?;

    let gym = repos::get_gym(&mut *tx, request.gym_id)
        .await?
        .ok_or(AppError::GymNotFound {
            gym_id: request.gym_id,
        })?;
    let fence = repos::get_geofence(&mut *tx, request.gym_id).await?;
    let assessment = geofence::assess(
        policy,
        &gym,
        fence.as_ref(),
        request.lat,
        request.lon,
        request.accuracy_m,
        request.auto,
    )?;

    repos::get_user_profile(&mut *tx, request.user_id)
        .await?
        .ok_or(AppError::UserNotFound {
            user_id: request.user_id,
        })?;

    let date = now.date_naive();
    if repos::find_open_assistance(&mut *tx, request.user_id, date)
        .await?
        .is_some()
    {
        return Err(AppError::AlreadyCheckedIn {
            user_id: request.user_id,
            date,
        });
    }

    let assistance_id = repos::insert_assistance(
        &mut *tx,
        &NewAssistance {
            user_id: request.user_id,
            gym_id: request.gym_id,
            date,
            check_in_at: now,
            auto_checkin: request.auto,
            distance_m: assessment.distance_m,
            verified: assessment.verified,
        },
    )
    .await?;

    let streak = streak::record_attendance(&mut tx, policy, request.user_id, date).await?;
    let frequency = frequency::record_attendance(&mut tx, policy, request.user_id, date).await?;

    let reward = if policy.base_checkin_reward > 0 {
        let outcome = ledger::credit(
            &mut tx,
            request.user_id,
            policy.base_checkin_reward,
            "gym_checkin",
            "assistance",
            Some(&assistance_id.to_string()),
            &json!({ "gym_id": request.gym_id }),
            now,
        )
        .await?;
        Some(outcome.into_entry())
    } else {
        None
    };

    // Every metric kind can move on a check-in (the base credit feeds
    // lifetime tokens), so evaluate the full catalog.
    let unlocked = achievements::evaluate(
        &mut tx,
        request.user_id,
        None,
        "assistance",
        Some(&assistance_id.to_string()),
        now,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = request.user_id,
        gym_id = request.gym_id,
        assistance_id,
        distance_m = assessment.distance_m,
        auto = request.auto,
        "check-in recorded"
    );

    Ok(CheckInOutcome {
        assistance: Assistance {
            id: assistance_id,
            user_id: request.user_id,
            gym_id: request.gym_id,
            date,
            check_in_at: now,
            check_out_at: None,
            duration_minutes: None,
            auto_checkin: request.auto,
            distance_m: assessment.distance_m,
            verified: assessment.verified,
        },
        streak,
        frequency,
        reward,
        unlocked,
    })
}

/// Close an open visit.
///
/// Only the visit's owner may close it, and only once; a second
/// attempt fails on the already-checked-out guard. Clock skew cannot
/// produce a check-out before the check-in: the timestamp is clamped
/// and the duration stays non-negative.
pub async fn check_out(
    pool: &SqlitePool,
    user_id: i64,
    assistance_id: i64,
    now: DateTime<Utc>,
) -> Result<Assistance, AppError> {
    let mut tx = pool.begin().await?;

    let visit = repos::get_assistance(&mut *tx, assistance_id)
        .await?
        .ok_or(AppError::CheckinRequired)?;
    if visit.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    if visit.check_out_at.is_some() {
        return Err(AppError::AlreadyCheckedOut { assistance_id });
    }

    let check_out_at = now.max(visit.check_in_at);
    let duration_minutes = (check_out_at - visit.check_in_at).num_minutes();
    repos::close_assistance(&mut *tx, assistance_id, check_out_at, duration_minutes).await?;

    tx.commit().await?;

    tracing::info!(user_id, assistance_id, duration_minutes, "check-out recorded");

    Ok(Assistance {
        check_out_at: Some(check_out_at),
        duration_minutes: Some(duration_minutes),
        ..visit
    })
}

/// Close visits whose owner never checked out.
///
/// A visit is stale once its check-in is older than the configured
/// threshold. The imputed duration is the larger of the default visit
/// length and the gym's minimum stay, and the check-out timestamp is
/// back-dated to check-in plus that duration. Returns how many visits
/// were closed.
pub async fn sweep_open_visits(
    pool: &SqlitePool,
    policy: &EnginePolicy,
    now: DateTime<Utc>,
) -> Result<u64, AppError> {
    let cutoff = now - Duration::minutes(policy.stale_after_minutes);

    let mut tx = pool.begin().await?;
    let stale = repos::get_open_assistances_before(&mut *tx, cutoff).await?;

    let mut min_stays: HashMap<i64, i64> = HashMap::new();
    let mut closed = 0u64;
    for visit in stale {
        let min_stay = match min_stays.get(&visit.gym_id) {
            Some(min_stay) => *min_stay,
            None => {
                let min_stay = repos::get_geofence(&mut *tx, visit.gym_id)
                    .await?
                    .map_or(0, |f| f.min_stay_minutes);
                min_stays.insert(visit.gym_id, min_stay);
                min_stay
            }
        };

        let duration_minutes = policy.default_visit_minutes.max(min_stay);
        let check_out_at = visit.check_in_at + Duration::minutes(duration_minutes);
        repos::close_assistance(&mut *tx, visit.id, check_out_at, duration_minutes).await?;
        closed += 1;
    }

    tx.commit().await?;

    if closed > 0 {
        tracing::info!(closed, "swept stale open visits");
    }
    Ok(closed)
}
