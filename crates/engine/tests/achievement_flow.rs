//! Integration tests for achievement evaluation, unlocks and rewards.

use chrono::{DateTime, TimeZone, Utc};
use gympulse_core::EnginePolicy;
use gympulse_engine::achievements::{self, AchievementFilter, MetricKind};
use gympulse_engine::checkin::{self, CheckInRequest};
use gympulse_engine::ledger;
use gympulse_storage::models::{Gym, GymGeofence, NewAchievementDefinition, UserProfile};
use gympulse_storage::{repos, SqlitePool};

const GYM_LAT: f64 = 40.4168;
const GYM_LON: f64 = -3.7038;

async fn setup() -> SqlitePool {
    gympulse_core::telemetry::try_init();
    let pool = gympulse_storage::connect_memory().await.unwrap();
    gympulse_storage::migrate(&pool).await.unwrap();

    repos::insert_gym(
        &pool,
        &Gym {
            id: 1,
            name: "Downtown".into(),
            lat: GYM_LAT,
            lon: GYM_LON,
        },
    )
    .await
    .unwrap();
    repos::upsert_geofence(
        &pool,
        &GymGeofence {
            gym_id: 1,
            radius_m: 150.0,
            enabled: true,
            min_stay_minutes: 0,
        },
    )
    .await
    .unwrap();

    repos::insert_user_profile(
        &pool,
        &UserProfile {
            id: 1,
            display_name: "member-1".into(),
            weekly_goal: 3,
            token_balance: 0,
            current_streak_id: None,
            created_at: at(1, 9),
        },
    )
    .await
    .unwrap();
    pool
}

/// March 2026; the 2nd is a Monday.
fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

fn request() -> CheckInRequest {
    CheckInRequest {
        user_id: 1,
        gym_id: 1,
        lat: GYM_LAT,
        lon: GYM_LON,
        accuracy_m: 10.0,
        auto: false,
    }
}

async fn seed_def(pool: &SqlitePool, code: &str, category: &str, metric: &str, target: i64, metadata: &str) {
    repos::insert_achievement_definition(
        pool,
        &NewAchievementDefinition {
            code: code.into(),
            category: category.into(),
            metric_type: metric.into(),
            target_value: target,
            is_active: true,
            metadata: metadata.into(),
        },
    )
    .await
    .unwrap();
}

async fn def_id(pool: &SqlitePool, code: &str) -> i64 {
    repos::get_achievement_definition(pool, code)
        .await
        .unwrap()
        .unwrap()
        .id
}

async fn visit_on(pool: &SqlitePool, policy: &EnginePolicy, day: u32) {
    let outcome = checkin::check_in(pool, policy, &request(), at(day, 18))
        .await
        .unwrap();
    checkin::check_out(pool, 1, outcome.assistance.id, at(day, 19))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unlock_credits_reward_tokens() {
    let pool = setup().await;
    let policy = EnginePolicy::default();
    seed_def(
        &pool,
        "FIRST_VISIT",
        "milestone",
        "total_visits",
        1,
        r#"{"token_reward": 25, "message": "Visit {value} of {target} logged!"}"#,
    )
    .await;

    let outcome = checkin::check_in(&pool, &policy, &request(), at(2, 18))
        .await
        .unwrap();

    assert_eq!(outcome.unlocked.len(), 1);
    let unlock = &outcome.unlocked[0];
    assert_eq!(unlock.code, "FIRST_VISIT");
    assert_eq!(unlock.metric, MetricKind::TotalVisits);
    assert_eq!(unlock.value, 1);
    assert_eq!(unlock.target, 1);
    assert_eq!(unlock.token_reward, 25);
    assert_eq!(unlock.message, "Visit 1 of 1 logged!");
    assert_eq!(unlock.unlocked_at, at(2, 18));

    // Check-in reward plus achievement reward
    assert_eq!(ledger::balance_of(&pool, 1).await.unwrap(), 35);

    let id = def_id(&pool, "FIRST_VISIT").await;
    let reward = repos::find_ledger_entry_by_ref(&pool, 1, "achievement", &id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reward.amount, 25);
    assert_eq!(reward.reason, "achievement_unlock");
}

#[tokio::test]
async fn test_partial_progress_is_recorded() {
    let pool = setup().await;
    let policy = EnginePolicy::default();
    seed_def(&pool, "VISITS_3", "milestone", "total_visits", 3, "{}").await;

    let outcome = checkin::check_in(&pool, &policy, &request(), at(2, 18))
        .await
        .unwrap();
    assert!(outcome.unlocked.is_empty());

    let id = def_id(&pool, "VISITS_3").await;
    let row = repos::get_user_achievement(&pool, 1, id).await.unwrap().unwrap();
    assert_eq!(row.current_value, 1);
    assert_eq!(row.target_value, 3);
    assert!((row.progress - 1.0 / 3.0).abs() < 1e-9);
    assert!(!row.unlocked);
    assert_eq!(row.last_source_type.as_deref(), Some("assistance"));
    assert_eq!(row.last_source_id.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_unlock_is_frozen_and_reward_paid_once() {
    let pool = setup().await;
    let policy = EnginePolicy::default();
    seed_def(
        &pool,
        "FIRST_VISIT",
        "milestone",
        "total_visits",
        1,
        r#"{"token_reward": 25}"#,
    )
    .await;

    let outcome = checkin::check_in(&pool, &policy, &request(), at(2, 18))
        .await
        .unwrap();
    assert_eq!(outcome.unlocked.len(), 1);
    checkin::check_out(&pool, 1, outcome.assistance.id, at(2, 19)).await.unwrap();

    // Re-evaluating later never re-awards
    let again = achievements::evaluate_user(&pool, 1, None, at(2, 20)).await.unwrap();
    assert!(again.is_empty());

    // A second qualifying visit leaves the frozen row alone
    let outcome = checkin::check_in(&pool, &policy, &request(), at(2, 21))
        .await
        .unwrap();
    assert!(outcome.unlocked.is_empty());

    let id = def_id(&pool, "FIRST_VISIT").await;
    let row = repos::get_user_achievement(&pool, 1, id).await.unwrap().unwrap();
    assert!(row.unlocked);
    assert_eq!(row.unlocked_at, Some(at(2, 18)));
    assert_eq!(row.current_value, 1);

    // Two check-in rewards, one achievement reward
    assert_eq!(ledger::balance_of(&pool, 1).await.unwrap(), 45);
}

#[tokio::test]
async fn test_unlock_without_reward_credits_nothing() {
    let pool = setup().await;
    let policy = EnginePolicy::default();
    seed_def(&pool, "FIRST_VISIT", "milestone", "total_visits", 1, "{}").await;

    let outcome = checkin::check_in(&pool, &policy, &request(), at(2, 18))
        .await
        .unwrap();

    assert_eq!(outcome.unlocked.len(), 1);
    assert_eq!(outcome.unlocked[0].token_reward, 0);
    assert_eq!(outcome.unlocked[0].message, "Achievement FIRST_VISIT unlocked");

    let id = def_id(&pool, "FIRST_VISIT").await;
    let reward = repos::find_ledger_entry_by_ref(&pool, 1, "achievement", &id.to_string())
        .await
        .unwrap();
    assert!(reward.is_none());
    assert_eq!(ledger::balance_of(&pool, 1).await.unwrap(), 10);
}

#[tokio::test]
async fn test_unknown_metric_type_is_skipped() {
    let pool = setup().await;
    let policy = EnginePolicy::default();
    seed_def(&pool, "BODY_FAT_10", "health", "body_fat_percent", 10, "{}").await;
    seed_def(&pool, "FIRST_VISIT", "milestone", "total_visits", 1, "{}").await;

    let outcome = checkin::check_in(&pool, &policy, &request(), at(2, 18))
        .await
        .unwrap();

    assert_eq!(outcome.unlocked.len(), 1);
    assert_eq!(outcome.unlocked[0].code, "FIRST_VISIT");

    // The unknown definition gets no progress row at all
    let id = def_id(&pool, "BODY_FAT_10").await;
    assert!(repos::get_user_achievement(&pool, 1, id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_streak_metric_unlocks_on_second_day() {
    let pool = setup().await;
    let policy = EnginePolicy::default();
    seed_def(&pool, "STREAK_2", "consistency", "current_streak", 2, "{}").await;

    visit_on(&pool, &policy, 2).await;
    let id = def_id(&pool, "STREAK_2").await;
    let row = repos::get_user_achievement(&pool, 1, id).await.unwrap().unwrap();
    assert!((row.progress - 0.5).abs() < 1e-9);
    assert!(!row.unlocked);

    let outcome = checkin::check_in(&pool, &policy, &request(), at(3, 18))
        .await
        .unwrap();
    assert_eq!(outcome.unlocked.len(), 1);
    assert_eq!(outcome.unlocked[0].code, "STREAK_2");
    assert_eq!(outcome.unlocked[0].value, 2);
}

#[tokio::test]
async fn test_metric_filter_limits_evaluation() {
    let pool = setup().await;
    let policy = EnginePolicy::default();

    visit_on(&pool, &policy, 2).await;
    seed_def(&pool, "VISITS_1", "milestone", "total_visits", 1, "{}").await;
    seed_def(&pool, "DAYS_1", "milestone", "assistance_days", 1, "{}").await;

    let unlocked =
        achievements::evaluate_user(&pool, 1, Some(&[MetricKind::TotalVisits]), at(2, 20))
            .await
            .unwrap();
    assert_eq!(unlocked.len(), 1);
    assert_eq!(unlocked[0].code, "VISITS_1");

    // The filtered-out definition was not even touched
    let days_id = def_id(&pool, "DAYS_1").await;
    assert!(repos::get_user_achievement(&pool, 1, days_id).await.unwrap().is_none());

    // A full pass picks it up, attributed to the evaluation itself
    let unlocked = achievements::evaluate_user(&pool, 1, None, at(2, 21)).await.unwrap();
    assert_eq!(unlocked.len(), 1);
    assert_eq!(unlocked[0].code, "DAYS_1");

    let row = repos::get_user_achievement(&pool, 1, days_id).await.unwrap().unwrap();
    assert_eq!(row.last_source_type.as_deref(), Some("evaluation"));
    assert_eq!(row.last_source_id, None);
}

#[tokio::test]
async fn test_listing_covers_untouched_definitions() {
    let pool = setup().await;
    let policy = EnginePolicy::default();
    seed_def(&pool, "FIRST_VISIT", "milestone", "total_visits", 1, "{}").await;
    seed_def(&pool, "VISITS_10", "milestone", "total_visits", 10, "{}").await;

    visit_on(&pool, &policy, 2).await;

    // Added after the visit, so it has no progress row yet
    seed_def(&pool, "STREAK_7", "consistency", "current_streak", 7, "{}").await;

    let all = achievements::get_user_achievements(&pool, 1, &AchievementFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let first = all.iter().find(|s| s.code == "FIRST_VISIT").unwrap();
    assert!(first.unlocked);
    assert!(first.unlocked_at.is_some());
    assert!((first.progress - 1.0).abs() < 1e-9);

    let ten = all.iter().find(|s| s.code == "VISITS_10").unwrap();
    assert!(!ten.unlocked);
    assert_eq!(ten.current_value, 1);

    let fresh = all.iter().find(|s| s.code == "STREAK_7").unwrap();
    assert!(!fresh.unlocked);
    assert_eq!(fresh.current_value, 0);
    assert_eq!(fresh.progress, 0.0);

    let milestones = achievements::get_user_achievements(
        &pool,
        1,
        &AchievementFilter {
            category: Some("milestone".into()),
            unlocked_only: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(milestones.len(), 2);

    let unlocked_only = achievements::get_user_achievements(
        &pool,
        1,
        &AchievementFilter {
            category: None,
            unlocked_only: true,
        },
    )
    .await
    .unwrap();
    assert_eq!(unlocked_only.len(), 1);
    assert_eq!(unlocked_only[0].code, "FIRST_VISIT");
}

#[tokio::test]
async fn test_weeks_goal_metric_counts_achieved_weeks() {
    let pool = setup().await;
    let policy = EnginePolicy::default();
    seed_def(&pool, "WEEK_GOAL_1", "consistency", "weeks_goal_met", 1, "{}").await;

    // Weekly goal is 3; Monday and Tuesday are not enough
    visit_on(&pool, &policy, 2).await;
    visit_on(&pool, &policy, 3).await;
    let id = def_id(&pool, "WEEK_GOAL_1").await;
    let row = repos::get_user_achievement(&pool, 1, id).await.unwrap().unwrap();
    assert!(!row.unlocked);
    assert_eq!(row.current_value, 0);

    // The goal-meeting check-in sees its own week completion
    let outcome = checkin::check_in(&pool, &policy, &request(), at(4, 18))
        .await
        .unwrap();
    assert!(outcome.frequency.goal_just_met);
    assert_eq!(outcome.unlocked.len(), 1);
    assert_eq!(outcome.unlocked[0].code, "WEEK_GOAL_1");
}

#[tokio::test]
async fn test_lifetime_tokens_includes_same_pass_credits() {
    let pool = setup().await;
    let policy = EnginePolicy::default();
    seed_def(&pool, "TOKENS_25", "economy", "lifetime_tokens", 25, "{}").await;

    visit_on(&pool, &policy, 2).await;
    visit_on(&pool, &policy, 3).await;
    let id = def_id(&pool, "TOKENS_25").await;
    let row = repos::get_user_achievement(&pool, 1, id).await.unwrap().unwrap();
    assert_eq!(row.current_value, 20);
    assert!(!row.unlocked);

    // The third check-in credit lands before evaluation, so the metric
    // sees 30 lifetime tokens
    let outcome = checkin::check_in(&pool, &policy, &request(), at(4, 18))
        .await
        .unwrap();
    assert_eq!(outcome.unlocked.len(), 1);
    assert_eq!(outcome.unlocked[0].code, "TOKENS_25");
    assert_eq!(outcome.unlocked[0].value, 30);
}
