use serde::Deserialize;

/// Global application settings loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// SQLite connection URL.
    pub database_url: String,

    /// Accuracy ceiling (meters) accepted for manual check-ins.
    pub manual_accuracy_limit_m: f64,

    /// Accuracy ceiling (meters) accepted for automatic check-ins.
    pub auto_accuracy_limit_m: f64,

    /// Fraction of the geofence radius inside which an automatic
    /// check-in counts as verified.
    pub verified_distance_factor: f64,

    /// Tokens credited for each successful check-in.
    pub base_checkin_reward: i64,

    /// Token price of one streak recovery item.
    pub recovery_item_cost: i64,

    /// Weekly attendance goal applied when a profile has none configured.
    pub default_weekly_goal: i64,

    /// Minutes after which an open visit is considered abandoned.
    pub stale_after_minutes: i64,

    /// Imputed visit length (minutes) when sweeping abandoned visits.
    pub default_visit_minutes: i64,
}

impl Settings {
    /// Load settings from environment variables (with optional `.env` file).
    pub fn from_env() -> eyre::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://gympulse.db".into()),
            manual_accuracy_limit_m: std::env::var("MANUAL_ACCURACY_LIMIT_M")
                .unwrap_or_else(|_| "50".into())
                .parse()?,
            auto_accuracy_limit_m: std::env::var("AUTO_ACCURACY_LIMIT_M")
                .unwrap_or_else(|_| "25".into())
                .parse()?,
            verified_distance_factor: std::env::var("VERIFIED_DISTANCE_FACTOR")
                .unwrap_or_else(|_| "0.5".into())
                .parse()?,
            base_checkin_reward: std::env::var("BASE_CHECKIN_REWARD")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            recovery_item_cost: std::env::var("RECOVERY_ITEM_COST")
                .unwrap_or_else(|_| "100".into())
                .parse()?,
            default_weekly_goal: std::env::var("DEFAULT_WEEKLY_GOAL")
                .unwrap_or_else(|_| "3".into())
                .parse()?,
            stale_after_minutes: std::env::var("STALE_AFTER_MINUTES")
                .unwrap_or_else(|_| "720".into())
                .parse()?,
            default_visit_minutes: std::env::var("DEFAULT_VISIT_MINUTES")
                .unwrap_or_else(|_| "60".into())
                .parse()?,
        })
    }

    /// Extract the threshold bundle consumed by the engines.
    pub fn policy(&self) -> EnginePolicy {
        EnginePolicy {
            manual_accuracy_limit_m: self.manual_accuracy_limit_m,
            auto_accuracy_limit_m: self.auto_accuracy_limit_m,
            verified_distance_factor: self.verified_distance_factor,
            base_checkin_reward: self.base_checkin_reward,
            recovery_item_cost: self.recovery_item_cost,
            default_weekly_goal: self.default_weekly_goal,
            stale_after_minutes: self.stale_after_minutes,
            default_visit_minutes: self.default_visit_minutes,
        }
    }
}

/// Thresholds and reward amounts applied by the engines.
#[derive(Debug, Clone, Deserialize)]
pub struct EnginePolicy {
    pub manual_accuracy_limit_m: f64,
    pub auto_accuracy_limit_m: f64,
    pub verified_distance_factor: f64,
    pub base_checkin_reward: i64,
    pub recovery_item_cost: i64,
    pub default_weekly_goal: i64,
    pub stale_after_minutes: i64,
    pub default_visit_minutes: i64,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            manual_accuracy_limit_m: 50.0,
            auto_accuracy_limit_m: 25.0,
            verified_distance_factor: 0.5,
            base_checkin_reward: 10,
            recovery_item_cost: 100,
            default_weekly_goal: 3,
            stale_after_minutes: 720,
            default_visit_minutes: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_mirrors_settings_thresholds() {
        let settings = Settings {
            database_url: "sqlite::memory:".into(),
            manual_accuracy_limit_m: 80.0,
            auto_accuracy_limit_m: 40.0,
            verified_distance_factor: 0.25,
            base_checkin_reward: 5,
            recovery_item_cost: 250,
            default_weekly_goal: 4,
            stale_after_minutes: 480,
            default_visit_minutes: 45,
        };

        let policy = settings.policy();
        assert_eq!(policy.manual_accuracy_limit_m, 80.0);
        assert_eq!(policy.auto_accuracy_limit_m, 40.0);
        assert_eq!(policy.verified_distance_factor, 0.25);
        assert_eq!(policy.base_checkin_reward, 5);
        assert_eq!(policy.recovery_item_cost, 250);
        assert_eq!(policy.default_weekly_goal, 4);
        assert_eq!(policy.stale_after_minutes, 480);
        assert_eq!(policy.default_visit_minutes, 45);
    }
}
