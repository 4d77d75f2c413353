pub mod achievements;
pub mod calendar;
pub mod checkin;
pub mod frequency;
pub mod geofence;
pub mod ledger;
pub mod streak;

pub use achievements::{AchievementFilter, MetricKind, UnlockResult};
pub use checkin::{CheckInOutcome, CheckInRequest};
pub use frequency::FrequencySnapshot;
pub use geofence::GeofenceAssessment;
pub use ledger::CreditOutcome;
pub use streak::{StreakSnapshot, StreakTransition};
