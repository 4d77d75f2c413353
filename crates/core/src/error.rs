use chrono::NaiveDate;
use thiserror::Error;

/// Shared error type used across all Gympulse crates.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid coordinates: lat {lat}, lon {lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("GPS accuracy {accuracy_m:.0}m exceeds the {limit_m:.0}m limit")]
    GpsInaccurate { accuracy_m: f64, limit_m: f64 },

    #[error("automatic check-in rejected: accuracy {accuracy_m:.0}m exceeds the {limit_m:.0}m limit")]
    AutoCheckinFailed { accuracy_m: f64, limit_m: f64 },

    #[error("gym {gym_id} not found")]
    GymNotFound { gym_id: i64 },

    #[error("user {user_id} not found")]
    UserNotFound { user_id: i64 },

    #[error("gym {gym_id} has no geofence configured")]
    GeofenceNotConfigured { gym_id: i64 },

    #[error("automatic check-in is disabled for gym {gym_id}")]
    AutoCheckinDisabled { gym_id: i64 },

    #[error("{distance_m:.0}m from gym, outside the {radius_m:.0}m geofence")]
    OutOfGeofenceRange { distance_m: f64, radius_m: f64 },

    #[error("user {user_id} already has an open visit for {date}")]
    AlreadyCheckedIn { user_id: i64, date: NaiveDate },

    #[error("no open check-in to close")]
    CheckinRequired,

    #[error("visit {assistance_id} is already checked out")]
    AlreadyCheckedOut { assistance_id: i64 },

    #[error("visit does not belong to the requesting user")]
    Forbidden,

    #[error("insufficient token balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("ledger amount must be positive, got {amount}")]
    InvalidAmount { amount: i64 },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

impl AppError {
    /// Stable machine-readable code for callers that map errors onto
    /// client-facing payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCoordinates { .. } => "INVALID_COORDINATES",
            Self::GpsInaccurate { .. } => "GPS_INACCURATE",
            Self::AutoCheckinFailed { .. } => "AUTO_CHECKIN_FAILED",
            Self::GymNotFound { .. } => "GYM_NOT_FOUND",
            Self::UserNotFound { .. } => "USER_NOT_FOUND",
            Self::GeofenceNotConfigured { .. } => "GEOFENCE_NOT_CONFIGURED",
            Self::AutoCheckinDisabled { .. } => "AUTO_CHECKIN_DISABLED",
            Self::OutOfGeofenceRange { .. } => "OUT_OF_GEOFENCE_RANGE",
            Self::AlreadyCheckedIn { .. } => "ALREADY_CHECKED_IN",
            Self::CheckinRequired => "CHECKIN_REQUIRED",
            Self::AlreadyCheckedOut { .. } => "ALREADY_CHECKED_OUT",
            Self::Forbidden => "FORBIDDEN",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}
