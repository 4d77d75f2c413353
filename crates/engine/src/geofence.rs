//! Geofence validation for check-in requests.
//!
//! The precondition chain is pure: it sees the gym, its geofence
//! configuration and the reported position, and either rejects the
//! request or yields the computed distance and verification flag.

use gympulse_core::{AppError, EnginePolicy};
use gympulse_storage::models::{Gym, GymGeofence};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Result of a passed geofence check.
#[derive(Debug, Clone, Copy)]
pub struct GeofenceAssessment {
    /// Great-circle distance from the reported position to the gym.
    pub distance_m: f64,
    /// Whether the visit counts as position-verified (automatic
    /// check-in well inside the fence).
    pub verified: bool,
}

/// Great-circle distance in meters between two WGS-84 coordinates,
/// using the haversine formula on a spherical earth.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Run the check-in preconditions in order: coordinate sanity, GPS
/// accuracy, fence configuration, distance.
///
/// Automatic check-ins face a stricter accuracy limit and report
/// rejections under their own error codes so the caller can tell a
/// failed background attempt from a failed manual one.
pub fn assess(
    policy: &EnginePolicy,
    gym: &Gym,
    fence: Option<&GymGeofence>,
    lat: f64,
    lon: f64,
    accuracy_m: f64,
    auto: bool,
) -> Result<GeofenceAssessment, AppError> {
    if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
        return Err(AppError::InvalidCoordinates { lat, lon });
    }

    let limit_m = if auto {
        policy.auto_accuracy_limit_m
    } else {
        policy.manual_accuracy_limit_m
    };
    // NaN accuracy fails the first comparison and is rejected too.
    if !(accuracy_m >= 0.0 && accuracy_m <= limit_m) {
        return Err(if auto {
            AppError::AutoCheckinFailed { accuracy_m, limit_m }
        } else {
            AppError::GpsInaccurate { accuracy_m, limit_m }
        });
    }

    let fence = match fence {
        Some(f) if f.enabled => f,
        _ => {
            return Err(if auto {
                AppError::AutoCheckinDisabled { gym_id: gym.id }
            } else {
                AppError::GeofenceNotConfigured { gym_id: gym.id }
            });
        }
    };

    let distance_m = haversine_m(lat, lon, gym.lat, gym.lon);
    if distance_m > fence.radius_m {
        return Err(AppError::OutOfGeofenceRange {
            distance_m,
            radius_m: fence.radius_m,
        });
    }

    let verified = auto && distance_m <= fence.radius_m * policy.verified_distance_factor;

    Ok(GeofenceAssessment {
        distance_m,
        verified,
    })
}
