/// ============================================================
///  Solar position
///
///  Grena (2012) algorithm no. 3: apparent solar longitude from a
///  short periodic series, then right ascension / declination,
///  local hour angle and topocentric elevation (parallax only).
///  Maximum error 0.01° for 2010–2110, degrading slowly outside.
///
///  Pure function of (location, instant): nothing is cached, the
///  caller recomputes once per estimation cycle.
/// ============================================================

use chrono::{DateTime, Utc};
use std::f64::consts::PI;

use crate::models::power::{Location, SolarPosition};

// ─── Constants ───────────────────────────────────────────────
const DEG: f64 = PI / 180.0;
/// TT − UT1 in seconds; ~69 s through the 2020s.
const DELTA_T_S: f64 = 69.0;

/// Zenith and azimuth of the sun seen from `location` at `instant`.
pub fn position(location: &Location, instant: DateTime<Utc>) -> SolarPosition {
    // ── 1. Time since the algorithm epoch (2060-01-01 00:00 UT) ─
    let t = days_since_epoch(instant);
    let t_e = t + 1.1574e-5 * DELTA_T_S;
    let omega = 0.0172019715 * t_e;

    // ── 2. Apparent longitude & obliquity ──────────────────────
    let lambda = -1.388803
        + 1.720279216e-2 * t_e
        + 3.3366e-2 * (omega - 0.06172).sin()
        + 3.53e-4 * (2.0 * omega - 0.1163).sin();
    let epsilon = 4.089567e-1 - 6.19e-9 * t_e;

    // ── 3. Right ascension & declination ───────────────────────
    let (s_lambda, c_lambda) = lambda.sin_cos();
    let (s_eps, c_eps) = epsilon.sin_cos();
    let ra = (s_lambda * c_eps).atan2(c_lambda).rem_euclid(2.0 * PI);
    let decl = (s_lambda * s_eps).asin();

    // ── 4. Hour angle, wrapped to [-π, π) ──────────────────────
    let h = (1.7528311 + 6.300388099 * t + location.longitude() * DEG - ra + PI)
        .rem_euclid(2.0 * PI)
        - PI;

    // ── 5. Topocentric elevation & azimuth ─────────────────────
    let (s_phi, c_phi) = (location.latitude() * DEG).sin_cos();
    let (s_decl, c_decl) = decl.sin_cos();
    let (s_h, c_h) = h.sin_cos();

    let s_e0 = (s_phi * s_decl + c_phi * c_decl * c_h).clamp(-1.0, 1.0);
    let e0 = s_e0.asin();
    // Parallax correction
    let e_p = e0 - 4.26e-5 * (1.0 - s_e0 * s_e0).sqrt();
    // Measured from south, westward positive
    let gamma = s_h.atan2(c_h * s_phi - s_decl * c_phi / c_decl);

    SolarPosition {
        zenith: (PI / 2.0 - e_p) / DEG,
        azimuth: ((gamma + PI) / DEG).rem_euclid(360.0),
    }
}

/// 2060-01-01T00:00:00Z as Unix milliseconds.
const EPOCH_UNIX_MS: i64 = 2_840_140_800_000;

fn days_since_epoch(instant: DateTime<Utc>) -> f64 {
    (instant.timestamp_millis() - EPOCH_UNIX_MS) as f64 / 86_400_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn turin() -> Location {
        Location::new(45.07, 7.33, "Europe/Rome").unwrap()
    }

    #[test]
    fn test_summer_noon_turin() {
        // Solar noon at 7.33°E on the solstice is ≈ 11:32 UTC
        let t = Utc.with_ymd_and_hms(2025, 6, 21, 11, 32, 0).unwrap();
        let p = position(&turin(), t);
        // 45.07° − 23.44° declination
        assert!((p.zenith - 21.63).abs() < 0.3, "zenith {:.2}", p.zenith);
        assert!(p.azimuth > 170.0 && p.azimuth < 190.0, "azimuth {:.1}", p.azimuth);
    }

    #[test]
    fn test_winter_noon_turin() {
        let t = Utc.with_ymd_and_hms(2025, 12, 21, 11, 30, 0).unwrap();
        let p = position(&turin(), t);
        // 45.07° + 23.44°
        assert!((p.zenith - 68.5).abs() < 0.5, "zenith {:.2}", p.zenith);
    }

    #[test]
    fn test_equinox_equator_sun_nearly_overhead() {
        let t = Utc.with_ymd_and_hms(2025, 3, 20, 12, 7, 0).unwrap();
        let p = position(&Location::new(0.0, 0.0, "UTC").unwrap(), t);
        assert!(p.zenith < 1.0, "zenith {:.2}", p.zenith);
    }

    #[test]
    fn test_morning_east_afternoon_west() {
        let loc = turin();
        let morning = position(&loc, Utc.with_ymd_and_hms(2025, 6, 21, 6, 0, 0).unwrap());
        let afternoon = position(&loc, Utc.with_ymd_and_hms(2025, 6, 21, 16, 0, 0).unwrap());
        assert!(morning.azimuth > 45.0 && morning.azimuth < 135.0, "{:.1}", morning.azimuth);
        assert!(afternoon.azimuth > 225.0 && afternoon.azimuth < 315.0, "{:.1}", afternoon.azimuth);
        assert!(morning.zenith < 90.0 && afternoon.zenith < 90.0);
    }

    #[test]
    fn test_midnight_below_horizon() {
        let p = position(&turin(), Utc.with_ymd_and_hms(2025, 6, 21, 23, 30, 0).unwrap());
        assert!(p.zenith > 90.0, "zenith {:.1}", p.zenith);
        assert!(p.elevation() < 0.0);
    }

    #[test]
    fn test_southern_hemisphere_noon_faces_north() {
        let sydney = Location::new(-33.87, 151.21, "Australia/Sydney").unwrap();
        // Solar noon ≈ 01:57 UTC in June
        let p = position(&sydney, Utc.with_ymd_and_hms(2025, 6, 21, 1, 57, 0).unwrap());
        assert!(p.azimuth < 10.0 || p.azimuth > 350.0, "azimuth {:.1}", p.azimuth);
        assert!((p.zenith - 57.3).abs() < 0.5, "zenith {:.2}", p.zenith);
    }

    #[test]
    fn test_epoch_offset() {
        let epoch = Utc.with_ymd_and_hms(2060, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(days_since_epoch(epoch), 0.0);
        let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((days_since_epoch(j2000) + 21914.5).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let t = Utc.with_ymd_and_hms(2030, 9, 1, 9, 15, 42).unwrap();
        assert_eq!(position(&turin(), t), position(&turin(), t));
    }
}
