use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ConfigError;

/// Reserved key holding the clipped sum of all arrays.
pub const TOTAL_KEY: &str = "total";

// ─── Location ────────────────────────────────────────────────────────────────

/// Validated observer location. The timezone only matters for resolving an
/// instant into a local calendar day; angle math runs on UTC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    latitude: f64,
    longitude: f64,
    timezone: Tz,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, timezone: &str) -> Result<Self, ConfigError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ConfigError::InvalidLocation(format!(
                "latitude {} outside -90..90",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ConfigError::InvalidLocation(format!(
                "longitude {} outside -180..180",
                longitude
            )));
        }
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(timezone.to_string()))?;
        Ok(Self { latitude, longitude, timezone })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Day of year (1-366) of `instant` on the location's local calendar.
    pub fn local_day_of_year(&self, instant: DateTime<Utc>) -> u32 {
        instant.with_timezone(&self.timezone).ordinal()
    }
}

// ─── Per-cycle intermediates ─────────────────────────────────────────────────

/// Sun position for one instant. Degrees; azimuth clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SolarPosition {
    pub zenith: f64,
    pub azimuth: f64,
}

impl SolarPosition {
    pub fn elevation(&self) -> f64 {
        90.0 - self.zenith
    }
}

/// Horizontal irradiance split into beam and diffuse parts (W/m²).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IrradianceComponents {
    pub ghi: f64,
    pub dni: f64,
    pub dhi: f64,
}

// ─── Cycle output ────────────────────────────────────────────────────────────

/// Array name → watts, plus the reserved `"total"` entry.
/// Always rebuilt from scratch; never merged with a previous cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PowerResult(BTreeMap<String, f64>);

impl PowerResult {
    pub fn new() -> Self {
        let mut map = BTreeMap::new();
        map.insert(TOTAL_KEY.to_string(), 0.0);
        Self(map)
    }

    pub fn insert_array(&mut self, name: &str, watts: f64) {
        self.0.insert(name.to_string(), watts.max(0.0));
    }

    pub fn set_total(&mut self, watts: f64) {
        self.0.insert(TOTAL_KEY.to_string(), watts.max(0.0));
    }

    pub fn total(&self) -> f64 {
        self.0.get(TOTAL_KEY).copied().unwrap_or(0.0)
    }

    /// Watts for an array name, or the total for `"total"`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Per-array entries, without the total.
    pub fn arrays(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0
            .iter()
            .filter(|(k, _)| k.as_str() != TOTAL_KEY)
            .map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for PowerResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Last-known-good output of the coordinator.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PowerSnapshot {
    pub computed_at: DateTime<Utc>,
    /// Irradiance reading the estimate was computed from (W/m²)
    pub ghi_w_m2: f64,
    /// Ambient temperature, if the temperature sensor was usable (°C)
    pub air_temperature_c: Option<f64>,
    pub solar_position: SolarPosition,
    #[schema(value_type = Object)]
    pub power: PowerResult,
}

/// Outcome of the latest refresh attempt, successful or not.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RefreshStatus {
    pub last_update_success: bool,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

// ─── REST API response types ──────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct PowerStatusResponse {
    pub status: RefreshStatus,
    pub snapshot: Option<PowerSnapshot>,
    /// Whether the MQTT publisher currently holds a broker session
    pub mqtt_connected: bool,
}

/// Metadata exposed next to each array's power value.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ArrayInfo {
    pub name: String,
    pub panel_wattage: f64,
    pub panel_count: u32,
    pub azimuth: f64,
    pub tilt: f64,
    pub temperature_coefficient: f64,
    /// panel_wattage × panel_count (W)
    pub array_capacity: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ArrayPowerResponse {
    pub name: String,
    pub power_w: f64,
    pub computed_at: DateTime<Utc>,
    /// Present for individual arrays, absent for the total
    pub array: Option<ArrayInfo>,
    /// Present for the total: sum of all array capacities (W)
    pub total_array_capacity: Option<f64>,
    /// Present for the total: number of configured arrays
    pub array_count: Option<usize>,
    /// Present for the total: sensor id the estimate is driven by
    pub solar_radiation_entity: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorStateBody {
    /// Raw state: a number, "unknown" or "unavailable"
    pub state: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ManualIrradianceBody {
    /// Global horizontal irradiance, 0..=1500 W/m²
    pub value: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModbusInfo {
    pub name: String,
    pub register_address: u16,
    pub length: u16,
    pub data_type: String,
    pub description: String,
}

// ─── Open-Meteo wire types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CurrentWeatherResponse {
    pub current: CurrentData,
}

#[derive(Debug, Deserialize)]
pub struct CurrentData {
    pub time: String,
    pub shortwave_radiation: Option<f64>,
    pub temperature_2m: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_location_rejects_out_of_range() {
        assert!(Location::new(91.0, 0.0, "UTC").is_err());
        assert!(Location::new(0.0, -180.5, "UTC").is_err());
        assert!(Location::new(f64::NAN, 0.0, "UTC").is_err());
        assert!(matches!(
            Location::new(45.0, 7.0, "Mars/Olympus_Mons"),
            Err(ConfigError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_local_day_of_year_uses_timezone() {
        // 23:30 UTC on Dec 31st is already Jan 1st in Rome
        let t = Utc.with_ymd_and_hms(2025, 12, 31, 23, 30, 0).unwrap();
        let rome = Location::new(41.9, 12.5, "Europe/Rome").unwrap();
        let utc = Location::new(41.9, 12.5, "UTC").unwrap();
        assert_eq!(rome.local_day_of_year(t), 1);
        assert_eq!(utc.local_day_of_year(t), 365);
    }

    #[test]
    fn test_power_result_total_and_arrays() {
        let mut r = PowerResult::new();
        r.insert_array("East", 1200.0);
        r.insert_array("West", -5.0);
        r.set_total(1200.0);
        assert_eq!(r.get("West"), Some(0.0));
        assert_eq!(r.total(), 1200.0);
        assert_eq!(r.arrays().count(), 2);

        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["total"], 1200.0);
        assert_eq!(json["East"], 1200.0);
    }
}
