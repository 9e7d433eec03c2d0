use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ConfigError;
use crate::models::power::{ArrayInfo, Location, TOTAL_KEY};
use crate::services::decomposition::DecompositionModel;
use crate::services::estimator::{ClippingPolicy, InverterConfig};

fn default_true() -> bool { true }
fn default_mqtt_port() -> u16 { 1883 }
fn default_topic_prefix() -> String { "pv-estimator".to_string() }
fn default_timezone() -> String { "UTC".to_string() }
fn default_inverter_efficiency() -> f64 { 96.0 }
fn default_inverter_capacity() -> f64 { 5000.0 }
fn default_noct() -> f64 { 45.0 }
fn default_update_interval() -> u64 { 60 }
fn default_panel_wattage() -> f64 { 400.0 }
fn default_panel_count() -> u32 { 1 }
fn default_panel_azimuth() -> f64 { 180.0 }
fn default_panel_tilt() -> f64 { 30.0 }
fn default_temperature_coefficient() -> f64 { -0.4 }
fn default_open_meteo_url() -> String { "https://api.open-meteo.com/v1/forecast".to_string() }
fn default_open_meteo_interval() -> u64 { 300 }
fn default_radiation_sensor_id() -> String { "open_meteo.shortwave_radiation".to_string() }
fn default_temperature_sensor_id() -> String { "open_meteo.temperature_2m".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub modbus: ModbusConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    /// Host location, used when the estimator has none of its own
    pub home: LocationConfig,
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub open_meteo: OpenMeteoConfig,
    pub arrays: Vec<ArrayConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModbusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub port: u16,
    /// First register of the map; the total lives here
    #[serde(default)]
    pub base_address: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub broker_host: String,
    #[serde(default = "default_mqtt_port")]
    pub broker_port: u16,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    pub publish_interval_s: Option<u64>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_host: String::new(),
            broker_port: default_mqtt_port(),
            client_id: String::new(),
            topic_prefix: default_topic_prefix(),
            publish_interval_s: None,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, ToSchema)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// IANA zone id, e.g. "Europe/Rome"
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl LocationConfig {
    pub fn resolve(&self) -> Result<Location, ConfigError> {
        Location::new(self.latitude, self.longitude, &self.timezone)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EstimatorConfig {
    /// Overrides `home` when set
    pub location: Option<LocationConfig>,
    /// Sensor id of the global horizontal irradiance source (W/m²)
    pub solar_radiation_sensor: String,
    /// Sensor id of the ambient temperature source (°C)
    pub temperature_sensor: Option<String>,
    /// Percent, 0.01..=100
    #[serde(default = "default_inverter_efficiency")]
    pub inverter_efficiency: f64,
    /// Watts
    #[serde(default = "default_inverter_capacity")]
    pub inverter_capacity: f64,
    #[serde(default)]
    pub decomposition: DecompositionModel,
    #[serde(default)]
    pub clipping: ClippingPolicy,
    /// Ground reflectance for transposition; 0 disables the ground term
    #[serde(default)]
    pub albedo: f64,
    /// Nominal operating cell temperature (°C)
    #[serde(default = "default_noct")]
    pub noct: f64,
    #[serde(default = "default_update_interval")]
    pub update_interval_s: u64,
}

/// Optional built-in irradiance/temperature source.
/// Writes its readings into the sensor registry under the configured ids.
#[derive(Debug, Deserialize, Clone)]
pub struct OpenMeteoConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_open_meteo_url")]
    pub base_url: String,
    #[serde(default = "default_open_meteo_interval")]
    pub poll_interval_s: u64,
    #[serde(default = "default_radiation_sensor_id")]
    pub radiation_sensor_id: String,
    #[serde(default = "default_temperature_sensor_id")]
    pub temperature_sensor_id: String,
}

impl Default for OpenMeteoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_open_meteo_url(),
            poll_interval_s: default_open_meteo_interval(),
            radiation_sensor_id: default_radiation_sensor_id(),
            temperature_sensor_id: default_temperature_sensor_id(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, ToSchema)]
pub struct ArrayConfig {
    pub name: String,
    /// Watts per panel at STC
    #[serde(default = "default_panel_wattage")]
    pub panel_wattage: f64,
    #[serde(default = "default_panel_count")]
    pub panel_count: u32,
    /// Degrees clockwise from north (180 = south)
    #[serde(default = "default_panel_azimuth")]
    pub azimuth: f64,
    /// Degrees from horizontal
    #[serde(default = "default_panel_tilt")]
    pub tilt: f64,
    /// %/°C above 25 °C, negative
    #[serde(default = "default_temperature_coefficient")]
    pub temperature_coefficient: f64,
}

impl ArrayConfig {
    pub fn total_capacity(&self) -> f64 {
        self.panel_wattage * self.panel_count as f64
    }

    pub fn info(&self) -> ArrayInfo {
        ArrayInfo {
            name: self.name.clone(),
            panel_wattage: self.panel_wattage,
            panel_count: self.panel_count,
            azimuth: self.azimuth,
            tilt: self.tilt,
            temperature_coefficient: self.temperature_coefficient,
            array_capacity: self.total_capacity(),
        }
    }

    /// Lowercase, underscore-separated name used in topics and ids.
    pub fn slug(&self) -> String {
        self.name.trim().to_lowercase().replace(' ', "_")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |reason: String| ConfigError::InvalidArray {
            array: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(fail("name must not be empty".to_string()));
        }
        if self.name == TOTAL_KEY {
            return Err(fail(format!("'{}' is a reserved name", TOTAL_KEY)));
        }
        if !(self.panel_wattage >= 1.0 && self.panel_wattage <= 1000.0) {
            return Err(fail(format!("panel_wattage {} outside 1..=1000", self.panel_wattage)));
        }
        if !(1..=10_000).contains(&self.panel_count) {
            return Err(fail(format!("panel_count {} outside 1..=10000", self.panel_count)));
        }
        if !(0.0..360.0).contains(&self.azimuth) {
            return Err(fail(format!("azimuth {} outside 0..360", self.azimuth)));
        }
        if !(0.0..=90.0).contains(&self.tilt) {
            return Err(fail(format!("tilt {} outside 0..=90", self.tilt)));
        }
        if !(-1.0..=0.0).contains(&self.temperature_coefficient) {
            return Err(fail(format!(
                "temperature_coefficient {} outside -1..=0",
                self.temperature_coefficient
            )));
        }
        Ok(())
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject anything the estimator must never see.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.location()?;
        self.inverter()?;

        let e = &self.estimator;
        if e.solar_radiation_sensor.trim().is_empty() {
            return Err(ConfigError::InvalidEstimator("solar_radiation_sensor is empty".into()));
        }
        if !(0.0..=1.0).contains(&e.albedo) {
            return Err(ConfigError::InvalidEstimator(format!("albedo {} outside 0..=1", e.albedo)));
        }
        if !(e.noct > 20.0 && e.noct < 100.0) {
            return Err(ConfigError::InvalidEstimator(format!("noct {} outside 20..100", e.noct)));
        }
        if e.update_interval_s == 0 {
            return Err(ConfigError::InvalidEstimator("update_interval_s must be > 0".into()));
        }

        // Equal slugs would share MQTT topics
        let mut seen = HashSet::new();
        for array in &self.arrays {
            array.validate()?;
            if !seen.insert(array.slug()) {
                return Err(ConfigError::DuplicateArray(array.name.clone()));
            }
        }
        Ok(())
    }

    /// Estimator location, falling back to the host location.
    pub fn location(&self) -> Result<Location, ConfigError> {
        self.estimator.location.as_ref().unwrap_or(&self.home).resolve()
    }

    pub fn inverter(&self) -> Result<InverterConfig, ConfigError> {
        let e = &self.estimator;
        if !(e.inverter_efficiency >= 0.01 && e.inverter_efficiency <= 100.0) {
            return Err(ConfigError::InvalidInverter(format!(
                "efficiency {}% outside 0.01..=100",
                e.inverter_efficiency
            )));
        }
        if !(e.inverter_capacity >= 1.0 && e.inverter_capacity <= 1_000_000.0) {
            return Err(ConfigError::InvalidInverter(format!(
                "capacity {} W outside 1..=1000000",
                e.inverter_capacity
            )));
        }
        Ok(InverterConfig {
            efficiency: e.inverter_efficiency / 100.0,
            capacity_w: e.inverter_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "server": { "port": 8080 },
        "modbus": { "port": 5020 },
        "home": { "latitude": 45.07, "longitude": 7.69, "timezone": "Europe/Rome" },
        "estimator": { "solar_radiation_sensor": "sensor.ghi" },
        "arrays": [
            { "name": "South Roof", "panel_count": 10 },
            { "name": "East Roof", "azimuth": 90, "tilt": 20, "panel_wattage": 380 }
        ]
    }"#;

    fn sample() -> Config {
        Config::from_json(SAMPLE).unwrap()
    }

    #[test]
    fn test_defaults_are_applied() {
        let c = sample();
        let south = &c.arrays[0];
        assert_eq!(south.panel_wattage, 400.0);
        assert_eq!(south.azimuth, 180.0);
        assert_eq!(south.tilt, 30.0);
        assert_eq!(south.temperature_coefficient, -0.4);
        assert_eq!(south.total_capacity(), 4000.0);
        assert_eq!(south.slug(), "south_roof");

        assert_eq!(c.estimator.decomposition, DecompositionModel::Erbs);
        assert_eq!(c.estimator.clipping, ClippingPolicy::TotalOnly);
        assert_eq!(c.estimator.update_interval_s, 60);
        assert!(!c.mqtt.enabled);
        assert!(!c.open_meteo.enabled);

        let inv = c.inverter().unwrap();
        assert!((inv.efficiency - 0.96).abs() < 1e-12);
        assert_eq!(inv.capacity_w, 5000.0);
    }

    #[test]
    fn test_location_falls_back_to_home() {
        let mut c = sample();
        assert_eq!(c.location().unwrap().latitude(), 45.07);

        c.estimator.location = Some(LocationConfig {
            latitude: -33.9,
            longitude: 18.4,
            timezone: "Africa/Johannesburg".into(),
        });
        assert_eq!(c.location().unwrap().latitude(), -33.9);
    }

    #[test]
    fn test_rejects_duplicate_array_names() {
        let mut c = sample();
        c.arrays[1].name = "South Roof".into();
        assert!(matches!(c.validate(), Err(ConfigError::DuplicateArray(_))));
    }

    #[test]
    fn test_rejects_names_sharing_a_slug() {
        let mut c = sample();
        c.arrays[0].name = "South Roof".into();
        c.arrays[1].name = "south_roof".into();
        assert_eq!(c.arrays[0].slug(), c.arrays[1].slug());
        assert!(matches!(c.validate(), Err(ConfigError::DuplicateArray(n)) if n == "south_roof"));
    }

    #[test]
    fn test_rejects_reserved_total_name() {
        let mut c = sample();
        c.arrays[0].name = "total".into();
        assert!(matches!(c.validate(), Err(ConfigError::InvalidArray { .. })));
    }

    #[test]
    fn test_rejects_out_of_range_array_fields() {
        let base = sample().arrays[0].clone();

        let mut a = base.clone();
        a.tilt = 91.0;
        assert!(a.validate().is_err());

        let mut a = base.clone();
        a.azimuth = 360.0;
        assert!(a.validate().is_err());

        let mut a = base.clone();
        a.temperature_coefficient = 0.1;
        assert!(a.validate().is_err());

        let mut a = base.clone();
        a.panel_count = 0;
        assert!(a.validate().is_err());

        let mut a = base.clone();
        a.panel_wattage = 0.0;
        assert!(a.validate().is_err());

        let mut a = base.clone();
        a.panel_wattage = 0.5;
        assert!(a.validate().is_err());

        let mut a = base.clone();
        a.panel_wattage = 1.0;
        assert!(a.validate().is_ok());

        let mut a = base;
        a.name = "  ".into();
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_inverter_and_location() {
        let mut c = sample();
        c.estimator.inverter_efficiency = 0.0;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidInverter(_))));

        let mut c = sample();
        c.home.latitude = 120.0;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidLocation(_))));
    }

    #[test]
    fn test_parses_strategy_and_policy_names() {
        let json = SAMPLE.replace(
            r#""solar_radiation_sensor": "sensor.ghi""#,
            r#""solar_radiation_sensor": "sensor.ghi", "decomposition": "simple", "clipping": "per_array""#,
        );
        let c = Config::from_json(&json).unwrap();
        assert_eq!(c.estimator.decomposition, DecompositionModel::Simple);
        assert_eq!(c.estimator.clipping, ClippingPolicy::PerArray);
    }
}
