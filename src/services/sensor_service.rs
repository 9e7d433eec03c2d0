use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::OpenMeteoConfig;
use crate::models::power::{CurrentWeatherResponse, Location};
use crate::shared_state::SensorRegistry;

/// Upper bound accepted for manual irradiance input (W/m²).
pub const MANUAL_IRRADIANCE_MAX: f64 = 1500.0;
/// Sensor id the manual input writes to.
pub const MANUAL_IRRADIANCE_SENSOR: &str = "manual.solar_radiation";

/// Current GHI and air temperature from Open-Meteo.
pub async fn fetch_current(
    client: &reqwest::Client,
    cfg: &OpenMeteoConfig,
    location: &Location,
) -> Result<(Option<f64>, Option<f64>), reqwest::Error> {
    let url = format!(
        "{}?latitude={}&longitude={}&current=shortwave_radiation,temperature_2m",
        cfg.base_url,
        location.latitude(),
        location.longitude()
    );
    let resp = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json::<CurrentWeatherResponse>()
        .await?;
    debug!("[OPEN-METEO] Reading for {}", resp.current.time);
    Ok((resp.current.shortwave_radiation, resp.current.temperature_2m))
}

/// Write one fetch outcome into the registry. Missing fields and failed
/// requests mark the sensors unavailable rather than keeping stale values.
pub fn apply_reading<E: std::fmt::Display>(
    registry: &SensorRegistry,
    cfg: &OpenMeteoConfig,
    reading: Result<(Option<f64>, Option<f64>), E>,
) {
    match reading {
        Ok((ghi, temperature)) => {
            match ghi {
                Some(g) => registry.set(&cfg.radiation_sensor_id, g.to_string()),
                None => registry.mark_unavailable(&cfg.radiation_sensor_id),
            };
            match temperature {
                Some(t) => registry.set(&cfg.temperature_sensor_id, t.to_string()),
                None => registry.mark_unavailable(&cfg.temperature_sensor_id),
            };
        }
        Err(e) => {
            warn!("[OPEN-METEO] Failed to fetch weather data: {}", e);
            registry.mark_unavailable(&cfg.radiation_sensor_id);
            registry.mark_unavailable(&cfg.temperature_sensor_id);
        }
    }
}

pub async fn run_open_meteo_poller(cfg: OpenMeteoConfig, location: Location, registry: SensorRegistry) {
    if !cfg.enabled {
        info!("[OPEN-METEO] Disabled, skipping poller");
        return;
    }
    let interval_s = cfg.poll_interval_s.max(60);
    info!(
        "[OPEN-METEO] Polling every {}s into {} / {}",
        interval_s, cfg.radiation_sensor_id, cfg.temperature_sensor_id
    );

    let client = reqwest::Client::new();
    loop {
        let reading = fetch_current(&client, &cfg, &location).await;
        apply_reading(&registry, &cfg, reading);
        tokio::time::sleep(Duration::from_secs(interval_s)).await;
    }
}

/// Validate and store a manual irradiance value.
pub fn set_manual_irradiance(registry: &SensorRegistry, value: f64) -> Result<(), String> {
    if !value.is_finite() || !(0.0..=MANUAL_IRRADIANCE_MAX).contains(&value) {
        return Err(format!("value {} outside 0..={}", value, MANUAL_IRRADIANCE_MAX));
    }
    registry.set(MANUAL_IRRADIANCE_SENSOR, value.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_reading_success_and_failure() {
        let reg = SensorRegistry::new();
        let cfg = OpenMeteoConfig::default();

        apply_reading::<String>(&reg, &cfg, Ok((Some(612.0), Some(18.5))));
        assert_eq!(reg.read_number(&cfg.radiation_sensor_id), Ok(612.0));
        assert_eq!(reg.read_number(&cfg.temperature_sensor_id), Ok(18.5));

        apply_reading::<String>(&reg, &cfg, Ok((Some(0.0), None)));
        assert_eq!(reg.read_number(&cfg.radiation_sensor_id), Ok(0.0));
        assert!(reg.read_number(&cfg.temperature_sensor_id).is_err());

        apply_reading(&reg, &cfg, Err("timeout"));
        assert_eq!(reg.get(&cfg.radiation_sensor_id).as_deref(), Some("unavailable"));
    }

    #[test]
    fn test_manual_irradiance_bounds() {
        let reg = SensorRegistry::new();
        assert!(set_manual_irradiance(&reg, 820.0).is_ok());
        assert_eq!(reg.read_number(MANUAL_IRRADIANCE_SENSOR), Ok(820.0));
        assert!(set_manual_irradiance(&reg, -1.0).is_err());
        assert!(set_manual_irradiance(&reg, 1500.1).is_err());
        assert!(set_manual_irradiance(&reg, f64::NAN).is_err());
        assert_eq!(reg.read_number(MANUAL_IRRADIANCE_SENSOR), Ok(820.0));
    }

    #[test]
    fn test_parses_open_meteo_payload() {
        let body = r#"{"latitude":45.06,"current":{"time":"2025-06-21T10:45","interval":900,
            "shortwave_radiation":742.0,"temperature_2m":27.3}}"#;
        let resp: CurrentWeatherResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.current.shortwave_radiation, Some(742.0));
        assert_eq!(resp.current.temperature_2m, Some(27.3));
    }
}
