use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, RefreshError};
use crate::models::power::{Location, PowerSnapshot};
use crate::services::clock::Clock;
use crate::services::estimator::{InverterConfig, PowerEstimator};
use crate::services::solar_geometry;
use crate::shared_state::AppState;

/// Drives refresh cycles: one at a time, on a fixed interval or when asked.
pub struct Coordinator {
    state: AppState,
    estimator: PowerEstimator,
    location: Location,
    inverter: InverterConfig,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    pub fn new(state: AppState, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let config = state.config.clone();
        Ok(Self {
            estimator: PowerEstimator::from_config(&config.estimator),
            location: config.location()?,
            inverter: config.inverter()?,
            state,
            clock,
        })
    }

    /// Run one cycle. On success the snapshot replaces the previous one;
    /// on failure the previous snapshot is left untouched.
    pub async fn refresh(&self) -> Result<PowerSnapshot, RefreshError> {
        let now = self.clock.now();
        match self.compute(now).await {
            Ok(snapshot) => {
                info!(
                    "[UPDATE] GHI: {:.1} W/m² | Zenith: {:.1}° | Total: {:.1} W",
                    snapshot.ghi_w_m2, snapshot.solar_position.zenith, snapshot.power.total()
                );
                for (name, watts) in snapshot.power.arrays() {
                    debug!("[UPDATE]   {}: {:.1} W", name, watts);
                }
                self.state.set_snapshot(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                warn!("[UPDATE] Refresh failed, keeping last estimate: {}", e);
                self.state.record_failure(&e.to_string(), now);
                Err(e)
            }
        }
    }

    async fn compute(&self, now: chrono::DateTime<chrono::Utc>) -> Result<PowerSnapshot, RefreshError> {
        let config = self.state.config.clone();
        let ghi = self.state.sensors.read_number(&config.estimator.solar_radiation_sensor)?;

        let air_temperature_c = match &config.estimator.temperature_sensor {
            None => None,
            Some(id) => match self.state.sensors.read_number(id) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!("[UPDATE] {}; estimating without thermal correction", e);
                    None
                }
            },
        };

        let sun = solar_geometry::position(&self.location, now);
        let day_of_year = self.location.local_day_of_year(now);
        debug!(
            "[UPDATE] {} local, day {} → zenith {:.2}°, azimuth {:.2}°",
            now.with_timezone(&self.location.timezone()),
            day_of_year,
            sun.zenith,
            sun.azimuth
        );

        let estimator = self.estimator;
        let inverter = self.inverter;
        let power = tokio::task::spawn_blocking(move || {
            estimator.estimate_at(ghi, air_temperature_c, &config.arrays, &inverter, &sun, day_of_year)
        })
        .await?;

        Ok(PowerSnapshot {
            computed_at: now,
            ghi_w_m2: ghi,
            air_temperature_c,
            solar_position: sun,
            power,
        })
    }

    /// Refresh forever. The first tick fires immediately.
    pub async fn run(self) {
        let trigger = self.state.refresh_trigger();
        let period = Duration::from_secs(self.state.config.estimator.update_interval_s);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = trigger.notified() => {
                    debug!("[UPDATE] Refresh requested");
                }
            }
            // Errors are recorded in shared state; the next tick retries
            let _ = self.refresh().await;
        }
    }
}

/// Request a refresh whenever the radiation sensor's value changes.
/// Subscribes before returning so no change is missed.
pub fn spawn_sensor_trigger(state: &AppState) -> JoinHandle<()> {
    let mut changes = state.sensors.subscribe();
    let state = state.clone();
    let radiation_id = state.config.estimator.solar_radiation_sensor.clone();

    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(id) if id == radiation_id => state.request_refresh(),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => state.request_refresh(),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
