/// ============================================================
///  Irradiance → power estimation
///
///  Per cycle:
///   1. GHI ≤ 0            → every array and the total are 0 W
///   2. Solar position     – once, shared by all arrays
///   3. Decomposition      – GHI → DNI + DHI
///   4. Transposition      – isotropic sky → POA global
///   5. Power              – P = POA/1000 · P_panel · n · η_inv
///   6. Thermal derate     – NOCT cell temperature, only with T_air
///   7. Clamp ≥ 0, clip by policy, sum into "total"
///
///  A numeric failure in one array zeroes that array only.
/// ============================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::config::{ArrayConfig, EstimatorConfig};
use crate::error::EstimationError;
use crate::models::power::{Location, PowerResult, SolarPosition};
use crate::services::decomposition::IrradianceDecomposer;
use crate::services::solar_geometry;
use crate::services::thermal::ThermalModel;
use crate::services::transposition::PlaneOfArrayConverter;

/// Irradiance at Standard Test Conditions (W/m²).
pub const STC_IRRADIANCE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverterConfig {
    /// Fraction, 0..=1
    pub efficiency: f64,
    /// Watts
    pub capacity_w: f64,
}

/// Where inverter capacity clipping is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClippingPolicy {
    /// Only the summed total is clipped; arrays report unclipped watts.
    #[default]
    TotalOnly,
    /// Each array is clipped to the inverter capacity, then the total too.
    PerArray,
}

/// Intermediate values of one array's calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayEstimate {
    pub aoi_deg: f64,
    pub poa_w_m2: f64,
    pub thermal_factor: f64,
    pub power_w: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct PowerEstimator {
    decomposer: IrradianceDecomposer,
    converter: PlaneOfArrayConverter,
    thermal: ThermalModel,
    clipping: ClippingPolicy,
}

impl PowerEstimator {
    pub fn new(
        decomposer: IrradianceDecomposer,
        converter: PlaneOfArrayConverter,
        thermal: ThermalModel,
        clipping: ClippingPolicy,
    ) -> Self {
        Self { decomposer, converter, thermal, clipping }
    }

    pub fn from_config(cfg: &EstimatorConfig) -> Self {
        Self::new(
            IrradianceDecomposer::new(cfg.decomposition),
            PlaneOfArrayConverter::new(cfg.albedo),
            ThermalModel::new(cfg.noct),
            cfg.clipping,
        )
    }

    /// Estimate every array for `instant` at `location`.
    pub fn estimate(
        &self,
        ghi: f64,
        air_temp_c: Option<f64>,
        arrays: &[ArrayConfig],
        inverter: &InverterConfig,
        location: &Location,
        instant: DateTime<Utc>,
    ) -> PowerResult {
        let sun = solar_geometry::position(location, instant);
        let day_of_year = location.local_day_of_year(instant);
        self.estimate_at(ghi, air_temp_c, arrays, inverter, &sun, day_of_year)
    }

    /// Same as [`estimate`](Self::estimate) with the solar position already resolved.
    pub fn estimate_at(
        &self,
        ghi: f64,
        air_temp_c: Option<f64>,
        arrays: &[ArrayConfig],
        inverter: &InverterConfig,
        sun: &SolarPosition,
        day_of_year: u32,
    ) -> PowerResult {
        let mut result = PowerResult::new();

        if ghi.is_nan() || ghi <= 0.0 {
            for array in arrays {
                result.insert_array(&array.name, 0.0);
            }
            return result;
        }

        let mut total = 0.0;
        for array in arrays {
            let power = match self.array_power(ghi, air_temp_c, array, inverter, sun, day_of_year) {
                Ok(est) => {
                    debug!(
                        "[ESTIMATE] Array {}: GHI={:.2} W/m², zenith={:.1}°, azimuth={:.1}°, AOI={:.1}°, POA={:.2} W/m², thermal={:.3}, power={:.2} W",
                        array.name, ghi, sun.zenith, sun.azimuth, est.aoi_deg, est.poa_w_m2, est.thermal_factor, est.power_w
                    );
                    est.power_w
                }
                Err(e) => {
                    warn!("[ESTIMATE] Error calculating power for array {}: {}", array.name, e);
                    0.0
                }
            };
            let power = match self.clipping {
                ClippingPolicy::TotalOnly => power,
                ClippingPolicy::PerArray => power.min(inverter.capacity_w),
            };
            result.insert_array(&array.name, power);
            total += power;
        }

        result.set_total(total.min(inverter.capacity_w));
        result
    }

    /// One array's unclipped power. Any non-finite intermediate is an error.
    pub fn array_power(
        &self,
        ghi: f64,
        air_temp_c: Option<f64>,
        array: &ArrayConfig,
        inverter: &InverterConfig,
        sun: &SolarPosition,
        day_of_year: u32,
    ) -> Result<ArrayEstimate, EstimationError> {
        let components = self.decomposer.decompose(ghi, sun.zenith, day_of_year);
        EstimationError::check("dni", components.dni)?;
        EstimationError::check("dhi", components.dhi)?;

        let aoi_deg = EstimationError::check(
            "aoi",
            self.converter.angle_of_incidence(array.tilt, array.azimuth, sun),
        )?;
        let poa_w_m2 = EstimationError::check(
            "poa",
            self.converter.to_poa(&components, sun, array.tilt, array.azimuth),
        )?;

        let raw = (poa_w_m2 / STC_IRRADIANCE)
            * array.panel_wattage
            * inverter.efficiency
            * array.panel_count as f64;
        let thermal_factor = EstimationError::check(
            "thermal factor",
            self.thermal.factor(air_temp_c, poa_w_m2, array.temperature_coefficient),
        )?;
        let power_w = EstimationError::check("power", raw * thermal_factor)?.max(0.0);

        Ok(ArrayEstimate { aoi_deg, poa_w_m2, thermal_factor, power_w })
    }
}
