/// STC reference cell temperature (°C).
pub const STC_TEMPERATURE_C: f64 = 25.0;
pub const DEFAULT_NOCT_C: f64 = 45.0;

/// NOCT cell-temperature model with a linear power temperature coefficient.
#[derive(Debug, Clone, Copy)]
pub struct ThermalModel {
    noct: f64,
}

impl ThermalModel {
    pub fn new(noct: f64) -> Self {
        Self { noct }
    }

    /// T_cell = T_air + (NOCT − 20) / 800 · G_poa
    pub fn cell_temperature(&self, air_temp_c: f64, poa_global: f64) -> f64 {
        air_temp_c + (self.noct - 20.0) / 800.0 * poa_global
    }

    /// Multiplicative power factor for a coefficient in %/°C.
    /// Not floor-clamped: very cold cells legitimately exceed nameplate.
    pub fn derate(&self, cell_temp_c: f64, temperature_coefficient: f64) -> f64 {
        1.0 + temperature_coefficient / 100.0 * (cell_temp_c - STC_TEMPERATURE_C)
    }

    /// Full correction for an optional air temperature; 1.0 when unknown.
    pub fn factor(&self, air_temp_c: Option<f64>, poa_global: f64, temperature_coefficient: f64) -> f64 {
        match air_temp_c {
            Some(air) => self.derate(self.cell_temperature(air, poa_global), temperature_coefficient),
            None => 1.0,
        }
    }
}

impl Default for ThermalModel {
    fn default() -> Self {
        Self::new(DEFAULT_NOCT_C)
    }
}
