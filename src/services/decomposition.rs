/// ============================================================
///  GHI decomposition
///
///  Splits a single global-horizontal reading into beam (DNI) and
///  diffuse (DHI) parts. With only one pyranometer this is an
///  empirical estimate: hourly-fitted correlations like Erbs carry
///  roughly ±15–25 % error on DNI for individual readings, and
///  broken-cloud conditions are the worst case. Callers get a
///  plausible split, not a measurement.
///
///  Two departures from the raw correlation keep plane-of-array
///  irradiance non-decreasing in GHI and physically bounded:
///   • diffuse is held at its peak (kt ≈ 0.44) for clearer skies,
///     so DHI never falls as GHI rises
///   • DNI is capped by a clear-sky air-mass limit and any excess
///     beam is returned to diffuse, keeping dni·cos z + dhi = ghi
/// ============================================================

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use utoipa::ToSchema;

use crate::models::power::IrradianceComponents;

// ─── Physical constants ──────────────────────────────────────
const SC: f64 = 1361.0; // Solar constant W/m²
const DEG: f64 = PI / 180.0;

/// Above this zenith everything is treated as diffuse.
pub const MAX_BEAM_ZENITH_DEG: f64 = 87.0;
/// Floor on cos(zenith) when forming the clearness index.
const MIN_COS_ZENITH: f64 = 0.065;
/// Share of GHI assigned to diffuse by the simple model.
const SIMPLE_DIFFUSE_SHARE: f64 = 0.15;
/// Clearness index where kt·df(kt) peaks; diffuse is held there above it.
pub const DIFFUSE_PEAK_KT: f64 = 0.44018;

/// Decomposition strategy. The two are not numerically equivalent,
/// so fixtures must pin one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionModel {
    /// Erbs, Klein & Duffie (1982) diffuse-fraction correlation on the
    /// clearness index, with monotone diffuse and a clear-sky DNI cap.
    /// Preserves `dni·cos z + dhi = ghi`.
    #[default]
    Erbs,
    /// `dni = ghi·cos z`, `dhi = 0.15·ghi` while the sun is up.
    /// Overestimates POA on tilted planes; kept for comparison.
    Simple,
}

#[derive(Debug, Clone, Copy)]
pub struct IrradianceDecomposer {
    model: DecompositionModel,
}

impl IrradianceDecomposer {
    pub fn new(model: DecompositionModel) -> Self {
        Self { model }
    }

    /// Split `ghi` (W/m²) for a sun at `zenith_deg` on local `day_of_year`.
    pub fn decompose(&self, ghi: f64, zenith_deg: f64, day_of_year: u32) -> IrradianceComponents {
        let ghi = ghi.max(0.0);
        match self.model {
            DecompositionModel::Erbs => erbs(ghi, zenith_deg, day_of_year),
            DecompositionModel::Simple => simple(ghi, zenith_deg),
        }
    }
}

fn all_diffuse(ghi: f64) -> IrradianceComponents {
    IrradianceComponents { ghi, dni: 0.0, dhi: ghi }
}

fn erbs(ghi: f64, zenith_deg: f64, day_of_year: u32) -> IrradianceComponents {
    if zenith_deg >= MAX_BEAM_ZENITH_DEG {
        return all_diffuse(ghi);
    }
    let cos_z = (zenith_deg * DEG).cos();
    let e0 = extraterrestrial_irradiance(day_of_year);
    let kt = clearness_index(ghi, cos_z, e0);

    let erbs_dhi = if kt <= DIFFUSE_PEAK_KT {
        ghi * erbs_diffuse_fraction(kt)
    } else {
        // Diffuse at the peak of kt·df(kt), held for clearer skies
        e0 * cos_z.max(MIN_COS_ZENITH) * DIFFUSE_PEAK_KT * erbs_diffuse_fraction(DIFFUSE_PEAK_KT)
    };
    let dni = ((ghi - erbs_dhi) / cos_z)
        .max(0.0)
        .min(clear_sky_dni(zenith_deg, e0));
    let dhi = (ghi - dni * cos_z).max(0.0);
    IrradianceComponents { ghi, dni, dhi }
}

/// Kasten & Young (1989) relative optical air mass.
pub fn air_mass(zenith_deg: f64) -> f64 {
    1.0 / ((zenith_deg * DEG).cos() + 0.50572 * (96.07995 - zenith_deg).powf(-1.6364))
}

/// Meinel clear-sky beam irradiance, the most DNI a sun at this zenith delivers.
pub fn clear_sky_dni(zenith_deg: f64, e0: f64) -> f64 {
    e0 * 0.7f64.powf(air_mass(zenith_deg).powf(0.678))
}

fn simple(ghi: f64, zenith_deg: f64) -> IrradianceComponents {
    let cos_z = (zenith_deg * DEG).cos().max(0.0);
    if cos_z > 0.01 {
        IrradianceComponents {
            ghi,
            dni: ghi * cos_z,
            dhi: ghi * SIMPLE_DIFFUSE_SHARE,
        }
    } else {
        all_diffuse(ghi)
    }
}

/// Ratio of measured GHI to the horizontal extraterrestrial irradiance, in [0, 1].
pub fn clearness_index(ghi: f64, cos_zenith: f64, e0: f64) -> f64 {
    let horizontal_extra = e0 * cos_zenith.max(MIN_COS_ZENITH);
    (ghi / horizontal_extra).clamp(0.0, 1.0)
}

/// Erbs (1982) piecewise diffuse fraction.
pub fn erbs_diffuse_fraction(kt: f64) -> f64 {
    if kt <= 0.22 {
        1.0 - 0.09 * kt
    } else if kt <= 0.80 {
        0.9511 - 0.1604 * kt + 4.388 * kt.powi(2) - 16.638 * kt.powi(3) + 12.336 * kt.powi(4)
    } else {
        0.165
    }
}

// ─── Extraterrestrial irradiance (eccentricity correction) ───
/// Normal-incidence irradiance at the top of the atmosphere (W/m²), Spencer (1971).
pub fn extraterrestrial_irradiance(day_of_year: u32) -> f64 {
    let b = 2.0 * PI * (day_of_year as f64 - 1.0) / 365.0;
    SC * (1.00011
        + 0.034221 * b.cos()
        + 0.00128 * b.sin()
        + 0.000719 * (2.0 * b).cos()
        + 0.000077 * (2.0 * b).sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERBS: IrradianceDecomposer = IrradianceDecomposer { model: DecompositionModel::Erbs };
    const SIMPLE: IrradianceDecomposer = IrradianceDecomposer { model: DecompositionModel::Simple };

    fn closure_error(c: &IrradianceComponents, zenith: f64) -> f64 {
        (c.dni * (zenith * DEG).cos() + c.dhi - c.ghi).abs()
    }

    #[test]
    fn test_extraterrestrial_follows_orbit() {
        // Perihelion in early January, aphelion in early July
        let jan = extraterrestrial_irradiance(3);
        let jul = extraterrestrial_irradiance(185);
        assert!(jan > 1400.0 && jan < 1420.0, "{jan}");
        assert!(jul > 1310.0 && jul < 1325.0, "{jul}");
    }

    #[test]
    fn test_diffuse_fraction_branches() {
        assert!((erbs_diffuse_fraction(0.0) - 1.0).abs() < 1e-12);
        assert!((erbs_diffuse_fraction(0.2) - 0.982).abs() < 1e-12);
        assert_eq!(erbs_diffuse_fraction(0.9), 0.165);
        // Continuous at the upper knee within the published fit
        assert!((erbs_diffuse_fraction(0.8) - 0.165).abs() < 0.01);
    }

    #[test]
    fn test_low_sun_is_all_diffuse() {
        for zenith in [87.0, 89.9, 95.0] {
            let c = ERBS.decompose(40.0, zenith, 100);
            assert_eq!(c.dni, 0.0);
            assert_eq!(c.dhi, 40.0);
        }
    }

    #[test]
    fn test_erbs_closure_holds_below_87() {
        for zenith in [0.0, 20.0, 45.0, 70.0, 86.9] {
            for ghi in [1.0, 50.0, 300.0, 800.0, 1100.0] {
                let c = ERBS.decompose(ghi, zenith, 172);
                assert!(c.dni >= 0.0 && c.dhi >= 0.0);
                assert!(closure_error(&c, zenith) < 1.0, "z={zenith} ghi={ghi} {c:?}");
            }
        }
    }

    #[test]
    fn test_erbs_overcast_is_mostly_diffuse() {
        // kt ≈ 0.1 at zenith 30°
        let c = ERBS.decompose(120.0, 30.0, 172);
        assert!(c.dhi / c.ghi > 0.98);
    }

    #[test]
    fn test_simple_model_fixture() {
        let c = SIMPLE.decompose(1000.0, 60.0, 1);
        assert!((c.dni - 500.0).abs() < 1e-9);
        assert!((c.dhi - 150.0).abs() < 1e-9);

        let night = SIMPLE.decompose(10.0, 90.0, 1);
        assert_eq!(night.dni, 0.0);
        assert_eq!(night.dhi, 10.0);
    }

    #[test]
    fn test_diffuse_never_falls_as_sky_clears() {
        for zenith in [0.0, 30.0, 60.0, 80.0, 86.5] {
            let mut prev = ERBS.decompose(0.0, zenith, 200);
            for step in 1..=300 {
                let c = ERBS.decompose(step as f64 * 5.0, zenith, 200);
                assert!(c.dhi >= prev.dhi - 1e-9, "z={zenith} ghi={} {c:?} < {prev:?}", c.ghi);
                assert!(c.dni >= prev.dni - 1e-9, "z={zenith} ghi={} {c:?} < {prev:?}", c.ghi);
                prev = c;
            }
        }
    }

    #[test]
    fn test_dni_capped_when_ghi_exceeds_extraterrestrial() {
        // Interval-mean readings can outrun the instantaneous sun near sunset
        for zenith in [80.0, 83.0, 86.0, 86.9] {
            let horizontal_extra = extraterrestrial_irradiance(1) * (zenith * DEG).cos();
            for factor in [1.0, 1.5, 3.0, 6.0] {
                let c = ERBS.decompose(horizontal_extra * factor, zenith, 1);
                let limit = clear_sky_dni(zenith, extraterrestrial_irradiance(1));
                assert!(c.dni <= limit + 1e-9, "z={zenith} x{factor} {c:?}");
                assert!(c.dni < 600.0, "z={zenith} x{factor} {c:?}");
                assert!(closure_error(&c, zenith) < 1e-9);
            }
        }
    }

    #[test]
    fn test_air_mass_and_clear_sky_limit() {
        assert!((air_mass(0.0) - 1.0).abs() < 1e-3);
        assert!((air_mass(60.0) - 2.0).abs() < 0.01);
        let e0 = extraterrestrial_irradiance(172);
        assert!(clear_sky_dni(0.0, e0) > 900.0);
        assert!(clear_sky_dni(86.0, e0) < 200.0);
    }

    #[test]
    fn test_negative_ghi_clamped() {
        let c = ERBS.decompose(-5.0, 30.0, 100);
        assert_eq!((c.ghi, c.dni, c.dhi), (0.0, 0.0, 0.0));
    }
}
