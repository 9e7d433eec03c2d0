use std::f64::consts::PI;

use crate::models::power::{IrradianceComponents, SolarPosition};

const DEG: f64 = PI / 180.0;

/// Isotropic-sky transposition of horizontal irradiance onto a tilted plane.
#[derive(Debug, Clone, Copy)]
pub struct PlaneOfArrayConverter {
    albedo: f64,
}

impl PlaneOfArrayConverter {
    /// `albedo` of 0 drops the ground-reflected term.
    pub fn new(albedo: f64) -> Self {
        Self { albedo: albedo.clamp(0.0, 1.0) }
    }

    /// Angle between the sun vector and the panel normal, in [0°, 90°].
    /// Sun behind the plane reports 90°, i.e. no beam contribution.
    pub fn angle_of_incidence(&self, tilt_deg: f64, azimuth_deg: f64, sun: &SolarPosition) -> f64 {
        aoi_projection(tilt_deg, azimuth_deg, sun).max(0.0).acos() / DEG
    }

    /// Plane-of-array global irradiance (W/m²), never negative.
    pub fn to_poa(
        &self,
        components: &IrradianceComponents,
        sun: &SolarPosition,
        tilt_deg: f64,
        azimuth_deg: f64,
    ) -> f64 {
        let cos_tilt = (tilt_deg * DEG).cos();

        let beam = components.dni * aoi_projection(tilt_deg, azimuth_deg, sun).max(0.0);
        let sky_diffuse = components.dhi * (1.0 + cos_tilt) / 2.0;
        let ground = components.ghi * self.albedo * (1.0 - cos_tilt) / 2.0;

        (beam + sky_diffuse + ground).max(0.0)
    }
}

impl Default for PlaneOfArrayConverter {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// cos(AOI): dot product of the surface normal and the unit sun vector.
fn aoi_projection(tilt_deg: f64, azimuth_deg: f64, sun: &SolarPosition) -> f64 {
    let tilt = tilt_deg * DEG;
    let zenith = sun.zenith * DEG;
    let projection = tilt.cos() * zenith.cos()
        + tilt.sin() * zenith.sin() * ((sun.azimuth - azimuth_deg) * DEG).cos();
    projection.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sun(zenith: f64, azimuth: f64) -> SolarPosition {
        SolarPosition { zenith, azimuth }
    }

    #[test]
    fn test_aoi_zero_when_sun_on_normal() {
        let c = PlaneOfArrayConverter::default();
        assert!(c.angle_of_incidence(35.0, 180.0, &sun(35.0, 180.0)).abs() < 1e-6);
        assert!(c.angle_of_incidence(0.0, 90.0, &sun(0.0, 0.0)).abs() < 1e-6);
    }

    #[test]
    fn test_aoi_ninety_when_sun_opposite_normal() {
        let c = PlaneOfArrayConverter::default();
        // Vertical south wall, sun low in the north
        let aoi = c.angle_of_incidence(90.0, 180.0, &sun(90.0, 0.0));
        assert!((aoi - 90.0).abs() < 1e-6);
        // Tilted south plane, sun exactly along the inward normal
        let aoi = c.angle_of_incidence(30.0, 180.0, &sun(150.0, 0.0));
        assert!((aoi - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_flat_plane_receives_ghi_when_closed() {
        let c = PlaneOfArrayConverter::new(0.25);
        let s = sun(40.0, 150.0);
        let dni = 600.0;
        let dhi = 120.0;
        let ghi = dni * (40.0 * DEG).cos() + dhi;
        let poa = c.to_poa(&IrradianceComponents { ghi, dni, dhi }, &s, 0.0, 200.0);
        assert!((poa - ghi).abs() < 1e-9);
    }

    #[test]
    fn test_isotropic_terms_on_vertical_plane() {
        let c = PlaneOfArrayConverter::new(0.2);
        let comps = IrradianceComponents { ghi: 500.0, dni: 0.0, dhi: 200.0 };
        let poa = c.to_poa(&comps, &sun(60.0, 180.0), 90.0, 180.0);
        // Half the sky dome plus half the ground
        assert!((poa - (100.0 + 500.0 * 0.2 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_sun_behind_plane_gives_only_diffuse() {
        let c = PlaneOfArrayConverter::default();
        let comps = IrradianceComponents { ghi: 400.0, dni: 700.0, dhi: 100.0 };
        let poa = c.to_poa(&comps, &sun(70.0, 0.0), 60.0, 180.0);
        assert!((poa - 100.0 * (1.0 + (60.0 * DEG).cos()) / 2.0).abs() < 1e-9);
    }
}
