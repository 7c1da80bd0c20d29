//! Simulated position source standing in for a device's geolocation API

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{now_millis, WirePosition, EARTH_RADIUS_M};

/// Produces position reports around a starting point.
///
/// With a non-zero jitter, every step drifts the position by up to
/// `jitter_m` meters north/south and east/west.
#[derive(Debug)]
pub struct Walker {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    jitter_m: f64,
    rng: StdRng,
}

impl Walker {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, jitter_m: f64) -> Self {
        Self::with_rng(latitude, longitude, accuracy, jitter_m, StdRng::from_entropy())
    }

    pub fn with_seed(latitude: f64, longitude: f64, accuracy: f64, jitter_m: f64, seed: u64) -> Self {
        Self::with_rng(latitude, longitude, accuracy, jitter_m, StdRng::seed_from_u64(seed))
    }

    fn with_rng(latitude: f64, longitude: f64, accuracy: f64, jitter_m: f64, rng: StdRng) -> Self {
        Self {
            latitude: latitude.clamp(-90.0, 90.0),
            longitude: wrap_longitude(longitude),
            accuracy: accuracy.max(0.0),
            jitter_m: jitter_m.max(0.0),
            rng,
        }
    }

    /// Current position, stamped now
    pub fn current(&self) -> WirePosition {
        WirePosition {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            timestamp: Some(now_millis()),
        }
    }

    /// Advances the simulated walk and returns the new position
    pub fn step(&mut self) -> WirePosition {
        if self.jitter_m > 0.0 {
            let north = self.rng.gen_range(-self.jitter_m..=self.jitter_m);
            let east = self.rng.gen_range(-self.jitter_m..=self.jitter_m);

            let d_lat = (north / EARTH_RADIUS_M).to_degrees();
            let cos_lat = self.latitude.to_radians().cos().max(1e-6);
            let d_lon = (east / (EARTH_RADIUS_M * cos_lat)).to_degrees();

            self.latitude = (self.latitude + d_lat).clamp(-90.0, 90.0);
            self.longitude = wrap_longitude(self.longitude + d_lon);
        }
        self.current()
    }
}

fn wrap_longitude(longitude: f64) -> f64 {
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}
