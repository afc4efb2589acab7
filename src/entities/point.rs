use serde::{Deserialize, Serialize};

use crate::error::{invalid_input_error, Error};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, Error> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(invalid_input_error());
        }

        Ok(Self { lat, lng })
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);

        EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

impl From<GeoPoint> for geo_types::Point<f64> {
    fn from(point: GeoPoint) -> Self {
        geo_types::Point::new(point.lng, point.lat)
    }
}

#[test]
fn rejects_out_of_range_coordinates() {
    assert!(GeoPoint::new(-90.1, 0.0).is_err());
    assert!(GeoPoint::new(90.1, 0.0).is_err());
    assert!(GeoPoint::new(0.0, -180.1).is_err());
    assert!(GeoPoint::new(0.0, 180.1).is_err());
    assert!(GeoPoint::new(-90.0, 180.0).is_ok());
}

#[test]
fn haversine_distance_sanity() {
    let pickup = GeoPoint::new(-23.5510, -46.6338).unwrap();
    let near = GeoPoint::new(-23.5505, -46.6333).unwrap();
    let far = GeoPoint::new(-23.5805, -46.6633).unwrap();

    let d_near = pickup.distance_m(&near);
    let d_far = pickup.distance_m(&far);

    assert!(d_near > 50.0 && d_near < 400.0, "got {}", d_near);
    assert!(d_far > 3000.0 && d_far < 6000.0, "got {}", d_far);
    assert_eq!(pickup.distance_m(&pickup), 0.0);
}
