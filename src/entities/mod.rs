mod area;
mod driver;
mod favorite;
mod flag;
mod geofence;
mod point;
mod ride;

pub use area::Area;
#[cfg(test)]
pub use geofence::square;
pub use driver::DriverBase;
pub use favorite::{FavoriteKind, FavoriteLocation};
pub use flag::FeatureFlag;
pub use geofence::{Confidence, Geofence};
pub use point::GeoPoint;
pub use ride::{CreateRide, Ride, ServiceType, Status};
