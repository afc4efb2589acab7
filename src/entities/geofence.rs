use geo::{Area as _, BoundingRect, Intersects};
use geo_types::{Geometry, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::GeoPoint;
use crate::error::{invalid_geometry_error, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Med,
    Low,
}

/// A stored boundary associated with an administrative area. Only `Polygon`
/// and `MultiPolygon` geometries are containment-eligible; `Point` and
/// `LineString` rows are degraded legacy imports kept for reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Geofence {
    pub id: Uuid,
    pub area_id: Uuid,
    pub geometry: Geometry<f64>,
    pub bbox: Rect<f64>,
    pub confidence: Confidence,
    pub is_verified: bool,
}

impl Geofence {
    /// Validates the geometry and precomputes the bounding box. Verification
    /// is a separate manual workflow, so every ingested geofence starts
    /// unverified.
    pub fn new(area_id: Uuid, geometry: Geometry<f64>, confidence: Confidence) -> Result<Self, Error> {
        let bbox = match &geometry {
            Geometry::Polygon(polygon) => {
                validate_polygon(polygon)?;
                polygon
                    .bounding_rect()
                    .ok_or_else(|| invalid_geometry_error("empty polygon"))?
            }
            Geometry::MultiPolygon(multi) => {
                if multi.0.is_empty() {
                    return Err(invalid_geometry_error("empty multipolygon"));
                }
                for polygon in &multi.0 {
                    validate_polygon(polygon)?;
                }
                multi
                    .bounding_rect()
                    .ok_or_else(|| invalid_geometry_error("empty multipolygon"))?
            }
            Geometry::Point(point) => Rect::new(point.0, point.0),
            Geometry::LineString(line) => line
                .bounding_rect()
                .ok_or_else(|| invalid_geometry_error("empty linestring"))?,
            _ => return Err(invalid_geometry_error("unsupported geometry type")),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            area_id,
            geometry,
            bbox,
            confidence,
            is_verified: false,
        })
    }

    pub fn containment_eligible(&self) -> bool {
        matches!(
            self.geometry,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_)
        )
    }

    pub fn bbox_contains(&self, point: &GeoPoint) -> bool {
        let min = self.bbox.min();
        let max = self.bbox.max();

        min.x <= point.lng && point.lng <= max.x && min.y <= point.lat && point.lat <= max.y
    }

    /// Exact containment test. Points on the boundary count as contained.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if !self.bbox_contains(point) {
            return false;
        }

        let point: geo_types::Point<f64> = (*point).into();

        match &self.geometry {
            Geometry::Polygon(polygon) => polygon.intersects(&point),
            Geometry::MultiPolygon(multi) => multi.intersects(&point),
            _ => false,
        }
    }

    /// Planar unsigned area of the geometry, used for "most specific area
    /// wins" precedence. Degraded geometries cover nothing.
    pub fn coverage(&self) -> f64 {
        match &self.geometry {
            Geometry::Polygon(polygon) => polygon.unsigned_area(),
            Geometry::MultiPolygon(multi) => multi.unsigned_area(),
            _ => 0.0,
        }
    }
}

fn validate_polygon(polygon: &Polygon<f64>) -> Result<(), Error> {
    validate_ring(polygon.exterior())?;

    for ring in polygon.interiors() {
        validate_ring(ring)?;
    }

    Ok(())
}

fn validate_ring(ring: &LineString<f64>) -> Result<(), Error> {
    if ring.0.len() < 4 {
        return Err(invalid_geometry_error("polygon ring has fewer than 4 points"));
    }

    if ring.0.first() != ring.0.last() {
        return Err(invalid_geometry_error("polygon ring is not closed"));
    }

    Ok(())
}

#[cfg(test)]
pub fn square(center: GeoPoint, half_side_deg: f64) -> Geometry<f64> {
    let (lat, lng, h) = (center.lat, center.lng, half_side_deg);

    Polygon::new(
        LineString::from(vec![
            (lng - h, lat - h),
            (lng + h, lat - h),
            (lng + h, lat + h),
            (lng - h, lat + h),
            (lng - h, lat - h),
        ]),
        vec![],
    )
    .into()
}

#[test]
fn rejects_degenerate_rings() {
    use geo_types::coord;

    let line = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
    let too_few = Polygon::new(line, vec![]);
    let result = Geofence::new(Uuid::new_v4(), too_few.into(), Confidence::High);
    assert_eq!(result.unwrap_err().code, crate::error::INVALID_GEOMETRY_CODE);

    // serde bypasses Polygon::new's auto-closing, matching hand-imported rows
    let open: Polygon<f64> = serde_json::from_value(serde_json::json!({
        "exterior": [
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 1.0, y: 0.0 },
            coord! { x: 1.0, y: 1.0 },
            coord! { x: 0.0, y: 1.0 },
        ],
        "interiors": [],
    }))
    .unwrap();
    let result = Geofence::new(Uuid::new_v4(), open.into(), Confidence::High);
    assert_eq!(result.unwrap_err().code, crate::error::INVALID_GEOMETRY_CODE);
}

#[test]
fn degraded_geometries_never_contain() {
    let point_geom: Geometry<f64> = geo_types::Point::new(-46.6338, -23.5510).into();
    let fence = Geofence::new(Uuid::new_v4(), point_geom, Confidence::Low).unwrap();

    assert!(!fence.containment_eligible());
    assert!(!fence.contains(&GeoPoint::new(-23.5510, -46.6338).unwrap()));
    assert_eq!(fence.coverage(), 0.0);
}

#[test]
fn boundary_points_count_as_contained() {
    // power-of-two half side keeps the edge coordinates exact in f64
    let center = GeoPoint::new(-23.5, -46.5).unwrap();
    let fence = Geofence::new(Uuid::new_v4(), square(center, 0.25), Confidence::High).unwrap();

    assert!(fence.contains(&center));
    // exactly on the eastern edge
    assert!(fence.contains(&GeoPoint::new(-23.5, -46.25).unwrap()));
    // corner point
    assert!(fence.contains(&GeoPoint::new(-23.25, -46.25).unwrap()));
    assert!(!fence.contains(&GeoPoint::new(-23.5, -46.0).unwrap()));
    assert!(!fence.is_verified);
}
