use std::collections::HashMap;

use geo::{Area, Coord, Geometry, MapCoords};
use proj4rs::Proj;

use crate::config::M2_PER_HECTARE;
use crate::geometry;

const WGS84_LONLAT: &str = "+proj=longlat +datum=WGS84 +no_defs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtmZone {
    pub number: i32,
    pub south: bool,
}

impl UtmZone {
    pub fn for_lonlat(lon: f64, lat: f64) -> Self {
        Self {
            number: ((lon + 180.0) / 6.0).floor() as i32 + 1,
            south: lat < 0.0,
        }
    }

    fn proj_string(&self) -> String {
        let south = if self.south { " +south" } else { "" };
        format!(
            "+proj=utm +zone={}{} +datum=WGS84 +units=m +no_defs",
            self.number, south
        )
    }
}

/// Computes areas in hectares by reprojecting into the UTM zone of each
/// geometry's centroid. Zone projections are built once and reused.
pub struct AreaCalculator {
    source: Option<Proj>,
    zones: HashMap<UtmZone, Option<Proj>>,
}

impl Default for AreaCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl AreaCalculator {
    pub fn new() -> Self {
        Self {
            source: Proj::from_proj_string(WGS84_LONLAT).ok(),
            zones: HashMap::new(),
        }
    }

    /// Returns `None` when the centroid is missing or out of bounds, or when
    /// the projection fails. The caller's geometry is never modified.
    pub fn area_hectares(&mut self, geometry: &Geometry<f64>) -> Option<f64> {
        let centroid = geometry::centroid(geometry)?;
        let (lon, lat) = (centroid.x(), centroid.y());
        if !geometry::in_geographic_bounds(lon, lat) {
            return None;
        }

        let zone = UtmZone::for_lonlat(lon, lat);
        let target = self
            .zones
            .entry(zone)
            .or_insert_with(|| Proj::from_proj_string(&zone.proj_string()).ok())
            .as_ref()?;
        let source = self.source.as_ref()?;

        let projected = geometry
            .try_map_coords(|c: Coord<f64>| {
                let mut point = (c.x.to_radians(), c.y.to_radians(), 0.0);
                proj4rs::transform::transform(source, target, &mut point)?;
                Ok::<_, proj4rs::errors::Error>(Coord {
                    x: point.0,
                    y: point.1,
                })
            })
            .ok()?;

        let hectares = projected.unsigned_area() / M2_PER_HECTARE;
        hectares.is_finite().then_some(hectares)
    }
}

pub fn area_hectares(geometry: &Geometry<f64>) -> Option<f64> {
    AreaCalculator::new().area_hectares(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon, LineString, Polygon};

    fn box_degrees(min_lon: f64, min_lat: f64, d_lon: f64, d_lat: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: min_lon, y: min_lat),
            (x: min_lon + d_lon, y: min_lat),
            (x: min_lon + d_lon, y: min_lat + d_lat),
            (x: min_lon, y: min_lat + d_lat),
        ])
    }

    fn assert_within(actual: f64, expected: f64, tolerance: f64) {
        let drift = (actual - expected).abs() / expected;
        assert!(drift < tolerance, "{actual} vs {expected} ({drift:.4})");
    }

    #[test]
    fn zone_from_longitude() {
        assert_eq!(UtmZone::for_lonlat(3.0, 45.0), UtmZone { number: 31, south: false });
        assert_eq!(UtmZone::for_lonlat(-180.0, -1.0), UtmZone { number: 1, south: true });
        assert_eq!(UtmZone::for_lonlat(-0.5, 0.0).number, 30);
    }

    #[test]
    fn one_degree_box_at_equator() {
        // ~12,308 km2
        let area = area_hectares(&box_degrees(2.5, 0.0, 1.0, 1.0)).unwrap();
        assert_within(area, 1_230_800.0, 0.01);
    }

    #[test]
    fn one_hectare_box() {
        let area = area_hectares(&box_degrees(3.0, 0.0, 100.0 / 111_320.0, 100.0 / 110_574.0))
            .unwrap();
        assert_within(area, 1.0, 0.01);
        assert_eq!(format!("{area:.2}"), "1.00");
    }

    #[test]
    fn southern_hemisphere_box() {
        let area = area_hectares(&box_degrees(-47.5, -1.0, 1.0, 1.0)).unwrap();
        assert_within(area, 1_230_600.0, 0.01);
    }

    #[test]
    fn point_has_zero_area() {
        let area = area_hectares(&Geometry::Point(point!(x: 10.0, y: 10.0))).unwrap();
        assert_eq!(area, 0.0);
    }

    #[test]
    fn out_of_bounds_centroid_fails() {
        assert!(area_hectares(&box_degrees(200.0, 10.0, 1.0, 1.0)).is_none());
    }

    #[test]
    fn input_geometry_is_untouched() {
        let original = box_degrees(2.0, 48.0, 0.01, 0.01);
        let copy = original.clone();
        let mut calculator = AreaCalculator::new();
        calculator.area_hectares(&original).unwrap();
        assert_eq!(original, copy);
    }

    #[test]
    fn empty_polygon_has_no_centroid() {
        let empty = Geometry::Polygon(Polygon::new(LineString::new(vec![]), vec![]));
        assert!(area_hectares(&empty).is_none());
    }
}
