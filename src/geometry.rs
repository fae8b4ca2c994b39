use geo::{
    Buffer, Centroid, Coord, CoordsIter, Geometry, HasDimensions, MultiPolygon, Point, Polygon,
    Simplify, Validation,
};

/// Base geometry type of a feature, ignoring dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    Collection,
}

impl GeometryKind {
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => Self::Point,
            Geometry::MultiPoint(_) => Self::MultiPoint,
            Geometry::Line(_) | Geometry::LineString(_) => Self::LineString,
            Geometry::MultiLineString(_) => Self::MultiLineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => Self::Polygon,
            Geometry::MultiPolygon(_) => Self::MultiPolygon,
            Geometry::GeometryCollection(_) => Self::Collection,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::MultiPoint => "MultiPoint",
            Self::LineString => "LineString",
            Self::MultiLineString => "MultiLineString",
            Self::Polygon => "Polygon",
            Self::MultiPolygon => "MultiPolygon",
            Self::Collection => "GeometryCollection",
        }
    }

    pub fn is_linear(self) -> bool {
        matches!(self, Self::LineString | Self::MultiLineString)
    }
}

pub fn is_missing(geometry: Option<&Geometry<f64>>) -> bool {
    geometry.map_or(true, |g| g.is_empty())
}

pub fn in_geographic_bounds(lon: f64, lat: f64) -> bool {
    (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)
}

/// First vertex outside lon/lat bounds, walking parts and rings depth-first.
pub fn first_vertex_out_of_range(geometry: &Geometry<f64>) -> Option<Coord<f64>> {
    geometry
        .coords_iter()
        .find(|c| !in_geographic_bounds(c.x, c.y))
}

/// Repairs an invalid geometry by buffering it with zero distance.
///
/// Returns `None` when the buffer collapses to nothing or is still invalid.
/// A single-part result is returned as a plain polygon.
pub fn repair(geometry: &Geometry<f64>) -> Option<Geometry<f64>> {
    let buffered: MultiPolygon<f64> = geometry.buffer(0.0);
    if buffered.is_empty() || !buffered.is_valid() {
        return None;
    }

    let mut parts = buffered.0;
    if parts.len() == 1 {
        parts.pop().map(Geometry::Polygon)
    } else {
        Some(Geometry::MultiPolygon(MultiPolygon::new(parts)))
    }
}

/// Douglas-Peucker simplification with `tolerance` in degrees.
///
/// Rings are simplified independently, so the result is kept only when it
/// is still a valid polygon; otherwise the input is returned unchanged.
pub fn simplify_polygon(polygon: &Polygon<f64>, tolerance: f64) -> Polygon<f64> {
    let simplified = polygon.simplify(tolerance);
    if simplified.is_valid() {
        simplified
    } else {
        polygon.clone()
    }
}

pub fn centroid(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    geometry.centroid()
}
