use std::fmt;

use geo::{Geometry, Validation};

use crate::config::SIMPLIFY_TOLERANCE;
use crate::geometry::{self, GeometryKind};

/// What the classifier did to an accepted geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    AutoFixed,
    Simplified,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::AutoFixed => write!(f, "Auto-fixed"),
            Action::Simplified => write!(f, "Simplified"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    MissingGeometry,
    UnsupportedType(GeometryKind),
    Invalid,
    Unfixable,
    PolygonWithHoles,
    CoordinateOutOfRange { lon: f64, lat: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingGeometry => write!(f, "Missing or empty geometry"),
            RejectReason::UnsupportedType(kind) if kind.is_linear() => {
                write!(f, "Invalid geometry type (LineString)")
            }
            RejectReason::UnsupportedType(kind) => {
                write!(f, "Invalid geometry type ({})", kind.name())
            }
            RejectReason::Invalid => write!(f, "Invalid geometry"),
            RejectReason::Unfixable => write!(f, "Invalid geometry (unfixable)"),
            RejectReason::PolygonWithHoles => write!(f, "Polygon with holes not supported"),
            RejectReason::CoordinateOutOfRange { lon, lat } => {
                write!(f, "Invalid coordinate range: [{lon:.5}, {lat:.5}]")
            }
        }
    }
}

/// Outcome of classifying one geometry.
///
/// An accepted verdict owns the geometry to store downstream, which is the
/// repaired or simplified version whenever an action was applied. A rejection
/// keeps `AutoFixed` when the repaired geometry failed a later rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted {
        geometry: Geometry<f64>,
        action: Option<Action>,
    },
    Rejected {
        reason: RejectReason,
        action: Option<Action>,
    },
}

impl Verdict {
    pub fn accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }

    pub fn action(&self) -> Option<Action> {
        match self {
            Verdict::Accepted { action, .. } | Verdict::Rejected { action, .. } => *action,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Verdict::Accepted { .. } => "Valid".to_string(),
            Verdict::Rejected { reason, .. } => reason.to_string(),
        }
    }

    fn reject(reason: RejectReason, action: Option<Action>) -> Self {
        Verdict::Rejected { reason, action }
    }
}

pub fn classify(geometry: Option<&Geometry<f64>>, autofix: bool, simplify: bool) -> Verdict {
    let geometry = match geometry {
        Some(g) if !geometry::is_missing(Some(g)) => g,
        _ => return Verdict::reject(RejectReason::MissingGeometry, None),
    };

    let kind = GeometryKind::of(geometry);
    if kind.is_linear() || kind == GeometryKind::Collection {
        return Verdict::reject(RejectReason::UnsupportedType(kind), None);
    }

    let (geometry, action) = if geometry.is_valid() {
        (geometry.clone(), None)
    } else if !autofix {
        return Verdict::reject(RejectReason::Invalid, None);
    } else {
        match geometry::repair(geometry) {
            Some(repaired) => (repaired, Some(Action::AutoFixed)),
            None => return Verdict::reject(RejectReason::Unfixable, None),
        }
    };

    if let Geometry::Polygon(polygon) = &geometry {
        if !polygon.interiors().is_empty() {
            return Verdict::reject(RejectReason::PolygonWithHoles, action);
        }
    }

    if let Some(c) = geometry::first_vertex_out_of_range(&geometry) {
        return Verdict::reject(RejectReason::CoordinateOutOfRange { lon: c.x, lat: c.y }, action);
    }

    match geometry {
        Geometry::Polygon(polygon) if simplify && action.is_none() => Verdict::Accepted {
            geometry: Geometry::Polygon(geometry::simplify_polygon(&polygon, SIMPLIFY_TOLERANCE)),
            action: Some(Action::Simplified),
        },
        geometry => Verdict::Accepted { geometry, action },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon, LineString, MultiLineString, Polygon};

    fn square() -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 10.0, y: 10.0),
            (x: 10.01, y: 10.0),
            (x: 10.01, y: 10.01),
            (x: 10.0, y: 10.01),
        ])
    }

    #[test]
    fn missing_geometry_rejected_regardless_of_flags() {
        let empty = Geometry::Polygon(Polygon::new(LineString::new(vec![]), vec![]));
        for (autofix, simplify) in [(false, false), (true, false), (false, true), (true, true)] {
            for geometry in [None, Some(&empty)] {
                let verdict = classify(geometry, autofix, simplify);
                assert!(!verdict.accepted());
                assert_eq!(verdict.reason(), "Missing or empty geometry");
                assert_eq!(verdict.action(), None);
            }
        }
    }

    #[test]
    fn lines_are_rejected() {
        let line = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)]);
        let multi = Geometry::MultiLineString(MultiLineString::new(vec![line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 1.0)
        ]]));
        for geometry in [line, multi] {
            let verdict = classify(Some(&geometry), true, true);
            assert_eq!(verdict.reason(), "Invalid geometry type (LineString)");
        }
    }

    #[test]
    fn invalid_without_autofix() {
        let bowtie = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 2.0),
        ]);
        let verdict = classify(Some(&bowtie), false, false);
        assert_eq!(verdict.reason(), "Invalid geometry");

        let verdict = classify(Some(&bowtie), true, false);
        assert_eq!(verdict.reason(), "Invalid geometry (unfixable)");
        assert_eq!(verdict.action(), None);
    }

    #[test]
    fn autofix_replaces_geometry() {
        let broken = Geometry::Polygon(Polygon::new(
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)],
            vec![line_string![(x: 5.0, y: 5.0), (x: 5.0, y: 6.0), (x: 6.0, y: 6.0), (x: 6.0, y: 5.0), (x: 5.0, y: 5.0)]],
        ));
        let verdict = classify(Some(&broken), true, true);
        match verdict {
            Verdict::Accepted { geometry, action } => {
                assert_eq!(action, Some(Action::AutoFixed));
                assert!(geometry.is_valid());
                assert_ne!(geometry, broken);
            }
            other => panic!("expected repair, got {other:?}"),
        }
    }

    #[test]
    fn holes_are_not_supported() {
        let with_hole = Geometry::Polygon(Polygon::new(
            line_string![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0), (x: 0.0, y: 0.0)],
            vec![line_string![(x: 1.0, y: 1.0), (x: 1.0, y: 2.0), (x: 2.0, y: 2.0), (x: 2.0, y: 1.0), (x: 1.0, y: 1.0)]],
        ));
        let verdict = classify(Some(&with_hole), true, true);
        assert_eq!(verdict.reason(), "Polygon with holes not supported");
    }

    #[test]
    fn out_of_range_coordinate_reason_is_formatted() {
        let far = Geometry::Polygon(polygon![
            (x: 179.5, y: 10.0),
            (x: 181.123456, y: 10.0),
            (x: 180.5, y: 11.0),
        ]);
        let verdict = classify(Some(&far), true, false);
        assert_eq!(verdict.reason(), "Invalid coordinate range: [181.12346, 10.00000]");
    }

    #[test]
    fn simplify_marks_polygons_only() {
        let verdict = classify(Some(&square()), false, true);
        assert_eq!(verdict.action(), Some(Action::Simplified));

        let pt = Geometry::Point(point!(x: 10.0, y: 10.0));
        let verdict = classify(Some(&pt), false, true);
        assert!(verdict.accepted());
        assert_eq!(verdict.action(), None);
    }

    #[test]
    fn accepting_is_idempotent() {
        let first = classify(Some(&square()), true, false);
        let Verdict::Accepted { geometry, action: None } = first else {
            panic!("expected plain accept");
        };
        let second = classify(Some(&geometry), true, false);
        assert_eq!(second, Verdict::Accepted { geometry, action: None });
    }
}
