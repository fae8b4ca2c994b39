use std::fmt;
use std::path::Path;

use geo::Geometry;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::area::AreaCalculator;
use crate::attributes::{self, AttributeStatus};
use crate::classifier::{classify, Action, Verdict};
use crate::config::{PartitionConfig, AREA_FIELD, MIN_AREA_HA_FOR_POLYGON, QA_ISSUE_FIELD};
use crate::dataset::{Crs, Dataset, Feature};
use crate::error::Result;
use crate::geometry::GeometryKind;
use crate::io;
use crate::layout::OutputLayout;
use crate::report::{ActionTaken, DetailRow, FinalStatus, PartitionStats};

const AREA_FAILED: &str = "Could not calculate area";

/// Destination for the features of one bucket.
pub trait FeatureSink {
    fn push(&mut self, feature: Feature) -> Result<()>;
}

impl FeatureSink for Vec<Feature> {
    fn push(&mut self, feature: Feature) -> Result<()> {
        Vec::push(self, feature);
        Ok(())
    }
}

/// In-memory bucket that is written out as one GeoJSON collection.
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    name: String,
    features: Vec<Feature>,
}

impl FeatureStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        io::write_collection(path, &self.name, &self.features)
    }
}

impl FeatureSink for FeatureStore {
    fn push(&mut self, feature: Feature) -> Result<()> {
        self.features.push(feature);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionResult {
    pub stats: PartitionStats,
    pub rows: Vec<DetailRow>,
    /// Dataset-level rollup of the attribute audit.
    pub attribute_summary: &'static str,
}

/// Why a whole dataset was kept out of partitioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetRejection {
    WrongEpsg(Crs),
}

impl fmt::Display for DatasetRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetRejection::WrongEpsg(_) => write!(f, "EPSG is not 4326"),
        }
    }
}

pub fn is_wgs84_dataset(dataset: &Dataset) -> bool {
    dataset.crs.is_wgs84()
}

pub fn gate(dataset: &Dataset) -> std::result::Result<(), DatasetRejection> {
    if is_wgs84_dataset(dataset) {
        Ok(())
    } else {
        Err(DatasetRejection::WrongEpsg(dataset.crs.clone()))
    }
}

struct Router<'a> {
    dataset: &'a Dataset,
    stats: PartitionStats,
    rows: Vec<DetailRow>,
    audits: Vec<AttributeStatus>,
}

impl Router<'_> {
    fn row(
        &mut self,
        feature: &Feature,
        status: FinalStatus,
        action: ActionTaken,
        reason: String,
        attribute_status: String,
    ) {
        debug!(id = %feature.id, %status, ?action, %reason, "routed feature");
        self.rows.push(DetailRow {
            dataset: self.dataset.name.clone(),
            identifier: feature.id.clone(),
            final_status: status,
            action_taken: action,
            reason,
            attribute_status,
        });
    }

    fn review(
        &mut self,
        sink: &mut dyn FeatureSink,
        feature: &Feature,
        geometry: Option<Geometry<f64>>,
        reason: String,
        action: Option<Action>,
        attribute_status: String,
    ) -> Result<()> {
        self.stats.review += 1;
        let mut attributes = feature.attributes.clone();
        attributes.insert(QA_ISSUE_FIELD.to_string(), Value::String(reason.clone()));
        sink.push(Feature {
            geometry,
            attributes,
            ..feature.clone()
        })?;
        self.row(
            feature,
            FinalStatus::RequiresReview,
            ActionTaken::from_action(action, ActionTaken::Segregated),
            reason,
            attribute_status,
        );
        Ok(())
    }
}

/// Routes every feature of `dataset` into exactly one of the three sinks.
///
/// The dataset is expected to have passed [`gate`] already. Feature-level
/// problems never fail the call; only a sink error does.
#[instrument(skip_all, fields(dataset = %dataset.name))]
pub fn partition(
    dataset: &Dataset,
    valid: &mut dyn FeatureSink,
    review: &mut dyn FeatureSink,
    candidates: &mut dyn FeatureSink,
    config: &PartitionConfig,
) -> Result<PartitionResult> {
    let mut router = Router {
        dataset,
        stats: PartitionStats::default(),
        rows: Vec::with_capacity(dataset.features.len()),
        audits: Vec::with_capacity(dataset.features.len()),
    };
    let mut calculator = AreaCalculator::new();
    let fill_area = !dataset.schema.contains(AREA_FIELD);

    for feature in &dataset.features {
        router.stats.total += 1;
        let audit = attributes::audit(feature);
        let attribute_status = audit.to_string();
        router.audits.push(audit);

        let verdict = classify(feature.geometry.as_ref(), config.autofix, config.simplify);
        if verdict.action() == Some(Action::AutoFixed) {
            router.stats.autofixed += 1;
        }

        let (geometry, action) = match verdict {
            Verdict::Rejected { reason, action } => {
                router.review(
                    review,
                    feature,
                    feature.geometry.clone(),
                    reason.to_string(),
                    action,
                    attribute_status,
                )?;
                continue;
            }
            Verdict::Accepted { geometry, action } => (geometry, action),
        };

        let Some(hectares) = calculator.area_hectares(&geometry) else {
            router.review(
                review,
                feature,
                Some(geometry),
                AREA_FAILED.to_string(),
                action,
                attribute_status,
            )?;
            continue;
        };

        let is_candidate = config.identify_candidates
            && GeometryKind::of(&geometry) == GeometryKind::Polygon
            && hectares < MIN_AREA_HA_FOR_POLYGON;

        if is_candidate {
            router.stats.candidates += 1;
            candidates.push(Feature {
                geometry: Some(geometry),
                ..feature.clone()
            })?;
            router.row(
                feature,
                FinalStatus::Candidate,
                ActionTaken::from_action(action, ActionTaken::Identified),
                format!("Area is {hectares:.2} ha (< 4ha)"),
                attribute_status,
            );
        } else {
            router.stats.valid_large += 1;
            let mut attributes = feature.attributes.clone();
            if fill_area {
                attributes.insert(AREA_FIELD.to_string(), Value::from(hectares));
            }
            valid.push(Feature {
                geometry: Some(geometry),
                attributes,
                ..feature.clone()
            })?;
            router.row(
                feature,
                FinalStatus::Valid,
                ActionTaken::from_action(action, ActionTaken::None),
                "Valid".to_string(),
                attribute_status,
            );
        }
    }

    let stats = router.stats;
    info!(
        total = stats.total,
        valid = stats.valid_large,
        review = stats.review,
        candidates = stats.candidates,
        autofixed = stats.autofixed,
        "partitioned dataset"
    );
    Ok(PartitionResult {
        stats,
        rows: router.rows,
        attribute_summary: attributes::summarize(&router.audits),
    })
}

/// Partitions `dataset` into the three stores of `layout` and writes them.
pub fn partition_into(
    dataset: &Dataset,
    layout: &OutputLayout,
    config: &PartitionConfig,
) -> Result<PartitionResult> {
    let stem = dataset.name.as_str();
    let mut valid = FeatureStore::new(format!("{stem}_valid"));
    let mut review = FeatureStore::new(format!("{stem}_review"));
    let mut candidates = FeatureStore::new(format!("{stem}_candidates"));

    let result = partition(dataset, &mut valid, &mut review, &mut candidates, config)?;

    valid.persist(&layout.valid_store(stem))?;
    review.persist(&layout.review_store(stem))?;
    candidates.persist(&layout.candidate_store(stem))?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Provenance;
    use geo::{line_string, point, polygon, Validation};
    use serde_json::json;

    const M_PER_DEG_LAT: f64 = 110_574.0;
    const M_PER_DEG_LON_EQ: f64 = 111_320.0;

    /// Square of roughly `hectares` just north of the equator at lon 3.
    fn plot(hectares: f64) -> Geometry<f64> {
        let side = (hectares * 10_000.0).sqrt();
        let (dx, dy) = (side / M_PER_DEG_LON_EQ, side / M_PER_DEG_LAT);
        Geometry::Polygon(polygon![
            (x: 3.0, y: 0.1),
            (x: 3.0 + dx, y: 0.1),
            (x: 3.0 + dx, y: 0.1 + dy),
            (x: 3.0, y: 0.1 + dy),
        ])
    }

    fn dataset(geometries: Vec<Option<Geometry<f64>>>, attributes: serde_json::Value) -> Dataset {
        let attributes = attributes.as_object().cloned().unwrap_or_default();
        let features = geometries
            .into_iter()
            .enumerate()
            .map(|(i, geometry)| {
                let provenance = Provenance::new("plots", i);
                Feature {
                    id: provenance.traceability_id(),
                    provenance,
                    geometry,
                    attributes: attributes.clone(),
                }
            })
            .collect();
        Dataset::new("plots", Crs::Wgs84, features)
    }

    fn run(dataset: &Dataset, config: PartitionConfig) -> (PartitionResult, [Vec<Feature>; 3]) {
        let mut valid: Vec<Feature> = Vec::new();
        let mut review: Vec<Feature> = Vec::new();
        let mut candidates: Vec<Feature> = Vec::new();
        let result = partition(dataset, &mut valid, &mut review, &mut candidates, &config).unwrap();
        (result, [valid, review, candidates])
    }

    #[test]
    fn every_feature_lands_in_exactly_one_bucket() {
        let ds = dataset(
            vec![
                Some(plot(10.0)),
                Some(plot(1.0)),
                None,
                Some(Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)])),
                Some(Geometry::Point(point!(x: 3.0, y: 0.1))),
            ],
            json!({}),
        );
        let (result, [valid, review, candidates]) = run(&ds, PartitionConfig::default());

        assert_eq!(
            result.stats,
            PartitionStats {
                total: 5,
                valid_large: 2,
                review: 2,
                autofixed: 0,
                candidates: 1,
            }
        );
        assert_eq!(valid.len() + review.len() + candidates.len(), 5);
        assert_eq!(result.rows.len(), 5);

        let statuses: Vec<_> = result.rows.iter().map(|r| r.final_status).collect();
        assert_eq!(
            statuses,
            [
                FinalStatus::Valid,
                FinalStatus::Candidate,
                FinalStatus::RequiresReview,
                FinalStatus::RequiresReview,
                FinalStatus::Valid,
            ]
        );
    }

    #[test]
    fn small_polygon_reason_and_toggle() {
        let ds = dataset(vec![Some(plot(1.0))], json!({}));
        let config = PartitionConfig {
            simplify: false,
            ..PartitionConfig::default()
        };

        let (result, [_, _, candidates]) = run(&ds, config);
        assert_eq!(candidates.len(), 1);
        assert_eq!(result.rows[0].reason, "Area is 1.00 ha (< 4ha)");
        assert_eq!(result.rows[0].action_taken, ActionTaken::Identified);

        let config = PartitionConfig {
            identify_candidates: false,
            ..config
        };
        let (result, [valid, _, candidates]) = run(&ds, config);
        assert!(candidates.is_empty());
        assert_eq!(valid.len(), 1);
        assert_eq!(result.rows[0].final_status, FinalStatus::Valid);
        assert_eq!(result.rows[0].action_taken, ActionTaken::None);
    }

    #[test]
    fn review_features_carry_the_issue() {
        let ds = dataset(vec![None], json!({ "ProducerName": "A" }));
        let (result, [_, review, _]) = run(&ds, PartitionConfig::default());

        assert_eq!(review[0].attributes[QA_ISSUE_FIELD], "Missing or empty geometry");
        assert_eq!(result.rows[0].action_taken, ActionTaken::Segregated);
        assert_eq!(
            result.rows[0].attribute_status,
            "Not included; OK; Not included; Not included"
        );
    }

    #[test]
    fn antimeridian_point_goes_to_review() {
        // lon 180 falls in zone 61, which has no projection
        let ds = dataset(vec![Some(Geometry::Point(point!(x: 180.0, y: 0.0)))], json!({}));
        let (result, [_, review, _]) = run(&ds, PartitionConfig::default());

        assert_eq!(result.stats.review, 1);
        assert_eq!(result.rows[0].reason, AREA_FAILED);
        assert_eq!(result.rows[0].action_taken, ActionTaken::Segregated);
        assert_eq!(review[0].geometry, ds.features[0].geometry);
    }

    #[test]
    fn valid_features_get_an_area_field() {
        let ds = dataset(vec![Some(plot(10.0))], json!({ "ProducerName": "A" }));
        let (_, [valid, _, _]) = run(&ds, PartitionConfig::default());
        let area = valid[0].attributes[AREA_FIELD].as_f64().unwrap();
        assert!((area - 10.0).abs() < 0.2, "{area}");

        let ds = dataset(vec![Some(plot(10.0))], json!({ "Area": 7 }));
        let (_, [valid, _, _]) = run(&ds, PartitionConfig::default());
        assert_eq!(valid[0].attributes[AREA_FIELD], 7);
    }

    #[test]
    fn repaired_feature_is_counted_as_autofixed() {
        let outside_hole = Geometry::Polygon(geo::Polygon::new(
            line_string![(x: 3.0, y: 0.1), (x: 3.01, y: 0.1), (x: 3.01, y: 0.11), (x: 3.0, y: 0.11), (x: 3.0, y: 0.1)],
            vec![line_string![(x: 3.05, y: 0.15), (x: 3.05, y: 0.16), (x: 3.06, y: 0.16), (x: 3.06, y: 0.15), (x: 3.05, y: 0.15)]],
        ));
        let ds = dataset(vec![Some(outside_hole)], json!({}));
        let (result, [valid, _, _]) = run(&ds, PartitionConfig::default());

        assert_eq!(result.stats.autofixed, 1);
        assert_eq!(result.rows[0].action_taken, ActionTaken::AutoFixed);
        assert_eq!(valid.len(), 1);
    }

    #[test]
    fn holes_left_by_repair_send_the_feature_to_review() {
        // overlapping holes repair into one hole, which is still rejected
        let overlapping_holes = Geometry::Polygon(geo::Polygon::new(
            line_string![(x: 3.0, y: 0.1), (x: 3.01, y: 0.1), (x: 3.01, y: 0.11), (x: 3.0, y: 0.11), (x: 3.0, y: 0.1)],
            vec![
                line_string![(x: 3.002, y: 0.102), (x: 3.005, y: 0.102), (x: 3.005, y: 0.105), (x: 3.002, y: 0.105), (x: 3.002, y: 0.102)],
                line_string![(x: 3.004, y: 0.104), (x: 3.007, y: 0.104), (x: 3.007, y: 0.107), (x: 3.004, y: 0.107), (x: 3.004, y: 0.104)],
            ],
        ));
        assert!(!overlapping_holes.is_valid());
        let ds = dataset(vec![Some(overlapping_holes)], json!({}));
        let (result, [valid, review, candidates]) = run(&ds, PartitionConfig::default());

        assert!(valid.is_empty() && candidates.is_empty());
        assert_eq!(review.len(), 1);
        assert_eq!(result.stats.autofixed, 1);
        assert_eq!(result.stats.review, 1);
        assert_eq!(result.rows[0].final_status, FinalStatus::RequiresReview);
        assert_eq!(result.rows[0].action_taken, ActionTaken::AutoFixed);
        assert_eq!(result.rows[0].reason, "Polygon with holes not supported");
        assert_eq!(review[0].attributes[QA_ISSUE_FIELD], "Polygon with holes not supported");
    }

    #[test]
    fn gate_rejects_projected_datasets() {
        let mut ds = dataset(vec![], json!({}));
        assert!(gate(&ds).is_ok());
        ds.crs = Crs::Epsg(3857);
        let rejection = gate(&ds).unwrap_err();
        assert_eq!(rejection.to_string(), "EPSG is not 4326");
    }
}
