use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use geo::{Geometry, HasDimensions};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{AREA_FIELD, MIN_AREA_HA_FOR_POLYGON};
use crate::dataset::{Feature, Provenance};
use crate::error::Result;
use crate::geometry;
use crate::io;
use crate::layout::OutputLayout;
use crate::report::DetailLedger;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionResult {
    pub converted_count: usize,
    pub failed_identifiers: Vec<String>,
}

#[derive(Debug, Default)]
struct GroupOutcome {
    converted: Vec<String>,
    failed: Vec<String>,
}

impl GroupOutcome {
    fn all_failed(ids: &[String]) -> Self {
        Self {
            converted: Vec::new(),
            failed: ids.to_vec(),
        }
    }
}

/// Turns candidate polygons into centroid points, moving them from a
/// dataset's candidate store to its valid store.
///
/// Requests for the same dataset stem are serialized; different stems may
/// convert concurrently from several threads sharing one engine.
pub struct ConversionEngine {
    layout: OutputLayout,
    stem_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    ledger_lock: Mutex<()>,
}

impl ConversionEngine {
    pub fn new(layout: OutputLayout) -> Self {
        Self {
            layout,
            stem_locks: Mutex::new(HashMap::new()),
            ledger_lock: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    fn stem_lock(&self, stem: &str) -> Arc<Mutex<()>> {
        let mut locks = self.stem_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(stem.to_string()).or_default().clone()
    }

    /// Groups ids by dataset stem. The detail ledger knows the dataset of
    /// every id it reported; anything else, or everything when the ledger
    /// cannot be read, falls back to parsing the id.
    fn group(&self, identifiers: &[String]) -> BTreeMap<String, Vec<String>> {
        let ledger = match DetailLedger::load(&self.layout.detail_ledger()) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!(error = %e, "detailed report unreadable, deriving datasets from ids");
                DetailLedger::default()
            }
        };
        let mut seen = HashSet::new();
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for id in identifiers {
            if !seen.insert(id.as_str()) {
                continue;
            }
            let stem = match ledger.dataset_of(id) {
                Some(stem) => stem.to_string(),
                None => {
                    debug!(%id, "id not in ledger, deriving dataset from id");
                    Provenance::legacy_stem(id)
                }
            };
            groups.entry(stem).or_default().push(id.clone());
        }
        groups
    }

    /// Converts the given candidates. Per-id and ledger problems are logged
    /// and reported in the result, which always reflects what was moved.
    #[instrument(skip_all, fields(requested = identifiers.len()))]
    pub fn convert(&self, identifiers: &[String]) -> Result<ConversionResult> {
        let mut result = ConversionResult::default();
        let mut converted = HashSet::new();

        for (stem, ids) in self.group(identifiers) {
            let lock = self.stem_lock(&stem);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

            let outcome = self.convert_group(&stem, &ids);
            result.converted_count += outcome.converted.len();
            result.failed_identifiers.extend(outcome.failed);
            converted.extend(outcome.converted);
        }

        if !converted.is_empty() {
            self.reconcile_ledger(&converted);
        }

        info!(
            converted = result.converted_count,
            failed = result.failed_identifiers.len(),
            "conversion finished"
        );
        Ok(result)
    }

    /// Marks converted rows in the detail ledger. The stores are already
    /// committed at this point, so failures are logged and not returned.
    fn reconcile_ledger(&self, converted: &HashSet<String>) {
        let _guard = self.ledger_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.layout.detail_ledger();
        let mut ledger = match DetailLedger::load(&path) {
            Ok(ledger) => ledger,
            Err(e) => {
                error!(error = %e, "failed to read detailed report, converted rows not marked");
                return;
            }
        };
        let updated = ledger.mark_converted(converted);
        match ledger.save(&path) {
            Ok(()) => debug!(updated, "updated detailed report"),
            Err(e) => error!(error = %e, "failed to update detailed report"),
        }
    }

    fn convert_group(&self, stem: &str, ids: &[String]) -> GroupOutcome {
        let candidate_path = self.layout.candidate_store(stem);
        let valid_path = self.layout.valid_store(stem);

        if !candidate_path.is_file() {
            error!(path = %candidate_path.display(), "candidate store not found");
            return GroupOutcome::all_failed(ids);
        }
        let existing_valid = if valid_path.is_file() {
            match io::read_store(&valid_path, stem) {
                Ok(features) => features,
                Err(e) => {
                    error!(error = %e, "failed to read valid store");
                    return GroupOutcome::all_failed(ids);
                }
            }
        } else {
            Vec::new()
        };
        let candidates = match io::read_store(&candidate_path, stem) {
            Ok(features) => features,
            Err(e) => {
                error!(error = %e, "failed to read candidate store");
                return GroupOutcome::all_failed(ids);
            }
        };

        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut outcome = GroupOutcome::default();
        let mut remaining = Vec::with_capacity(candidates.len());
        let mut points = Vec::new();

        for feature in candidates {
            if !wanted.contains(feature.id.as_str()) {
                remaining.push(feature);
                continue;
            }
            match to_point(&feature) {
                Some(point) => {
                    outcome.converted.push(point.id.clone());
                    points.push(point);
                }
                None => {
                    warn!(id = %feature.id, "candidate has no usable centroid");
                    outcome.failed.push(feature.id.clone());
                    remaining.push(feature);
                }
            }
        }

        for id in ids {
            if !outcome.converted.contains(id) && !outcome.failed.contains(id) {
                warn!(%id, "not found in candidate store");
                outcome.failed.push(id.clone());
            }
        }

        if points.is_empty() {
            return outcome;
        }

        let mut valid = existing_valid.clone();
        valid.extend(points);
        if let Err(e) = self.commit(stem, &valid, &remaining, &existing_valid) {
            error!(error = %e, "failed to write converted features");
            let GroupOutcome { converted, mut failed } = outcome;
            failed.extend(converted);
            return GroupOutcome {
                converted: Vec::new(),
                failed,
            };
        }
        outcome
    }

    /// Stages both stores before touching either. If the candidate store
    /// cannot be replaced after the valid store was, the valid store is
    /// restored.
    fn commit(
        &self,
        stem: &str,
        valid: &[Feature],
        remaining: &[Feature],
        previous_valid: &[Feature],
    ) -> Result<()> {
        let valid_path = self.layout.valid_store(stem);
        let candidate_path = self.layout.candidate_store(stem);
        let valid_name = format!("{stem}_valid");

        let staged_valid = io::stage_collection(&valid_path, &valid_name, valid)?;
        let staged_candidates =
            io::stage_collection(&candidate_path, &format!("{stem}_candidates"), remaining)?;

        io::commit(staged_valid, &valid_path)?;
        if let Err(e) = io::commit(staged_candidates, &candidate_path) {
            if let Err(restore) = io::write_collection(&valid_path, &valid_name, previous_valid) {
                error!(error = %restore, "failed to restore valid store");
            }
            return Err(e);
        }
        Ok(())
    }
}

/// The feature with its geometry replaced by its centroid.
fn to_point(feature: &Feature) -> Option<Feature> {
    let geometry = feature.geometry.as_ref().filter(|g| !g.is_empty())?;
    let centroid = geometry::centroid(geometry)?;

    let mut attributes = feature.attributes.clone();
    if let Some(area) = attributes.get_mut(AREA_FIELD) {
        *area = Value::from(MIN_AREA_HA_FOR_POLYGON);
    }
    Some(Feature {
        geometry: Some(Geometry::Point(centroid)),
        attributes,
        ..feature.clone()
    })
}
