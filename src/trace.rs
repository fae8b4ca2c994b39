use geo::Geometry;
use tracing::debug;

use crate::dataset::{Dataset, Feature, Provenance};

/// Gives every feature the `<stem>_<index>` traceability id. Ids carried
/// over from the input file are replaced.
pub fn inject_ids(dataset: &mut Dataset) {
    let mut replaced = 0;
    for (index, feature) in dataset.features.iter_mut().enumerate() {
        let provenance = Provenance::new(dataset.name.clone(), index);
        let id = provenance.traceability_id();
        if !feature.id.is_empty() && feature.id != id {
            replaced += 1;
        }
        feature.provenance = provenance;
        feature.id = id;
    }
    debug!(dataset = %dataset.name, replaced, "injected traceability ids");
}

/// Splits every multi-polygon into one feature per part, with ids
/// `<id>-p<part>`. Other features pass through unchanged.
pub fn explode_multipart(dataset: Dataset) -> Dataset {
    let Dataset {
        name,
        crs,
        schema,
        features,
    } = dataset;

    let mut exploded = Vec::with_capacity(features.len());
    for feature in features {
        match feature.geometry {
            Some(Geometry::MultiPolygon(multi)) => {
                for (part, polygon) in multi.0.into_iter().enumerate() {
                    exploded.push(Feature {
                        id: format!("{}-p{}", feature.id, part),
                        provenance: feature.provenance.with_part(part),
                        geometry: Some(Geometry::Polygon(polygon)),
                        attributes: feature.attributes.clone(),
                    });
                }
            }
            geometry => exploded.push(Feature { geometry, ..feature }),
        }
    }

    debug!(dataset = %name, features = exploded.len(), "exploded multi-part features");
    Dataset {
        name,
        crs,
        schema,
        features: exploded,
    }
}
