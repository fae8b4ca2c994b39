use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use geo::Geometry;
use geojson::{FeatureCollection, GeoJson};
use serde_json::{json, Map, Value};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::ID_FIELD_NAME;
use crate::dataset::{Crs, Dataset, Feature, Provenance};
use crate::error::{Error, Result};
use crate::layout::{Bucket, OutputLayout};

/// File extensions that are opened as datasets.
pub const DATASET_TRIGGERS: [&str; 2] = ["geojson", "json"];

pub fn is_dataset_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| DATASET_TRIGGERS.iter().any(|t| t.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub fn dataset_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

pub fn read_collection(path: &Path) -> Result<FeatureCollection> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let geojson = GeoJson::from_reader(BufReader::new(file))
        .map_err(|e| Error::geojson(path, e.into()))?;

    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(Error::NotFeatureCollection(path.to_path_buf())),
    }
}

/// Converts a GeoJSON feature. Geometries that cannot be represented are
/// treated as missing so the feature still reaches review.
pub fn feature_from_geojson(feature: geojson::Feature, provenance: Provenance) -> Feature {
    let geometry = feature
        .geometry
        .and_then(|g| Geometry::<f64>::try_from(&g.value).ok());
    let mut attributes = feature.properties.unwrap_or_default();
    let id = match attributes.remove(ID_FIELD_NAME) {
        Some(Value::String(id)) => id,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    Feature {
        id,
        provenance,
        geometry,
        attributes,
    }
}

pub fn feature_to_geojson(feature: &Feature) -> geojson::Feature {
    let mut properties = feature.attributes.clone();
    properties.insert(ID_FIELD_NAME.to_string(), Value::String(feature.id.clone()));

    geojson::Feature {
        bbox: None,
        geometry: feature
            .geometry
            .as_ref()
            .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Opens a GeoJSON file as a dataset named after the file stem.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    if !is_dataset_path(path) {
        return Err(Error::UnsupportedFormat(path.to_path_buf()));
    }
    let stem = dataset_stem(path);
    let fc = read_collection(path)?;
    let crs = Crs::from_member(fc.foreign_members.as_ref().and_then(|m| m.get("crs")));
    debug!(path = %path.display(), features = fc.features.len(), %crs, "loaded dataset");

    let features = fc
        .features
        .into_iter()
        .enumerate()
        .map(|(i, f)| feature_from_geojson(f, Provenance::new(stem.clone(), i)))
        .collect();

    Ok(Dataset::new(stem, crs, features))
}

fn collection_members(name: &str) -> Map<String, Value> {
    let mut members = Map::new();
    members.insert("name".to_string(), Value::String(name.to_string()));
    members.insert(
        "crs".to_string(),
        json!({ "type": "name", "properties": { "name": Crs::Wgs84.to_string() } }),
    );
    members
}

/// Serializes `value` to a temporary file beside `path`. The caller decides
/// when to move it into place.
pub fn stage_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<NamedTempFile> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush().map_err(|e| Error::io(path, e))?;
    }
    Ok(tmp)
}

pub fn commit(staged: NamedTempFile, path: &Path) -> Result<()> {
    staged.persist(path).map_err(|e| Error::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    commit(stage_json(path, value)?, path)
}

pub fn stage_collection(path: &Path, name: &str, features: &[Feature]) -> Result<NamedTempFile> {
    let collection = FeatureCollection {
        bbox: None,
        features: features.iter().map(feature_to_geojson).collect(),
        foreign_members: Some(collection_members(name)),
    };
    stage_json(path, &collection)
}

/// Writes a feature collection with `name` and a CRS84 `crs` member.
pub fn write_collection(path: &Path, name: &str, features: &[Feature]) -> Result<()> {
    commit(stage_collection(path, name, features)?, path)
}

/// Reads back a store written by [`write_collection`].
pub fn read_features(path: &Path) -> Result<Vec<Feature>> {
    let stem = dataset_stem(path);
    Ok(read_collection(path)?
        .features
        .into_iter()
        .enumerate()
        .map(|(i, f)| feature_from_geojson(f, Provenance::new(stem.clone(), i)))
        .collect())
}

/// Reads one dataset's store, rebuilding provenance from the ids.
pub fn read_store(path: &Path, stem: &str) -> Result<Vec<Feature>> {
    Ok(read_collection(path)?
        .features
        .into_iter()
        .enumerate()
        .map(|(i, f)| {
            let mut feature = feature_from_geojson(f, Provenance::new(stem, i));
            if let Some(provenance) = Provenance::parse(stem, &feature.id) {
                feature.provenance = provenance;
            }
            feature
        })
        .collect())
}

/// Looks a feature up by traceability id in one of a dataset's stores. A
/// store that was never written holds nothing.
pub fn find_feature(
    layout: &OutputLayout,
    bucket: Bucket,
    stem: &str,
    id: &str,
) -> Result<Option<Feature>> {
    let path = layout.store(bucket, stem);
    if !path.is_file() {
        return Ok(None);
    }
    Ok(read_store(&path, stem)?.into_iter().find(|f| f.id == id))
}
