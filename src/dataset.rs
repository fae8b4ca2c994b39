use std::fmt;

use geo::Geometry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Attributes = Map<String, Value>;

/// Where a feature came from: its dataset stem, its position in the source
/// file, and the part index when it was split out of a multi-part geometry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub dataset: String,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<usize>,
}

impl Provenance {
    pub fn new(dataset: impl Into<String>, index: usize) -> Self {
        Self {
            dataset: dataset.into(),
            index,
            part: None,
        }
    }

    pub fn with_part(&self, part: usize) -> Self {
        Self {
            part: Some(part),
            ..self.clone()
        }
    }

    /// Traceability id in the `<stem>_<index>[-p<part>]` scheme.
    pub fn traceability_id(&self) -> String {
        match self.part {
            Some(part) => format!("{}_{}-p{}", self.dataset, self.index, part),
            None => format!("{}_{}", self.dataset, self.index),
        }
    }

    /// Rebuilds provenance from an id known to belong to `stem`.
    pub fn parse(stem: &str, id: &str) -> Option<Self> {
        let rest = id.strip_prefix(stem)?.strip_prefix('_')?;
        let (index, part) = match rest.split_once("-p") {
            Some((index, part)) => (index, Some(part.parse().ok()?)),
            None => (rest, None),
        };
        Some(Self {
            dataset: stem.to_string(),
            index: index.parse().ok()?,
            part,
        })
    }

    /// Dataset stem recovered from the id string alone. Ambiguous when the
    /// stem itself contains `_` followed by digits or `-p`.
    pub fn legacy_stem(id: &str) -> String {
        let without_index = match id.rsplit_once('_') {
            Some((head, _)) => head,
            None => "",
        };
        match without_index.split_once("-p") {
            Some((stem, _)) => stem.to_string(),
            None => without_index.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: String,
    pub provenance: Provenance,
    pub geometry: Option<Geometry<f64>>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Crs {
    /// OGC CRS84, or no `crs` member at all.
    Wgs84,
    Epsg(u32),
    Named(String),
}

const CRS84_NAMES: [&str; 3] = [
    "urn:ogc:def:crs:OGC:1.3:CRS84",
    "urn:ogc:def:crs:OGC::CRS84",
    "CRS84",
];

impl Crs {
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if CRS84_NAMES.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return Crs::Wgs84;
        }
        let code = name
            .strip_prefix("EPSG:")
            .or_else(|| name.strip_prefix("urn:ogc:def:crs:EPSG::"))
            .and_then(|c| c.parse().ok());
        match code {
            Some(code) => Crs::Epsg(code),
            None => Crs::Named(name.to_string()),
        }
    }

    /// Reads the legacy GeoJSON `crs` member; only named CRS objects are understood.
    pub fn from_member(member: Option<&Value>) -> Self {
        let Some(member) = member else {
            return Crs::Wgs84;
        };
        match member.pointer("/properties/name").and_then(Value::as_str) {
            Some(name) if member.get("type").and_then(Value::as_str) == Some("name") => {
                Crs::from_name(name)
            }
            _ => Crs::Named(member.to_string()),
        }
    }

    pub fn is_wgs84(&self) -> bool {
        matches!(self, Crs::Wgs84 | Crs::Epsg(4326))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Wgs84 => write!(f, "{}", CRS84_NAMES[0]),
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Named(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Real,
    Boolean,
    Unknown,
}

impl FieldKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => FieldKind::String,
            Value::Number(n) if n.is_f64() => FieldKind::Real,
            Value::Number(_) => FieldKind::Integer,
            Value::Bool(_) => FieldKind::Boolean,
            _ => FieldKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered attribute fields shared by every feature of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub fields: Vec<FieldDef>,
}

impl Schema {
    /// Union of all attribute names in order of first appearance. A field's
    /// kind comes from its first non-null value.
    pub fn infer<'a>(attributes: impl IntoIterator<Item = &'a Attributes>) -> Self {
        let mut schema = Schema::default();
        for attrs in attributes {
            for (name, value) in attrs {
                match schema.fields.iter_mut().find(|f| f.name == *name) {
                    Some(field) if field.kind == FieldKind::Unknown => {
                        field.kind = FieldKind::of(value);
                    }
                    Some(_) => {}
                    None => schema.fields.push(FieldDef {
                        name: name.clone(),
                        kind: FieldKind::of(value),
                    }),
                }
            }
        }
        schema
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Reorders `attributes` to schema order, filling absent fields with null.
    pub fn normalize(&self, attributes: &mut Attributes) {
        let mut normalized = Map::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = attributes.remove(&field.name).unwrap_or(Value::Null);
            normalized.insert(field.name.clone(), value);
        }
        normalized.append(attributes);
        *attributes = normalized;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub crs: Crs,
    pub schema: Schema,
    pub features: Vec<Feature>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, crs: Crs, mut features: Vec<Feature>) -> Self {
        let schema = Schema::infer(features.iter().map(|f| &f.attributes));
        for feature in &mut features {
            schema.normalize(&mut feature.attributes);
        }
        Self {
            name: name.into(),
            crs,
            schema,
            features,
        }
    }
}
