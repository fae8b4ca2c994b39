use std::fmt;

use serde_json::Value;

use crate::dataset::Feature;

/// Optional regulatory fields, in report order.
pub const OPTIONAL_FIELDS: [&str; 4] = ["ProductionPlace", "ProducerName", "ProducerCountry", "Area"];

const VALID_ISO2_CODES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX", "AZ",
    "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS",
    "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN",
    "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE",
    "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF",
    "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM",
    "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM",
    "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC",
    "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK",
    "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA",
    "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG",
    "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW",
    "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS",
    "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO",
    "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

pub fn is_iso2_country(code: &str) -> bool {
    let upper = code.to_ascii_uppercase();
    VALID_ISO2_CODES.binary_search(&upper.as_str()).is_ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStatus {
    Ok,
    NotIncluded,
    InvalidValue(String),
    InvalidDataType,
}

impl fmt::Display for FieldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldStatus::Ok => write!(f, "OK"),
            FieldStatus::NotIncluded => write!(f, "Not included"),
            FieldStatus::InvalidValue(value) => write!(f, "Invalid value: '{value}'"),
            FieldStatus::InvalidDataType => write!(f, "Invalid data type"),
        }
    }
}

/// Status of every optional field of one feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeStatus(pub Vec<FieldStatus>);

impl AttributeStatus {
    pub fn all_ok(&self) -> bool {
        self.0.iter().all(|s| *s == FieldStatus::Ok)
    }

    pub fn has_invalid(&self) -> bool {
        self.0
            .iter()
            .any(|s| matches!(s, FieldStatus::InvalidValue(_) | FieldStatus::InvalidDataType))
    }
}

impl fmt::Display for AttributeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, status) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{status}")?;
        }
        Ok(())
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn check_field(name: &str, value: Option<&Value>) -> FieldStatus {
    let Some(value) = value else {
        return FieldStatus::NotIncluded;
    };
    match name {
        "ProducerCountry" => match value {
            Value::String(code) if is_iso2_country(code) => FieldStatus::Ok,
            other => FieldStatus::InvalidValue(display_value(other)),
        },
        "Area" if value.is_number() => FieldStatus::Ok,
        "Area" => FieldStatus::InvalidDataType,
        _ => FieldStatus::Ok,
    }
}

pub fn audit(feature: &Feature) -> AttributeStatus {
    AttributeStatus(
        OPTIONAL_FIELDS
            .iter()
            .map(|name| check_field(name, feature.attributes.get(*name)))
            .collect(),
    )
}

pub const SUMMARY_ALL_VALID: &str = "All optional attributes valid";
pub const SUMMARY_ISSUES: &str = "Attribute issues found";
pub const SUMMARY_NOT_INCLUDED: &str = "Some attributes not included";

/// Dataset-level rollup of per-feature statuses.
pub fn summarize(statuses: &[AttributeStatus]) -> &'static str {
    if statuses.is_empty() {
        "N/A"
    } else if statuses.iter().all(AttributeStatus::all_ok) {
        SUMMARY_ALL_VALID
    } else if statuses.iter().any(AttributeStatus::has_invalid) {
        SUMMARY_ISSUES
    } else {
        SUMMARY_NOT_INCLUDED
    }
}
