/// Type Normalization Module
///
/// Maps driver-reported column descriptions (`int(10) unsigned`,
/// `varchar(255)`, `utf8mb4_general_ci`, ...) onto a small portable model.
/// Every function here is total: empty or unrecognized input yields a default
/// value instead of an error.

use crate::core::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

static LENGTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d+)\)").unwrap());
static CURRENT_TS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)CURRENT_(TIME|DATE)").unwrap());
static INDEX_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\A(pri|uni|key|mul)").unwrap());

/// Portable column type taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Bool,
    Integer,
    Float,
    String,
    DateTime,
    Date,
    Time,
    Binary,
    Blob,
    Set,
    Geometry,
    Json,
    Unknown,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::String => "string",
            TypeTag::DateTime => "datetime",
            TypeTag::Date => "date",
            TypeTag::Time => "time",
            TypeTag::Binary => "binary",
            TypeTag::Blob => "blob",
            TypeTag::Set => "set",
            TypeTag::Geometry => "geometry",
            TypeTag::Json => "json",
            TypeTag::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized column default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnDefault {
    None,
    /// Literal default as reported by the driver
    Literal(String),
    /// Any `CURRENT_TIMESTAMP` / `CURRENT_DATE` style default
    CurrentTimestamp,
}

impl ColumnDefault {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnDefault::None => None,
            ColumnDefault::Literal(s) => Some(s),
            ColumnDefault::CurrentTimestamp => Some("current_timestamp"),
        }
    }
}

/// Classifies a driver type string.
///
/// The checks run in a fixed order and the first match wins; several
/// patterns overlap (`bit`/`tinyint(1)` against `int`, `datetime` against
/// `date`), so the order is part of the contract.
pub fn normalize_type(raw: &str) -> TypeTag {
    let t = raw.trim().to_lowercase();

    if (t.starts_with("tinyint") && t.contains("(1)"))
        || t.starts_with("bool")
        || t.starts_with("bit")
    {
        TypeTag::Bool
    } else if t.contains("int") || t.starts_with("year") {
        TypeTag::Integer
    } else if t.contains("float")
        || t.contains("decimal")
        || t.contains("double")
        || t.starts_with("dec")
    {
        TypeTag::Float
    } else if t.contains("char") || t.contains("text") {
        TypeTag::String
    } else if t.starts_with("timestamp") || t.starts_with("datetime") {
        TypeTag::DateTime
    } else if t.starts_with("date") {
        TypeTag::Date
    } else if t.starts_with("time") {
        TypeTag::Time
    } else if t.contains("binary") {
        TypeTag::Binary
    } else if t.contains("blob") {
        TypeTag::Blob
    } else if t.contains("enum") || t.starts_with("set") {
        TypeTag::Set
    } else if t.contains("geometry")
        || t.contains("point")
        || t.contains("polygon")
        || t.contains("linestring")
    {
        TypeTag::Geometry
    } else if t.contains("json") {
        TypeTag::Json
    } else {
        TypeTag::Unknown
    }
}

/// Extracts the first parenthesized length, e.g. `varchar(64)` -> 64.
pub fn normalize_length(raw: &str) -> Option<u32> {
    LENGTH_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn normalize_unsigned(raw: &str) -> bool {
    raw.to_lowercase().contains("unsigned")
}

/// Maps `CURRENT_TIMESTAMP`-style defaults, found either in the default value
/// or in the extra field (`on update CURRENT_TIMESTAMP`), to a sentinel.
pub fn normalize_default(default: Option<&str>, extra: Option<&str>) -> ColumnDefault {
    let is_current = |s: Option<&str>| s.map_or(false, |s| CURRENT_TS_RE.is_match(s));

    if is_current(default) || is_current(extra) {
        ColumnDefault::CurrentTimestamp
    } else {
        match default {
            Some(value) => ColumnDefault::Literal(value.to_string()),
            None => ColumnDefault::None,
        }
    }
}

/// Derives the character set from a collation name:
/// `utf8mb4_general_ci` -> `utf8`, `latin1_swedish_ci` -> `latin1`.
pub fn normalize_charset(collation: &str) -> Option<String> {
    let lower = collation.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    let charset = match lower.find('_') {
        Some(pos) => &lower[..pos],
        None => lower.as_str(),
    };
    let charset = charset.replace("mb4", "");

    if charset.is_empty() {
        None
    } else {
        Some(charset)
    }
}

/// `Null` field of a column listing: `NO` means the column is required.
pub fn normalize_require(null: &str) -> bool {
    null.trim().eq_ignore_ascii_case("no")
}

pub fn normalize_primary(key: &str) -> bool {
    key.trim().to_lowercase().starts_with("pri")
}

/// True when the key field names any index kind (`PRI`, `UNI`, `MUL`, `KEY`).
pub fn normalize_index(key: &str) -> bool {
    INDEX_KEY_RE.is_match(key.trim())
}

pub fn normalize_auto_increment(extra: &str) -> bool {
    extra.trim().to_lowercase().starts_with("auto_incr")
}

/// Decodes a catalog comment using the declared charset.
///
/// Text values are already decoded by the driver. Raw bytes are read as
/// latin1 when that is the declared charset, otherwise as (lossy) UTF-8.
pub fn decode_text(value: &Value, charset: Option<&str>) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bytes(bytes) => {
            let decoded = match charset {
                Some("latin1") => bytes.iter().map(|&b| char::from(b)).collect(),
                _ => String::from_utf8_lossy(bytes).into_owned(),
            };
            Some(decoded).filter(|s: &String| !s.is_empty())
        }
        other => other.as_text().filter(|s| !s.is_empty()),
    }
}
