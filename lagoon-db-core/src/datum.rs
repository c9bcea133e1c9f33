//! Datum - immutable query-language value
//!
//! The object carried by a `DATUM` leaf in a parsed term tree. Composite
//! payloads are `Arc`-shared so cloning a datum never deep-copies.
//!
//! ## Ordering of object members
//!
//! Object members are kept in a `BTreeMap`, so member order is canonical and
//! equality is structural. This matches the language semantics: object key
//! order is never significant.
//!
//! ## Pseudo-types
//!
//! A small number of language values are encoded as tagged objects under the
//! reserved key [`PSEUDO_TYPE_KEY`]. This module only constructs the `TIME`
//! pseudo-type (see [`time_now`]); interpretation is the evaluator's job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Reserved object key marking a pseudo-typed value.
pub const PSEUDO_TYPE_KEY: &str = "$lagoon_type$";

/// Pseudo-type tag for time values.
pub const TIME_PSEUDO_TYPE: &str = "TIME";

/// Immutable query-language value.
///
/// Serializes as plain JSON (`#[serde(untagged)]`), so the datum model and
/// the wire encoding cannot drift apart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    /// JSON null
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value; always a finite double
    Num(f64),
    /// String value (cheap clones)
    Str(Arc<str>),
    /// Ordered array of datums
    Array(Arc<[Datum]>),
    /// Object with canonically ordered members
    Object(Arc<BTreeMap<String, Datum>>),
}

/// Type tag of a datum, used in error messages and inspection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DatumType {
    Null,
    Bool,
    Num,
    Str,
    Array,
    Object,
}

impl DatumType {
    /// Wire-facing name of the type, as used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            DatumType::Null => "NULL",
            DatumType::Bool => "BOOL",
            DatumType::Num => "NUMBER",
            DatumType::Str => "STRING",
            DatumType::Array => "ARRAY",
            DatumType::Object => "OBJECT",
        }
    }
}

impl Datum {
    /// Create a string datum
    pub fn string(s: impl AsRef<str>) -> Self {
        Datum::Str(Arc::from(s.as_ref()))
    }

    /// Create an array datum
    pub fn array(items: impl Into<Vec<Datum>>) -> Self {
        Datum::Array(Arc::from(items.into()))
    }

    /// Create an object datum
    pub fn object(members: BTreeMap<String, Datum>) -> Self {
        Datum::Object(Arc::new(members))
    }

    /// Type tag of this datum
    pub fn datum_type(&self) -> DatumType {
        match self {
            Datum::Null => DatumType::Null,
            Datum::Bool(_) => DatumType::Bool,
            Datum::Num(_) => DatumType::Num,
            Datum::Str(_) => DatumType::Str,
            Datum::Array(_) => DatumType::Array,
            Datum::Object(_) => DatumType::Object,
        }
    }

    /// Boolean payload, if this is a BOOL datum
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric payload, if this is a NUMBER datum
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Datum::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// String payload, if this is a STRING datum
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Array payload, if this is an ARRAY datum
    pub fn as_array(&self) -> Option<&[Datum]> {
        match self {
            Datum::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Object payload, if this is an OBJECT datum
    pub fn as_object(&self) -> Option<&BTreeMap<String, Datum>> {
        match self {
            Datum::Object(members) => Some(members),
            _ => None,
        }
    }

    /// Whether this datum is null
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

/// Current wall-clock time as a `TIME` pseudo-typed object datum.
///
/// The term storage caches the first result so every `now()` inside one
/// query observes the same instant.
pub fn time_now() -> Datum {
    let now = chrono::Utc::now();
    let epoch = now.timestamp_millis() as f64 / 1000.0;
    let mut members = BTreeMap::new();
    members.insert(
        PSEUDO_TYPE_KEY.to_string(),
        Datum::string(TIME_PSEUDO_TYPE),
    );
    members.insert("epoch_time".to_string(), Datum::Num(epoch));
    members.insert("timezone".to_string(), Datum::string("+00:00"));
    Datum::object(members)
}
