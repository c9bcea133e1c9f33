//! JSON → datum bridge
//!
//! The single authoritative conversion from a parsed JSON value to the
//! immutable [`Datum`] model. Used by the query parser for `DATUM` leaves and
//! bare scalars, and by the wire codecs when decoding embedded values.
//!
//! Conversion is structural: JSON null/bool/number/string/array/object map to
//! the corresponding datum variants. Numbers must be representable as finite
//! doubles; arrays and objects are bounded by [`TermLimits`].

use crate::datum::Datum;
use crate::error::{Error, Result};
use crate::limits::TermLimits;
use serde_json::Value;
use std::collections::BTreeMap;

/// Wire-facing name of a JSON value's type, as used in parse error messages.
pub fn json_typestr(v: &Value) -> &'static str {
    match v {
        Value::Null => "NULL",
        Value::Bool(_) => "BOOL",
        Value::Number(_) => "NUMBER",
        Value::String(_) => "STRING",
        Value::Array(_) => "ARRAY",
        Value::Object(_) => "OBJECT",
    }
}

/// Convert a JSON value into a datum, enforcing `limits`.
pub fn to_datum(v: &Value, limits: &TermLimits) -> Result<Datum> {
    match v {
        Value::Null => Ok(Datum::Null),
        Value::Bool(b) => Ok(Datum::Bool(*b)),
        Value::Number(n) => {
            let d = n.as_f64().ok_or_else(|| Error::bad_number(n.to_string()))?;
            if !d.is_finite() {
                return Err(Error::bad_number(n.to_string()));
            }
            Ok(Datum::Num(d))
        }
        Value::String(s) => Ok(Datum::string(s)),
        Value::Array(items) => {
            if items.len() > limits.array_size_limit() {
                return Err(Error::ArrayOverSizeLimit(limits.array_size_limit()));
            }
            let converted: Result<Vec<Datum>> =
                items.iter().map(|item| to_datum(item, limits)).collect();
            Ok(Datum::array(converted?))
        }
        Value::Object(members) => {
            if members.len() > limits.array_size_limit() {
                return Err(Error::ArrayOverSizeLimit(limits.array_size_limit()));
            }
            let mut converted = BTreeMap::new();
            for (key, val) in members {
                converted.insert(key.clone(), to_datum(val, limits)?);
            }
            Ok(Datum::object(converted))
        }
    }
}
