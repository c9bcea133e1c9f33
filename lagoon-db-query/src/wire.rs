//! Legacy typed wire record for term trees.
//!
//! Pre-latest cluster versions ship a whole tree as one self-describing
//! record: a tag, an optional datum payload, and recursively nested args and
//! optargs. The record mirrors the in-memory tree exactly, so conversion in
//! either direction is a structural walk.
//!
//! References never appear on the wire; converting a tree that contains them
//! writes their targets in their place.

use crate::term::TermRef;
use crate::term_type::TermType;
use lagoon_db_core::Datum;
use serde::{Deserialize, Serialize};

/// One node of the legacy record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireTerm {
    /// Wire tag of the operator (`DATUM` for leaves).
    #[serde(rename = "type")]
    pub term_type: i32,

    /// Leaf payload; present exactly when `term_type` is `DATUM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<Datum>,

    /// Positional arguments, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<WireTerm>,

    /// Named optional arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optargs: Vec<WireOptarg>,
}

/// One optarg of a [`WireTerm`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireOptarg {
    pub key: String,
    pub val: WireTerm,
}

impl WireTerm {
    /// Snapshot a parsed term as a wire record, resolving references.
    pub fn from_term(term: TermRef<'_>) -> Self {
        let term = term.resolve();
        if let Some(datum) = term.datum() {
            return WireTerm {
                term_type: TermType::Datum.wire_tag(),
                datum: Some(datum.clone()),
                args: Vec::new(),
                optargs: Vec::new(),
            };
        }
        WireTerm {
            term_type: term.term_type().wire_tag(),
            datum: None,
            args: term.args().map(WireTerm::from_term).collect(),
            optargs: term
                .optargs()
                .map(|(key, val)| WireOptarg {
                    key: key.to_string(),
                    val: WireTerm::from_term(val),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TermStorage;
    use serde_json::json;

    #[test]
    fn test_record_round_trips_as_json() {
        let record = WireTerm {
            term_type: TermType::Add.wire_tag(),
            datum: None,
            args: vec![WireTerm {
                term_type: TermType::Datum.wire_tag(),
                datum: Some(Datum::Num(1.0)),
                args: Vec::new(),
                optargs: Vec::new(),
            }],
            optargs: vec![WireOptarg {
                key: "index".to_string(),
                val: WireTerm {
                    term_type: TermType::Datum.wire_tag(),
                    datum: Some(Datum::string("id")),
                    args: Vec::new(),
                    optargs: Vec::new(),
                },
            }],
        };
        let bytes = serde_json::to_vec(&record).unwrap();
        let back: WireTerm = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_from_term_resolves_references() {
        let mut storage = TermStorage::new();
        storage.add_global_optargs(&json!({"a": 1})).unwrap();
        let (_, func) = storage.global_optargs().next().unwrap();
        let record = WireTerm::from_term(func);
        assert_eq!(record.term_type, TermType::Func.wire_tag());
        // The wrapped value arrives as a plain DATUM node, not a reference.
        assert_eq!(record.args.len(), 2);
        assert_eq!(record.args[1].term_type, TermType::Datum.wire_tag());
        assert_eq!(record.args[1].datum, Some(Datum::Num(1.0)));
    }
}
