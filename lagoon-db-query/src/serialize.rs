//! Versioned binary codecs for term trees.
//!
//! Inter-node messages carry a cluster-version tag out of band; the tag
//! selects how an embedded term tree is encoded:
//!
//! - **Pre-latest versions** frame the whole tree as one length-prefixed
//!   legacy record (see [`crate::wire`]).
//! - **The latest version** streams the tree node by node: `i32` type tag,
//!   `u32` backtrace id, then either the datum payload (for `DATUM` leaves)
//!   or the arg/optarg counts and bodies. Optargs interleave a
//!   length-prefixed name before each child.
//!
//! All integers are little-endian. Writers always emit the latest version;
//! decoders recurse depth-first in the same order writers do, so declared
//! counts are verified by construction. References never reach the wire:
//! a reference serializes as its target, keeping the format tree-shaped.
//!
//! Failures are typed [`ArchiveError`] values; no partial tree is surfaced
//! to callers (nodes appended to the storage before a failure are dropped
//! with it).

use crate::backtrace::BacktraceId;
use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::TermStorage;
use crate::term::{TermId, TermRef};
use crate::term_type::TermType;
use crate::wire::WireTerm;
use lagoon_db_core::Datum;
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// On-wire encoding generations, oldest first.
///
/// The tag travels out of band in the cluster handshake; every message on a
/// connection uses the version negotiated there.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClusterVersion {
    V1_0,
    V1_1,
    V1_2,
    V2_0,
    /// Current encoding; the authoritative format.
    V2_1,
}

impl ClusterVersion {
    pub const LATEST: ClusterVersion = ClusterVersion::V2_1;

    pub fn is_latest(self) -> bool {
        self == Self::LATEST
    }
}

// ============================================================================
// Primitive helpers
// ============================================================================

fn write_i32(w: &mut impl Write, v: i32) -> ArchiveResult<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_u32(w: &mut impl Write, v: u32) -> ArchiveResult<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_f64(w: &mut impl Write, v: f64) -> ArchiveResult<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_count(w: &mut impl Write, count: usize) -> ArchiveResult<()> {
    let count = u32::try_from(count).map_err(|_| ArchiveError::Range(count as i64))?;
    write_u32(w, count)
}

fn write_str(w: &mut impl Write, s: &str) -> ArchiveResult<()> {
    write_count(w, s.len())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_i32(r: &mut impl Read) -> ArchiveResult<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u32(r: &mut impl Read) -> ArchiveResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64(r: &mut impl Read) -> ArchiveResult<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_str(r: &mut impl Read, what: &'static str) -> ArchiveResult<String> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| ArchiveError::InvalidUtf8(what))
}

// ============================================================================
// Datum encoding
// ============================================================================

const DATUM_NULL: u8 = 0;
const DATUM_BOOL: u8 = 1;
const DATUM_NUM: u8 = 2;
const DATUM_STR: u8 = 3;
const DATUM_ARRAY: u8 = 4;
const DATUM_OBJECT: u8 = 5;

fn write_datum(w: &mut impl Write, d: &Datum) -> ArchiveResult<()> {
    match d {
        Datum::Null => w.write_all(&[DATUM_NULL])?,
        Datum::Bool(b) => w.write_all(&[DATUM_BOOL, *b as u8])?,
        Datum::Num(n) => {
            w.write_all(&[DATUM_NUM])?;
            write_f64(w, *n)?;
        }
        Datum::Str(s) => {
            w.write_all(&[DATUM_STR])?;
            write_str(w, s)?;
        }
        Datum::Array(items) => {
            w.write_all(&[DATUM_ARRAY])?;
            write_count(w, items.len())?;
            for item in items.iter() {
                write_datum(w, item)?;
            }
        }
        Datum::Object(members) => {
            w.write_all(&[DATUM_OBJECT])?;
            write_count(w, members.len())?;
            for (key, val) in members.iter() {
                write_str(w, key)?;
                write_datum(w, val)?;
            }
        }
    }
    Ok(())
}

fn read_datum(r: &mut impl Read) -> ArchiveResult<Datum> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)?;
    match tag[0] {
        DATUM_NULL => Ok(Datum::Null),
        DATUM_BOOL => {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            Ok(Datum::Bool(b[0] != 0))
        }
        DATUM_NUM => Ok(Datum::Num(read_f64(r)?)),
        DATUM_STR => Ok(Datum::string(read_str(r, "string datum")?)),
        DATUM_ARRAY => {
            let count = read_u32(r)? as usize;
            let mut items = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                items.push(read_datum(r)?);
            }
            Ok(Datum::array(items))
        }
        DATUM_OBJECT => {
            let count = read_u32(r)? as usize;
            let mut members = BTreeMap::new();
            for _ in 0..count {
                let key = read_str(r, "object key")?;
                members.insert(key, read_datum(r)?);
            }
            Ok(Datum::object(members))
        }
        other => Err(ArchiveError::UnknownDatumTag(other)),
    }
}

// ============================================================================
// Term tree codecs
// ============================================================================

/// Encode a term tree in the latest cluster version.
///
/// References are written as their targets, so the output is always a tree.
pub fn serialize_term_tree(w: &mut impl Write, term: TermRef<'_>) -> ArchiveResult<()> {
    let term = term.resolve();
    write_i32(w, term.term_type().wire_tag())?;
    write_u32(w, term.backtrace().as_u32())?;

    if let Some(datum) = term.datum() {
        return write_datum(w, datum);
    }

    write_count(w, term.num_args())?;
    for arg in term.args() {
        serialize_term_tree(w, arg)?;
    }
    write_count(w, term.num_optargs())?;
    for (name, val) in term.optargs() {
        write_str(w, name)?;
        serialize_term_tree(w, val)?;
    }
    Ok(())
}

/// Decode a term tree into `storage`, dispatching on the negotiated version.
pub fn deserialize_term_tree(
    r: &mut impl Read,
    storage: &mut TermStorage,
    version: ClusterVersion,
) -> ArchiveResult<TermId> {
    if version.is_latest() {
        deserialize_latest(r, storage)
    } else {
        deserialize_legacy(r, storage)
    }
}

fn deserialize_latest(r: &mut impl Read, storage: &mut TermStorage) -> ArchiveResult<TermId> {
    let tag = read_i32(r)?;
    let bt = BacktraceId::from_u32(read_u32(r)?);
    let op = TermType::from_wire(tag).ok_or(ArchiveError::UnknownTermType(tag))?;

    if op == TermType::Datum {
        let datum = read_datum(r)?;
        return Ok(storage.new_datum(datum, bt));
    }

    let res = storage.new_term(op, bt);
    let num_args = read_u32(r)? as usize;
    let mut args = Vec::with_capacity(num_args.min(4096));
    for _ in 0..num_args {
        args.push(deserialize_latest(r, storage)?);
    }
    storage.set_args(res, args);

    let num_optargs = read_u32(r)? as usize;
    let mut optargs = Vec::with_capacity(num_optargs.min(4096));
    for _ in 0..num_optargs {
        let name = read_str(r, "optarg name")?;
        let child = deserialize_latest(r, storage)?;
        storage.set_optarg_name(child, &name);
        optargs.push(child);
    }
    storage.set_optargs(res, optargs);
    Ok(res)
}

/// Pre-latest framing: `i32` byte length, then the legacy record.
fn deserialize_legacy(r: &mut impl Read, storage: &mut TermStorage) -> ArchiveResult<TermId> {
    let size = read_i32(r)?;
    if size < 0 {
        return Err(ArchiveError::Range(size as i64));
    }
    let mut data = vec![0u8; size as usize];
    r.read_exact(&mut data)?;
    let record: WireTerm =
        serde_json::from_slice(&data).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    storage.parse_wire_term(&record)
}

/// Frame a legacy record the way pre-latest versions expect it.
///
/// New code never emits legacy trees; this exists for talking down to peers
/// that have not finished upgrading, and for exercising the legacy decoder.
pub fn write_wire_record(w: &mut impl Write, record: &WireTerm) -> ArchiveResult<()> {
    let data = serde_json::to_vec(record).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    let size = i32::try_from(data.len()).map_err(|_| ArchiveError::Range(data.len() as i64))?;
    write_i32(w, size)?;
    w.write_all(&data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: serde_json::Value) -> (TermStorage, TermId) {
        let mut storage = TermStorage::new();
        let root = storage.add_root(&v).unwrap();
        (storage, root)
    }

    fn assert_trees_equal(a: TermRef<'_>, b: TermRef<'_>) {
        assert_eq!(a.term_type(), b.term_type());
        assert_eq!(a.datum(), b.datum());
        assert_eq!(a.num_args(), b.num_args());
        assert_eq!(a.num_optargs(), b.num_optargs());
        for (left, right) in a.args().zip(b.args()) {
            assert_trees_equal(left, right);
        }
        let mut left_optargs: Vec<_> = a.optargs().collect();
        let mut right_optargs: Vec<_> = b.optargs().collect();
        left_optargs.sort_by_key(|(name, _)| name.to_string());
        right_optargs.sort_by_key(|(name, _)| name.to_string());
        for ((ln, lv), (rn, rv)) in left_optargs.into_iter().zip(right_optargs) {
            assert_eq!(ln, rn);
            assert_trees_equal(lv, rv);
        }
    }

    #[test]
    fn test_latest_round_trip() {
        let (storage, root) = parse(json!([39, [[15, [[14, ["test"]], "users"]]], {
            "default": [1, true]
        }]));
        let mut buf = Vec::new();
        serialize_term_tree(&mut buf, storage.term(root)).unwrap();

        let mut decoded = TermStorage::new();
        let got =
            deserialize_term_tree(&mut buf.as_slice(), &mut decoded, ClusterVersion::LATEST)
                .unwrap();
        assert_trees_equal(storage.term(root), decoded.term(got));
    }

    #[test]
    fn test_latest_preserves_backtraces() {
        let (storage, root) = parse(json!([24, [[1, 1], [1, 2]]]));
        let mut buf = Vec::new();
        serialize_term_tree(&mut buf, storage.term(root)).unwrap();

        let mut decoded = TermStorage::new();
        let got =
            deserialize_term_tree(&mut buf.as_slice(), &mut decoded, ClusterVersion::LATEST)
                .unwrap();
        let orig_bts: Vec<_> = storage.term(root).args().map(|t| t.backtrace()).collect();
        let got_bts: Vec<_> = decoded.term(got).args().map(|t| t.backtrace()).collect();
        assert_eq!(orig_bts, got_bts);
    }

    #[test]
    fn test_short_read_is_io_error() {
        let (storage, root) = parse(json!([24, [[1, 1], [1, 2]]]));
        let mut buf = Vec::new();
        serialize_term_tree(&mut buf, storage.term(root)).unwrap();
        buf.truncate(buf.len() - 3);

        let mut decoded = TermStorage::new();
        let err =
            deserialize_term_tree(&mut buf.as_slice(), &mut decoded, ClusterVersion::LATEST)
                .unwrap_err();
        assert!(matches!(err, ArchiveError::Io(_)));
    }

    #[test]
    fn test_unknown_term_type_tag() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 9999).unwrap();
        write_u32(&mut buf, 0).unwrap();
        let mut decoded = TermStorage::new();
        let err =
            deserialize_term_tree(&mut buf.as_slice(), &mut decoded, ClusterVersion::LATEST)
                .unwrap_err();
        assert!(matches!(err, ArchiveError::UnknownTermType(9999)));
    }

    #[test]
    fn test_legacy_round_trip() {
        let (storage, root) = parse(json!([38, [[2, [[1, 1], [1, 2]]], [69, [[1, []], [1, 3]]]]]));
        let record = WireTerm::from_term(storage.term(root));
        let mut buf = Vec::new();
        write_wire_record(&mut buf, &record).unwrap();

        let mut decoded = TermStorage::new();
        let got = deserialize_term_tree(&mut buf.as_slice(), &mut decoded, ClusterVersion::V1_2)
            .unwrap();
        assert_trees_equal(storage.term(root), decoded.term(got));
    }

    #[test]
    fn test_legacy_negative_length() {
        let mut buf = Vec::new();
        write_i32(&mut buf, -5).unwrap();
        let mut decoded = TermStorage::new();
        let err = deserialize_term_tree(&mut buf.as_slice(), &mut decoded, ClusterVersion::V1_0)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Range(-5)));
    }

    #[test]
    fn test_legacy_corrupt_record() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 4).unwrap();
        buf.extend_from_slice(b"!!!!");
        let mut decoded = TermStorage::new();
        let err = deserialize_term_tree(&mut buf.as_slice(), &mut decoded, ClusterVersion::V2_0)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt(_)));
    }

    #[test]
    fn test_datum_codec_covers_all_shapes() {
        let mut members = BTreeMap::new();
        members.insert("k".to_string(), Datum::Null);
        members.insert("v".to_string(), Datum::Bool(true));
        let d = Datum::array(vec![
            Datum::Num(-1.5),
            Datum::string("s"),
            Datum::object(members),
        ]);
        let mut buf = Vec::new();
        write_datum(&mut buf, &d).unwrap();
        let got = read_datum(&mut buf.as_slice()).unwrap();
        assert_eq!(d, got);
    }

    #[test]
    fn test_references_serialize_as_targets() {
        let mut storage = TermStorage::new();
        storage.add_global_optargs(&json!({"a": 42})).unwrap();
        let (_, func) = storage.global_optargs().next().unwrap();

        let mut buf = Vec::new();
        serialize_term_tree(&mut buf, func).unwrap();

        let mut decoded = TermStorage::new();
        let got =
            deserialize_term_tree(&mut buf.as_slice(), &mut decoded, ClusterVersion::LATEST)
                .unwrap();
        // No node in the decoded storage is a reference.
        for term in decoded.terms() {
            assert!(term.ref_target().is_none());
        }
        let body = decoded.term(got).args().nth(1).unwrap();
        assert_eq!(body.datum().unwrap().as_num(), Some(42.0));
    }
}
