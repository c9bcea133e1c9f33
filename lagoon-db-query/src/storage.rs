//! Term storage - exclusive owner of all term nodes in one query.
//!
//! Parsing appends nodes to a flat arena; nodes address each other by
//! [`TermId`] and never move, so child lists stay valid for the storage's
//! lifetime. Teardown is a plain drop of the arena.
//!
//! Two ingest paths produce the same tree shape:
//!
//! - [`TermStorage::add_root`] / [`TermStorage::add_global_optargs`] parse the
//!   JSON wire encoding (`[tag, args, optargs]`, bare objects desugared to
//!   `MAKE_OBJ`, bare scalars to `DATUM` leaves);
//! - [`TermStorage::parse_wire_term`] accepts the typed record used by the
//!   legacy binary envelope.
//!
//! Nullary `now()` calls are rewritten to `DATUM` leaves carrying the cached
//! query start time, so `now()` is a constant throughout one query.

use crate::backtrace::{BacktraceId, BacktraceRegistry, Frame};
use crate::error::{ArchiveError, ArchiveResult, QueryError, Result};
use crate::minidriver::MiniDriver;
use crate::term::{OptargIter, RawTerm, TermId, TermKind, TermRef};
use crate::term_type::TermType;
use crate::wire::WireTerm;
use lagoon_db_core::{json_typestr, time_now, to_datum, Datum, TermLimits};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::trace;

fn expect_array<'a>(v: &'a Value, bt: BacktraceId) -> Result<&'a Vec<Value>> {
    v.as_array().ok_or_else(|| {
        QueryError::generic(
            format!(
                "Query parse error: expected ARRAY but found {}.",
                json_typestr(v)
            ),
            bt,
        )
    })
}

fn expect_object<'a>(v: &'a Value, bt: BacktraceId) -> Result<&'a Map<String, Value>> {
    v.as_object().ok_or_else(|| {
        QueryError::generic(
            format!(
                "Query parse error: expected OBJECT but found {}.",
                json_typestr(v)
            ),
            bt,
        )
    })
}

/// Read a wire tag from a JSON number, tolerating the float encodings some
/// client drivers emit for integers.
pub(crate) fn number_as_tag(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

fn check_term_size(items: &[Value], bt: BacktraceId) -> Result<()> {
    if items.is_empty() || items.len() > 3 {
        return Err(QueryError::generic(
            format!(
                "Expected an array of 1, 2, or 3 elements, but found {}.",
                items.len()
            ),
            bt,
        ));
    }
    Ok(())
}

/// Owner of all terms in one query.
#[derive(Default)]
pub struct TermStorage {
    terms: Vec<RawTerm>,
    global_optargs: Vec<TermId>,
    backtraces: BacktraceRegistry,
    root: Option<TermId>,
    start_time: Option<Datum>,
    limits: TermLimits,
}

impl TermStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage with explicit conversion limits (internal paths pass
    /// [`TermLimits::unlimited`]).
    pub fn with_limits(limits: TermLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Parse the root term of a query from its JSON encoding.
    pub fn add_root(&mut self, v: &Value) -> Result<TermId> {
        let root = self.parse_internal(v, true, BacktraceId::EMPTY)?;
        self.root = Some(root);
        Ok(root)
    }

    /// Parse query-level optargs, wrapping each value as a nullary function
    /// and appending a default `db("test")` when the client supplied none.
    ///
    /// Synthesized wrappers parse without backtrace frames so they stay
    /// invisible in user-facing errors.
    pub fn add_global_optargs(&mut self, optargs: &Value) -> Result<()> {
        let members = expect_object(optargs, BacktraceId::EMPTY)?;
        let mut has_db_optarg = false;
        for (key, val) in members {
            if key == "db" {
                has_db_optarg = true;
            }

            let term = self.parse_internal(val, false, BacktraceId::EMPTY)?;
            let mut r = MiniDriver::new(self, BacktraceId::EMPTY);
            let wrapped = r.expr(term);
            let func_term = r.fun(wrapped);
            self.set_optarg_name(func_term, key);
            self.global_optargs.push(func_term);
        }

        // Add a default 'test' database optarg if none was specified
        if !has_db_optarg {
            let mut r = MiniDriver::new(self, BacktraceId::EMPTY);
            let db = r.db("test");
            let func_term = r.fun(db);
            self.set_optarg_name(func_term, "db");
            self.global_optargs.push(func_term);
        }
        Ok(())
    }

    /// The query start time, computed once on first use.
    pub fn get_time(&mut self) -> Datum {
        self.start_time.get_or_insert_with(time_now).clone()
    }

    /// The parsed root term, if one has been added.
    pub fn root_term(&self) -> Option<TermRef<'_>> {
        self.root.map(|id| TermRef::new(self, id))
    }

    /// Query-level optargs as `(name, term)` pairs, in append order.
    pub fn global_optargs(&self) -> OptargIter<'_> {
        OptargIter::over(self, &self.global_optargs)
    }

    /// Read handle to an owned term.
    pub fn term(&self, id: TermId) -> TermRef<'_> {
        TermRef::new(self, id)
    }

    /// All owned terms, in arena order.
    pub fn terms(&self) -> impl Iterator<Item = TermRef<'_>> {
        (0..self.terms.len() as u32).map(|i| TermRef::new(self, TermId(i)))
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// Positions allocated while parsing this storage's terms.
    pub fn backtraces(&self) -> &BacktraceRegistry {
        &self.backtraces
    }

    pub(crate) fn raw(&self, id: TermId) -> &RawTerm {
        &self.terms[id.index()]
    }

    pub(crate) fn new_term(&mut self, op: TermType, bt: BacktraceId) -> TermId {
        debug_assert!(op != TermType::Datum, "datum leaves go through new_datum");
        self.push(RawTerm {
            kind: TermKind::Apply {
                op,
                args: Vec::new(),
                optargs: Vec::new(),
            },
            bt,
            optarg_name: None,
        })
    }

    pub(crate) fn new_datum(&mut self, datum: Datum, bt: BacktraceId) -> TermId {
        self.push(RawTerm {
            kind: TermKind::Datum(datum),
            bt,
            optarg_name: None,
        })
    }

    /// New reference to `target`, collapsing one hop so a reference never
    /// points at another reference.
    pub(crate) fn new_ref(&mut self, target: TermId) -> TermId {
        let (resolved, bt) = match self.raw(target).kind {
            TermKind::Ref(inner) => {
                debug_assert!(
                    !matches!(self.raw(inner).kind, TermKind::Ref(_)),
                    "reference chain in term storage"
                );
                (inner, self.raw(target).bt)
            }
            _ => (target, self.raw(target).bt),
        };
        self.push(RawTerm {
            kind: TermKind::Ref(resolved),
            bt,
            optarg_name: None,
        })
    }

    pub(crate) fn set_args(&mut self, id: TermId, new_args: Vec<TermId>) {
        match &mut self.terms[id.index()].kind {
            TermKind::Apply { args, .. } => *args = new_args,
            _ => debug_assert!(false, "set_args on a non-apply term"),
        }
    }

    pub(crate) fn set_optargs(&mut self, id: TermId, new_optargs: Vec<TermId>) {
        match &mut self.terms[id.index()].kind {
            TermKind::Apply { optargs, .. } => *optargs = new_optargs,
            _ => debug_assert!(false, "set_optargs on a non-apply term"),
        }
    }

    pub(crate) fn set_optarg_name(&mut self, id: TermId, name: &str) {
        self.terms[id.index()].optarg_name = Some(Arc::from(name));
    }

    fn push(&mut self, term: RawTerm) -> TermId {
        let id = TermId(self.terms.len() as u32);
        self.terms.push(term);
        id
    }

    /// Recursive JSON parse. `track` selects whether children receive fresh
    /// backtrace frames; synthesized subtrees pass `false` and inherit the
    /// empty backtrace throughout.
    fn parse_internal(&mut self, v: &Value, track: bool, bt: BacktraceId) -> Result<TermId> {
        match v {
            Value::Array(items) => {
                trace!(term = %v, "processing term");
                check_term_size(items, bt)?;
                let tag = number_as_tag(&items[0]).ok_or_else(|| {
                    QueryError::generic(
                        format!(
                            "Query parse error: expected NUMBER but found {}.",
                            json_typestr(&items[0])
                        ),
                        bt,
                    )
                })?;
                let op = TermType::from_wire(tag as i32).ok_or_else(|| {
                    QueryError::generic(format!("Unrecognized term type `{tag}`."), bt)
                })?;

                if op == TermType::Datum {
                    if items.len() != 2 {
                        return Err(QueryError::generic(
                            format!("Expected 2 items in array, but found {}", items.len()),
                            bt,
                        ));
                    }
                    let datum = to_datum(&items[1], &self.limits)
                        .map_err(|e| QueryError::generic(e.to_string(), bt))?;
                    return Ok(self.new_datum(datum, bt));
                }

                let res = self.new_term(op, bt);
                if items.len() >= 2 {
                    let args = self.parse_args(&items[1], track, bt)?;
                    self.set_args(res, args);
                }
                if items.len() == 3 {
                    let optargs = self.parse_optargs(&items[2], track, bt)?;
                    self.set_optargs(res, optargs);
                }

                // Convert NOW terms into a literal datum - so they all have
                // the same value
                let term = self.term(res);
                if op == TermType::Now && term.num_args() == 0 && term.num_optargs() == 0 {
                    let now = self.get_time();
                    self.terms[res.index()].kind = TermKind::Datum(now);
                }
                Ok(res)
            }
            Value::Object(_) => {
                trace!(term = %v, "converting object to MAKE_OBJ");
                let res = self.new_term(TermType::MakeObj, bt);
                let optargs = self.parse_optargs(v, track, bt)?;
                self.set_optargs(res, optargs);
                Ok(res)
            }
            _ => {
                trace!(term = %v, "converting json to datum");
                let datum = to_datum(v, &self.limits)
                    .map_err(|e| QueryError::generic(e.to_string(), bt))?;
                Ok(self.new_datum(datum, bt))
            }
        }
    }

    fn parse_args(&mut self, args: &Value, track: bool, bt: BacktraceId) -> Result<Vec<TermId>> {
        let items = expect_array(args, bt)?;
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let child_bt = if track {
                self.backtraces.new_frame(bt, Frame::index(i))
            } else {
                BacktraceId::EMPTY
            };
            out.push(self.parse_internal(item, track, child_bt)?);
        }
        Ok(out)
    }

    fn parse_optargs(
        &mut self,
        optargs: &Value,
        track: bool,
        bt: BacktraceId,
    ) -> Result<Vec<TermId>> {
        let members = expect_object(optargs, bt)?;
        let mut out = Vec::with_capacity(members.len());
        for (key, val) in members {
            let child_bt = if track {
                self.backtraces.new_frame(bt, Frame::key(key))
            } else {
                BacktraceId::EMPTY
            };
            let t = self.parse_internal(val, track, child_bt)?;
            self.set_optarg_name(t, key);
            out.push(t);
        }
        Ok(out)
    }

    /// Build a tree from the legacy typed record.
    ///
    /// The record arrives from cluster peers, so nodes carry the empty
    /// backtrace and no `now()` folding is applied; the originating node
    /// already folded its tree.
    pub fn parse_wire_term(&mut self, wire: &WireTerm) -> ArchiveResult<TermId> {
        let op = TermType::from_wire(wire.term_type)
            .ok_or(ArchiveError::UnknownTermType(wire.term_type))?;

        if op == TermType::Datum {
            let datum = wire.datum.clone().ok_or_else(|| {
                ArchiveError::Corrupt("DATUM record missing its datum payload".to_string())
            })?;
            return Ok(self.new_datum(datum, BacktraceId::EMPTY));
        }

        let res = self.new_term(op, BacktraceId::EMPTY);
        let mut args = Vec::with_capacity(wire.args.len());
        for arg in &wire.args {
            args.push(self.parse_wire_term(arg)?);
        }
        self.set_args(res, args);

        let mut optargs = Vec::with_capacity(wire.optargs.len());
        for optarg in &wire.optargs {
            let t = self.parse_wire_term(&optarg.val)?;
            self.set_optarg_name(t, &optarg.key);
            optargs.push(t);
        }
        self.set_optargs(res, optargs);
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_bare_scalar_becomes_datum() {
        let mut storage = TermStorage::new();
        let id = storage.add_root(&json!(5)).unwrap();
        let term = storage.term(id);
        assert_eq!(term.term_type(), TermType::Datum);
        assert_eq!(term.datum().unwrap().as_num(), Some(5.0));
    }

    #[test]
    fn test_datum_wrapper_arity() {
        let mut storage = TermStorage::new();
        let err = storage.add_root(&json!([1, 5, 5])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Generic);
        assert!(err.msg.contains("Expected 2 items in array"));
    }

    #[test]
    fn test_term_size_check() {
        let mut storage = TermStorage::new();
        let err = storage.add_root(&json!([])).unwrap_err();
        assert!(err
            .msg
            .contains("Expected an array of 1, 2, or 3 elements, but found 0."));
        let err = storage.add_root(&json!([24, [], {}, {}])).unwrap_err();
        assert!(err
            .msg
            .contains("Expected an array of 1, 2, or 3 elements, but found 4."));
    }

    #[test]
    fn test_term_type_must_be_number() {
        let mut storage = TermStorage::new();
        let err = storage.add_root(&json!(["add", []])).unwrap_err();
        assert_eq!(
            err.msg,
            "Query parse error: expected NUMBER but found STRING."
        );
    }

    #[test]
    fn test_unrecognized_term_type() {
        let mut storage = TermStorage::new();
        let err = storage.add_root(&json!([9999])).unwrap_err();
        assert!(err.msg.contains("Unrecognized term type `9999`."));
    }

    #[test]
    fn test_make_obj_desugar() {
        let mut storage = TermStorage::new();
        let id = storage.add_root(&json!({"a": 1, "b": 2})).unwrap();
        let term = storage.term(id);
        assert_eq!(term.term_type(), TermType::MakeObj);
        assert_eq!(term.num_args(), 0);
        let optargs: Vec<_> = term.optargs().collect();
        assert_eq!(optargs.len(), 2);
        let names: Vec<&str> = optargs.iter().map(|(name, _)| *name).collect();
        assert!(names.contains(&"a") && names.contains(&"b"));
        for (_, child) in optargs {
            assert_eq!(child.term_type(), TermType::Datum);
        }
    }

    #[test]
    fn test_args_get_backtrace_frames() {
        let mut storage = TermStorage::new();
        // ADD with two datum args
        let id = storage.add_root(&json!([24, [[1, 1], [1, 2]]])).unwrap();
        let term = storage.term(id);
        assert_eq!(term.term_type(), TermType::Add);
        let args: Vec<_> = term.args().collect();
        assert_eq!(args.len(), 2);
        for (i, arg) in args.iter().enumerate() {
            let bt = arg.backtrace();
            assert!(storage.backtraces().contains(bt));
            assert_eq!(storage.backtraces().frame(bt), Some(&Frame::index(i)));
        }
    }

    #[test]
    fn test_now_folding_shares_one_instant() {
        let mut storage = TermStorage::new();
        // FUNCALL over two nullary NOW calls
        let id = storage.add_root(&json!([64, [[103], [103]]])).unwrap();
        let term = storage.term(id);
        let args: Vec<_> = term.args().collect();
        assert_eq!(args.len(), 2);
        let first = args[0].datum().expect("folded to datum").clone();
        let second = args[1].datum().expect("folded to datum").clone();
        assert_eq!(first, second);
        assert_eq!(storage.get_time(), first);
    }

    #[test]
    fn test_now_with_args_not_folded() {
        let mut storage = TermStorage::new();
        let id = storage.add_root(&json!([103, [[1, 1]]])).unwrap();
        assert_eq!(storage.term(id).term_type(), TermType::Now);
    }

    #[test]
    fn test_global_optargs_wrapped_and_db_defaulted() {
        let mut storage = TermStorage::new();
        storage
            .add_global_optargs(&json!({"profile": [1, true]}))
            .unwrap();
        let pairs: Vec<_> = storage.global_optargs().collect();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "profile");
        assert_eq!(pairs[0].1.term_type(), TermType::Func);
        assert_eq!(pairs[1].0, "db");
        assert_eq!(pairs[1].1.term_type(), TermType::Func);
        // The default wrapper's body is DB("test").
        let body = pairs[1].1.args().nth(1).unwrap();
        assert_eq!(body.term_type(), TermType::Db);
        let name = body.args().next().unwrap();
        assert_eq!(name.datum().unwrap().as_str(), Some("test"));
    }

    #[test]
    fn test_client_db_optarg_suppresses_default() {
        let mut storage = TermStorage::new();
        storage
            .add_global_optargs(&json!({"db": [14, ["prod"]]}))
            .unwrap();
        let pairs: Vec<_> = storage.global_optargs().collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "db");
    }

    #[test]
    fn test_no_reference_chains() {
        let mut storage = TermStorage::new();
        storage
            .add_global_optargs(&json!({"a": 1, "b": {"c": 2}}))
            .unwrap();
        storage.add_root(&json!([24, [[1, 1], [1, 2]]])).unwrap();
        for term in storage.terms() {
            if let Some(target) = term.ref_target() {
                assert!(!target.is_ref(), "reference chain at {:?}", term.id());
            }
        }
    }

    #[test]
    fn test_global_optarg_backtraces_stay_empty() {
        let mut storage = TermStorage::new();
        storage
            .add_global_optargs(&json!({"a": [24, [[1, 1], [1, 2]]]}))
            .unwrap();
        assert!(storage.backtraces().is_empty());
        for term in storage.terms() {
            assert!(term.backtrace().is_empty());
        }
    }
}
