//! Term nodes and read access to a parsed tree.
//!
//! All terms of a query live in one [`TermStorage`](crate::storage::TermStorage)
//! arena and address each other by [`TermId`]. A node is one of:
//!
//! - a `DATUM` leaf carrying an immutable value,
//! - an operator application with ordered args and named optargs,
//! - a reference to another node in the same storage.
//!
//! References exist so synthesized subtrees can share client-parsed nodes
//! without copying. A reference never points at another reference; the
//! indirection is collapsed when the reference is created, so every read-side
//! resolution is a single hop.
//!
//! [`TermRef`] is the read surface handed to the evaluator: it resolves
//! references transparently, both at the node itself and for each child
//! yielded by [`TermRef::args`] / [`TermRef::optargs`].

use crate::backtrace::BacktraceId;
use crate::storage::TermStorage;
use crate::term_type::TermType;
use lagoon_db_core::Datum;
use std::sync::Arc;

/// Index of a term inside its storage arena.
///
/// Stable for the storage's lifetime; never valid across storages.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TermId(pub(crate) u32);

impl TermId {
    /// Arena index of this id.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Payload of a term node.
#[derive(Clone, Debug)]
pub(crate) enum TermKind {
    Datum(Datum),
    Apply {
        op: TermType,
        args: Vec<TermId>,
        optargs: Vec<TermId>,
    },
    Ref(TermId),
}

/// One node in the term arena.
#[derive(Clone, Debug)]
pub(crate) struct RawTerm {
    pub(crate) kind: TermKind,
    pub(crate) bt: BacktraceId,
    /// Set when this node is a member of an optargs mapping; frozen after
    /// append.
    pub(crate) optarg_name: Option<Arc<str>>,
}

/// Read handle to one term in a storage.
#[derive(Copy, Clone)]
pub struct TermRef<'a> {
    storage: &'a TermStorage,
    id: TermId,
}

impl<'a> TermRef<'a> {
    pub(crate) fn new(storage: &'a TermStorage, id: TermId) -> Self {
        Self { storage, id }
    }

    /// Id of this node (pre-resolution).
    pub fn id(&self) -> TermId {
        self.id
    }

    /// Whether this node is a reference.
    pub fn is_ref(&self) -> bool {
        matches!(self.raw().kind, TermKind::Ref(_))
    }

    /// The node a reference points at, without resolving it; `None` when this
    /// node is not a reference.
    pub fn ref_target(&self) -> Option<TermRef<'a>> {
        match self.raw().kind {
            TermKind::Ref(target) => Some(TermRef::new(self.storage, target)),
            _ => None,
        }
    }

    /// This node with any reference collapsed to its target.
    pub fn resolve(&self) -> TermRef<'a> {
        match self.raw().kind {
            TermKind::Ref(target) => {
                let resolved = TermRef::new(self.storage, target);
                debug_assert!(!resolved.is_ref());
                resolved
            }
            _ => *self,
        }
    }

    /// Operator tag of this node (`TermType::Datum` for leaves), resolving
    /// references.
    pub fn term_type(&self) -> TermType {
        match &self.resolve().raw().kind {
            TermKind::Datum(_) => TermType::Datum,
            TermKind::Apply { op, .. } => *op,
            TermKind::Ref(_) => unreachable!("reference resolved above"),
        }
    }

    /// Datum payload, resolving references; `None` unless this is a leaf.
    pub fn datum(&self) -> Option<&'a Datum> {
        match &self.resolve().into_raw().kind {
            TermKind::Datum(d) => Some(d),
            _ => None,
        }
    }

    /// Backtrace id of this node (pre-resolution; a reference shares its
    /// target's backtrace by construction).
    pub fn backtrace(&self) -> BacktraceId {
        self.raw().bt
    }

    /// Optarg name of this node if it is a member of an optargs mapping.
    ///
    /// Read pre-resolution: the name lives on the listed node, which may be
    /// the reference rather than its target.
    pub fn optarg_name(&self) -> Option<&'a str> {
        self.into_raw().optarg_name.as_deref()
    }

    /// Number of positional arguments, resolving references; 0 for leaves.
    pub fn num_args(&self) -> usize {
        match &self.resolve().raw().kind {
            TermKind::Apply { args, .. } => args.len(),
            _ => 0,
        }
    }

    /// Number of optargs, resolving references; 0 for leaves.
    pub fn num_optargs(&self) -> usize {
        match &self.resolve().raw().kind {
            TermKind::Apply { optargs, .. } => optargs.len(),
            _ => 0,
        }
    }

    /// Positional arguments in order, each resolved past references.
    pub fn args(&self) -> ArgIter<'a> {
        let ids = match &self.resolve().into_raw().kind {
            TermKind::Apply { args, .. } => args.as_slice(),
            _ => &[],
        };
        ArgIter {
            storage: self.storage,
            ids: ids.iter(),
        }
    }

    /// Optargs as `(name, term)` pairs, each term resolved past references.
    ///
    /// The name is read from the listed node; the term is its resolution.
    pub fn optargs(&self) -> OptargIter<'a> {
        let ids = match &self.resolve().into_raw().kind {
            TermKind::Apply { optargs, .. } => optargs.as_slice(),
            _ => &[],
        };
        OptargIter {
            storage: self.storage,
            ids: ids.iter(),
        }
    }

    fn raw(&self) -> &'a RawTerm {
        self.storage.raw(self.id)
    }

    // Same as `raw`, spelled to make the 'a lifetime explicit at call sites
    // that return borrowed payloads.
    fn into_raw(self) -> &'a RawTerm {
        self.storage.raw(self.id)
    }
}

impl std::fmt::Debug for TermRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("TermRef");
        dbg.field("id", &self.id);
        if self.is_ref() {
            dbg.field("ref", &self.resolve().id());
        }
        dbg.field("type", &self.term_type());
        if let Some(d) = self.datum() {
            dbg.field("datum", d);
        }
        dbg.finish()
    }
}

/// Iterator over positional arguments.
pub struct ArgIter<'a> {
    storage: &'a TermStorage,
    ids: std::slice::Iter<'a, TermId>,
}

impl<'a> Iterator for ArgIter<'a> {
    type Item = TermRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.ids
            .next()
            .map(|id| TermRef::new(self.storage, *id).resolve())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for ArgIter<'_> {}

/// Iterator over optargs as `(name, term)` pairs.
pub struct OptargIter<'a> {
    storage: &'a TermStorage,
    ids: std::slice::Iter<'a, TermId>,
}

impl<'a> OptargIter<'a> {
    pub(crate) fn over(storage: &'a TermStorage, ids: &'a [TermId]) -> Self {
        Self {
            storage,
            ids: ids.iter(),
        }
    }
}

impl<'a> Iterator for OptargIter<'a> {
    type Item = (&'a str, TermRef<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let listed = TermRef::new(self.storage, *self.ids.next()?);
        let name = listed.optarg_name().unwrap_or("");
        debug_assert!(!name.is_empty(), "optarg member missing its name");
        Some((name, listed.resolve()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for OptargIter<'_> {}
