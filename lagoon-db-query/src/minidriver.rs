//! Mini-builder for synthesized term subtrees.
//!
//! A small fluent constructor that emits terms into an existing storage,
//! used wherever the server needs to fabricate language fragments around
//! client input - most importantly wrapping every global optarg value as a
//! nullary function so the evaluator consistently sees option args as thunks.
//!
//! Synthesized nodes carry the builder's backtrace (normally the empty one),
//! keeping them out of user-facing error positions.

use crate::backtrace::BacktraceId;
use crate::storage::TermStorage;
use crate::term::TermId;
use crate::term_type::TermType;
use lagoon_db_core::Datum;

/// Fluent constructor of term subtrees inside one storage.
pub struct MiniDriver<'a> {
    storage: &'a mut TermStorage,
    bt: BacktraceId,
}

impl<'a> MiniDriver<'a> {
    pub fn new(storage: &'a mut TermStorage, bt: BacktraceId) -> Self {
        Self { storage, bt }
    }

    /// Reference an already-parsed term so a synthesized tree can share it.
    pub fn expr(&mut self, term: TermId) -> TermId {
        self.storage.new_ref(term)
    }

    /// A `DATUM` leaf.
    pub fn expr_datum(&mut self, datum: Datum) -> TermId {
        self.storage.new_datum(datum, self.bt)
    }

    /// A `DB(name)` call.
    pub fn db(&mut self, name: &str) -> TermId {
        let arg = self.expr_datum(Datum::string(name));
        self.apply(TermType::Db, vec![arg])
    }

    /// A nullary function wrapping `body`.
    ///
    /// Shaped as `FUNC([<empty param list>, body])`, the same encoding
    /// clients produce for zero-argument lambdas.
    pub fn fun(&mut self, body: TermId) -> TermId {
        let params = self.expr_datum(Datum::array(Vec::new()));
        self.apply(TermType::Func, vec![params, body])
    }

    fn apply(&mut self, op: TermType, args: Vec<TermId>) -> TermId {
        let id = self.storage.new_term(op, self.bt);
        self.storage.set_args(id, args);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fun_wraps_body_as_nullary() {
        let mut storage = TermStorage::new();
        let mut r = MiniDriver::new(&mut storage, BacktraceId::EMPTY);
        let body = r.expr_datum(Datum::Num(7.0));
        let func = r.fun(body);

        let term = storage.term(func);
        assert_eq!(term.term_type(), TermType::Func);
        let args: Vec<_> = term.args().collect();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].datum().unwrap().as_array().unwrap().len(), 0);
        assert_eq!(args[1].datum().unwrap().as_num(), Some(7.0));
    }

    #[test]
    fn test_expr_of_expr_stays_single_hop() {
        let mut storage = TermStorage::new();
        let mut r = MiniDriver::new(&mut storage, BacktraceId::EMPTY);
        let base = r.expr_datum(Datum::Num(1.0));
        let once = r.expr(base);
        let twice = r.expr(once);

        let term = storage.term(twice);
        assert!(term.is_ref());
        let target = term.ref_target().unwrap();
        assert!(!target.is_ref());
        assert_eq!(target.id(), base);
    }

    #[test]
    fn test_db_call() {
        let mut storage = TermStorage::new();
        let mut r = MiniDriver::new(&mut storage, BacktraceId::EMPTY);
        let db = r.db("test");

        let term = storage.term(db);
        assert_eq!(term.term_type(), TermType::Db);
        let name = term.args().next().unwrap();
        assert_eq!(name.datum().unwrap().as_str(), Some("test"));
    }
}
