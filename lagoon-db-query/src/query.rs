//! Query envelope - validation of the outer `[type, root?, optargs?]` shape.
//!
//! Construction validates only what must be known before any term
//! evaluation: the envelope arity, the query type, and the two boolean
//! options (`noreply`, `profile`) read through the deliberately permissive
//! `static_optarg_as_bool` probe. Everything else - including malformed
//! optarg values - is left for full term parsing, so pre-flight checks never
//! reject a query the evaluator would accept.
//!
//! Envelope failures carry `CLIENT_ERROR` and an empty backtrace.

use crate::error::EnvelopeError;
use crate::query_id::{QueryIdAllocator, QueryIdHandle};
use crate::storage::TermStorage;
use crate::term::TermId;
use crate::term_type::{QueryType, TermType};
use lagoon_db_core::json_typestr;
use serde_json::{Map, Value};

/// A validated query envelope.
///
/// Owns the parsed JSON document and the raw bytes it came from; the raw
/// buffer is retained until evaluation completes for the profiling and
/// re-serialization surfaces.
#[derive(Debug)]
pub struct QueryParams {
    token: i64,
    query_type: QueryType,
    noreply: bool,
    profile: bool,
    id: Option<QueryIdHandle>,
    doc: Value,
    original: Vec<u8>,
}

impl QueryParams {
    /// Validate a client document and register the query with the session's
    /// id allocator.
    ///
    /// The id is kept alive only for `noreply` queries; it exists to order
    /// no-reply queries for `noreply_wait`, so for replying queries it is
    /// released before this constructor returns.
    pub fn new(
        token: i64,
        ids: &mut QueryIdAllocator,
        original: Vec<u8>,
        doc: Value,
    ) -> Result<Self, EnvelopeError> {
        let items = doc.as_array().ok_or_else(|| {
            EnvelopeError::client_error(format!(
                "Expected a query to be an array, but found {}.",
                json_typestr(&doc)
            ))
        })?;
        if items.is_empty() || items.len() > 3 {
            return Err(EnvelopeError::client_error(format!(
                "Expected 1 to 3 elements in the top-level query, but found {}.",
                items.len()
            )));
        }

        let type_tag = crate::storage::number_as_tag(&items[0]).ok_or_else(|| {
            EnvelopeError::client_error(format!(
                "Expected a query type as a number, but found {}.",
                json_typestr(&items[0])
            ))
        })?;
        let query_type = QueryType::from_wire(type_tag as i32).ok_or_else(|| {
            EnvelopeError::client_error(format!("Unrecognized query type `{type_tag}`."))
        })?;

        if let Some(optargs) = items.get(2) {
            if !optargs.is_object() {
                return Err(EnvelopeError::client_error(format!(
                    "Expected global optargs as an object, but found {}.",
                    json_typestr(optargs)
                )));
            }
        }

        // Parse out optargs that are needed before query evaluation.
        let (noreply, profile) = match items.get(2).and_then(Value::as_object) {
            Some(optargs) => (
                static_optarg_as_bool(optargs, "noreply", false),
                static_optarg_as_bool(optargs, "profile", false),
            ),
            None => (false, false),
        };

        // The query id only tracks the ordering of noreply queries for
        // noreply_wait; a replying query releases it immediately.
        let id = if noreply {
            Some(ids.acquire())
        } else {
            let handle = ids.acquire();
            ids.release(handle);
            None
        };

        Ok(Self {
            token,
            query_type,
            noreply,
            profile,
            id,
            doc,
            original,
        })
    }

    /// Client-supplied token, echoed on every response.
    pub fn token(&self) -> i64 {
        self.token
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// Whether the client expects no response.
    pub fn noreply(&self) -> bool {
        self.noreply
    }

    /// Whether profiling was requested.
    pub fn profile(&self) -> bool {
        self.profile
    }

    /// Value of the retained query id, present only for `noreply` queries.
    pub fn query_id(&self) -> Option<u64> {
        self.id.as_ref().map(|h| h.value())
    }

    /// JSON of the root term, when the envelope carried one.
    pub fn root_term_json(&self) -> Option<&Value> {
        self.doc.as_array().and_then(|items| items.get(1))
    }

    /// JSON of the global optargs object, when the envelope carried one.
    pub fn global_optargs_json(&self) -> Option<&Value> {
        self.doc.as_array().and_then(|items| items.get(2))
    }

    /// Raw bytes the document was parsed from.
    pub fn original_bytes(&self) -> &[u8] {
        &self.original
    }

    /// Parse this query's terms into `storage`: global optargs first, then
    /// the root term. Returns the root's id when the envelope carried one.
    pub fn parse_terms(&self, storage: &mut TermStorage) -> crate::error::Result<Option<TermId>> {
        if let Some(optargs) = self.global_optargs_json() {
            storage.add_global_optargs(optargs)?;
        }
        match self.root_term_json() {
            Some(root) => Ok(Some(storage.add_root(root)?)),
            None => Ok(None),
        }
    }

    /// Release a retained query id at the end of the query's lifetime.
    /// No-op for replying queries, whose id was released at construction.
    pub fn finish(&mut self, ids: &mut QueryIdAllocator) {
        if let Some(handle) = self.id.take() {
            ids.release(handle);
        }
    }
}

/// Read an optarg as a boolean before full parsing.
///
/// Accepts only the exact shape `[DATUM, <bool>]` and returns `default` for
/// anything else, including malformed values: raising on those is full
/// parsing's job.
fn static_optarg_as_bool(optargs: &Map<String, Value>, key: &str, default: bool) -> bool {
    let Some(v) = optargs.get(key) else {
        return default;
    };
    let Some(items) = v.as_array() else {
        return default;
    };
    if items.len() != 2 {
        return default;
    }
    let is_datum_tag = items[0]
        .as_i64()
        .and_then(|tag| TermType::from_wire(tag as i32))
        == Some(TermType::Datum);
    if !is_datum_tag {
        return default;
    }
    items[1].as_bool().unwrap_or(default)
}
