//! # Lagoon DB Query Ingestion
//!
//! Query ingestion and term storage for Lagoon DB.
//!
//! This crate takes a client-submitted JSON document and turns it into a
//! query the evaluator can run:
//!
//! 1. [`QueryParams`] validates the outer `[type, root?, optargs?]` envelope
//!    and extracts the pre-evaluation options (`noreply`, `profile`).
//! 2. [`TermStorage`] parses the root term and global optargs into an arena
//!    of term nodes; [`MiniDriver`] synthesizes the wrapper subtrees around
//!    option values.
//! 3. [`QueryIdAllocator`] assigns monotonically increasing query ids and
//!    maintains the oldest-outstanding watermark behind `noreply_wait`.
//! 4. [`serialize`] encodes and decodes term trees for inter-node messages,
//!    across every supported cluster version.
//!
//! Evaluation, storage effects, transport, and result streaming live
//! elsewhere; this crate hands a parsed query off and steps aside.

pub mod backtrace;
pub mod error;
pub mod minidriver;
pub mod query;
pub mod query_id;
pub mod serialize;
pub mod storage;
pub mod term;
pub mod term_type;
pub mod wire;

pub use backtrace::{BacktraceId, BacktraceRegistry, Frame};
pub use error::{ArchiveError, ArchiveResult, EnvelopeError, ErrorKind, QueryError, Result};
pub use minidriver::MiniDriver;
pub use query::QueryParams;
pub use query_id::{QueryIdAllocator, QueryIdHandle};
pub use serialize::{
    deserialize_term_tree, serialize_term_tree, write_wire_record, ClusterVersion,
};
pub use storage::TermStorage;
pub use term::{ArgIter, OptargIter, TermId, TermRef};
pub use term_type::{QueryType, ResponseType, TermType};
pub use wire::{WireOptarg, WireTerm};
