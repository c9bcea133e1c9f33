//! # Lagoon DB Core
//!
//! Core value model for Lagoon DB queries.
//!
//! This crate provides:
//! - The immutable query-language value type [`Datum`]
//! - The JSON → datum bridge ([`to_datum`]) with conversion limits
//! - The pseudo-typed time datum used to pin `now()` per query
//!
//! ## Design Principles
//!
//! 1. **Immutable values**: a `Datum` is never mutated after construction;
//!    composite payloads are `Arc`-shared so clones are cheap.
//! 2. **JSON-shaped**: datums serialize exactly as their JSON form, so the
//!    wire surface and the value model never drift.
//! 3. **Bounded conversion**: the bridge enforces [`TermLimits`] so a
//!    malicious document cannot balloon server memory during ingest.

pub mod coerce;
pub mod datum;
pub mod error;
pub mod limits;

pub use coerce::{json_typestr, to_datum};
pub use datum::{time_now, Datum, DatumType, PSEUDO_TYPE_KEY, TIME_PSEUDO_TYPE};
pub use error::{Error, Result};
pub use limits::TermLimits;
