//! Conversion limits applied during JSON → datum coercion.

/// Limits applied when converting client-supplied JSON into datums.
///
/// The default bounds composite sizes so a hostile document cannot balloon
/// server memory during ingest. Internal paths (synthesized subtrees, the
/// binary codec) use [`TermLimits::unlimited`], matching the trust placed in
/// cluster-internal data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TermLimits {
    array_size_limit: usize,
}

const DEFAULT_ARRAY_SIZE_LIMIT: usize = 100_000;

impl TermLimits {
    /// Limits with a specific array/object element bound.
    pub fn with_array_size_limit(limit: usize) -> Self {
        Self {
            array_size_limit: limit,
        }
    }

    /// No bounds; used for cluster-internal data.
    pub fn unlimited() -> Self {
        Self {
            array_size_limit: usize::MAX,
        }
    }

    /// Maximum number of elements allowed in one array or object.
    pub fn array_size_limit(&self) -> usize {
        self.array_size_limit
    }
}

impl Default for TermLimits {
    fn default() -> Self {
        Self {
            array_size_limit: DEFAULT_ARRAY_SIZE_LIMIT,
        }
    }
}
