//! Backtrace registry - source positions inside the query AST.
//!
//! Every parsed term carries a [`BacktraceId`] naming its position for error
//! reporting. The registry is append-only: parsing pushes one frame per
//! positional recursion (an integer for array indices, a string for optarg
//! keys) and frames are never removed while the query is alive.
//!
//! Id 0 is the reserved empty backtrace: the query root, and every node of a
//! synthesized subtree that should stay invisible in user-facing errors.

use std::sync::Arc;

/// Opaque handle naming a position inside the AST.
///
/// Scoped to one registry; the empty id is valid in every registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BacktraceId(u32);

impl BacktraceId {
    /// The empty backtrace: the query root, or "no position".
    pub const EMPTY: BacktraceId = BacktraceId(0);

    /// Whether this is the empty backtrace.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw wire value of this id.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Rebuild an id from its wire value.
    ///
    /// Wire-decoded ids are scoped to the registry of the peer that wrote
    /// them; they are carried opaquely, not resolved locally.
    pub fn from_u32(raw: u32) -> Self {
        BacktraceId(raw)
    }
}

/// One step of a backtrace path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Positional argument index
    Index(u32),
    /// Optarg key
    Key(Arc<str>),
}

impl Frame {
    /// Frame for the `i`-th positional argument
    pub fn index(i: usize) -> Self {
        Frame::Index(i as u32)
    }

    /// Frame for an optarg key
    pub fn key(k: impl AsRef<str>) -> Self {
        Frame::Key(Arc::from(k.as_ref()))
    }
}

struct FrameEntry {
    parent: BacktraceId,
    frame: Frame,
}

/// Append-only store of backtrace frames.
#[derive(Default)]
pub struct BacktraceRegistry {
    frames: Vec<FrameEntry>,
}

impl BacktraceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a child frame under `parent`.
    pub fn new_frame(&mut self, parent: BacktraceId, frame: Frame) -> BacktraceId {
        debug_assert!(self.contains(parent));
        self.frames.push(FrameEntry { parent, frame });
        BacktraceId(self.frames.len() as u32)
    }

    /// Whether `id` names a frame in this registry (the empty id always does).
    pub fn contains(&self, id: BacktraceId) -> bool {
        (id.0 as usize) <= self.frames.len()
    }

    /// The frame named by `id`, or `None` for the empty id.
    pub fn frame(&self, id: BacktraceId) -> Option<&Frame> {
        if id.is_empty() {
            return None;
        }
        self.frames.get(id.0 as usize - 1).map(|e| &e.frame)
    }

    /// Parent of `id`, or `None` for the empty id.
    pub fn parent(&self, id: BacktraceId) -> Option<BacktraceId> {
        if id.is_empty() {
            return None;
        }
        self.frames.get(id.0 as usize - 1).map(|e| e.parent)
    }

    /// Root-to-leaf path of frames for `id`.
    pub fn path(&self, id: BacktraceId) -> Vec<&Frame> {
        let mut out = Vec::new();
        let mut cur = id;
        while let Some(entry) = cur
            .0
            .checked_sub(1)
            .and_then(|i| self.frames.get(i as usize))
        {
            out.push(&entry.frame);
            cur = entry.parent;
        }
        out.reverse();
        out
    }

    /// Number of allocated frames (the empty id is not counted).
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
