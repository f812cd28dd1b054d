//! Shared coordinate-space types for the preview pipeline.
//!
//! Three byte-offset spaces exist side by side during a render: offsets into
//! the Markdown source, offsets into the output buffer, and offsets relative
//! to a parent DOM node's content span. Each space gets its own newtype so
//! that mixing them requires an explicit conversion.
//!
//! Invariants:
//! - Conversions between spaces go through the named methods below; there is
//!   no arithmetic between positions of different spaces.
//! - A source map entry is `None` exactly when the output byte has no
//!   originating source byte.

/// Byte offset into the original Markdown source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SrcPos(pub usize);

impl SrcPos {
    pub fn get(self) -> usize {
        self.0
    }

    /// Offset of the byte immediately after this one.
    pub fn next(self) -> SrcPos {
        SrcPos(self.0 + 1)
    }
}

/// Byte offset into the output buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutPos(pub usize);

impl OutPos {
    pub fn get(self) -> usize {
        self.0
    }

    /// Express this position relative to `base` (typically the content start
    /// of the containing DOM node, or the start of the span being processed).
    pub fn rel_to(self, base: OutPos) -> RelPos {
        debug_assert!(base <= self, "rel_to base must not be ahead of the position");
        RelPos(self.0 - base.0)
    }

    /// Byte distance from `base` to this position.
    pub fn distance_from(self, base: OutPos) -> usize {
        debug_assert!(base <= self, "distance_from base must not be ahead of the position");
        self.0 - base.0
    }
}

/// Byte offset relative to the start of a parent DOM node's content span.
///
/// Root-level nodes measure from the start of the buffer span being processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelPos(pub usize);

impl RelPos {
    pub const ZERO: RelPos = RelPos(0);

    pub fn get(self) -> usize {
        self.0
    }
}

/// One output byte's provenance: the source byte that produced it, if any.
pub type MapEntry = Option<SrcPos>;

/// Borrowed per-byte source map, aligned with a run of output or span bytes.
pub type SrcMap = [MapEntry];

/// Markup classification for highlight-span events emitted during a render.
///
/// This is the raw-HTML subset of the editor's syntax-formatting taxonomy;
/// Markdown-native kinds are the enclosing renderer's concern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum HighlightKind {
    /// Bytes of a recognized HTML tag.
    RawTag,
    /// Text content inside or between raw-HTML tags.
    RawText,
    /// Bytes of an HTML comment.
    RawComment,
}
