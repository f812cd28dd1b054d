//! Driver that turns tokenizer events into output bytes and tree structure.
//!
//! Two modes share one forward pass:
//!
//! - Single-tag mode is best-effort: unmatched end tags and malformed tags
//!   become typed tree nodes and every span byte still reaches the output.
//! - Block mode is all-or-nothing: the caller needs a trustworthy sub-tree,
//!   so any sign of ambiguity discards the partial structure and output
//!   (one bounded rollback) and replaces them with a single verbatim
//!   opaque-block node.
//!
//! Offset bookkeeping: node offsets are relative to the containing element's
//! content start. The parser tracks the absolute output position where each
//! open element's content begins on a stack that grows with nesting depth;
//! there is no depth cap to silently overflow.

use core_types::{HighlightKind, OutPos, RelPos, SrcMap, SrcPos};
use cursor::{CursorTracker, write_text_with_marker};
use dom::{Ambiguity, NodeId, RawHtmlKind, Tag, Tree};
use memchr::memchr;
use outbuf::OutBuf;

use crate::tokenizer::{RawEvent, RawTokenizer, Span};

/// Parsing discipline for one raw-HTML span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Best-effort pass that records problems as typed nodes.
    SingleTag,
    /// Trustworthy-subtree-or-opaque-fallback.
    Block,
}

/// Cheap per-parse counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub events: u64,
    pub tags_opened: u64,
    pub tags_closed: u64,
    pub unmatched_end_tags: u64,
    pub malformed_tags: u64,
    pub comments: u64,
    pub cancelled: u64,
    pub rollbacks: u64,
}

impl ParseStats {
    /// Fold another parse's counters into this one (per-pass aggregation).
    pub fn absorb(&mut self, other: ParseStats) {
        self.events += other.events;
        self.tags_opened += other.tags_opened;
        self.tags_closed += other.tags_closed;
        self.unmatched_end_tags += other.unmatched_end_tags;
        self.malformed_tags += other.malformed_tags;
        self.comments += other.comments;
        self.cancelled += other.cancelled;
        self.rollbacks += other.rollbacks;
    }
}

/// One highlight event: a contiguous run of source bytes and how to paint it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HighlightSpan {
    pub start: SrcPos,
    pub len: usize,
    pub kind: HighlightKind,
}

/// Receiver for highlight events emitted during a parse.
pub trait HighlightSink {
    fn apply(&mut self, span: HighlightSpan);
}

/// Sink that buffers into a Vec.
pub struct VecHighlightSink<'a>(pub &'a mut Vec<HighlightSpan>);

impl HighlightSink for VecHighlightSink<'_> {
    fn apply(&mut self, span: HighlightSpan) {
        self.0.push(span);
    }
}

/// What one raw-HTML parse produced.
#[derive(Debug)]
pub struct ParseReport {
    /// Head of the unattached sibling chain built for this span, if any.
    /// The caller decides where to hang it in the pass tree.
    pub fragment: Option<NodeId>,
    /// Block mode discarded the structural parse and wrote the span verbatim.
    pub opaque_fallback: bool,
    pub stats: ParseStats,
}

/// Parse one raw-HTML span in best-effort single-tag mode.
pub fn parse_single_tag(
    out: &mut OutBuf,
    tree: &mut Tree,
    marker: &mut CursorTracker,
    sink: &mut dyn HighlightSink,
    src: &[u8],
    map: Option<&SrcMap>,
) -> ParseReport {
    Parser::new(src, map, Mode::SingleTag, out, tree).run(out, tree, marker, sink)
}

/// Parse one raw-HTML span in block mode (opaque fallback on ambiguity).
pub fn parse_block(
    out: &mut OutBuf,
    tree: &mut Tree,
    marker: &mut CursorTracker,
    sink: &mut dyn HighlightSink,
    src: &[u8],
    map: Option<&SrcMap>,
) -> ParseReport {
    Parser::new(src, map, Mode::Block, out, tree).run(out, tree, marker, sink)
}

/// How many bytes of `text` form an inline raw-HTML span to hand to the
/// parser: everything up to and including the first `>`.
///
/// This is the enclosing renderer's tag-extent rule, and it is deliberately
/// quote-unaware; a `>` inside a quoted attribute value cuts the span short,
/// which the parser then surfaces as a malformed tag.
pub fn inline_raw_html_extent(text: &[u8]) -> Option<usize> {
    if text.first() != Some(&b'<') {
        return None;
    }
    memchr(b'>', text).map(|gt| gt + 1)
}

/// Void elements cannot have content or a close tag. Sorted for binary search.
const VOID_ELEMENTS: [&str; 15] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Case-insensitive void-element classification.
pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS
        .binary_search_by(|probe| {
            probe
                .bytes()
                .cmp(name.bytes().map(|b| b.to_ascii_lowercase()))
        })
        .is_ok()
}

struct Parser<'a> {
    src: &'a [u8],
    map: Option<&'a SrcMap>,
    mode: Mode,
    /// Output position at parse start; the block-mode rollback point, and the
    /// base that root-level node offsets are measured from.
    base: OutPos,
    /// Arena length at parse start, for discarding a failed fragment.
    tree_mark: usize,
    /// Absolute content-start positions of currently open elements.
    open_stack: Vec<OutPos>,
    fragment: Option<NodeId>,
    /// End of the last handled tag/comment within `src`; text up to the next
    /// tag start is pending until then.
    prev_tag_end: usize,
    invalid: bool,
    staged: Vec<HighlightSpan>,
    stats: ParseStats,
}

impl<'a> Parser<'a> {
    fn new(
        src: &'a [u8],
        map: Option<&'a SrcMap>,
        mode: Mode,
        out: &OutBuf,
        tree: &Tree,
    ) -> Self {
        if let Some(map) = map {
            debug_assert_eq!(map.len(), src.len(), "source map must align with the span");
        }
        Self {
            src,
            map,
            mode,
            base: out.pos(),
            tree_mark: tree.len(),
            open_stack: Vec::new(),
            fragment: None,
            prev_tag_end: 0,
            invalid: false,
            staged: Vec::new(),
            stats: ParseStats::default(),
        }
    }

    fn run(
        mut self,
        out: &mut OutBuf,
        tree: &mut Tree,
        marker: &mut CursorTracker,
        sink: &mut dyn HighlightSink,
    ) -> ParseReport {
        let mut tokenizer = RawTokenizer::new(self.src);
        for event in tokenizer.by_ref() {
            self.stats.events += 1;
            #[cfg(any(test, feature = "debug-stats"))]
            log::trace!(target: "rawhtml.parser", "event {event:?}");
            match event {
                RawEvent::StartTag { name, span, .. } => {
                    self.on_start_tag(out, tree, marker, name, span);
                }
                RawEvent::EndTag { name, span } => {
                    self.on_end_tag(out, tree, marker, name, span);
                }
                RawEvent::Comment { span } => {
                    self.on_comment(out, marker, span);
                }
                RawEvent::CancelledTag { .. } => {
                    self.stats.cancelled += 1;
                    if self.mode == Mode::Block {
                        self.invalid = true;
                    }
                }
            }
            if self.invalid {
                debug_assert_eq!(self.mode, Mode::Block);
                break;
            }
        }

        if !self.invalid
            && let Some(tag_start) = tokenizer.ended_in_tag()
        {
            match self.mode {
                Mode::SingleTag => self.on_malformed_tail(out, tree, marker, tag_start),
                Mode::Block => self.invalid = true,
            }
        }

        if self.mode == Mode::Block && !self.invalid && !self.trailing_text_trusted() {
            self.invalid = true;
        }

        let opaque_fallback = if self.invalid {
            debug_assert_eq!(self.mode, Mode::Block);
            self.opaque_fallback(out, tree, marker);
            true
        } else {
            self.flush_text(out, marker, self.src.len());
            false
        };

        for span in self.staged.drain(..) {
            sink.apply(span);
        }
        ParseReport {
            fragment: self.fragment,
            opaque_fallback,
            stats: self.stats,
        }
    }

    /// Block mode only trusts trailing text that sits inside a still-open
    /// element; loose text after the last top-level tag (or a span with no
    /// structure at all) means the span was not really one HTML block.
    fn trailing_text_trusted(&self) -> bool {
        if !self.open_stack.is_empty() {
            return true;
        }
        self.src[self.prev_tag_end..]
            .iter()
            .all(|b| b.is_ascii_whitespace())
    }

    /// Flush pending text up to `upto`, consulting the cursor marker.
    fn flush_text(&mut self, out: &mut OutBuf, marker: &mut CursorTracker, upto: usize) {
        let start = self.prev_tag_end;
        if upto <= start {
            return;
        }
        let bytes = &self.src[start..upto];
        let slice = self.map.map(|m| &m[start..upto]);
        self.stage_highlight(slice, HighlightKind::RawText);
        write_text_with_marker(out, marker, bytes, slice);
        self.prev_tag_end = upto;
    }

    /// Flush pending text, then the tag bytes themselves. The marker may land
    /// immediately before an end tag or immediately after a start tag whose
    /// source range contains the cursor. Returns the tag's output extent.
    fn write_tag(
        &mut self,
        out: &mut OutBuf,
        marker: &mut CursorTracker,
        tag: Span,
        is_end: bool,
    ) -> (OutPos, OutPos) {
        self.flush_text(out, marker, tag.start);
        let bytes = &self.src[tag.start..tag.end];
        let slice = self.map.map(|m| &m[tag.start..tag.end]);
        self.stage_highlight(slice, HighlightKind::RawTag);
        if is_end && let Some(slice) = slice {
            marker.maybe_insert(out, slice, 0);
        }
        let start_of_tag = out.pos();
        let _ = out.append(bytes, slice);
        let end_of_tag = out.pos();
        if !is_end && let Some(slice) = slice {
            marker.maybe_insert(out, slice, bytes.len() - 1);
        }
        self.prev_tag_end = tag.end;
        (start_of_tag, end_of_tag)
    }

    fn on_start_tag(
        &mut self,
        out: &mut OutBuf,
        tree: &mut Tree,
        marker: &mut CursorTracker,
        name: Span,
        span: Span,
    ) {
        self.stats.tags_opened += 1;
        let (start_of_tag, end_of_tag) = self.write_tag(out, marker, span, false);
        let containing = self.containing_content_start();
        let name = std::str::from_utf8(&self.src[name.start..name.end])
            .expect("tag names are ASCII by construction");
        let node = tree.alloc(
            Tag::Owned(name.into()),
            start_of_tag.rel_to(containing),
            None,
        );
        if is_void_element(name) {
            tree.node_mut(node).kind = RawHtmlKind::Closed;
        } else {
            tree.node_mut(node).kind = RawHtmlKind::Unclosed;
            tree.node_mut(node).content_offset = end_of_tag.rel_to(containing);
            self.open_stack.push(end_of_tag);
        }
        self.fragment = Some(tree.append_respecting_open_elements(self.fragment, node));
    }

    fn on_end_tag(
        &mut self,
        out: &mut OutBuf,
        tree: &mut Tree,
        marker: &mut CursorTracker,
        name: Span,
        span: Span,
    ) {
        let (start_of_tag, end_of_tag) = self.write_tag(out, marker, span, true);
        let name = std::str::from_utf8(&self.src[name.start..name.end])
            .expect("tag names are ASCII by construction");
        let open = tree.deepest_open_raw_html_node(self.fragment);
        if let Some(open_id) = open
            && tree
                .node(open_id)
                .tag
                .name()
                .is_some_and(|open_name| open_name.eq_ignore_ascii_case(name))
        {
            let content_start = self
                .open_stack
                .pop()
                .expect("open stack tracks every unclosed element");
            let node = tree.node_mut(open_id);
            node.kind = RawHtmlKind::Closed;
            node.content_length = start_of_tag.distance_from(content_start);
            node.close_tag_length = end_of_tag.distance_from(start_of_tag);
            self.stats.tags_closed += 1;
        } else {
            match self.mode {
                Mode::SingleTag => {
                    self.stats.unmatched_end_tags += 1;
                    let containing = self.containing_content_start();
                    let node = tree.alloc(
                        Tag::Owned(name.into()),
                        start_of_tag.rel_to(containing),
                        None,
                    );
                    tree.node_mut(node).kind = RawHtmlKind::UnmatchedEndTag;
                    self.fragment =
                        Some(tree.append_respecting_open_elements(self.fragment, node));
                }
                Mode::Block => {
                    log::debug!(
                        target: "rawhtml.parser",
                        "unmatched </{name}> makes the block untrustworthy"
                    );
                    self.invalid = true;
                }
            }
        }
    }

    fn on_comment(&mut self, out: &mut OutBuf, marker: &mut CursorTracker, span: Span) {
        self.stats.comments += 1;
        self.flush_text(out, marker, span.start);
        let bytes = &self.src[span.start..span.end];
        let slice = self.map.map(|m| &m[span.start..span.end]);
        self.stage_highlight(slice, HighlightKind::RawComment);
        let _ = out.append(bytes, slice);
        self.prev_tag_end = span.end;
    }

    /// The span ended while the tokenizer was still inside a tag (e.g. a
    /// stray `>` cut the span short earlier). Everything from the tag start
    /// is flushed as one trailing unit under a malformed-tag node.
    fn on_malformed_tail(
        &mut self,
        out: &mut OutBuf,
        tree: &mut Tree,
        marker: &mut CursorTracker,
        tag_start: usize,
    ) {
        self.stats.malformed_tags += 1;
        self.flush_text(out, marker, tag_start);
        let bytes = &self.src[tag_start..];
        let slice = self.map.map(|m| &m[tag_start..]);
        self.stage_highlight(slice, HighlightKind::RawTag);
        if let Some(slice) = slice
            && marker.in_range(slice)
        {
            // The cursor sits inside markup whose structure is not trusted.
            marker.mark_unlocatable();
        }
        let containing = self.containing_content_start();
        let start_of_tag = out.pos();
        let _ = out.append(bytes, slice);
        let node = tree.alloc(Tag::Anonymous, start_of_tag.rel_to(containing), None);
        tree.node_mut(node).kind = RawHtmlKind::MalformedTag;
        self.fragment = Some(tree.append_respecting_open_elements(self.fragment, node));
        self.prev_tag_end = self.src.len();
    }

    /// Discard the structural parse and write the span verbatim under one
    /// opaque node. The single bounded rollback of the render pass.
    fn opaque_fallback(&mut self, out: &mut OutBuf, tree: &mut Tree, marker: &mut CursorTracker) {
        self.stats.rollbacks += 1;
        log::debug!(
            target: "rawhtml.parser",
            "structural parse untrusted, falling back to opaque block ({} bytes)",
            self.src.len()
        );
        out.truncate_to(self.base);
        tree.truncate(self.tree_mark);
        self.staged.clear();
        self.open_stack.clear();
        marker.rescind_inserted();
        if let Some(map) = self.map
            && marker.in_range(map)
        {
            marker.mark_unlocatable();
        }
        self.stage_highlight(self.map, HighlightKind::RawText);
        let _ = out.append(self.src, self.map);
        let node = tree.alloc(Tag::Anonymous, RelPos::ZERO, None);
        {
            let node = tree.node_mut(node);
            node.kind = RawHtmlKind::OpaqueBlock;
            node.content_length = self.src.len();
            node.ambiguity = Ambiguity::ContainsAmbiguousHtml;
        }
        self.fragment = Some(node);
        self.prev_tag_end = self.src.len();
    }

    fn containing_content_start(&self) -> OutPos {
        self.open_stack.last().copied().unwrap_or(self.base)
    }

    /// Record highlight events for the maximal contiguous mapped runs of a
    /// span's source map. Events are staged until the parse commits so a
    /// block-mode rollback emits nothing from the discarded attempt.
    fn stage_highlight(&mut self, slice: Option<&SrcMap>, kind: HighlightKind) {
        let Some(map) = slice else {
            return;
        };
        let mut i = 0;
        while i < map.len() {
            let Some(start) = map[i] else {
                i += 1;
                continue;
            };
            let mut len = 1;
            while i + len < map.len() && map[i + len] == Some(SrcPos(start.get() + len)) {
                len += 1;
            }
            self.staged.push(HighlightSpan { start, len, kind });
            i += len;
        }
    }
}
