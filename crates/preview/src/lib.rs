//! Per-render integration glue.
//!
//! A [`RenderPass`] owns everything one render produces: the source-mapped
//! output buffer, the structural tree, the cursor-marker state, and the
//! highlight events. The enclosing Markdown renderer drives it through three
//! hook points — plain text spans, inline raw HTML, and raw HTML blocks — and
//! consumes the finished [`RenderArtifacts`].
//!
//! Ownership: a pass is created at render start and consumed by
//! [`RenderPass::finish`]; nothing is shared between renders. An edit means a
//! brand-new pass.

use cursor::{CursorTracker, write_text_with_marker};
use dom::Tag;
use rawhtml::{Mode, VecHighlightSink};

pub use core_types::{HighlightKind, MapEntry, OutPos, RelPos, SrcMap, SrcPos};
pub use cursor::{MARKER_ELEMENT_ID, MARKER_HTML, MarkerOutcome, MarkerStatus};
pub use dom::{Ambiguity, Node, NodeId, RawHtmlKind, Tree};
pub use outbuf::OutBuf;
pub use rawhtml::{HighlightSpan, ParseReport, ParseStats, inline_raw_html_extent};

/// Default growth quantum for the output buffer.
pub const OUTPUT_UNIT: usize = 64;

/// Whether and where this render wants the cursor marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorPolicy {
    /// Insert the marker for this source cursor position.
    Track(SrcPos),
    /// No marker this render (e.g. non-interactive export).
    Suppress,
}

#[derive(Clone, Copy, Debug)]
pub struct RenderConfig {
    pub buffer_unit: usize,
    /// Record a per-byte source map alongside the output.
    pub source_mapped: bool,
    pub cursor: CursorPolicy,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            buffer_unit: OUTPUT_UNIT,
            source_mapped: true,
            cursor: CursorPolicy::Suppress,
        }
    }
}

/// Everything a finished render hands to the editor layer.
#[derive(Debug)]
pub struct RenderArtifacts {
    pub buffer: OutBuf,
    pub tree: Tree,
    pub highlights: Vec<HighlightSpan>,
    pub marker: MarkerOutcome,
    pub stats: ParseStats,
}

/// State of one in-flight render.
#[derive(Debug)]
pub struct RenderPass {
    out: OutBuf,
    tree: Tree,
    marker: CursorTracker,
    highlights: Vec<HighlightSpan>,
    stats: ParseStats,
}

impl RenderPass {
    pub fn new(config: RenderConfig) -> Self {
        let out = if config.source_mapped {
            OutBuf::with_srcmap(config.buffer_unit)
        } else {
            OutBuf::new(config.buffer_unit)
        };
        let marker = match config.cursor {
            CursorPolicy::Track(pos) => CursorTracker::new(pos),
            CursorPolicy::Suppress => CursorTracker::suppressed(),
        };
        Self {
            out,
            tree: Tree::new(),
            marker,
            highlights: Vec::new(),
            stats: ParseStats::default(),
        }
    }

    pub fn out(&self) -> &OutBuf {
        &self.out
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn marker_status(&self) -> MarkerStatus {
        self.marker.status()
    }

    /// Append renderer-generated markup (tag syntax with no source bytes).
    pub fn write_markup(&mut self, html: &str) {
        let _ = self.out.append_literal(html);
    }

    /// Append a text span, consulting the cursor marker with its source map.
    pub fn write_text(&mut self, bytes: &[u8], map: Option<&SrcMap>) {
        write_text_with_marker(&mut self.out, &mut self.marker, bytes, map);
    }

    /// Feed one inline raw-HTML span (best-effort single-tag mode).
    pub fn raw_html_inline(&mut self, src: &[u8], map: Option<&SrcMap>) -> ParseReport {
        let report = rawhtml::parse_single_tag(
            &mut self.out,
            &mut self.tree,
            &mut self.marker,
            &mut VecHighlightSink(&mut self.highlights),
            src,
            map,
        );
        self.absorb(&report, Mode::SingleTag);
        report
    }

    /// Feed one raw-HTML block span. On the opaque fallback, the preceding
    /// top-level node is flagged so consumers know the structure after it is
    /// not trustworthy.
    pub fn raw_html_block(&mut self, src: &[u8], map: Option<&SrcMap>) -> ParseReport {
        let preceding = self.tree.roots().map(|head| self.tree.last_sibling(head));
        let report = rawhtml::parse_block(
            &mut self.out,
            &mut self.tree,
            &mut self.marker,
            &mut VecHighlightSink(&mut self.highlights),
            src,
            map,
        );
        if report.opaque_fallback
            && let Some(prev) = preceding
        {
            self.tree.node_mut(prev).ambiguity = Ambiguity::FollowedByAmbiguousHtml;
        }
        self.absorb(&report, Mode::Block);
        report
    }

    /// Append a markdown-native tree node (static tag name, offsets supplied
    /// by the enclosing renderer).
    pub fn append_markdown_node(
        &mut self,
        tag: &'static str,
        elem_offset: RelPos,
        first_child: Option<NodeId>,
    ) -> NodeId {
        let id = self.tree.alloc(Tag::Static(tag), elem_offset, first_child);
        self.tree.append_root_respecting_open_elements(id);
        id
    }

    pub fn finish(self) -> RenderArtifacts {
        log::trace!(
            target: "preview.pass",
            "render finished: {} output bytes, {} nodes, marker {:?}",
            self.out.len(),
            self.tree.len(),
            self.marker.status()
        );
        RenderArtifacts {
            buffer: self.out,
            tree: self.tree,
            highlights: self.highlights,
            marker: self.marker.outcome(),
            stats: self.stats,
        }
    }

    fn absorb(&mut self, report: &ParseReport, mode: Mode) {
        if let Some(head) = report.fragment {
            self.tree.append_root_respecting_open_elements(head);
        }
        self.stats.absorb(report.stats);
        if report.opaque_fallback {
            log::debug!(
                target: "preview.pass",
                "raw-html {mode:?} span degraded to an opaque block"
            );
        }
    }
}
