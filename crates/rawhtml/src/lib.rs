//! Raw-HTML handling for the preview render pass.
//!
//! A span of Markdown source that is syntactically raw HTML comes in; out go
//! passthrough bytes in the output buffer (annotated with highlight spans for
//! tag vs. text content), plus a structural-tree fragment describing the
//! element structure the span produced. Malformed or ambiguous markup must
//! degrade without corrupting either: unrecognizable pieces become typed tree
//! nodes in single-tag mode, and block mode falls back to one verbatim opaque
//! node when the structure cannot be trusted.
//!
//! Invariants:
//! - The span is consumed in one forward pass; committed output bytes are
//!   never revisited, except for block mode's single bounded rollback to the
//!   position saved at parse start.
//! - Every byte of the span reaches the output exactly once (in block
//!   fallback: verbatim, as one unit).
//! - Cursor-marker insertion is only attempted between appends, through the
//!   tracker, so the at-most-once contract holds across text and tag flushes.

mod parser;
mod tokenizer;

pub use parser::{
    HighlightSink, HighlightSpan, Mode, ParseReport, ParseStats, VecHighlightSink,
    inline_raw_html_extent, is_void_element, parse_block, parse_single_tag,
};
pub use tokenizer::{RawEvent, RawTokenizer, Span};
