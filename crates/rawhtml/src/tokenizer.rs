//! Streaming tokenizer for one span of embedded raw HTML.
//!
//! This is a pull-based event stream: the driver iterates a lazy, finite,
//! non-restartable sequence of tag/comment events instead of registering
//! reentrant callbacks. Events carry byte spans into the input, so tag
//! boundary positions are available directly and the driver never needs to
//! pause the feed to record them.
//!
//! Text is the complement of the event spans: anything between one event's
//! `span.end` and the next event's `span.start` is literal text, including the
//! bytes of a [`RawEvent::CancelledTag`].
//!
//! Invariants:
//! - Events are emitted in input order; spans never overlap and never move
//!   backwards.
//! - The tokenizer is quote-aware inside start tags: a `>` inside a quoted
//!   attribute value does not terminate the tag.
//! - If the span ends while a tag, quoted value, or comment is still open,
//!   iteration stops and [`RawTokenizer::ended_in_tag`] reports where the
//!   unterminated markup began.
//!
//! Not a full HTML5 tokenizer by design: it recovers just enough structure
//! for preview support. Tag and attribute names are ASCII `[A-Za-z0-9:_-]`.

use memchr::{memchr, memmem};

const COMMENT_OPEN: &[u8] = b"<!--";
const COMMENT_CLOSE: &[u8] = b"-->";

/// Byte range into the span being tokenized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start must be <= end");
        Self { start, end }
    }

    pub fn len(self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }
}

/// One tokenizer event. Name spans cover only the tag name; `span` covers the
/// whole construct including the angle brackets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawEvent {
    /// `<name ...>` or `<name ... />`. Self-closing is reported but void
    /// classification is the driver's concern.
    StartTag {
        name: Span,
        span: Span,
        self_closing: bool,
    },
    /// `</name ...>`.
    EndTag { name: Span, span: Span },
    /// `<!-- ... -->`, terminator included.
    Comment { span: Span },
    /// A `<` that turned out not to open a tag or comment; it is literal text.
    CancelledTag { at: usize },
}

enum Scan {
    Event(RawEvent, usize),
    Cancel,
    Unterminated,
}

/// Pull-based tokenizer over one raw-HTML span.
#[derive(Debug)]
pub struct RawTokenizer<'a> {
    input: &'a [u8],
    pos: usize,
    unterminated: Option<usize>,
}

impl<'a> RawTokenizer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            unterminated: None,
        }
    }

    /// After iteration is exhausted: the offset where an unterminated tag or
    /// comment began, if the span ended inside one.
    pub fn ended_in_tag(&self) -> Option<usize> {
        self.unterminated
    }

    fn scan_markup(&self, lt: usize) -> Scan {
        let b = self.input;
        let n = b.len();
        debug_assert_eq!(b[lt], b'<');
        if lt + 1 >= n {
            // Span ends right after `<`: still inside a possible tag.
            return Scan::Unterminated;
        }
        match b[lt + 1] {
            b'!' => self.scan_comment(lt),
            b'/' => self.scan_end_tag(lt),
            c if c.is_ascii_alphabetic() => self.scan_start_tag(lt),
            _ => Scan::Cancel,
        }
    }

    fn scan_comment(&self, lt: usize) -> Scan {
        let b = self.input;
        let n = b.len();
        if n >= lt + COMMENT_OPEN.len() && &b[lt..lt + COMMENT_OPEN.len()] == COMMENT_OPEN {
            match memmem::find(&b[lt + COMMENT_OPEN.len()..], COMMENT_CLOSE) {
                Some(rel) => {
                    let end = lt + COMMENT_OPEN.len() + rel + COMMENT_CLOSE.len();
                    Scan::Event(
                        RawEvent::Comment {
                            span: Span::new(lt, end),
                        },
                        end,
                    )
                }
                None => Scan::Unterminated,
            }
        } else if n < lt + COMMENT_OPEN.len() && b[lt + 2..].iter().all(|&c| c == b'-') {
            // Span ends inside a possible comment opener (`<!` or `<!-`).
            Scan::Unterminated
        } else {
            // `<!` followed by something other than `--` is literal text.
            Scan::Cancel
        }
    }

    fn scan_end_tag(&self, lt: usize) -> Scan {
        let b = self.input;
        let n = b.len();
        if lt + 2 >= n {
            return Scan::Unterminated;
        }
        if !b[lt + 2].is_ascii_alphabetic() {
            return Scan::Cancel;
        }
        let name_end = scan_name(b, lt + 2);
        match memchr(b'>', &b[name_end..]) {
            Some(rel) => {
                let gt = name_end + rel;
                Scan::Event(
                    RawEvent::EndTag {
                        name: Span::new(lt + 2, name_end),
                        span: Span::new(lt, gt + 1),
                    },
                    gt + 1,
                )
            }
            None => Scan::Unterminated,
        }
    }

    fn scan_start_tag(&self, lt: usize) -> Scan {
        let b = self.input;
        let n = b.len();
        let name_end = scan_name(b, lt + 1);
        let mut k = name_end;
        loop {
            if k >= n {
                return Scan::Unterminated;
            }
            match b[k] {
                quote @ (b'"' | b'\'') => match memchr(quote, &b[k + 1..]) {
                    Some(rel) => k = k + 1 + rel + 1,
                    None => return Scan::Unterminated, // span ends inside a quoted value
                },
                b'>' => {
                    let self_closing = preceding_non_ws(b, name_end, k) == Some(b'/');
                    return Scan::Event(
                        RawEvent::StartTag {
                            name: Span::new(lt + 1, name_end),
                            span: Span::new(lt, k + 1),
                            self_closing,
                        },
                        k + 1,
                    );
                }
                _ => k += 1,
            }
        }
    }
}

impl Iterator for RawTokenizer<'_> {
    type Item = RawEvent;

    fn next(&mut self) -> Option<RawEvent> {
        if self.unterminated.is_some() || self.pos >= self.input.len() {
            return None;
        }
        let rel = match memchr(b'<', &self.input[self.pos..]) {
            Some(rel) => rel,
            None => {
                self.pos = self.input.len();
                return None;
            }
        };
        let lt = self.pos + rel;
        match self.scan_markup(lt) {
            Scan::Event(event, next_pos) => {
                self.pos = next_pos;
                Some(event)
            }
            Scan::Cancel => {
                self.pos = lt + 1;
                Some(RawEvent::CancelledTag { at: lt })
            }
            Scan::Unterminated => {
                self.unterminated = Some(lt);
                None
            }
        }
    }
}

fn scan_name(b: &[u8], start: usize) -> usize {
    let mut k = start;
    while k < b.len() && is_name_byte(b[k]) {
        k += 1;
    }
    k
}

fn is_name_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_' || c == b':'
}

/// Last non-whitespace byte in `b[lo..hi]`, scanning backwards from `hi`.
fn preceding_non_ws(b: &[u8], lo: usize, hi: usize) -> Option<u8> {
    b[lo..hi]
        .iter()
        .rev()
        .copied()
        .find(|c| !c.is_ascii_whitespace())
}
