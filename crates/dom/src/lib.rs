//! Structural tree of the rendered HTML.
//!
//! Nodes describe one element each: tag name plus byte ranges in the output
//! buffer, measured relative to the parent node's content span. The tree is
//! built in document order during a single forward render pass, partly by the
//! enclosing Markdown renderer (static tag names) and partly by the raw-HTML
//! parser (owned tag names copied out of the span being parsed).
//!
//! Nodes live in an arena addressed by [`NodeId`]; sibling/child links are
//! indices, so releasing a render's tree is dropping the arena.
//!
//! Invariants:
//! - For a `Closed` node, `content_offset + content_length + close_tag_length`
//!   does not exceed the parent's content length, and
//!   `elem_offset <= content_offset`.
//! - Sibling chains are append-only and in document order.

use core_types::{OutPos, RelPos};

/// Arena handle for one tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Tag name ownership mirrors node provenance: markdown-native nodes share
/// static names, raw-HTML nodes own a copy (the parsed span's text is not
/// stable past the parse), and text chunks / malformed markers have none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tag {
    Static(&'static str),
    Owned(Box<str>),
    Anonymous,
}

impl Tag {
    pub fn name(&self) -> Option<&str> {
        match self {
            Tag::Static(name) => Some(name),
            Tag::Owned(name) => Some(name),
            Tag::Anonymous => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawHtmlKind {
    /// Markdown-native node created by the enclosing renderer.
    NotRawHtml,
    /// Element with a matched close tag, or a void element.
    Closed,
    /// Element whose close tag has not been seen (yet, or ever).
    Unclosed,
    /// End tag with no matching open element.
    UnmatchedEndTag,
    /// Tag the tokenizer was still inside when the span ended.
    MalformedTag,
    /// Verbatim span whose internal structure could not be trusted.
    OpaqueBlock,
}

impl RawHtmlKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotRawHtml => "markdown",
            Self::Closed => "closed",
            Self::Unclosed => "unclosed",
            Self::UnmatchedEndTag => "unmatched-end-tag",
            Self::MalformedTag => "malformed-tag",
            Self::OpaqueBlock => "opaque-block",
        }
    }
}

/// Whether substructure around this node can be trusted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Ambiguity {
    #[default]
    None,
    ContainsAmbiguousHtml,
    FollowedByAmbiguousHtml,
}

#[derive(Debug)]
pub struct Node {
    pub tag: Tag,
    /// Offset of the whole element (open tag included) in the parent's content.
    pub elem_offset: RelPos,
    /// Offset of the content span in the parent's content.
    pub content_offset: RelPos,
    pub content_length: usize,
    pub close_tag_length: usize,
    pub kind: RawHtmlKind,
    pub ambiguity: Ambiguity,
    first_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

impl Node {
    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling
    }
}

/// Arena-backed structural tree for one render pass.
#[derive(Debug, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    roots: Option<NodeId>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated nodes (attached or not).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First top-level node, in document order.
    pub fn roots(&self) -> Option<NodeId> {
        self.roots
    }

    /// Allocate a node. Offsets other than `elem_offset` start at zero and are
    /// filled in when the element is closed.
    pub fn alloc(&mut self, tag: Tag, elem_offset: RelPos, first_child: Option<NodeId>) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("node count fits in u32"));
        self.nodes.push(Node {
            tag,
            elem_offset,
            content_offset: RelPos::ZERO,
            content_length: 0,
            close_tag_length: 0,
            kind: RawHtmlKind::NotRawHtml,
            ambiguity: Ambiguity::None,
            first_child,
            next_sibling: None,
        });
        id
    }

    /// Drop every node allocated at or past `len`.
    ///
    /// Invariant: the caller guarantees no surviving node links into the
    /// dropped tail (the raw-HTML parser only truncates nodes of its own
    /// unattached fragment).
    pub fn truncate(&mut self, len: usize) {
        debug_assert!(len <= self.nodes.len());
        self.nodes.truncate(len);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Last node of the sibling chain starting at `id`.
    pub fn last_sibling(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(next) = self.node(current).next_sibling {
            current = next;
        }
        current
    }

    /// Append a top-level sibling without descending into open elements.
    pub fn append_root(&mut self, id: NodeId) {
        match self.roots {
            None => self.roots = Some(id),
            Some(head) => {
                let last = self.last_sibling(head);
                self.node_mut(last).next_sibling = Some(id);
            }
        }
    }

    /// Append `id` into the chain starting at `head`, descending into the
    /// last sibling's children while it is an unclosed raw-HTML element.
    ///
    /// This is what nests `<div><span>` without a stack walk at the call
    /// site: `span` lands inside the still-open `div`. Returns the chain head
    /// (unchanged unless the chain was empty).
    pub fn append_respecting_open_elements(&mut self, head: Option<NodeId>, id: NodeId) -> NodeId {
        let Some(head) = head else {
            return id;
        };
        let mut level = head;
        loop {
            let last = self.last_sibling(level);
            if self.node(last).kind == RawHtmlKind::Unclosed {
                match self.node(last).first_child {
                    Some(child) => level = child,
                    None => {
                        self.node_mut(last).first_child = Some(id);
                        return head;
                    }
                }
            } else {
                self.node_mut(last).next_sibling = Some(id);
                return head;
            }
        }
    }

    /// Append a top-level node, descending into open raw-HTML elements.
    pub fn append_root_respecting_open_elements(&mut self, id: NodeId) {
        self.roots = Some(self.append_respecting_open_elements(self.roots, id));
    }

    /// The deepest raw-HTML element still open at the end of `head`'s chain,
    /// or `None` if the chain ends in a closed element.
    pub fn deepest_open_raw_html_node(&self, head: Option<NodeId>) -> Option<NodeId> {
        let head = head?;
        let last = self.last_sibling(head);
        if self.node(last).kind != RawHtmlKind::Unclosed {
            return None;
        }
        self.deepest_open_raw_html_node(self.node(last).first_child)
            .or(Some(last))
    }

    /// Indented text rendering of the tree against the output bytes it
    /// describes. `base` is the buffer position the root offsets are relative
    /// to. Diagnostic format for tests, not a stable serialization.
    pub fn outline(&self, bytes: &[u8], base: OutPos) -> Vec<String> {
        let mut lines = Vec::new();
        self.outline_chain(self.roots, bytes, base.get(), 0, &mut lines);
        lines
    }

    fn outline_chain(
        &self,
        head: Option<NodeId>,
        bytes: &[u8],
        base: usize,
        depth: usize,
        lines: &mut Vec<String>,
    ) {
        const PREVIEW_BYTES: usize = 40;
        let mut current = head;
        while let Some(id) = current {
            let node = self.node(id);
            let mut line = "  ".repeat(depth);
            line.push('[');
            line.push_str(node.tag.name().unwrap_or("-"));
            line.push_str("] ");
            line.push_str(node.kind.label());
            let content_start = base + node.content_offset.get();
            let content_end = content_start + node.content_length;
            if content_end <= bytes.len() && node.content_length > 0 {
                line.push_str(" \"");
                for &b in bytes[content_start..content_end].iter().take(PREVIEW_BYTES) {
                    match b {
                        b'\n' => line.push(' '),
                        b => line.push(b as char),
                    }
                }
                if node.content_length > PREVIEW_BYTES {
                    line.push('…');
                }
                line.push('"');
            }
            match node.ambiguity {
                Ambiguity::None => {}
                Ambiguity::ContainsAmbiguousHtml => line.push_str(" (contains-ambiguous-html)"),
                Ambiguity::FollowedByAmbiguousHtml => {
                    line.push_str(" (followed-by-ambiguous-html)")
                }
            }
            lines.push(line);
            self.outline_chain(node.first_child, bytes, content_start, depth + 1, lines);
            current = node.next_sibling;
        }
    }
}
