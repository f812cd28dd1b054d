//! End-to-end exercises of the render-pass hook points, driving them the way
//! an enclosing Markdown renderer would.

use core_types::{MapEntry, RelPos, SrcPos};
use dom::{Ambiguity, RawHtmlKind};
use preview::{
    CursorPolicy, MARKER_ELEMENT_ID, MARKER_HTML, MarkerStatus, RenderConfig, RenderPass,
    inline_raw_html_extent,
};

fn identity_map(source: &[u8]) -> Vec<MapEntry> {
    (0..source.len()).map(|i| Some(SrcPos(i))).collect()
}

fn pass_with_cursor(cursor: Option<usize>) -> RenderPass {
    RenderPass::new(RenderConfig {
        cursor: cursor.map_or(CursorPolicy::Suppress, |pos| {
            CursorPolicy::Track(SrcPos(pos))
        }),
        ..RenderConfig::default()
    })
}

fn marker_count(bytes: &[u8]) -> usize {
    bytes
        .windows(MARKER_HTML.len())
        .filter(|w| *w == MARKER_HTML.as_bytes())
        .count()
}

#[test]
fn quoted_attribute_gt_degrades_to_malformed_tag_end_to_end() {
    let source = b"see <tag attr=\">\"> done";
    let map = identity_map(source);
    let mut pass = pass_with_cursor(None);

    pass.write_text(&source[..4], Some(&map[..4]));
    let tag_region = &source[4..];
    let consumed = inline_raw_html_extent(tag_region).expect("starts with <");
    assert_eq!(&tag_region[..consumed], b"<tag attr=\">");
    pass.raw_html_inline(&tag_region[..consumed], Some(&map[4..4 + consumed]));
    pass.write_text(&source[4 + consumed..], Some(&map[4 + consumed..]));

    let artifacts = pass.finish();
    // Every original byte is present, byte for byte.
    assert_eq!(artifacts.buffer.as_bytes(), source);
    assert_eq!(artifacts.stats.malformed_tags, 1);
    let root = artifacts.tree.roots().expect("malformed node");
    assert_eq!(artifacts.tree.node(root).kind, RawHtmlKind::MalformedTag);
}

#[test]
fn cursor_is_placed_once_across_text_and_raw_html_spans() {
    let source = b"hello <b>x</b>";
    let map = identity_map(source);
    let mut pass = pass_with_cursor(Some(9)); // at 'x'

    pass.write_text(&source[..6], Some(&map[..6]));
    pass.raw_html_inline(&source[6..], Some(&map[6..]));

    let artifacts = pass.finish();
    assert_eq!(marker_count(artifacts.buffer.as_bytes()), 1);
    assert_eq!(artifacts.marker.status, MarkerStatus::Inserted);
    // The marker sits immediately after the start tag that precedes the cursor.
    let expected = format!("hello <b>{MARKER_HTML}x</b>");
    assert_eq!(artifacts.buffer.as_bytes(), expected.as_bytes());
    assert_eq!(artifacts.marker.effective_pos, Some(SrcPos(8)));
}

#[test]
fn marker_element_is_locatable_by_reserved_id() {
    let source = b"ab";
    let map = identity_map(source);
    let mut pass = pass_with_cursor(Some(1));
    pass.write_text(source, Some(&map));
    let artifacts = pass.finish();
    let html = String::from_utf8(artifacts.buffer.as_bytes().to_vec()).unwrap();
    assert_eq!(html.matches(MARKER_ELEMENT_ID).count(), 1);
}

#[test]
fn suppressed_render_never_inserts() {
    let source = b"abc";
    let map = identity_map(source);
    let mut pass = pass_with_cursor(None);
    pass.write_text(source, Some(&map));
    let artifacts = pass.finish();
    assert_eq!(artifacts.marker.status, MarkerStatus::ShouldNotBeInserted);
    assert_eq!(marker_count(artifacts.buffer.as_bytes()), 0);
}

#[test]
fn cursor_nowhere_in_render_stays_yet_to_be_inserted() {
    let source = b"abc";
    let map = identity_map(source);
    let mut pass = pass_with_cursor(Some(99));
    pass.write_text(source, Some(&map));
    let artifacts = pass.finish();
    assert_eq!(artifacts.marker.status, MarkerStatus::YetToBeInserted);
}

#[test]
fn opaque_block_flags_the_preceding_sibling() {
    let mut pass = pass_with_cursor(None);
    let good = b"<p>ok</p>\n";
    let good_map = identity_map(good);
    let report = pass.raw_html_block(good, Some(&good_map));
    assert!(!report.opaque_fallback);

    let bad = b"</div>";
    let bad_map = identity_map(bad);
    let report = pass.raw_html_block(bad, Some(&bad_map));
    assert!(report.opaque_fallback);

    let artifacts = pass.finish();
    let p = artifacts.tree.roots().expect("p node");
    assert_eq!(
        artifacts.tree.node(p).ambiguity,
        Ambiguity::FollowedByAmbiguousHtml
    );
    let opaque = artifacts.tree.node(p).next_sibling().expect("opaque node");
    assert_eq!(artifacts.tree.node(opaque).kind, RawHtmlKind::OpaqueBlock);
    assert_eq!(
        artifacts.tree.node(opaque).ambiguity,
        Ambiguity::ContainsAmbiguousHtml
    );
    assert_eq!(artifacts.buffer.as_bytes(), b"<p>ok</p>\n</div>");
}

#[test]
fn markdown_nodes_nest_inside_open_raw_html() {
    let mut pass = pass_with_cursor(None);
    let open = b"<div>";
    let open_map = identity_map(open);
    pass.raw_html_inline(open, Some(&open_map));

    pass.write_markup("<p>");
    let p = pass.append_markdown_node("p", RelPos(5), None);

    let artifacts = pass.finish();
    let div = artifacts.tree.roots().expect("div node");
    assert_eq!(artifacts.tree.node(div).kind, RawHtmlKind::Unclosed);
    assert_eq!(artifacts.tree.node(div).first_child(), Some(p));
}

#[test]
fn srcmap_alignment_survives_mixed_writes() {
    let source = b"a<b>c</b>";
    let map = identity_map(source);
    let mut pass = pass_with_cursor(None);
    pass.write_markup("<p>");
    pass.write_text(&source[..1], Some(&map[..1]));
    pass.raw_html_inline(&source[1..], Some(&map[1..]));
    pass.write_markup("</p>");

    let artifacts = pass.finish();
    assert_eq!(artifacts.buffer.as_bytes(), b"<p>a<b>c</b></p>");
    let srcmap = artifacts.buffer.srcmap().expect("source-mapped render");
    // Generated markup is unmapped; source bytes map back to their origin.
    assert_eq!(&srcmap[..3], &[None, None, None]);
    assert_eq!(srcmap[3], Some(SrcPos(0)));
    assert_eq!(srcmap[4], Some(SrcPos(1)));
    assert_eq!(srcmap[12..], [None, None, None, None]);
    for (out_index, entry) in srcmap.iter().enumerate() {
        if let Some(src_pos) = entry {
            assert_eq!(
                artifacts.buffer.as_bytes()[out_index],
                source[src_pos.get()],
                "output byte {out_index} should equal its source byte"
            );
        }
    }
}

#[test]
fn highlights_cover_raw_html_in_source_coordinates() {
    let source = b"<em>hi</em>";
    let map = identity_map(source);
    let mut pass = pass_with_cursor(None);
    pass.raw_html_inline(source, Some(&map));
    let artifacts = pass.finish();
    use preview::HighlightKind;
    let kinds: Vec<_> = artifacts.highlights.iter().map(|h| h.kind).collect();
    assert_eq!(
        kinds,
        vec![
            HighlightKind::RawTag,
            HighlightKind::RawText,
            HighlightKind::RawTag
        ]
    );
    let covered: usize = artifacts.highlights.iter().map(|h| h.len).sum();
    assert_eq!(covered, source.len());
}
