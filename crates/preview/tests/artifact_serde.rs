//! Artifact types serialize for editor bridges (requires the `serde` feature).

use core_types::{MapEntry, SrcPos};
use preview::{CursorPolicy, MarkerStatus, RenderConfig, RenderPass};

fn identity_map(len: usize) -> Vec<MapEntry> {
    (0..len).map(|i| Some(SrcPos(i))).collect()
}

#[test]
fn highlights_and_marker_outcome_serialize() {
    let source = b"<b>x</b>";
    let map = identity_map(source.len());
    let mut pass = RenderPass::new(RenderConfig {
        cursor: CursorPolicy::Track(SrcPos(3)),
        ..RenderConfig::default()
    });
    pass.raw_html_inline(source, Some(&map));
    let artifacts = pass.finish();
    assert_eq!(artifacts.marker.status, MarkerStatus::Inserted);

    let highlights = serde_json::to_value(&artifacts.highlights).unwrap();
    assert!(
        highlights.as_array().is_some_and(|spans| !spans.is_empty()),
        "expected serialized highlight spans, got: {highlights}"
    );

    let marker = serde_json::to_value(artifacts.marker).unwrap();
    assert_eq!(marker["status"], "Inserted");
}
