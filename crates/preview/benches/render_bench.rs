use core_types::{MapEntry, SrcPos};
use criterion::{Criterion, criterion_group, criterion_main};
use preview::{CursorPolicy, RenderConfig, RenderPass};
use std::hint::black_box;

fn identity_map(len: usize) -> Vec<MapEntry> {
    (0..len).map(|i| Some(SrcPos(i))).collect()
}

fn bench_raw_html_single_tag(c: &mut Criterion) {
    let span = b"<div class=\"note\"><span>some nested content</span><br></div>";
    let map = identity_map(span.len());
    c.bench_function("raw_html_single_tag", |b| {
        b.iter(|| {
            let mut pass = RenderPass::new(RenderConfig::default());
            pass.raw_html_inline(black_box(span), Some(&map));
            black_box(pass.finish())
        })
    });
}

fn bench_write_text_with_cursor(c: &mut Criterion) {
    let text: Vec<u8> = b"lorem ipsum dolor sit amet "
        .iter()
        .copied()
        .cycle()
        .take(4096)
        .collect();
    let map = identity_map(text.len());
    c.bench_function("write_text_with_cursor", |b| {
        b.iter(|| {
            let mut pass = RenderPass::new(RenderConfig {
                cursor: CursorPolicy::Track(SrcPos(2048)),
                ..RenderConfig::default()
            });
            for start in (0..text.len()).step_by(64) {
                let end = (start + 64).min(text.len());
                pass.write_text(black_box(&text[start..end]), Some(&map[start..end]));
            }
            black_box(pass.finish())
        })
    });
}

criterion_group!(benches, bench_raw_html_single_tag, bench_write_text_with_cursor);
criterion_main!(benches);
