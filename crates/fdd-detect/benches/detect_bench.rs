use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fdd_core::parse_layout;
use fdd_detect::SectionDetector;
use serde_json::json;

fn synthetic_document(total_pages: usize) -> String {
    let headers = [
        "Item 1: The Franchisor, and any Parents, Predecessors, and Affiliates",
        "Item 5: Initial Fees",
        "Item 7: Estimated Initial Investment",
        "Item 11: Franchisor's Assistance, Advertising, Computer Systems, and Training",
        "Item 17: Renewal, Termination, Transfer, and Dispute Resolution",
        "Item 19: Financial Performance Representations",
        "Item 21: Financial Statements",
    ];
    let pages: Vec<serde_json::Value> = (0..total_pages)
        .map(|idx| {
            let mut blocks = vec![json!({
                "type": "text",
                "bbox": [40.0, 120.0, 560.0, 700.0],
                "lines": [{ "spans": [{
                    "content": format!("Body text for page {idx} of the disclosure document. \
                                        The franchisee shall pay the fees described herein.")
                }] }],
            })];
            if idx % 9 == 3 {
                let header = headers[(idx / 9) % headers.len()];
                blocks.insert(
                    0,
                    json!({
                        "type": "title",
                        "bbox": [40.0, 50.0, 560.0, 90.0],
                        "lines": [{ "spans": [{ "content": header }] }],
                    }),
                );
            }
            json!({ "page_idx": idx, "para_blocks": blocks })
        })
        .collect();
    json!({ "pdf_info": pages }).to_string()
}

fn bench_detect(c: &mut Criterion) {
    let raw = synthetic_document(80);
    let doc = parse_layout(&raw).unwrap();
    let detector = SectionDetector::new();

    c.bench_function("detect_80_pages", |b| {
        b.iter(|| black_box(detector.detect(black_box(&doc))))
    });

    c.bench_function("parse_layout_80_pages", |b| {
        b.iter(|| black_box(parse_layout(black_box(&raw)).unwrap()))
    });
}

criterion_group!(benches, bench_detect);
criterion_main!(benches);
