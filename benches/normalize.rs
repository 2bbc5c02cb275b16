//! Benchmarks for page parsing, normalization, and batch upserts.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use biblio_harvest::client::{WireAuthor, WireCategories, WireRecord, parse_page};
use biblio_harvest::model::NormalizedRecord;
use biblio_harvest::normalize::{Normalized, normalize};
use biblio_harvest::store::{MemRecordStore, RecordStore};

fn sample_record(i: usize) -> WireRecord {
    let mut record = WireRecord::article(
        &format!("oai:arXiv.org:2401.{i:05}"),
        "  On the   harvesting of\n  bibliographic metadata ",
        "2024-01-15",
    );
    record.abstract_text = Some("We study   incremental\tharvesting. ".repeat(20));
    record.authors = (0..8)
        .map(|a| WireAuthor::Parts {
            keyname: format!("Author{a}"),
            forenames: Some("A. B.".into()),
            suffix: None,
        })
        .collect();
    record.categories = Some(WireCategories::Joined("cs.DL cs.IR cs.DB cs.IR".into()));
    record.identifiers.doi = Some("https://doi.org/10.1000/182".into());
    record.created = Some("2024-01-10T08:00:00Z".into());
    record
}

fn bench_normalize(c: &mut Criterion) {
    let record = sample_record(1);
    c.bench_function("normalize_record", |bench| {
        bench.iter(|| black_box(normalize(black_box(&record))))
    });
}

fn bench_parse_page(c: &mut Criterion) {
    let records: Vec<String> = (0..100)
        .map(|i| {
            format!(
                r#"{{"identifier": "oai:arXiv.org:2401.{i:05}", "datestamp": "2024-01-15",
                    "title": "Paper {i}", "abstract": "Text of paper {i}.",
                    "authors": ["Ada Lovelace", {{"keyname": "Turing", "forenames": "Alan"}}],
                    "categories": "cs.DL cs.IR"}}"#
            )
        })
        .collect();
    let body = format!(
        r#"{{"records": [{}], "resumption_token": {{"value": "tok", "complete_list_size": 1000, "cursor": 0}}}}"#,
        records.join(",")
    );
    c.bench_function("parse_page_100", |bench| {
        bench.iter(|| black_box(parse_page(black_box(&body)).unwrap()))
    });
}

fn bench_upsert_batch(c: &mut Criterion) {
    let batch: Vec<NormalizedRecord> = (0..500)
        .filter_map(|i| match normalize(&sample_record(i)) {
            Normalized::Record(r) => Some(r),
            Normalized::Skipped(_) => None,
        })
        .collect();
    let store = MemRecordStore::new();
    c.bench_function("mem_upsert_500", |bench| {
        bench.iter(|| black_box(store.upsert_batch(&batch).unwrap()))
    });
}

criterion_group!(benches, bench_normalize, bench_parse_page, bench_upsert_batch);
criterion_main!(benches);
