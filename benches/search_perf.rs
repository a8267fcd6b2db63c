use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use tempfile::TempDir;

use file_record_search::config::SearchConfig;
use file_record_search::model::types::MatchMode;
use file_record_search::search::{SearchEngine, SearchRequest};
use file_record_search::storage::sqlite::{NewFileRecord, RecordStore};

const WORDS: &[&str] = &[
    "invoice", "report", "budget", "forecast", "draft", "summary", "quarterly", "annual",
    "meeting", "notes", "plan", "design", "spec", "review", "archive", "export",
];

/// Seeded corpus: 5k records across 4 owners, indexed in one rebuild.
fn seeded_engine(docs: usize) -> (TempDir, Arc<SearchEngine>) {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(RecordStore::open_in_memory().expect("store"));
    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..docs {
        let a = WORDS[rng.gen_range(0..WORDS.len())];
        let b = WORDS[rng.gen_range(0..WORDS.len())];
        store
            .insert(NewFileRecord {
                owner_id: (i % 4) as i64 + 1,
                workspace_id: Some((i % 7) as i64),
                name: format!("{a}_{b}_{i}.pdf"),
                path: format!("/files/{a}/{b}/{i}.pdf"),
                description: Some(format!("{a} {b} generated for benchmark run {i}")),
                tags: Some(format!("{a},{b}")),
                importance_score: (i % 100) as f64,
                is_favorite: i % 9 == 0,
                ..NewFileRecord::default()
            })
            .expect("insert");
    }
    let engine = Arc::new(SearchEngine::open(
        store,
        dir.path(),
        SearchConfig::default(),
    ));
    assert!(engine.rebuild());
    (dir, engine)
}

fn bench_fuzzy_search(c: &mut Criterion) {
    let (_dir, engine) = seeded_engine(5_000);
    c.bench_function("fuzzy_search_5k_docs", |b| {
        b.iter(|| {
            let req = SearchRequest::new("inv", 1);
            black_box(engine.search(&req).expect("search"));
        })
    });
}

fn bench_phrase_search(c: &mut Criterion) {
    let (_dir, engine) = seeded_engine(5_000);
    c.bench_function("phrase_search_5k_docs", |b| {
        b.iter(|| {
            let mut req = SearchRequest::new("quarterly budget", 1);
            req.mode = MatchMode::Phrase;
            black_box(engine.search(&req).expect("search"));
        })
    });
}

fn bench_suggest(c: &mut Criterion) {
    let (_dir, engine) = seeded_engine(5_000);
    engine.warm_vocabulary().expect("warm");
    c.bench_function("suggest_5k_docs", |b| {
        b.iter(|| {
            black_box(engine.suggest("re", 1, Some(5)));
        })
    });
}

criterion_group!(benches, bench_fuzzy_search, bench_phrase_search, bench_suggest);
criterion_main!(benches);
