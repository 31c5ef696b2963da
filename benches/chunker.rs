use agent_memory::context::{chunk_text_by_structure, count_tokens, merge_chunks};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn document(sections: usize) -> String {
    let mut text = String::new();
    for section in 0..sections {
        text.push_str(&format!("## Section {}\n\n", section));
        for para in 0..4 {
            for sentence in 0..6 {
                text.push_str(&format!(
                    "Sentence {} of paragraph {} covers session memory and summaries. ",
                    sentence, para
                ));
            }
            text.push_str("\n\n");
        }
    }
    text
}

/// Benchmark structural chunking at several document sizes
fn benchmark_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunking");

    for sections in [4, 16, 64] {
        let text = document(sections);
        group.bench_with_input(BenchmarkId::new("approx", sections), &text, |b, text| {
            b.iter(|| chunk_text_by_structure(black_box(text), 200, "local-model"));
        });
        group.bench_with_input(BenchmarkId::new("cl100k", sections), &text, |b, text| {
            b.iter(|| chunk_text_by_structure(black_box(text), 200, "gpt-4o"));
        });
    }

    group.finish();
}

/// Benchmark the greedy merge pass
fn benchmark_merge(c: &mut Criterion) {
    let text = document(32);
    let chunks = chunk_text_by_structure(&text, 100, "local-model");

    c.bench_function("merge_chunks", |b| {
        b.iter(|| merge_chunks(black_box(chunks.clone()), 400, "local-model"));
    });
}

fn benchmark_token_count(c: &mut Criterion) {
    let text = document(8);
    c.bench_function("count_tokens_cl100k", |b| {
        b.iter(|| count_tokens(black_box(&text), "gpt-4o"));
    });
}

criterion_group!(benches, benchmark_chunking, benchmark_merge, benchmark_token_count);
criterion_main!(benches);
