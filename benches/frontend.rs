use std::fs;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fangless::{lexer, parser};

fn bench_frontend(c: &mut Criterion) {
    let source = fs::read_to_string("tests/programs/showcase.py")
        .unwrap_or_else(|err| panic!("read showcase program: {err}"));

    c.bench_function("frontend_tokenize_showcase", |b| {
        b.iter(|| {
            let out = lexer::tokenize(black_box(&source));
            black_box(out);
        })
    });

    c.bench_function("frontend_parse_showcase", |b| {
        b.iter(|| {
            let out = parser::parse(black_box(&source));
            black_box(out);
        })
    });
}

criterion_group!(benches, bench_frontend);
criterion_main!(benches);
