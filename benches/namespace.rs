//! Namespace benchmark: keyed writes and projections over pattern-sized attributes.

use benchbot::namespace::{Key, Namespace};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn filled(depths: i64, fs: i64) -> Namespace {
    let mut ns = Namespace::new();
    ns.set_key_names("expanded", &["depth", "f"]);
    for d in 0..depths {
        for f in 0..fs {
            ns.insert("expanded", vec![Key::Int(d), Key::Int(f)], d * f);
        }
    }
    ns
}

fn bench_keyed_write(c: &mut Criterion) {
    let mut ns = filled(1, 1);
    c.bench_function("namespace_set_keyed", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            ns.set_keyed(
                "expanded",
                &[("f", Key::Int(i % 64)), ("depth", Key::Int(i % 32))],
                black_box(i),
            )
            .unwrap()
        })
    });
}

fn bench_projection(c: &mut Criterion) {
    let ns = filled(64, 64);
    c.bench_function("namespace_project_4096", |b| {
        b.iter(|| black_box(ns.project("expanded", &["depth"]).unwrap().len()))
    });
}

criterion_group!(benches, bench_keyed_write, bench_projection);
criterion_main!(benches);
