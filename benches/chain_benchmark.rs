use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ripple_api::models::{Deed, GeoPoint};
use ripple_api::services::chain;

/// Build a linear chain of `len` deeds with correct counters.
fn linear_chain(len: usize) -> Vec<Deed> {
    let mut deeds = Vec::with_capacity(len);
    for i in 0..len {
        let mut deed = Deed::unlinked(
            format!("deed-{:06}", i),
            format!("user-{:06}", i),
            "challenge-1".to_string(),
            "https://example.com/pic.jpg".to_string(),
            "done".to_string(),
            GeoPoint { lat: 51.5, lng: -0.12 },
            format!("2025-06-01T10:{:02}:{:02}Z", (i / 60) % 60, i % 60),
        );
        if i > 0 {
            deed.prev_deed_id = Some(format!("deed-{:06}", i - 1));
        }
        if i + 1 < len {
            deed.next_deed_id = Some(format!("deed-{:06}", i + 1));
        }
        deed.num_contributions = (len - i) as u32;
        deeds.push(deed);
    }
    deeds
}

/// Build a wide chain: one root with `fanout` children, each with
/// `fanout` children of their own.
fn branching_chain(fanout: usize) -> Vec<Deed> {
    let mut deeds = linear_chain(1);
    for i in 0..fanout {
        let mut child = Deed::unlinked(
            format!("child-{:04}", i),
            format!("user-c{:04}", i),
            "challenge-1".to_string(),
            "https://example.com/pic.jpg".to_string(),
            "done".to_string(),
            GeoPoint { lat: 51.5, lng: -0.12 },
            format!("2025-06-02T10:00:{:02}Z", i % 60),
        );
        child.prev_deed_id = Some("deed-000000".to_string());
        deeds.push(child);
        for j in 0..fanout {
            let mut grandchild = Deed::unlinked(
                format!("grandchild-{:04}-{:04}", i, j),
                format!("user-g{:04}-{:04}", i, j),
                "challenge-1".to_string(),
                "https://example.com/pic.jpg".to_string(),
                "done".to_string(),
                GeoPoint { lat: 51.5, lng: -0.12 },
                format!("2025-06-03T10:00:{:02}Z", j % 60),
            );
            grandchild.prev_deed_id = Some(format!("child-{:04}", i));
            deeds.push(grandchild);
        }
    }
    deeds
}

fn benchmark_chain_ops(c: &mut Criterion) {
    let deep = linear_chain(1000);
    let wide = branching_chain(30);

    let mut group = c.benchmark_group("chain");

    group.bench_function("build_forest_deep_1000", |b| {
        b.iter(|| chain::build_chain_forest(black_box(deep.clone())))
    });

    group.bench_function("build_forest_wide_930", |b| {
        b.iter(|| chain::build_chain_forest(black_box(wide.clone())))
    });

    group.bench_function("recompute_contributions_deep_1000", |b| {
        b.iter(|| chain::recompute_contributions(black_box(deep.clone())))
    });

    group.bench_function("verify_contributions_deep_1000", |b| {
        b.iter(|| chain::verify_contributions(black_box(&deep)))
    });

    group.finish();
}

criterion_group!(benches, benchmark_chain_ops);
criterion_main!(benches);
