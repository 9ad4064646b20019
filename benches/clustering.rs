use adcluster::cluster::{Clustering, ElbowSelector, Kmeans};
use adcluster::reduce::{Pca, Projection};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use rand::prelude::*;

fn random_data(n: usize, d: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n, d), |_| rng.random::<f64>())
}

fn bench_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans");

    // Campaign-sized table: ~1.1k records, 8 features.
    let data = random_data(1143, 8, 42);

    group.bench_function("fit_predict_n1143_d8_k5", |b| {
        b.iter(|| {
            let model = Kmeans::new(5).with_n_init(1).with_max_iter(50).with_seed(42);
            model.fit_predict(black_box(data.view())).unwrap();
        })
    });

    group.bench_function("inertia_curve_n1143_d8_k10", |b| {
        b.iter(|| {
            ElbowSelector::new(10)
                .with_n_init(1)
                .with_max_iter(50)
                .with_seed(42)
                .inertia_curve(black_box(data.view()))
                .unwrap();
        })
    });

    group.finish();
}

fn bench_pca(c: &mut Criterion) {
    let data = random_data(1143, 8, 7);

    c.bench_function("pca_fit_transform_d8_m2", |b| {
        b.iter(|| {
            let model = Pca::new(2).fit(black_box(data.view())).unwrap();
            model.transform(data.view()).unwrap();
        })
    });
}

criterion_group!(benches, bench_kmeans, bench_pca);
criterion_main!(benches);
